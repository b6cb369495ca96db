use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wattshare::{Config, Discovery, ListingStore, MemoryStore, SavedListings, SortKey, SupabaseStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "wattshare=info".into()))
        .init();

    info!("☀️ WattShare - Solar Listing Explorer");
    info!("=====================================");

    let config = Config::from_env().context("Failed to load configuration")?;

    // wattshare [search] [condition] [sort]
    let mut args = std::env::args().skip(1);
    let search = args.next().unwrap_or_default();
    let condition = args.next().unwrap_or_else(|| "all".to_string());
    let sort = match args.next() {
        Some(raw) => raw.parse::<SortKey>().map_err(anyhow::Error::msg)?,
        None => SortKey::Newest,
    };

    match &config.supabase {
        Some(supabase) => {
            info!("Using Supabase backend at {}", supabase.url);
            let store = SupabaseStore::new(supabase, config.http_timeout)
                .context("Failed to create Supabase client")?;
            run(Arc::new(store), &config, search, condition, sort).await
        }
        None => {
            info!("SUPABASE_URL not set, using demo listings...");
            run(Arc::new(MemoryStore::demo()), &config, search, condition, sort).await
        }
    }
}

async fn run<S: ListingStore + 'static>(
    store: Arc<S>,
    config: &Config,
    search: String,
    condition: String,
    sort: SortKey,
) -> anyhow::Result<()> {
    let saved = SavedListings::from_config(Arc::clone(&store), config);
    saved.load().await;

    let mut discovery = Discovery::from_config(store, config);
    discovery.set_search(search);
    discovery.set_condition(condition.as_str());
    discovery.set_sort(sort);

    let page = discovery
        .refresh()
        .await
        .context("Failed to load listings")?
        .clone();

    info!("\n✅ {}\n", discovery.summary());

    for (i, listing) in page.items.iter().enumerate() {
        let marker = if saved.is_saved(&listing.id) { "★" } else { " " };
        let sponsored = if listing.is_sponsored { " [Sponsored]" } else { "" };
        println!("{}{}. {} (${:.2}){}", marker, i + 1, listing.title, listing.price, sponsored);
        println!("   {} · {} condition · rating {:.1}", listing.location, listing.condition, listing.rating);
        println!("   ID: {}", listing.id);
        println!("   Image: {}", listing.primary_image());
        println!();
    }
    println!("Page {} of {}", page.page + 1, page.total_pages);

    for notice in saved.take_notices().into_iter().chain(discovery.take_notices()) {
        info!("{}: {}", notice.title, notice.description);
    }

    let json = serde_json::to_string_pretty(&page)?;
    tokio::fs::write("listings.json", json).await?;
    info!("💾 Saved {} listings to listings.json", page.items.len());

    Ok(())
}
