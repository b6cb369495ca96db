use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::traits::ListingStore;
use super::types::{ListingFilter, ListingPage};
use crate::discovery::filter::filter_and_sort_owned;
use crate::error::{AppError, AppResult};
use crate::models::{CurrentUser, Deal, Listing, ListingImage, SavedMark};

/// Remote operations recorded by [`MemoryStore`], in issue order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    QueryListings,
    GetListing(String),
    GetImages(String),
    GetPaidIds,
    GetSavedIds(String),
    Insert(String, String),
    Delete(String, String),
    GetCurrentUser,
}

#[derive(Debug, Default)]
struct Failures {
    /// Listing queries to let through before one fails
    query: Option<usize>,
    saved_ids: bool,
    insert: bool,
    delete: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    listings: Vec<Listing>,
    deals: Vec<Deal>,
    saved: HashSet<SavedMark>,
    user: Option<CurrentUser>,
    calls: Vec<StoreCall>,
    fail_next: Failures,
}

/// In-process listing store: demo data for the binary and a fake for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    write_gate: Gate,
    saved_read_gate: Gate,
}

type Gate = Arc<Mutex<Option<Arc<Semaphore>>>>;

impl MemoryStore {
    pub fn new(listings: Vec<Listing>) -> Self {
        let store = Self::default();
        store.lock().listings = listings;
        store
    }

    /// Store seeded with the bundled demo catalogue
    pub fn demo() -> Self {
        let store = Self::new(demo_listings());
        store.add_deal(Deal {
            listing_id: "demo-7".to_string(),
            status: "paid".to_string(),
        });
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_deal(&self, deal: Deal) {
        self.lock().deals.push(deal);
    }

    pub fn set_user(&self, user: Option<CurrentUser>) {
        self.lock().user = user;
    }

    pub fn sign_in(&self, user_id: &str) {
        self.set_user(Some(CurrentUser {
            id: user_id.to_string(),
            email: None,
        }));
    }

    pub fn seed_saved(&self, user_id: &str, listing_id: &str) {
        self.lock().saved.insert(SavedMark {
            user_id: user_id.to_string(),
            listing_id: listing_id.to_string(),
        });
    }

    pub fn has_saved(&self, user_id: &str, listing_id: &str) -> bool {
        self.lock().saved.contains(&SavedMark {
            user_id: user_id.to_string(),
            listing_id: listing_id.to_string(),
        })
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    /// Writes (insert/delete) recorded so far
    pub fn write_calls(&self) -> Vec<StoreCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, StoreCall::Insert(..) | StoreCall::Delete(..)))
            .collect()
    }

    pub fn fail_next_query(&self) {
        self.fail_query_after(0);
    }

    /// Let `successes` listing queries through, then fail the one after.
    pub fn fail_query_after(&self, successes: usize) {
        self.lock().fail_next.query = Some(successes);
    }

    pub fn fail_next_saved_ids(&self) {
        self.lock().fail_next.saved_ids = true;
    }

    pub fn fail_next_insert(&self) {
        self.lock().fail_next.insert = true;
    }

    pub fn fail_next_delete(&self) {
        self.lock().fail_next.delete = true;
    }

    /// Park every subsequent write until [`MemoryStore::release_writes`] lets it through.
    pub fn hold_writes(&self) {
        close_gate(&self.write_gate);
    }

    pub fn release_writes(&self, count: usize) {
        open_gate(&self.write_gate, count);
    }

    /// Park saved-id reads after they have snapshotted the marks, until released.
    pub fn hold_saved_reads(&self) {
        close_gate(&self.saved_read_gate);
    }

    pub fn release_saved_reads(&self, count: usize) {
        open_gate(&self.saved_read_gate, count);
    }

    fn record(&self, call: StoreCall) {
        debug!("memory store call: {:?}", call);
        self.lock().calls.push(call);
    }

    async fn pass_gate(gate: &Gate) -> AppResult<()> {
        let gate = gate.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(gate) = gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| AppError::RemoteOperationFailed(e.to_string()))?;
            permit.forget();
        }
        Ok(())
    }

    fn injected(message: &str) -> AppError {
        AppError::Remote {
            status: 503,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn query_listings(&self, filter: &ListingFilter) -> AppResult<ListingPage> {
        self.record(StoreCall::QueryListings);
        let mut state = self.lock();
        match state.fail_next.query {
            Some(0) => {
                state.fail_next.query = None;
                return Err(Self::injected("listing query failed"));
            }
            Some(n) => state.fail_next.query = Some(n - 1),
            None => {}
        }

        let excluded: HashSet<&str> = filter.exclude_ids.iter().map(String::as_str).collect();
        let candidates: Vec<Listing> = state
            .listings
            .iter()
            .filter(|l| !excluded.contains(l.id.as_str()))
            .cloned()
            .collect();
        let matched = filter_and_sort_owned(&candidates, &filter.as_query_spec());
        let total_count = matched.len();

        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(usize::MAX);
        let items = matched.into_iter().skip(offset).take(limit).collect();

        Ok(ListingPage { items, total_count })
    }

    async fn get_listing_by_id(&self, id: &str) -> AppResult<Option<Listing>> {
        self.record(StoreCall::GetListing(id.to_string()));
        Ok(self.lock().listings.iter().find(|l| l.id == id).cloned())
    }

    async fn get_images_for_listing(&self, id: &str) -> AppResult<Vec<ListingImage>> {
        self.record(StoreCall::GetImages(id.to_string()));
        Ok(self
            .lock()
            .listings
            .iter()
            .find(|l| l.id == id)
            .map(|l| l.images.clone())
            .unwrap_or_default())
    }

    async fn get_paid_listing_ids(&self) -> AppResult<Vec<String>> {
        self.record(StoreCall::GetPaidIds);
        Ok(self
            .lock()
            .deals
            .iter()
            .filter(|d| d.is_paid())
            .map(|d| d.listing_id.clone())
            .collect())
    }

    async fn get_saved_listing_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.record(StoreCall::GetSavedIds(user_id.to_string()));
        let ids = {
            let mut state = self.lock();
            if std::mem::take(&mut state.fail_next.saved_ids) {
                return Err(Self::injected("saved listing fetch failed"));
            }
            let mut ids: Vec<String> = state
                .saved
                .iter()
                .filter(|m| m.user_id == user_id)
                .map(|m| m.listing_id.clone())
                .collect();
            ids.sort();
            ids
        };
        Self::pass_gate(&self.saved_read_gate).await?;
        Ok(ids)
    }

    async fn insert_saved_mark(&self, user_id: &str, listing_id: &str) -> AppResult<()> {
        self.record(StoreCall::Insert(user_id.to_string(), listing_id.to_string()));
        Self::pass_gate(&self.write_gate).await?;

        let mut state = self.lock();
        if std::mem::take(&mut state.fail_next.insert) {
            return Err(Self::injected("insert failed"));
        }
        let inserted = state.saved.insert(SavedMark {
            user_id: user_id.to_string(),
            listing_id: listing_id.to_string(),
        });
        if !inserted {
            return Err(AppError::Remote {
                status: 409,
                message: "duplicate key value violates unique constraint".to_string(),
            });
        }
        Ok(())
    }

    async fn delete_saved_mark(&self, user_id: &str, listing_id: &str) -> AppResult<()> {
        self.record(StoreCall::Delete(user_id.to_string(), listing_id.to_string()));
        Self::pass_gate(&self.write_gate).await?;

        let mut state = self.lock();
        if std::mem::take(&mut state.fail_next.delete) {
            return Err(Self::injected("delete failed"));
        }
        state.saved.remove(&SavedMark {
            user_id: user_id.to_string(),
            listing_id: listing_id.to_string(),
        });
        Ok(())
    }

    async fn get_current_user(&self) -> AppResult<Option<CurrentUser>> {
        self.record(StoreCall::GetCurrentUser);
        Ok(self.lock().user.clone())
    }

    fn store_name(&self) -> &'static str {
        "Memory"
    }
}

fn close_gate(gate: &Gate) {
    *gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(Semaphore::new(0)));
}

fn open_gate(gate: &Gate, count: usize) {
    if let Some(gate) = gate.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
        gate.add_permits(count);
    }
}

/// Demo solar catalogue used when no backend is configured
pub fn demo_listings() -> Vec<Listing> {
    info!("📋 Generating demo solar listings");

    let base = Utc
        .with_ymd_and_hms(2024, 6, 1, 9, 0, 0)
        .single()
        .unwrap_or_default();
    let rows: [(&str, f64, &str, &str, Option<f64>, i64, bool); 8] = [
        ("Monocrystalline Panel 400W", 180.0, "Austin, TX", "new", Some(4.6), 0, true),
        ("Used Polycrystalline Panels (x10)", 650.0, "Lahore", "used", Some(3.9), 3, false),
        ("Hybrid Inverter 5kW", 920.0, "San Francisco, CA", "like new", Some(4.8), 6, false),
        ("LiFePO4 Battery 10kWh", 3100.0, "Karachi", "new", None, 9, true),
        ("Surplus Solar Energy 50kWh/month", 35.0, "Islamabad", "new", Some(4.2), 12, false),
        ("Charge Controller MPPT 60A", 140.0, "Austin, TX", "used", Some(4.0), 15, false),
        ("Roof Mounting Kit", 220.0, "Lahore", "like new", Some(3.5), 18, false),
        ("Portable Solar Generator 1kWh", 480.0, "Karachi", "used", Some(4.4), 21, false),
    ];

    rows.iter()
        .enumerate()
        .map(|(i, &(title, price, location, condition, rating, days_ago, sponsored))| Listing {
            id: format!("demo-{}", i + 1),
            title: title.to_string(),
            price,
            location: location.to_string(),
            condition: condition.to_string(),
            rating: rating.unwrap_or(0.0),
            created_at: base - Duration::days(days_ago),
            is_sponsored: sponsored,
            seller_id: format!("seller-{}", i % 3 + 1),
            images: vec![ListingImage {
                url: format!("https://images.wattshare.dev/demo-{}.jpg", i + 1),
                is_primary: true,
            }],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{QuerySpec, SortKey};

    #[tokio::test]
    async fn test_query_excludes_filters_and_ranges() {
        let store = MemoryStore::new(demo_listings());
        let spec = QuerySpec::new("", "all", SortKey::PriceLow);
        let page = store
            .query_listings(&ListingFilter::for_page(&spec, 2, 3, vec!["demo-5".into()]))
            .await
            .unwrap();

        assert_eq!(page.total_count, 7);
        assert_eq!(page.items.len(), 3);
        assert!(page.items.windows(2).all(|w| w[0].price <= w[1].price));
        assert!(page.items.iter().all(|l| l.id != "demo-5"));
    }

    #[tokio::test]
    async fn test_saved_marks_are_unique_per_pair() {
        let store = MemoryStore::default();
        store.insert_saved_mark("u1", "l1").await.unwrap();
        let err = store.insert_saved_mark("u1", "l1").await.unwrap_err();
        assert!(matches!(err, AppError::Remote { status: 409, .. }));

        store.insert_saved_mark("u2", "l1").await.unwrap();
        assert_eq!(store.get_saved_listing_ids("u1").await.unwrap(), vec!["l1".to_string()]);

        store.delete_saved_mark("u1", "l1").await.unwrap();
        assert!(!store.has_saved("u1", "l1"));
        assert!(store.has_saved("u2", "l1"));
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let store = MemoryStore::default();
        store.fail_next_insert();
        assert!(store.insert_saved_mark("u", "l").await.is_err());
        assert!(store.insert_saved_mark("u", "l").await.is_ok());
        assert_eq!(store.write_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_demo_store_has_a_paid_listing() {
        let store = MemoryStore::demo();
        assert_eq!(store.get_paid_listing_ids().await.unwrap(), vec!["demo-7".to_string()]);
        assert!(store.get_current_user().await.unwrap().is_none());
    }
}
