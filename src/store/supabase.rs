use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::traits::ListingStore;
use super::types::{ListingFilter, ListingPage};
use crate::config::SupabaseConfig;
use crate::discovery::SortKey;
use crate::error::{AppError, AppResult};
use crate::models::raw::text;
use crate::models::{CurrentUser, Listing, ListingImage, RawImage, RawListing, PAID_STATUS};

const LISTINGS: &str = "listings";
const LISTING_IMAGES: &str = "listing_images";
const SAVED_LISTINGS: &str = "saved_listings";
const DEALS: &str = "deals";

const LISTING_SELECT: &str = "*,listing_images(image_url,is_primary)";

/// Row shape shared by the `deals` and `saved_listings` id lookups
#[derive(Debug, Deserialize)]
struct ListingIdRow {
    #[serde(default)]
    listing_id: Option<Value>,
}

/// Listing store backed by a hosted Supabase project (PostgREST + GoTrue)
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
}

impl SupabaseStore {
    pub fn new(config: &SupabaseConfig, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wattshare/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        request.header("apikey", self.anon_key.as_str()).bearer_auth(bearer)
    }

    async fn send(&self, request: RequestBuilder) -> AppResult<Response> {
        let response = self.authed(request).send().await?;
        check_status(response).await
    }

    async fn fetch_rows<T: DeserializeOwned>(&self, table: &str, params: &[(String, String)]) -> AppResult<Vec<T>> {
        debug!("GET {} {:?}", table, params);
        let response = self.send(self.client.get(self.rest_url(table)).query(params)).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn fetch_listing_ids(&self, table: &str, params: &[(String, String)]) -> AppResult<Vec<String>> {
        let rows: Vec<ListingIdRow> = self.fetch_rows(table, params).await?;
        Ok(rows
            .into_iter()
            .map(|row| text(row.listing_id.as_ref()))
            .filter(|id| !id.is_empty())
            .collect())
    }
}

#[async_trait]
impl ListingStore for SupabaseStore {
    async fn query_listings(&self, filter: &ListingFilter) -> AppResult<ListingPage> {
        let params = listing_query_params(filter);
        debug!("Querying listings: {:?}", params);

        let request = self
            .client
            .get(self.rest_url(LISTINGS))
            .query(&params)
            .header("Prefer", "count=exact");
        let response = self.send(request).await?;

        let counted = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);

        let body = response.text().await?;
        let rows: Vec<RawListing> = serde_json::from_str(&body)?;
        let items: Vec<Listing> = rows.into_iter().map(Listing::from_raw).collect();

        let total_count = match counted {
            Some(total) => total,
            None => {
                warn!("Missing content-range total, falling back to page length");
                filter.offset.unwrap_or(0) + items.len()
            }
        };

        info!("Fetched {} listings ({} total)", items.len(), total_count);
        Ok(ListingPage { items, total_count })
    }

    async fn get_listing_by_id(&self, id: &str) -> AppResult<Option<Listing>> {
        let params = vec![
            ("select".to_string(), LISTING_SELECT.to_string()),
            ("id".to_string(), format!("eq.{}", id)),
            ("limit".to_string(), "1".to_string()),
        ];
        let rows: Vec<RawListing> = self.fetch_rows(LISTINGS, &params).await?;
        Ok(rows.into_iter().next().map(Listing::from_raw))
    }

    async fn get_images_for_listing(&self, id: &str) -> AppResult<Vec<ListingImage>> {
        let params = vec![
            ("select".to_string(), "image_url,is_primary".to_string()),
            ("listing_id".to_string(), format!("eq.{}", id)),
        ];
        let rows: Vec<RawImage> = self.fetch_rows(LISTING_IMAGES, &params).await?;
        Ok(rows.into_iter().filter_map(RawImage::normalize).collect())
    }

    async fn get_paid_listing_ids(&self) -> AppResult<Vec<String>> {
        let params = vec![
            ("select".to_string(), "listing_id".to_string()),
            ("status".to_string(), format!("eq.{}", PAID_STATUS)),
        ];
        self.fetch_listing_ids(DEALS, &params).await
    }

    async fn get_saved_listing_ids(&self, user_id: &str) -> AppResult<Vec<String>> {
        let params = vec![
            ("select".to_string(), "listing_id".to_string()),
            ("user_id".to_string(), format!("eq.{}", user_id)),
        ];
        self.fetch_listing_ids(SAVED_LISTINGS, &params).await
    }

    async fn insert_saved_mark(&self, user_id: &str, listing_id: &str) -> AppResult<()> {
        let request = self
            .client
            .post(self.rest_url(SAVED_LISTINGS))
            .header("Prefer", "return=minimal")
            .json(&json!([{ "user_id": user_id, "listing_id": listing_id }]));
        self.send(request).await?;
        debug!("Inserted saved mark {}/{}", user_id, listing_id);
        Ok(())
    }

    async fn delete_saved_mark(&self, user_id: &str, listing_id: &str) -> AppResult<()> {
        let params = [
            ("user_id", format!("eq.{}", user_id)),
            ("listing_id", format!("eq.{}", listing_id)),
        ];
        let request = self.client.delete(self.rest_url(SAVED_LISTINGS)).query(&params);
        self.send(request).await?;
        debug!("Deleted saved mark {}/{}", user_id, listing_id);
        Ok(())
    }

    async fn get_current_user(&self) -> AppResult<Option<CurrentUser>> {
        if self.access_token.is_none() {
            return Ok(None);
        }

        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self.authed(self.client.get(url)).send().await?;
        if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            warn!("Access token rejected, continuing signed out");
            return Ok(None);
        }
        let response = check_status(response).await?;
        let body = response.text().await?;
        Ok(Some(serde_json::from_str(&body)?))
    }

    fn store_name(&self) -> &'static str {
        "Supabase"
    }
}

async fn check_status(response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    warn!("Supabase returned status: {} {}", status, message);
    Err(AppError::Remote {
        status: status.as_u16(),
        message,
    })
}

/// PostgREST query parameters for a listing filter
pub fn listing_query_params(filter: &ListingFilter) -> Vec<(String, String)> {
    let mut params = vec![
        ("select".to_string(), LISTING_SELECT.to_string()),
        ("order".to_string(), order_clause(filter.sort).to_string()),
    ];

    if let Some(term) = filter.search_term.as_deref().filter(|t| !t.is_empty()) {
        let pattern = quote(&format!("*{}*", escape_like(term)));
        params.push((
            "or".to_string(),
            format!("(title.ilike.{p},location.ilike.{p})", p = pattern),
        ));
    }
    if let Some(condition) = filter.condition.as_deref().filter(|c| !c.is_empty()) {
        params.push(("condition".to_string(), format!("ilike.{}", quote(&escape_like(condition)))));
    }
    if !filter.exclude_ids.is_empty() {
        let ids: Vec<String> = filter.exclude_ids.iter().map(|id| quote(id)).collect();
        params.push(("id".to_string(), format!("not.in.({})", ids.join(","))));
    }
    if let Some(offset) = filter.offset {
        params.push(("offset".to_string(), offset.to_string()));
    }
    if let Some(limit) = filter.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn order_clause(sort: SortKey) -> &'static str {
    match sort {
        SortKey::Newest => "created_at.desc,id.asc",
        SortKey::PriceLow => "price.asc,id.asc",
        SortKey::PriceHigh => "price.desc,id.asc",
        SortKey::Rating => "rating.desc.nullslast,id.asc",
    }
}

/// Make `%` and `_` literal inside an `ilike` pattern.
fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Double-quote a PostgREST filter value so commas and parens stay literal.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Total from a `Content-Range` header such as `0-24/120` or `*/0`
pub fn parse_content_range(header: &str) -> Option<usize> {
    let (_, total) = header.trim().rsplit_once('/')?;
    total.trim().parse().ok()
}
