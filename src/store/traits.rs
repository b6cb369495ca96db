use async_trait::async_trait;

use super::types::{ListingFilter, ListingPage};
use crate::error::AppResult;
use crate::models::{CurrentUser, Listing, ListingImage};

/// Common trait for every listing backend.
/// The hosted backend and the in-process store both answer these queries.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Filtered, sorted, ranged listing query with the total match count
    async fn query_listings(&self, filter: &ListingFilter) -> AppResult<ListingPage>;

    async fn get_listing_by_id(&self, id: &str) -> AppResult<Option<Listing>>;

    async fn get_images_for_listing(&self, id: &str) -> AppResult<Vec<ListingImage>>;

    /// Listings with a paid deal, to be kept out of discovery
    async fn get_paid_listing_ids(&self) -> AppResult<Vec<String>>;

    async fn get_saved_listing_ids(&self, user_id: &str) -> AppResult<Vec<String>>;

    async fn insert_saved_mark(&self, user_id: &str, listing_id: &str) -> AppResult<()>;

    async fn delete_saved_mark(&self, user_id: &str, listing_id: &str) -> AppResult<()>;

    async fn get_current_user(&self) -> AppResult<Option<CurrentUser>>;

    /// Name of the backend, for logs
    fn store_name(&self) -> &'static str;
}
