pub mod raw;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use raw::{RawImage, RawListing};

/// Image shown when a listing has no usable picture
pub const PLACEHOLDER_IMAGE: &str = "/placeholder.svg";

/// Deal status that removes a listing from discovery
pub const PAID_STATUS: &str = "paid";

pub type UserId = String;

/// A displayable picture for a listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListingImage {
    pub url: String,
    pub is_primary: bool,
}

/// Core listing data model, normalized at the store boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: String,
    pub title: String,
    /// Non-negative, currency-agnostic
    pub price: f64,
    pub location: String,
    pub condition: String,
    /// In [0, 5]; absent ratings are stored as 0
    pub rating: f64,
    pub created_at: DateTime<Utc>,
    pub is_sponsored: bool,
    pub seller_id: String,
    pub images: Vec<ListingImage>,
}

impl Listing {
    /// Primary image if flagged, else the first image, else the placeholder.
    pub fn primary_image(&self) -> &str {
        self.images
            .iter()
            .find(|img| img.is_primary)
            .or_else(|| self.images.first())
            .map(|img| img.url.as_str())
            .unwrap_or(PLACEHOLDER_IMAGE)
    }
}

/// A user's bookmark of a listing; unique per (user, listing)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SavedMark {
    pub user_id: UserId,
    pub listing_id: String,
}

/// A completed-sale record for a listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deal {
    pub listing_id: String,
    pub status: String,
}

impl Deal {
    pub fn is_paid(&self) -> bool {
        self.status.eq_ignore_ascii_case(PAID_STATUS)
    }
}

/// The signed-in user as reported by the auth service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing_with(images: Vec<ListingImage>) -> Listing {
        Listing {
            id: "1".into(),
            title: "Panel".into(),
            price: 10.0,
            location: String::new(),
            condition: "new".into(),
            rating: 0.0,
            created_at: DateTime::<Utc>::default(),
            is_sponsored: false,
            seller_id: String::new(),
            images,
        }
    }

    fn image(url: &str, is_primary: bool) -> ListingImage {
        ListingImage { url: url.into(), is_primary }
    }

    #[test]
    fn test_primary_image_selection() {
        let listing = listing_with(vec![image("a.png", false), image("b.png", true)]);
        assert_eq!(listing.primary_image(), "b.png");

        let listing = listing_with(vec![image("a.png", false), image("c.png", false)]);
        assert_eq!(listing.primary_image(), "a.png");

        let listing = listing_with(vec![]);
        assert_eq!(listing.primary_image(), PLACEHOLDER_IMAGE);
    }

    #[test]
    fn test_deal_paid_status() {
        let deal = Deal { listing_id: "1".into(), status: "PAID".into() };
        assert!(deal.is_paid());
        let deal = Deal { listing_id: "1".into(), status: "pending".into() };
        assert!(!deal.is_paid());
    }
}
