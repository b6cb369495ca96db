//! Loose row shapes as the backend returns them, and the one-time
//! normalization into [`Listing`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Listing, ListingImage};

/// Listing row before normalization. Every field may be missing or mistyped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawListing {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub title: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(default)]
    pub condition: Option<Value>,
    #[serde(default)]
    pub rating: Option<Value>,
    #[serde(default)]
    pub created_at: Option<Value>,
    #[serde(default)]
    pub is_sponsored: Option<Value>,
    #[serde(default)]
    pub seller_id: Option<Value>,
    #[serde(default)]
    pub listing_images: Option<Vec<RawImage>>,
}

/// Image row before normalization
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawImage {
    #[serde(default)]
    pub image_url: Option<Value>,
    #[serde(default)]
    pub is_primary: Option<Value>,
}

impl RawImage {
    /// Rows without a URL carry nothing displayable and are dropped.
    pub fn normalize(self) -> Option<ListingImage> {
        let url = text(self.image_url.as_ref());
        if url.is_empty() {
            return None;
        }
        Some(ListingImage {
            url,
            is_primary: flag(self.is_primary.as_ref()),
        })
    }
}

impl Listing {
    pub fn from_raw(raw: RawListing) -> Self {
        let images = raw
            .listing_images
            .unwrap_or_default()
            .into_iter()
            .filter_map(RawImage::normalize)
            .collect();

        Listing {
            id: text(raw.id.as_ref()),
            title: text(raw.title.as_ref()),
            price: number(raw.price.as_ref()).filter(|p| *p >= 0.0).unwrap_or(0.0),
            location: text(raw.location.as_ref()),
            condition: text(raw.condition.as_ref()),
            rating: number(raw.rating.as_ref())
                .map(|r| r.clamp(0.0, 5.0))
                .unwrap_or(0.0),
            created_at: timestamp(raw.created_at.as_ref()),
            is_sponsored: flag(raw.is_sponsored.as_ref()),
            seller_id: text(raw.seller_id.as_ref()),
            images,
        }
    }
}

impl From<RawListing> for Listing {
    fn from(raw: RawListing) -> Self {
        Listing::from_raw(raw)
    }
}

/// Stringify any JSON value; null and missing become empty.
pub(crate) fn text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        _ => false,
    }
}

fn timestamp(value: Option<&Value>) -> DateTime<Utc> {
    let raw = match value {
        Some(Value::String(s)) => s.trim(),
        _ => return DateTime::<Utc>::default(),
    };
    parse_timestamp(raw).unwrap_or_default()
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PLACEHOLDER_IMAGE;
    use serde_json::json;

    fn raw(value: Value) -> RawListing {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_full_row_normalizes() {
        let listing = Listing::from_raw(raw(json!({
            "id": "abc",
            "title": "Mono panel 400W",
            "price": 120.5,
            "location": "Austin, TX",
            "condition": "Used",
            "rating": 4,
            "created_at": "2024-02-01T10:00:00.123456+00:00",
            "is_sponsored": true,
            "seller_id": "seller-1",
            "listing_images": [
                {"image_url": "x.png", "is_primary": false},
                {"image_url": "y.png", "is_primary": true}
            ]
        })));

        assert_eq!(listing.id, "abc");
        assert_eq!(listing.price, 120.5);
        assert_eq!(listing.condition, "Used");
        assert_eq!(listing.rating, 4.0);
        assert!(listing.is_sponsored);
        assert_eq!(listing.primary_image(), "y.png");
        assert_eq!(listing.created_at.to_rfc3339(), "2024-02-01T10:00:00.123456+00:00");
    }

    #[test]
    fn test_missing_and_mistyped_fields_get_defaults() {
        let listing = Listing::from_raw(raw(json!({
            "id": 7,
            "title": null,
            "price": "-3",
            "location": 42,
            "rating": "9.5",
            "created_at": "not a date",
            "listing_images": [{"image_url": null}]
        })));

        assert_eq!(listing.id, "7");
        assert_eq!(listing.title, "");
        assert_eq!(listing.price, 0.0);
        assert_eq!(listing.location, "42");
        assert_eq!(listing.condition, "");
        assert_eq!(listing.rating, 5.0);
        assert_eq!(listing.created_at, DateTime::<Utc>::default());
        assert!(!listing.is_sponsored);
        assert!(listing.images.is_empty());
        assert_eq!(listing.primary_image(), PLACEHOLDER_IMAGE);
    }

    #[test]
    fn test_empty_object_is_tolerated() {
        let listing = Listing::from_raw(raw(json!({})));
        assert_eq!(listing.id, "");
        assert_eq!(listing.rating, 0.0);
    }

    #[test]
    fn test_timestamp_formats() {
        let date_only = parse_timestamp("2024-01-01").unwrap();
        assert_eq!(date_only.to_rfc3339(), "2024-01-01T00:00:00+00:00");

        let naive = parse_timestamp("2024-01-01T08:30:00").unwrap();
        assert_eq!(naive.to_rfc3339(), "2024-01-01T08:30:00+00:00");

        let spaced = parse_timestamp("2024-01-01 08:30:00.5").unwrap();
        assert_eq!(spaced.timestamp(), naive.timestamp());

        assert!(parse_timestamp("yesterday").is_none());
    }
}
