use std::cmp::Ordering;

use super::query::{ConditionFilter, QuerySpec, SortKey};
use crate::models::Listing;

/// Case-insensitive substring match on title or location. Empty terms match.
pub fn matches_search(listing: &Listing, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    let term = term.to_lowercase();
    listing.title.to_lowercase().contains(&term) || listing.location.to_lowercase().contains(&term)
}

pub fn matches_condition(listing: &Listing, condition: &ConditionFilter) -> bool {
    match condition {
        ConditionFilter::All => true,
        ConditionFilter::Only(wanted) => listing.condition.to_lowercase() == wanted.to_lowercase(),
    }
}

pub fn compare(a: &Listing, b: &Listing, sort: SortKey) -> Ordering {
    match sort {
        SortKey::Newest => b.created_at.cmp(&a.created_at),
        SortKey::PriceLow => a.price.total_cmp(&b.price),
        SortKey::PriceHigh => b.price.total_cmp(&a.price),
        SortKey::Rating => b.rating.total_cmp(&a.rating),
    }
}

/// Filter by search and condition, then stable-sort by the query's sort key.
pub fn filter_and_sort<'a>(listings: &'a [Listing], spec: &QuerySpec) -> Vec<&'a Listing> {
    let term = spec.search_term().to_lowercase();
    let mut matched: Vec<&Listing> = listings
        .iter()
        .filter(|listing| matches_search(listing, &term) && matches_condition(listing, &spec.condition))
        .collect();
    matched.sort_by(|a, b| compare(a, b, spec.sort));
    matched
}

/// Owned variant of [`filter_and_sort`]
pub fn filter_and_sort_owned(listings: &[Listing], spec: &QuerySpec) -> Vec<Listing> {
    filter_and_sort(listings, spec).into_iter().cloned().collect()
}
