use serde::{Deserialize, Serialize};

use crate::discovery::{ConditionFilter, QuerySpec, SortKey};
use crate::models::Listing;

/// Query parameters sent to a listing store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingFilter {
    /// Matched case-insensitively against title and location
    pub search_term: Option<String>,
    pub condition: Option<String>,
    pub sort: SortKey,
    pub offset: Option<usize>,
    /// `None` returns every match
    pub limit: Option<usize>,
    pub exclude_ids: Vec<String>,
}

impl ListingFilter {
    /// Filter for one page of `spec`, leaving out `exclude_ids`.
    pub fn for_page(spec: &QuerySpec, offset: usize, limit: usize, exclude_ids: Vec<String>) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(limit),
            ..Self::unpaged(spec, exclude_ids)
        }
    }

    /// Filter for every match of `spec`.
    pub fn unpaged(spec: &QuerySpec, exclude_ids: Vec<String>) -> Self {
        let term = spec.search_term();
        Self {
            search_term: (!term.is_empty()).then(|| term.to_string()),
            condition: match &spec.condition {
                ConditionFilter::All => None,
                ConditionFilter::Only(c) => Some(c.clone()),
            },
            sort: spec.sort,
            offset: None,
            limit: None,
            exclude_ids,
        }
    }

    /// The same filter as a query spec, for stores that filter in memory
    pub fn as_query_spec(&self) -> QuerySpec {
        QuerySpec::new(
            self.search_term.clone().unwrap_or_default(),
            self.condition.as_deref().unwrap_or_default(),
            self.sort,
        )
    }
}

/// One page of listings plus the total number of matches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingPage {
    pub items: Vec<Listing>,
    pub total_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_from_spec() {
        let spec = QuerySpec::new("panel", "used", SortKey::Rating);
        let filter = ListingFilter::for_page(&spec, 50, 25, vec!["9".into()]);
        assert_eq!(filter.search_term.as_deref(), Some("panel"));
        assert_eq!(filter.condition.as_deref(), Some("used"));
        assert_eq!(filter.offset, Some(50));
        assert_eq!(filter.limit, Some(25));
        assert_eq!(filter.exclude_ids, vec!["9".to_string()]);

        let all = ListingFilter::unpaged(&QuerySpec::default(), vec![]);
        assert_eq!(all.search_term, None);
        assert_eq!(all.condition, None);
        assert_eq!(all.limit, None);
    }

    #[test]
    fn test_round_trips_to_query_spec() {
        let spec = QuerySpec::new("panel", "used", SortKey::PriceHigh);
        let back = ListingFilter::unpaged(&spec, vec![]).as_query_spec();
        assert!(!back.filters_differ(&spec));
    }
}
