use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_PAGE_SIZE;

/// Sentinel condition value that disables condition filtering
pub const ALL_CONDITIONS: &str = "all";

/// Result ordering for discovery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Descending by creation timestamp
    #[default]
    Newest,
    PriceLow,
    PriceHigh,
    /// Descending by rating, absent rating as 0
    Rating,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Newest => "newest",
            SortKey::PriceLow => "price_low",
            SortKey::PriceHigh => "price_high",
            SortKey::Rating => "rating",
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "newest" => Ok(SortKey::Newest),
            "price_low" => Ok(SortKey::PriceLow),
            "price_high" => Ok(SortKey::PriceHigh),
            "rating" => Ok(SortKey::Rating),
            other => Err(format!("unknown sort key '{}'", other)),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition filter: everything, or one condition compared case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionFilter {
    #[default]
    All,
    Only(String),
}

impl ConditionFilter {
    pub fn is_all(&self) -> bool {
        matches!(self, ConditionFilter::All)
    }
}

impl From<&str> for ConditionFilter {
    fn from(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case(ALL_CONDITIONS) {
            ConditionFilter::All
        } else {
            ConditionFilter::Only(value.to_string())
        }
    }
}

impl From<String> for ConditionFilter {
    fn from(value: String) -> Self {
        ConditionFilter::from(value.as_str())
    }
}

impl From<ConditionFilter> for String {
    fn from(value: ConditionFilter) -> Self {
        match value {
            ConditionFilter::All => ALL_CONDITIONS.to_string(),
            ConditionFilter::Only(condition) => condition,
        }
    }
}

/// Current discovery intent: what to search, filter, sort and which page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub search: String,
    pub condition: ConditionFilter,
    pub sort: SortKey,
    pub page: usize,
    pub page_size: usize,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            search: String::new(),
            condition: ConditionFilter::All,
            sort: SortKey::Newest,
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl QuerySpec {
    pub fn new(search: impl Into<String>, condition: impl Into<ConditionFilter>, sort: SortKey) -> Self {
        Self {
            search: search.into(),
            condition: condition.into(),
            sort,
            ..Self::default()
        }
    }

    /// Search term exactly as typed; only the empty string matches everything
    pub fn search_term(&self) -> &str {
        &self.search
    }

    /// True when the filtering inputs (search, condition, sort) differ
    pub fn filters_differ(&self, other: &QuerySpec) -> bool {
        self.search_term() != other.search_term()
            || self.condition != other.condition
            || self.sort != other.sort
    }
}
