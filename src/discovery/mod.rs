//! Listing discovery: search, condition filter, sort and pagination over a
//! [`ListingStore`], with paid listings kept out of every result set.

pub mod filter;
pub mod pagination;
pub mod query;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use filter::filter_and_sort;
pub use pagination::{LoadMore, Paginator};
pub use query::{ConditionFilter, QuerySpec, SortKey, ALL_CONDITIONS};

use crate::config::Config;
use crate::error::AppResult;
use crate::models::Listing;
use crate::notice::Notice;
use crate::store::{ListingFilter, ListingStore};

/// Where filtering and paging happen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagingMode {
    /// The store filters and returns one page plus a total count
    #[default]
    Server,
    /// The whole catalogue is held in memory and sliced into pages
    Client,
    /// The whole catalogue is held in memory and shown through a growing window
    LoadMore,
}

impl FromStr for PagingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "server" => Ok(PagingMode::Server),
            "client" => Ok(PagingMode::Client),
            "load_more" | "load-more" => Ok(PagingMode::LoadMore),
            other => Err(format!("unknown paging mode '{}'", other)),
        }
    }
}

impl fmt::Display for PagingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PagingMode::Server => "server",
            PagingMode::Client => "client",
            PagingMode::LoadMore => "load_more",
        })
    }
}

/// What the presentation layer renders for one discovery query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryPage {
    pub items: Vec<Listing>,
    pub total_count: usize,
    pub has_more: bool,
    pub page: usize,
    pub total_pages: usize,
}

/// Owns the query state for one browsing session.
pub struct Discovery<S> {
    store: Arc<S>,
    mode: PagingMode,
    spec: QuerySpec,
    paginator: Paginator,
    load_more: LoadMore,
    /// Non-paid listings, fetched once for the in-memory modes
    catalogue: Option<Vec<Listing>>,
    current: DiscoveryPage,
    loaded: bool,
    last_error: Option<String>,
    notices: Vec<Notice>,
}

impl<S: ListingStore> Discovery<S> {
    pub fn new(store: Arc<S>, mode: PagingMode, page_size: usize) -> Self {
        let paginator = Paginator::new(page_size);
        let spec = QuerySpec {
            page_size: paginator.page_size(),
            ..QuerySpec::default()
        };
        Self {
            store,
            mode,
            spec,
            load_more: LoadMore::new(paginator.page_size(), paginator.page_size()),
            paginator,
            catalogue: None,
            current: DiscoveryPage::default(),
            loaded: false,
            last_error: None,
            notices: Vec::new(),
        }
    }

    pub fn from_config(store: Arc<S>, config: &Config) -> Self {
        Self::new(store, config.paging, config.page_size)
            .with_load_more(config.load_more_initial, config.load_more_step)
    }

    pub fn with_load_more(mut self, initial: usize, step: usize) -> Self {
        self.load_more = LoadMore::new(initial, step);
        self
    }

    pub fn mode(&self) -> PagingMode {
        self.mode
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn paginator(&self) -> &Paginator {
        &self.paginator
    }

    /// Last successfully loaded page; kept as is when a refresh fails
    pub fn current(&self) -> &DiscoveryPage {
        &self.current
    }

    /// Error indicator for the last refresh, cleared on success
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Returns true when the term changed (and paging was reset).
    pub fn set_search(&mut self, term: impl Into<String>) -> bool {
        let term = term.into();
        if term == self.spec.search {
            return false;
        }
        self.spec.search = term;
        self.reset_paging();
        true
    }

    pub fn set_condition(&mut self, condition: impl Into<ConditionFilter>) -> bool {
        let condition = condition.into();
        if condition == self.spec.condition {
            return false;
        }
        self.spec.condition = condition;
        self.reset_paging();
        true
    }

    pub fn set_sort(&mut self, sort: SortKey) -> bool {
        if sort == self.spec.sort {
            return false;
        }
        self.spec.sort = sort;
        self.reset_paging();
        true
    }

    /// Clear search and condition, as the empty-state "reset filters" does
    pub fn reset_filters(&mut self) -> bool {
        let search = self.set_search("");
        let condition = self.set_condition(ConditionFilter::All);
        search || condition
    }

    fn reset_paging(&mut self) {
        self.paginator.reset();
        self.load_more.reset();
        self.spec.page = 0;
    }

    /// Clamp to the known page range; call [`Discovery::refresh`] to load it.
    pub fn go_to_page(&mut self, n: usize) -> usize {
        let page = self.paginator.go_to_page(n);
        self.spec.page = page;
        page
    }

    /// Grow the load-more window and re-slice the cached catalogue.
    /// Does nothing outside [`PagingMode::LoadMore`]. Returns whether more remain.
    pub fn load_more(&mut self) -> bool {
        if self.mode != PagingMode::LoadMore {
            return self.current.has_more;
        }
        let loaded = self.load_more.load_more();
        debug!("Load more: window now {}", loaded);
        if let Some(catalogue) = &self.catalogue {
            self.current = local_view(catalogue, &self.spec, self.mode, &mut self.paginator, &self.load_more);
        }
        self.current.has_more
    }

    /// Drop the cached catalogue so the next refresh fetches it again.
    pub fn invalidate(&mut self) {
        self.catalogue = None;
    }

    /// Load the page for the current query state.
    ///
    /// On failure the previous page stays in place, [`Discovery::last_error`]
    /// is set and an error notice is queued.
    pub async fn refresh(&mut self) -> AppResult<&DiscoveryPage> {
        let result = match self.mode {
            PagingMode::Server => self.fetch_server_page().await,
            PagingMode::Client | PagingMode::LoadMore => self.fetch_local_page().await,
        };

        match result {
            Ok(page) => {
                info!(
                    "Discovery page {}/{}: {} of {} listings",
                    page.page + 1,
                    page.total_pages,
                    page.items.len(),
                    page.total_count
                );
                self.current = page;
                self.spec.page = self.paginator.page();
                self.loaded = true;
                self.last_error = None;
                Ok(&self.current)
            }
            Err(e) => {
                warn!("Discovery refresh failed, keeping previous results: {}", e);
                self.last_error = Some(e.to_string());
                self.notices.push(Notice::error(
                    "Error loading listings",
                    "Showing the last results that loaded successfully",
                ));
                Err(e)
            }
        }
    }

    /// Run a whole query spec: apply its filters, land on its page, load.
    pub async fn query(&mut self, spec: QuerySpec) -> AppResult<&DiscoveryPage> {
        let changed = spec.filters_differ(&self.spec);
        self.spec.search = spec.search;
        self.spec.condition = spec.condition;
        self.spec.sort = spec.sort;
        if changed {
            self.reset_paging();
        }

        // The page index can only be clamped once the total for these filters is known.
        let needs_total = changed || !self.loaded;
        if needs_total {
            self.refresh().await?;
        }
        if spec.page != self.paginator.page() {
            self.go_to_page(spec.page);
            self.refresh().await?;
        } else if !needs_total {
            self.refresh().await?;
        }
        Ok(&self.current)
    }

    /// "Showing N results in C condition matching "T""
    pub fn summary(&self) -> String {
        let mut text = format!("Showing {} results", self.current.total_count);
        if let ConditionFilter::Only(condition) = &self.spec.condition {
            text.push_str(&format!(" in {} condition", condition));
        }
        let term = self.spec.search_term();
        if !term.is_empty() {
            text.push_str(&format!(" matching \"{}\"", term));
        }
        text
    }

    async fn fetch_server_page(&mut self) -> AppResult<DiscoveryPage> {
        let paid = self.store.get_paid_listing_ids().await?;
        let size = self.paginator.page_size();

        // Paging state only moves once the page has been fetched.
        let mut paginator = self.paginator.clone();
        let requested = paginator.offset();
        let mut filter = ListingFilter::for_page(&self.spec, requested, size, paid);
        let mut page = self.store.query_listings(&filter).await?;
        paginator.set_total(page.total_count);

        if paginator.offset() != requested {
            debug!("Page beyond {} results, refetching page {}", page.total_count, paginator.page());
            filter.offset = Some(paginator.offset());
            page = self.store.query_listings(&filter).await?;
            paginator.set_total(page.total_count);
        }

        self.paginator = paginator;
        Ok(DiscoveryPage {
            items: page.items,
            total_count: page.total_count,
            has_more: self.paginator.has_next(),
            page: self.paginator.page(),
            total_pages: self.paginator.total_pages(),
        })
    }

    async fn fetch_local_page(&mut self) -> AppResult<DiscoveryPage> {
        if self.catalogue.is_none() {
            let paid = self.store.get_paid_listing_ids().await?;
            let all = self
                .store
                .query_listings(&ListingFilter::unpaged(&QuerySpec::default(), paid))
                .await?;
            info!("Cached {} listings from {}", all.items.len(), self.store.store_name());
            self.catalogue = Some(all.items);
        }

        let catalogue = self.catalogue.as_deref().unwrap_or_default();
        Ok(local_view(catalogue, &self.spec, self.mode, &mut self.paginator, &self.load_more))
    }
}

fn local_view(
    catalogue: &[Listing],
    spec: &QuerySpec,
    mode: PagingMode,
    paginator: &mut Paginator,
    load_more: &LoadMore,
) -> DiscoveryPage {
    let matched = filter_and_sort(catalogue, spec);
    paginator.set_total(matched.len());

    let (visible, has_more) = match mode {
        PagingMode::LoadMore => (load_more.visible(&matched), load_more.has_more(matched.len())),
        _ => (paginator.slice(&matched), paginator.has_next()),
    };

    DiscoveryPage {
        items: visible.iter().map(|l| (*l).clone()).collect(),
        total_count: matched.len(),
        has_more,
        page: paginator.page(),
        total_pages: paginator.total_pages(),
    }
}
