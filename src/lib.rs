//! WattShare listing core: discovery (search, filter, sort, paginate) over a
//! remote listing store, and optimistic bookmark syncing.

pub mod config;
pub mod discovery;
pub mod error;
pub mod models;
pub mod notice;
pub mod saved;
pub mod store;

pub use config::Config;
pub use discovery::{ConditionFilter, Discovery, DiscoveryPage, PagingMode, QuerySpec, SortKey};
pub use error::{AppError, AppResult};
pub use models::{Listing, ListingImage};
pub use notice::{Notice, NoticeKind};
pub use saved::{SaveState, SavedListings, ToggleOutcome};
pub use store::{ListingStore, MemoryStore, SupabaseStore};
