pub mod memory;
pub mod supabase;
pub mod traits;
pub mod types;

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;
pub use traits::ListingStore;
pub use types::{ListingFilter, ListingPage};
