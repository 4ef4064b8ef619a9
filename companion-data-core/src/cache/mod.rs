//! Local caching layers
//!
//! - [`memory_cache`]: process-local TTL cache in front of everything else
//! - [`card_store`] / [`sqlite_store`]: persistent card table
//! - [`ratings_store`]: last-good-copy fallback for ratings tables

pub mod card_store;
pub mod memory_cache;
pub mod ratings_store;
pub mod sqlite_store;

pub use card_store::{CardStore, FreshnessSummary, MemoryCardStore};
pub use memory_cache::TtlCache;
pub use ratings_store::{JsonRatingsStore, MemoryRatingsStore, RatingsCacheStore};
pub use sqlite_store::SqliteCardStore;
