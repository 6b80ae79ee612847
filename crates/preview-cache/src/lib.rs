//! Preview-response cache: maps fetched preview URLs to their captured
//! response bodies so repeated resolution runs stay cheap. Historical pages
//! are immutable, so entries are never invalidated, only written once.

pub mod entry;
pub mod store;

pub use entry::CacheEntry;
pub use store::PreviewCache;
