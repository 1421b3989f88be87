//! Read-through caching in front of a collection.
//!
//! A [`ReadThroughCache`] holds at most one snapshot of the full collection
//! value. It goes stale after its TTL or as soon as the owner invalidates it
//! after a write.

mod read_through;
mod source;

pub use read_through::{CacheStatus, ReadThroughCache};
pub use source::CollectionSource;
