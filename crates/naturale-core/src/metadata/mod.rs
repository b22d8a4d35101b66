//! Project schema knowledge: the built-in fallback and the live cache.

pub mod fallback;
pub mod store;

pub use fallback::fallback_snapshot;
pub use store::{CacheStatus, MetadataStore};
