//! In-memory response cache for repository reads.
//!
//! This module provides an entity-agnostic caching mechanism that:
//! - Serves a stored payload while it is younger than the configured TTL
//! - Invalidates everything at once after a write
//! - Lets identical concurrent reads share a single network call
//! - Degrades to de-duplication only when caching is disabled

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, MemoryStorage, NoopStorage};
pub use traits::{CacheEntry, CacheResult, CacheSource};
