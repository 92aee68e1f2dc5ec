//! Local caching module for offline data access.
//!
//! This module provides the `CacheStore` for storing and retrieving feed
//! data locally. Entries are JSON files carrying their own expiry; schedules
//! expire after 30 minutes and members after 24 hours.
//!
//! Expired entries are invisible to normal reads but kept on disk until read,
//! so a failed refresh can still fall back to them via `get_stale`.

pub mod error;
pub mod manager;

pub use error::StorageError;
pub use manager::{member_key, schedule_key, CacheStore, CachedData, TtlClass, CACHE_KEY_PREFIX};
