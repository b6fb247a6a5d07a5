//! Local caching of API responses.
//!
//! This module provides the `CacheManager` for storing previously fetched
//! dashboard data as JSON so it can be shown again without a round trip.
//! Data is considered stale after 60 minutes, and the whole cache is purged
//! on logout so one account never sees another's data.

pub mod manager;

pub use manager::{CacheManager, CachedData};
