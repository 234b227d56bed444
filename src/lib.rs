//! # Search Cache
//!
//! An adaptive two-tier cache for search results: a bounded in-process tier
//! in front of a shared remote store, with pluggable admission strategies,
//! event-driven invalidation, warming from query logs, and periodic
//! analytics.

/// Error types, configuration, clock and the request/decision model
pub mod core;

/// The cache itself: stores, strategies, invalidation, warming, analytics
pub mod caching;

/// Logging setup and metric names
pub mod observability;

pub use caching::{CacheMiddleware, CacheService, SearchBackend};
pub use core::config::CacheConfig;
pub use core::error::{CacheError, CacheResult};
pub use core::types::{CacheDecision, CacheKey, Record, SearchContext, SearchLogEntry, SearchRequest};
