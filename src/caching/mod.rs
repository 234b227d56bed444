//! # Search Result Caching
//!
//! A two-tier cache for search results with strategy-driven admission.
//!
//! ## Architecture
//! 1. **Key generation**: content-addressed keys from `(query, filters, context)`
//! 2. **Stores**: a bounded local LRU tier and a best-effort remote tier
//! 3. **Strategies**: decide whether and how long to cache a result set
//! 4. **Invalidation**: domain events mapped to key deletions in both tiers
//! 5. **Warming**: pre-computation of frequent queries from search logs
//! 6. **Analytics and maintenance**: statistics, recommendations, periodic review
//!
//! ## Usage Example
//! ```no_run
//! use search_cache::caching::CacheService;
//! use search_cache::core::config::CacheConfig;
//! use search_cache::core::types::SearchRequest;
//!
//! # async fn example() -> search_cache::core::error::CacheResult<()> {
//! let service = CacheService::open(CacheConfig::default()).await?;
//! let request = SearchRequest::new("react button");
//!
//! if service.get(&request).await.is_none() {
//!     let results = Vec::new(); // computed elsewhere
//!     service.set(&request, &results, None).await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod backend;
pub mod codec;
pub mod invalidation;
pub mod key_generator;
pub mod maintenance;
pub mod middleware;
pub mod service;
pub mod stores;
pub mod strategies;
pub mod warming;

pub use analytics::{Analytics, AnalyticsReport, CacheStats, StatsRecorder};
pub use backend::{FnBackend, SearchBackend};
pub use codec::PayloadCodec;
pub use invalidation::{InvalidationAction, InvalidationOutcome, Invalidator, TagIndex};
pub use key_generator::KeyGenerator;
pub use maintenance::{MaintenanceHandle, MaintenanceLoop, MaintenanceReport};
pub use middleware::CacheMiddleware;
pub use service::{CacheService, HealthStatus};
pub use stores::{CacheEntry, LocalCache, LocalCacheStats, MemoryRemoteStore, RedisStore, RemoteLookup, RemoteStore, RemoteTier};
pub use strategies::{CacheStrategy, StrategyEngine};
pub use warming::{WarmTarget, Warmer, WarmingFailure, WarmingReport};
