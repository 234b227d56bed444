//! # Admission Strategies
//!
//! Strategies decide whether a freshly computed result set is worth caching
//! and for how long. Four are provided:
//!
//! 1. **Adaptive**: query frequency, result stability, query cost and memory footprint
//! 2. **QueryBased**: ordered keyword rules on the query text
//! 3. **ResultBased**: quality, diversity and completeness of the results
//! 4. **Hybrid**: majority vote over the other three, evaluated concurrently
//!
//! [`StrategyEngine`] wraps the configured strategy and guarantees a decision
//! even when evaluation fails.

pub mod adaptive;
pub mod hybrid;
pub mod query_based;
pub mod result_based;

pub use adaptive::{AdaptiveStrategy, AdaptiveWeights, QueryPattern};
pub use hybrid::{HybridStrategy, WeightedStrategy};
pub use query_based::{default_query_rules, QueryBasedStrategy, QueryRule};
pub use result_based::ResultBasedStrategy;

use crate::core::clock::Clock;
use crate::core::config::{CacheConfig, StrategyKind};
use crate::core::error::CacheResult;
use crate::core::types::{CacheDecision, Record, SearchRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// A cache admission policy
#[async_trait]
pub trait CacheStrategy: Send + Sync {
    /// Strategy name for logs and decision reasons
    fn name(&self) -> &'static str;

    /// Decide whether and how long to cache `results` for `request`
    async fn evaluate(&self, request: &SearchRequest, results: &[Record]) -> CacheResult<CacheDecision>;
}

/// Owns the configured strategy and turns failures into rejections
#[derive(Clone)]
pub struct StrategyEngine {
    strategy: Arc<dyn CacheStrategy>,
}

impl StrategyEngine {
    pub fn new(strategy: Arc<dyn CacheStrategy>) -> Self {
        Self { strategy }
    }

    /// Build the strategy selected by configuration
    pub fn from_config(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let adaptive = || {
            Arc::new(
                AdaptiveStrategy::new(clock.clone())
                    .with_base_ttl(config.default_ttl_seconds)
                    .with_recency_mode(config.strategy.recency_mode),
            )
        };
        let query_based = || Arc::new(QueryBasedStrategy::new(config.strategy.query_rules.clone()));

        let strategy: Arc<dyn CacheStrategy> = match config.strategy.kind {
            StrategyKind::Adaptive => adaptive(),
            StrategyKind::QueryBased => query_based(),
            StrategyKind::ResultBased => Arc::new(ResultBasedStrategy::new()),
            StrategyKind::Hybrid => Arc::new(HybridStrategy::new(
                adaptive(),
                query_based(),
                Arc::new(ResultBasedStrategy::new()),
            )),
        };

        Self::new(strategy)
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Produce the final decision for a `set` call. Evaluation errors reject
    /// the write; admitted decisions always carry a clamped TTL.
    pub async fn decide(&self, request: &SearchRequest, results: &[Record]) -> CacheDecision {
        match self.strategy.evaluate(request, results).await {
            Ok(decision) if decision.should_cache => decision.clamped(),
            Ok(decision) => decision,
            Err(e) => {
                warn!(strategy = self.strategy.name(), error = %e, "Strategy evaluation failed");
                CacheDecision::reject(format!("{} strategy failed: {}", self.strategy.name(), e))
            }
        }
    }
}

impl std::fmt::Debug for StrategyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyEngine")
            .field("strategy", &self.strategy.name())
            .finish()
    }
}

/// Test doubles shared by the strategy test modules
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::error::CacheError;
    use serde_json::Value;

    /// Returns a canned decision
    pub struct FixedStrategy {
        pub name: &'static str,
        pub decision: CacheDecision,
    }

    impl FixedStrategy {
        pub fn voting(should_cache: bool, ttl_seconds: u64, priority: u8) -> Arc<dyn CacheStrategy> {
            Arc::new(Self {
                name: "fixed",
                decision: CacheDecision {
                    should_cache,
                    ttl_seconds,
                    priority,
                    reason: "fixed".to_string(),
                },
            })
        }
    }

    #[async_trait]
    impl CacheStrategy for FixedStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn evaluate(&self, _request: &SearchRequest, _results: &[Record]) -> CacheResult<CacheDecision> {
            Ok(self.decision.clone())
        }
    }

    /// Always errors
    pub struct BrokenStrategy;

    #[async_trait]
    impl CacheStrategy for BrokenStrategy {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn evaluate(&self, _request: &SearchRequest, _results: &[Record]) -> CacheResult<CacheDecision> {
            Err(CacheError::strategy("broken", "cannot evaluate"))
        }
    }

    pub fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }
}
