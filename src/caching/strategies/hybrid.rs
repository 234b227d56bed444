//! Majority-vote combiner.

use super::CacheStrategy;
use crate::core::error::{CacheError, CacheResult};
use crate::core::types::{CacheDecision, Record, SearchRequest};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// A member strategy and its weight in the TTL/priority average
#[derive(Clone)]
pub struct WeightedStrategy {
    pub strategy: Arc<dyn CacheStrategy>,
    pub weight: f64,
}

impl WeightedStrategy {
    pub fn new(strategy: Arc<dyn CacheStrategy>, weight: f64) -> Self {
        Self { strategy, weight }
    }
}

impl std::fmt::Debug for WeightedStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightedStrategy")
            .field("strategy", &self.strategy.name())
            .field("weight", &self.weight)
            .finish()
    }
}

/// Evaluates its members concurrently and admits on a strict majority of
/// the votes that were actually cast. A member that errors abstains.
#[derive(Debug, Clone)]
pub struct HybridStrategy {
    members: Vec<WeightedStrategy>,
}

impl HybridStrategy {
    /// Standard combination with weights 0.4 / 0.3 / 0.3
    pub fn new(
        adaptive: Arc<dyn CacheStrategy>,
        query_based: Arc<dyn CacheStrategy>,
        result_based: Arc<dyn CacheStrategy>,
    ) -> Self {
        Self::with_members(vec![
            WeightedStrategy::new(adaptive, 0.4),
            WeightedStrategy::new(query_based, 0.3),
            WeightedStrategy::new(result_based, 0.3),
        ])
    }

    pub fn with_members(members: Vec<WeightedStrategy>) -> Self {
        Self { members }
    }

    pub fn members(&self) -> &[WeightedStrategy] {
        &self.members
    }
}

#[async_trait]
impl CacheStrategy for HybridStrategy {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    async fn evaluate(&self, request: &SearchRequest, results: &[Record]) -> CacheResult<CacheDecision> {
        let evaluations = self.members.iter().map(|member| async move {
            (member, member.strategy.evaluate(request, results).await)
        });

        let mut votes = Vec::with_capacity(self.members.len());
        for (member, outcome) in join_all(evaluations).await {
            match outcome {
                Ok(decision) => votes.push((member.weight, decision)),
                Err(e) => {
                    warn!(strategy = member.strategy.name(), error = %e, "Strategy abstained from hybrid vote");
                }
            }
        }

        if votes.is_empty() {
            return Err(CacheError::strategy("hybrid", "every member strategy failed"));
        }

        let counted = votes.len();
        let in_favour = votes.iter().filter(|(_, decision)| decision.should_cache).count();
        let should_cache = in_favour * 2 > counted;

        let total_weight: f64 = votes.iter().map(|(weight, _)| weight).sum();
        let (ttl, priority) = if total_weight > 0.0 {
            votes.iter().fold((0.0, 0.0), |(ttl, priority), (weight, decision)| {
                (
                    ttl + weight * decision.ttl_seconds as f64 / total_weight,
                    priority + weight * decision.priority as f64 / total_weight,
                )
            })
        } else {
            (0.0, 0.0)
        };

        debug!(in_favour, counted, should_cache, "Hybrid vote");

        Ok(CacheDecision {
            should_cache,
            ttl_seconds: ttl as u64,
            priority: (priority as u8).min(10),
            reason: format!("hybrid vote {}/{} in favour", in_favour, counted),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{BrokenStrategy, FixedStrategy};
    use super::*;

    fn hybrid(a: Arc<dyn CacheStrategy>, q: Arc<dyn CacheStrategy>, r: Arc<dyn CacheStrategy>) -> HybridStrategy {
        HybridStrategy::new(a, q, r)
    }

    #[tokio::test]
    async fn test_two_of_three_admits() {
        let strategy = hybrid(
            FixedStrategy::voting(true, 3600, 8),
            FixedStrategy::voting(true, 7200, 9),
            FixedStrategy::voting(false, 1800, 2),
        );
        let decision = strategy.evaluate(&SearchRequest::new("q"), &[]).await.unwrap();

        assert!(decision.should_cache);
        // 0.4 * 3600 + 0.3 * 7200 + 0.3 * 1800
        assert_eq!(decision.ttl_seconds, 4140);
        // 0.4 * 8 + 0.3 * 9 + 0.3 * 2 = 6.5 truncated
        assert_eq!(decision.priority, 6);
    }

    #[tokio::test]
    async fn test_one_of_three_rejects() {
        let strategy = hybrid(
            FixedStrategy::voting(true, 3600, 8),
            FixedStrategy::voting(false, 1800, 3),
            FixedStrategy::voting(false, 0, 0),
        );
        let decision = strategy.evaluate(&SearchRequest::new("q"), &[]).await.unwrap();
        assert!(!decision.should_cache);
    }

    #[tokio::test]
    async fn test_failed_member_abstains() {
        // one yes, one no, one abstention: 1 of 2 is not a strict majority
        let split = hybrid(
            FixedStrategy::voting(true, 3600, 8),
            FixedStrategy::voting(false, 1800, 3),
            Arc::new(BrokenStrategy),
        );
        assert!(!split.evaluate(&SearchRequest::new("q"), &[]).await.unwrap().should_cache);

        let agreed = hybrid(
            FixedStrategy::voting(true, 3000, 8),
            FixedStrategy::voting(true, 3000, 8),
            Arc::new(BrokenStrategy),
        );
        let decision = agreed.evaluate(&SearchRequest::new("q"), &[]).await.unwrap();
        assert!(decision.should_cache);
        assert_eq!(decision.ttl_seconds, 3000);
        assert_eq!(decision.priority, 8);
    }

    #[tokio::test]
    async fn test_all_members_failing_is_an_error() {
        let strategy = hybrid(Arc::new(BrokenStrategy), Arc::new(BrokenStrategy), Arc::new(BrokenStrategy));
        assert!(strategy.evaluate(&SearchRequest::new("q"), &[]).await.is_err());
    }
}
