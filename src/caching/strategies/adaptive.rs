//! Adaptive admission strategy.
//!
//! Combines four sub-scores in `[0, 1]`:
//!
//! | score     | weight | signal                                             |
//! |-----------|--------|----------------------------------------------------|
//! | frequency | 0.3    | how often (and how recently) the query was seen    |
//! | stability | 0.3    | overlap with the last five result sets             |
//! | cost      | 0.2    | how expensive the query looks to recompute         |
//! | memory    | 0.2    | how cheap the result set is to hold                |
//!
//! A total of at least 0.6 admits the entry; the total also scales the TTL
//! between half and twice the base TTL.

use super::CacheStrategy;
use crate::core::clock::{seconds_between, Clock};
use crate::core::config::RecencyMode;
use crate::core::error::CacheResult;
use crate::core::types::{clamp_ttl, score_to_priority, CacheDecision, Record, SearchContext, SearchRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

const SECONDS_PER_DAY: f64 = 86_400.0;
const FIRST_SIGHT_SCORE: f64 = 0.1;
const NEUTRAL_STABILITY: f64 = 0.5;
const HISTORY_WINDOW: usize = 5;
const MAX_TRACKED_QUERIES: usize = 10_000;
const ADMISSION_THRESHOLD: f64 = 0.6;

/// How often a normalized query has been observed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPattern {
    pub key: String,
    pub count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Sub-score weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveWeights {
    pub frequency: f64,
    pub stability: f64,
    pub cost: f64,
    pub memory: f64,
}

impl Default for AdaptiveWeights {
    fn default() -> Self {
        Self {
            frequency: 0.3,
            stability: 0.3,
            cost: 0.2,
            memory: 0.2,
        }
    }
}

/// Per-evaluation score breakdown
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveScores {
    pub frequency: f64,
    pub stability: f64,
    pub cost: f64,
    pub memory: f64,
    pub total: f64,
}

/// Frequency/stability/cost/memory based strategy
pub struct AdaptiveStrategy {
    clock: Arc<dyn Clock>,
    base_ttl_seconds: u64,
    recency_mode: RecencyMode,
    weights: AdaptiveWeights,
    patterns: Mutex<HashMap<String, QueryPattern>>,
    history: Mutex<HashMap<String, VecDeque<HashSet<String>>>>,
}

impl AdaptiveStrategy {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            base_ttl_seconds: 3600,
            recency_mode: RecencyMode::AfterUpdate,
            weights: AdaptiveWeights::default(),
            patterns: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_base_ttl(mut self, base_ttl_seconds: u64) -> Self {
        self.base_ttl_seconds = base_ttl_seconds;
        self
    }

    pub fn with_recency_mode(mut self, mode: RecencyMode) -> Self {
        self.recency_mode = mode;
        self
    }

    pub fn with_weights(mut self, weights: AdaptiveWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Snapshot of the tracked pattern for a normalized query
    pub fn pattern(&self, normalized_query: &str) -> Option<QueryPattern> {
        self.patterns.lock().get(normalized_query).cloned()
    }

    pub fn tracked_queries(&self) -> usize {
        self.patterns.lock().len()
    }

    /// Score a request, updating frequency and stability bookkeeping
    pub fn score(&self, request: &SearchRequest, results: &[Record]) -> CacheResult<AdaptiveScores> {
        let normalized = request.normalized_query();

        let frequency = self.frequency_score(&normalized);
        let stability = self.stability_score(&normalized, results);
        let cost = cost_score(request);
        let memory = memory_score(results)?;

        let w = &self.weights;
        let total = w.frequency * frequency + w.stability * stability + w.cost * cost + w.memory * memory;

        Ok(AdaptiveScores {
            frequency,
            stability,
            cost,
            memory,
            total,
        })
    }

    /// TTL for a combined score under the given context
    pub fn ttl_for_score(&self, total: f64, context: &SearchContext) -> u64 {
        let base_multiplier = 0.5 + total.clamp(0.0, 1.0) * 1.5;

        let mut context_multiplier = 1.0;
        if context.real_time {
            context_multiplier *= 0.1;
        }
        if context.stable_data {
            context_multiplier *= 2.0;
        }

        let ttl = self.base_ttl_seconds as f64 * base_multiplier * context_multiplier;
        clamp_ttl(ttl.round() as u64)
    }

    fn frequency_score(&self, normalized: &str) -> f64 {
        let now = self.clock.now();
        let mut patterns = self.patterns.lock();

        let Some(pattern) = patterns.get_mut(normalized) else {
            if patterns.len() >= MAX_TRACKED_QUERIES {
                evict_stalest(&mut patterns);
            }
            patterns.insert(
                normalized.to_string(),
                QueryPattern {
                    key: normalized.to_string(),
                    count: 1,
                    first_seen: now,
                    last_seen: now,
                },
            );
            return FIRST_SIGHT_SCORE;
        };

        let previous = pattern.last_seen;
        pattern.count += 1;
        pattern.last_seen = now;

        let reference = match self.recency_mode {
            RecencyMode::AfterUpdate => pattern.last_seen,
            RecencyMode::BeforeUpdate => previous,
        };
        let age = seconds_between(reference, now);
        let recency = (1.0 - age / SECONDS_PER_DAY).max(0.1);

        let frequency = ((pattern.count as f64).ln() / 100f64.ln()).min(1.0);
        frequency * recency
    }

    fn stability_score(&self, normalized: &str, results: &[Record]) -> f64 {
        let current = result_ids(results);
        let mut history = self.history.lock();

        if !history.contains_key(normalized) && history.len() >= MAX_TRACKED_QUERIES {
            // history keys mirror pattern keys, drop an arbitrary one to stay bounded
            if let Some(victim) = history.keys().next().cloned() {
                history.remove(&victim);
            }
        }

        let window = history.entry(normalized.to_string()).or_default();
        let score = if window.is_empty() {
            NEUTRAL_STABILITY
        } else {
            window.iter().map(|past| jaccard(&current, past)).sum::<f64>() / window.len() as f64
        };

        window.push_back(current);
        while window.len() > HISTORY_WINDOW {
            window.pop_front();
        }

        score
    }
}

fn evict_stalest(patterns: &mut HashMap<String, QueryPattern>) {
    let stalest = patterns
        .values()
        .min_by_key(|pattern| pattern.last_seen)
        .map(|pattern| pattern.key.clone());
    if let Some(key) = stalest {
        patterns.remove(&key);
    }
}

/// Identifier used for set-overlap comparisons
fn result_id(record: &Record) -> String {
    match record.get("id").or_else(|| record.get("name")) {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => Value::Object(record.clone()).to_string(),
    }
}

fn result_ids(results: &[Record]) -> HashSet<String> {
    results.iter().map(result_id).collect()
}

/// `|A ∩ B| / |A ∪ B|`; two empty sets are identical
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn cost_score(request: &SearchRequest) -> f64 {
    let mut score: f64 = 0.0;

    if request.query.split_whitespace().count() > 5 {
        score += 0.3;
    }
    if request.filters.len() > 3 {
        score += 0.2;
    }
    if sort_requested(request) {
        score += 0.2;
    }
    if page_size(request).map(|size| size > 50.0).unwrap_or(false) {
        score += 0.3;
    }

    score.min(1.0)
}

fn sort_requested(request: &SearchRequest) -> bool {
    ["sort", "sort_by"].iter().any(|name| match request.hint(name) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(field)) => !field.trim().is_empty(),
        Some(_) => true,
        None => false,
    })
}

fn page_size(request: &SearchRequest) -> Option<f64> {
    ["limit", "page_size"].iter().find_map(|name| match request.hint(name) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn memory_score(results: &[Record]) -> CacheResult<f64> {
    if results.is_empty() {
        return Ok(1.0);
    }

    let size_mb = serde_json::to_vec(results)?.len() as f64 / (1024.0 * 1024.0);
    Ok(if size_mb < 1.0 {
        1.0
    } else if size_mb < 5.0 {
        0.8
    } else if size_mb < 10.0 {
        0.6
    } else {
        0.3
    })
}

#[async_trait]
impl CacheStrategy for AdaptiveStrategy {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    async fn evaluate(&self, request: &SearchRequest, results: &[Record]) -> CacheResult<CacheDecision> {
        let scores = self.score(request, results)?;
        let ttl = self.ttl_for_score(scores.total, &request.context);

        Ok(CacheDecision::new(
            scores.total >= ADMISSION_THRESHOLD,
            ttl,
            score_to_priority(scores.total),
            format!(
                "adaptive score {:.2} (frequency {:.2}, stability {:.2}, cost {:.2}, memory {:.2})",
                scores.total, scores.frequency, scores.stability, scores.cost, scores.memory
            ),
        ))
    }
}

impl std::fmt::Debug for AdaptiveStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveStrategy")
            .field("base_ttl_seconds", &self.base_ttl_seconds)
            .field("recency_mode", &self.recency_mode)
            .field("weights", &self.weights)
            .finish()
    }
}
