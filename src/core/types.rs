//! # Core Types
//!
//! Data structures shared by every cache component: the search request triple,
//! the result records being cached, cache keys and admission decisions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A single search result. Records are opaque JSON objects to the cache;
/// strategies only inspect a handful of well-known fields.
pub type Record = Map<String, Value>;

/// Search filters as supplied by the caller
pub type Filters = Map<String, Value>;

/// Lower TTL bound for any admitted entry, in seconds
pub const MIN_TTL_SECONDS: u64 = 60;

/// Upper TTL bound for any admitted entry, in seconds
pub const MAX_TTL_SECONDS: u64 = 86_400;

/// Normalize query text for keying and frequency tracking
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Caller context attached to a search.
///
/// Only `tech_stack` and `category` participate in key derivation; the
/// freshness hints steer TTL selection and everything else rides along in
/// `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchContext {
    #[serde(default)]
    pub tech_stack: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Results must be close to live (shortens TTL)
    #[serde(default)]
    pub real_time: bool,

    /// Underlying data changes rarely (lengthens TTL)
    #[serde(default)]
    pub stable_data: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SearchContext {
    pub fn with_category<S: Into<String>>(mut self, category: S) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tech_stack<I, S>(mut self, stack: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tech_stack = stack.into_iter().map(Into::into).collect();
        self
    }

    pub fn real_time(mut self, real_time: bool) -> Self {
        self.real_time = real_time;
        self
    }

    pub fn stable_data(mut self, stable_data: bool) -> Self {
        self.stable_data = stable_data;
        self
    }
}

/// The `(query, filters, context)` triple every cache operation is keyed on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,

    #[serde(default)]
    pub filters: Filters,

    #[serde(default)]
    pub context: SearchContext,
}

impl SearchRequest {
    pub fn new<S: Into<String>>(query: S) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_filter<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.filters.insert(key.into(), value);
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_context(mut self, context: SearchContext) -> Self {
        self.context = context;
        self
    }

    /// Normalized query text
    pub fn normalized_query(&self) -> String {
        normalize_query(&self.query)
    }

    /// Look up a hint in the filters first, then in the free-form context
    pub fn hint(&self, name: &str) -> Option<&Value> {
        self.filters
            .get(name)
            .or_else(|| self.context.extra.get(name))
            .filter(|value| !value.is_null())
    }
}

/// Derived cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Admission decision produced once per `set` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheDecision {
    pub should_cache: bool,
    pub ttl_seconds: u64,
    /// 0..=10, higher means more valuable to keep
    pub priority: u8,
    pub reason: String,
}

impl CacheDecision {
    /// Build a decision, clamping TTL into the admissible range
    pub fn new<S: Into<String>>(should_cache: bool, ttl_seconds: u64, priority: u8, reason: S) -> Self {
        Self {
            should_cache,
            ttl_seconds: clamp_ttl(ttl_seconds),
            priority: priority.min(10),
            reason: reason.into(),
        }
    }

    /// A hard rejection: nothing is stored and TTL/priority are zero
    pub fn reject<S: Into<String>>(reason: S) -> Self {
        Self {
            should_cache: false,
            ttl_seconds: 0,
            priority: 0,
            reason: reason.into(),
        }
    }

    /// Copy of this decision with TTL forced into the admissible range
    pub fn clamped(mut self) -> Self {
        self.ttl_seconds = clamp_ttl(self.ttl_seconds);
        self.priority = self.priority.min(10);
        self
    }
}

/// Clamp a TTL into `[MIN_TTL_SECONDS, MAX_TTL_SECONDS]`
pub fn clamp_ttl(ttl_seconds: u64) -> u64 {
    ttl_seconds.clamp(MIN_TTL_SECONDS, MAX_TTL_SECONDS)
}

/// Convert a score in `[0, 1]` into a priority in `0..=10`
pub fn score_to_priority(score: f64) -> u8 {
    (score * 10.0).round().clamp(0.0, 10.0) as u8
}

/// One historical search, as recorded in query logs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchLogEntry {
    pub query: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SearchLogEntry {
    pub fn new<S: Into<String>>(query: S) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decision_ttl_is_clamped() {
        assert_eq!(CacheDecision::new(true, 5, 3, "short").ttl_seconds, 60);
        assert_eq!(CacheDecision::new(true, 1_000_000, 3, "long").ttl_seconds, 86_400);
        assert_eq!(CacheDecision::new(true, 3600, 3, "ok").ttl_seconds, 3600);
        assert_eq!(CacheDecision::new(true, 3600, 42, "ok").priority, 10);
    }

    #[test]
    fn test_reject_decision() {
        let decision = CacheDecision::reject("empty results");
        assert!(!decision.should_cache);
        assert_eq!(decision.ttl_seconds, 0);
        assert_eq!(decision.priority, 0);
    }

    #[test]
    fn test_score_to_priority() {
        assert_eq!(score_to_priority(0.0), 0);
        assert_eq!(score_to_priority(0.64), 6);
        assert_eq!(score_to_priority(0.65), 7);
        assert_eq!(score_to_priority(1.7), 10);
    }

    #[test]
    fn test_context_round_trip_keeps_extra_fields() {
        let value = json!({
            "tech_stack": ["react"],
            "category": "ui",
            "real_time": true,
            "sort_by": "stars"
        });
        let context: SearchContext = serde_json::from_value(value).unwrap();

        assert_eq!(context.tech_stack, vec!["react".to_string()]);
        assert_eq!(context.category.as_deref(), Some("ui"));
        assert!(context.real_time);
        assert!(!context.stable_data);
        assert_eq!(context.extra.get("sort_by"), Some(&json!("stars")));
    }

    #[test]
    fn test_request_hint_prefers_filters() {
        let mut context = SearchContext::default();
        context.extra.insert("limit".to_string(), json!(10));
        let request = SearchRequest::new("q")
            .with_filter("limit", json!(100))
            .with_context(context);

        assert_eq!(request.hint("limit"), Some(&json!(100)));
        assert_eq!(request.hint("sort"), None);
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  React Button "), "react button");
    }
}
