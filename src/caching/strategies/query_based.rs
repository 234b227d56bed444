//! Keyword-rule admission strategy.
//!
//! Rules are checked in declared order and the first rule sharing a keyword
//! with the query wins, so the order of the rule table is significant.

use super::CacheStrategy;
use crate::core::error::CacheResult;
use crate::core::types::{CacheDecision, Record, SearchRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const DEFAULT_TTL_SECONDS: u64 = 1800;
const DEFAULT_PRIORITY: u8 = 3;

/// One keyword rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRule {
    pub name: String,
    pub keywords: Vec<String>,
    pub ttl_seconds: u64,
    pub priority: u8,
}

impl QueryRule {
    pub fn new<S: Into<String>>(name: S, keywords: &[&str], ttl_seconds: u64, priority: u8) -> Self {
        Self {
            name: name.into(),
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            ttl_seconds,
            priority,
        }
    }

    fn matches(&self, terms: &HashSet<String>) -> bool {
        self.keywords.iter().any(|keyword| terms.contains(&keyword.to_lowercase()))
    }
}

/// Built-in rule table. Component names come first so that a query such as
/// "new react button" keeps the long component TTL.
pub fn default_query_rules() -> Vec<QueryRule> {
    vec![
        QueryRule::new(
            "popular_components",
            &["react", "vue", "angular", "svelte", "button", "modal", "form", "table", "chart"],
            7200,
            9,
        ),
        QueryRule::new("time_sensitive", &["latest", "new", "trending", "recent", "today"], 300, 4),
        QueryRule::new("documentation", &["docs", "documentation", "guide", "tutorial", "example"], 14_400, 7),
        QueryRule::new("utilities", &["utility", "utils", "helper", "hook", "hooks"], 3600, 6),
        QueryRule::new("exploratory", &["alternative", "alternatives", "compare", "vs", "similar"], 900, 5),
    ]
}

/// Split query text into lower-cased terms
fn query_terms(query: &str) -> HashSet<String> {
    query
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_' || c == '.'))
        .filter(|term| !term.is_empty())
        .map(str::to_string)
        .collect()
}

/// First-match keyword strategy
#[derive(Debug, Clone)]
pub struct QueryBasedStrategy {
    rules: Vec<QueryRule>,
}

impl Default for QueryBasedStrategy {
    fn default() -> Self {
        Self::new(default_query_rules())
    }
}

impl QueryBasedStrategy {
    pub fn new(rules: Vec<QueryRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[QueryRule] {
        &self.rules
    }

    /// The rule that applies to `query`, if any
    pub fn matching_rule(&self, query: &str) -> Option<&QueryRule> {
        let terms = query_terms(query);
        self.rules.iter().find(|rule| rule.matches(&terms))
    }
}

#[async_trait]
impl CacheStrategy for QueryBasedStrategy {
    fn name(&self) -> &'static str {
        "query_based"
    }

    async fn evaluate(&self, request: &SearchRequest, results: &[Record]) -> CacheResult<CacheDecision> {
        let decision = match self.matching_rule(&request.query) {
            Some(rule) => CacheDecision::new(
                true,
                rule.ttl_seconds,
                rule.priority,
                format!("matched query rule '{}'", rule.name),
            ),
            None => CacheDecision::new(
                !results.is_empty(),
                DEFAULT_TTL_SECONDS,
                DEFAULT_PRIORITY,
                "no query rule matched",
            ),
        };
        Ok(decision)
    }
}
