//! Result-quality admission strategy: only well-formed, varied result sets
//! are worth keeping.

use super::CacheStrategy;
use crate::core::error::CacheResult;
use crate::core::types::{score_to_priority, CacheDecision, Record, SearchRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;

const REQUIRED_FIELDS: [&str; 4] = ["id", "name", "description", "version"];
const ADMISSION_THRESHOLD: f64 = 0.6;

/// Quality/diversity/completeness strategy
#[derive(Debug, Clone, Default)]
pub struct ResultBasedStrategy;

impl ResultBasedStrategy {
    pub fn new() -> Self {
        Self
    }

    /// Combined score for a non-empty result set
    pub fn overall_score(results: &[Record]) -> f64 {
        0.4 * quality_score(results) + 0.3 * diversity_score(results) + 0.3 * completeness_score(results)
    }
}

fn present(record: &Record, field: &str) -> bool {
    match record.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn record_quality(record: &Record) -> f64 {
    let mut score = 0.0;
    if present(record, "description") {
        score += 0.2;
    }
    if present(record, "documentation_url") {
        score += 0.2;
    }
    if record.get("github_stars").and_then(Value::as_f64).map(|stars| stars > 100.0).unwrap_or(false) {
        score += 0.3;
    }
    if present(record, "last_updated") {
        score += 0.3;
    }
    score
}

fn quality_score(results: &[Record]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().map(record_quality).sum::<f64>() / results.len() as f64
}

fn distinct(results: &[Record], field: &str) -> usize {
    results
        .iter()
        .filter_map(|record| match record.get(field) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.to_lowercase()),
            _ => None,
        })
        .collect::<HashSet<_>>()
        .len()
}

fn diversity_score(results: &[Record]) -> f64 {
    let categories = (distinct(results, "category") as f64 / 5.0).min(1.0);
    let languages = (distinct(results, "language") as f64 / 3.0).min(1.0);
    (categories + languages) / 2.0
}

fn completeness_score(results: &[Record]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let per_record = |record: &Record| {
        REQUIRED_FIELDS.iter().filter(|field| present(record, field)).count() as f64 / REQUIRED_FIELDS.len() as f64
    };
    results.iter().map(per_record).sum::<f64>() / results.len() as f64
}

#[async_trait]
impl CacheStrategy for ResultBasedStrategy {
    fn name(&self) -> &'static str {
        "result_based"
    }

    async fn evaluate(&self, _request: &SearchRequest, results: &[Record]) -> CacheResult<CacheDecision> {
        if results.is_empty() {
            return Ok(CacheDecision::reject("empty result set"));
        }

        let overall = Self::overall_score(results);
        let ttl = (1800.0 + overall * 1800.0).round() as u64;

        Ok(CacheDecision::new(
            overall >= ADMISSION_THRESHOLD,
            ttl,
            score_to_priority(overall),
            format!("result quality score {:.2}", overall),
        ))
    }
}
