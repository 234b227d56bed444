//! Cache warming from historical query logs.

use super::backend::SearchBackend;
use crate::core::config::WarmingConfig;
use crate::core::types::{normalize_query, Record, SearchLogEntry, SearchRequest};
use crate::observability::metrics as names;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Where warmed results are written
#[async_trait]
pub trait WarmTarget: Send + Sync {
    /// Returns whether the results were stored
    async fn store(&self, request: &SearchRequest, results: &[Record]) -> bool;
}

/// A query that could not be warmed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmingFailure {
    pub query: String,
    pub error: String,
}

/// Summary of one warming pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarmingReport {
    /// Queries selected for warming
    pub candidates: Vec<String>,
    /// Queries whose results were stored
    pub warmed: Vec<String>,
    /// Queries computed but declined by the admission policy
    pub skipped: Vec<String>,
    pub failures: Vec<WarmingFailure>,
}

enum WarmResult {
    Warmed(String),
    Skipped(String),
    Failed(WarmingFailure),
}

#[derive(Debug, Clone)]
pub struct Warmer {
    config: WarmingConfig,
}

impl Warmer {
    pub fn new(config: WarmingConfig) -> Self {
        Self { config }
    }

    /// Most frequent normalized queries meeting the length and frequency
    /// floors, most frequent first
    pub fn select_candidates(&self, logs: &[SearchLogEntry]) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for entry in logs {
            let query = normalize_query(&entry.query);
            if query.chars().count() >= self.config.min_query_length {
                *counts.entry(query).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.config.top_n);
        ranked.retain(|(_, count)| *count >= self.config.min_frequency);
        ranked
    }

    /// Compute and store results for every candidate. Failures are collected
    /// per query and never abort the batch.
    pub async fn warm(
        &self,
        logs: &[SearchLogEntry],
        backend: &dyn SearchBackend,
        target: &dyn WarmTarget,
    ) -> WarmingReport {
        let candidates: Vec<String> = self.select_candidates(logs).into_iter().map(|(query, _)| query).collect();
        let mut report = WarmingReport {
            candidates: candidates.clone(),
            ..Default::default()
        };

        if candidates.is_empty() {
            debug!(log_entries = logs.len(), "No queries qualify for warming");
            return report;
        }

        let results: Vec<WarmResult> = stream::iter(candidates)
            .map(|query| async move {
                let request = SearchRequest::new(query.clone());
                let records = match backend.search(&request).await {
                    Ok(records) => records,
                    Err(e) => {
                        return WarmResult::Failed(WarmingFailure {
                            query,
                            error: format!("{:#}", e),
                        })
                    }
                };
                if target.store(&request, &records).await {
                    WarmResult::Warmed(query)
                } else {
                    WarmResult::Skipped(query)
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for result in results {
            match result {
                WarmResult::Warmed(query) => report.warmed.push(query),
                WarmResult::Skipped(query) => report.skipped.push(query),
                WarmResult::Failed(failure) => {
                    warn!(query = %failure.query, error = %failure.error, "Failed to warm query");
                    report.failures.push(failure);
                }
            }
        }
        report.warmed.sort();
        report.skipped.sort();

        metrics::counter!(names::WARMED_TOTAL).increment(report.warmed.len() as u64);
        info!(
            candidates = report.candidates.len(),
            warmed = report.warmed.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            "Cache warming completed"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::backend::FnBackend;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Records every store call
    #[derive(Default)]
    struct TraceTarget {
        calls: Mutex<Vec<String>>,
        accept: bool,
    }

    #[async_trait]
    impl WarmTarget for TraceTarget {
        async fn store(&self, request: &SearchRequest, _results: &[Record]) -> bool {
            self.calls.lock().push(request.query.clone());
            self.accept
        }
    }

    fn logs(entries: &[(&str, usize)]) -> Vec<SearchLogEntry> {
        entries
            .iter()
            .flat_map(|(query, count)| std::iter::repeat(SearchLogEntry::new(*query)).take(*count))
            .collect()
    }

    fn backend() -> FnBackend<impl Fn(SearchRequest) -> futures::future::Ready<anyhow::Result<Vec<Record>>>> {
        FnBackend::new(|request: SearchRequest| {
            let result = if request.query == "broken" {
                Err(anyhow::anyhow!("backend down"))
            } else {
                Ok(vec![json!({"id": request.query}).as_object().cloned().unwrap_or_default()])
            };
            futures::future::ready(result)
        })
    }

    #[tokio::test]
    async fn test_only_frequent_queries_are_warmed() {
        let warmer = Warmer::new(WarmingConfig::default());
        let target = TraceTarget {
            accept: true,
            ..Default::default()
        };
        let logs = logs(&[("button", 6), ("modal", 4), ("table", 2), ("ab", 9)]);

        let report = warmer.warm(&logs, &backend(), &target).await;

        assert_eq!(report.candidates, vec!["button".to_string()]);
        assert_eq!(report.warmed, vec!["button".to_string()]);
        assert_eq!(*target.calls.lock(), vec!["button".to_string()]);
    }

    #[test]
    fn test_candidates_are_normalized_and_ranked() {
        let warmer = Warmer::new(WarmingConfig {
            top_n: 2,
            min_frequency: 1,
            ..Default::default()
        });
        let mut entries = logs(&[("Button ", 3), ("modal", 5), ("chart", 1)]);
        entries.extend(logs(&[("button", 3)]));

        let candidates = warmer.select_candidates(&entries);
        assert_eq!(candidates, vec![("button".to_string(), 6), ("modal".to_string(), 5)]);
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let warmer = Warmer::new(WarmingConfig {
            min_frequency: 1,
            concurrency: 2,
            ..Default::default()
        });
        let target = TraceTarget::default();
        let logs = logs(&[("broken", 2), ("button", 2), ("modal", 2)]);

        let report = warmer.warm(&logs, &backend(), &target).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].query, "broken");
        assert!(report.failures[0].error.contains("backend down"));
        assert_eq!(report.skipped, vec!["button".to_string(), "modal".to_string()]);
        assert!(report.warmed.is_empty());
    }
}
