//! # Cache Middleware
//!
//! Cache-aside wrapper around a [`SearchBackend`]: serve from the cache when
//! possible, otherwise compute, offer the result to the cache and return it.

use super::backend::SearchBackend;
use super::service::CacheService;
use crate::core::types::{Record, SearchRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// A [`SearchBackend`] that consults the cache first
pub struct CacheMiddleware<B> {
    service: Arc<CacheService>,
    backend: B,
}

impl<B: SearchBackend> CacheMiddleware<B> {
    pub fn new(service: Arc<CacheService>, backend: B) -> Self {
        Self { service, backend }
    }

    pub fn service(&self) -> &Arc<CacheService> {
        &self.service
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: SearchBackend> SearchBackend for CacheMiddleware<B> {
    /// Backend errors propagate unchanged; cache problems never do
    async fn search(&self, request: &SearchRequest) -> anyhow::Result<Vec<Record>> {
        if let Some(cached) = self.service.get(request).await {
            return Ok(cached);
        }

        let results = self.backend.search(request).await?;
        let stored = self.service.set(request, &results, None).await;
        debug!(query = %request.query, results = results.len(), stored, "Computed on cache miss");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::backend::FnBackend;
    use crate::caching::strategies::testing::{record, FixedStrategy};
    use crate::core::clock::ManualClock;
    use crate::core::config::CacheConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service(admit: bool) -> Arc<CacheService> {
        let clock = Arc::new(ManualClock::starting_now());
        Arc::new(
            CacheService::with_components(CacheConfig::default(), None, clock)
                .unwrap()
                .with_strategy(FixedStrategy::voting(admit, 3600, 5)),
        )
    }

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let backend = FnBackend::new(move |request: SearchRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok::<_, anyhow::Error>(vec![record(json!({"id": request.query}))]))
        });
        let middleware = CacheMiddleware::new(service(true), backend);
        let request = SearchRequest::new("modal");

        let first = middleware.search(&request).await.unwrap();
        let second = middleware.search(&request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_results_are_still_returned() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let backend = FnBackend::new(move |_request: SearchRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok::<_, anyhow::Error>(vec![record(json!({"id": "x"}))]))
        });
        let middleware = CacheMiddleware::new(service(false), backend);
        let request = SearchRequest::new("modal");

        assert_eq!(middleware.search(&request).await.unwrap().len(), 1);
        assert_eq!(middleware.search(&request).await.unwrap().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_backend_errors_propagate() {
        let backend = FnBackend::new(|_request: SearchRequest| {
            futures::future::ready(Err::<Vec<Record>, _>(anyhow::anyhow!("index offline")))
        });
        let middleware = CacheMiddleware::new(service(true), backend);

        let err = middleware.search(&SearchRequest::new("modal")).await.unwrap_err();
        assert!(err.to_string().contains("index offline"));
    }
}
