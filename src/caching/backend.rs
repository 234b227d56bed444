//! The computation the cache sits in front of.

use crate::core::types::{Record, SearchRequest};
use async_trait::async_trait;
use std::future::Future;

/// Produces results for a request on a cache miss or during warming
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> anyhow::Result<Vec<Record>>;
}

/// Adapts an async closure into a [`SearchBackend`]
pub struct FnBackend<F> {
    func: F,
}

impl<F> FnBackend<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> SearchBackend for FnBackend<F>
where
    F: Fn(SearchRequest) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Vec<Record>>> + Send,
{
    async fn search(&self, request: &SearchRequest) -> anyhow::Result<Vec<Record>> {
        (self.func)(request.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_backend() {
        let backend = FnBackend::new(|request: SearchRequest| async move {
            if request.query.is_empty() {
                anyhow::bail!("empty query");
            }
            Ok(vec![json!({"id": request.query}).as_object().cloned().unwrap_or_default()])
        });

        let results = backend.search(&SearchRequest::new("button")).await.unwrap();
        assert_eq!(results[0]["id"], "button");
        assert!(backend.search(&SearchRequest::new("")).await.is_err());
    }
}
