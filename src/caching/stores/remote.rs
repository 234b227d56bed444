//! Best-effort remote tier.
//!
//! Wraps a [`RemoteStore`] with the payload codec and a hard deadline on every
//! call. Lookups report [`RemoteLookup::Unavailable`] instead of failing so the
//! caller can treat a broken remote tier as a miss.

use super::RemoteStore;
use crate::caching::codec::PayloadCodec;
use crate::core::error::{CacheError, CacheResult};
use crate::core::types::{CacheKey, Record};
use crate::observability::metrics as names;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Outcome of a remote lookup
#[derive(Debug)]
pub enum RemoteLookup {
    Hit(Vec<Record>),
    Miss,
    /// Transport, timeout or payload failure; treat as a miss
    Unavailable(CacheError),
}

impl RemoteLookup {
    pub fn into_records(self) -> Option<Vec<Record>> {
        match self {
            RemoteLookup::Hit(records) => Some(records),
            _ => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, RemoteLookup::Unavailable(_))
    }
}

/// Remote tier with codec and timeout
pub struct RemoteTier {
    store: Arc<dyn RemoteStore>,
    codec: PayloadCodec,
    timeout: Duration,
    errors: AtomicU64,
}

impl RemoteTier {
    pub fn new(store: Arc<dyn RemoteStore>, codec: PayloadCodec, timeout: Duration) -> Self {
        Self {
            store,
            codec,
            timeout,
            errors: AtomicU64::new(0),
        }
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Number of failed remote operations since start
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> CacheResult<T>
    where
        F: Future<Output = CacheResult<T>>,
    {
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        if let Err(e) = &result {
            self.errors.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(names::REMOTE_ERRORS_TOTAL, "op" => op).increment(1);
            warn!(op, store = self.store.name(), kind = e.kind(), transport = e.is_transport(), error = %e, "Remote cache operation failed");
        }
        result
    }

    /// Fetch and decode an entry
    pub async fn get(&self, key: &CacheKey) -> RemoteLookup {
        let payload = match self.bounded("get", self.store.get(key.as_str())).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return RemoteLookup::Miss,
            Err(e) => return RemoteLookup::Unavailable(e),
        };

        match self.codec.decode(&payload) {
            Ok(records) => RemoteLookup::Hit(records),
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(names::REMOTE_ERRORS_TOTAL, "op" => "decode").increment(1);
                warn!(key = %key, error = %e, "Discarding undecodable remote payload");
                RemoteLookup::Unavailable(e)
            }
        }
    }

    /// Encode and store an entry
    pub async fn set(&self, key: &CacheKey, records: &[Record], ttl_seconds: u64) -> CacheResult<()> {
        let payload = self.codec.encode(records)?;
        let ttl = Duration::from_secs(ttl_seconds);
        self.bounded("set", self.store.set_with_ttl(key.as_str(), &payload, ttl)).await
    }

    /// Delete every key containing `fragment`
    pub async fn delete_matching(&self, fragment: &str) -> CacheResult<usize> {
        self.delete_matching_where(fragment, |_| true).await
    }

    /// Delete keys containing `fragment` that also satisfy `filter`
    pub async fn delete_matching_where<F>(&self, fragment: &str, filter: F) -> CacheResult<usize>
    where
        F: Fn(&str) -> bool,
    {
        let mut keys = self.bounded("scan", self.store.scan_keys(fragment)).await?;
        keys.retain(|key| filter(key));
        if keys.is_empty() {
            return Ok(0);
        }
        self.bounded("delete", self.store.delete(&keys)).await
    }

    /// Delete specific keys
    pub async fn delete_keys(&self, keys: &[CacheKey]) -> CacheResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let raw: Vec<String> = keys.iter().map(|key| key.as_str().to_string()).collect();
        self.bounded("delete", self.store.delete(&raw)).await
    }

    pub async fn ping(&self) -> bool {
        self.bounded("ping", self.store.ping()).await.unwrap_or(false)
    }
}

impl std::fmt::Debug for RemoteTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTier")
            .field("store", &self.store.name())
            .field("codec", &self.codec)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::stores::MemoryRemoteStore;
    use crate::core::clock::ManualClock;
    use async_trait::async_trait;
    use serde_json::json;

    /// Store that never answers
    struct StalledStore;

    #[async_trait]
    impl RemoteStore for StalledStore {
        async fn get(&self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
            futures::future::pending().await
        }
        async fn set_with_ttl(&self, _key: &str, _value: &[u8], _ttl: Duration) -> CacheResult<()> {
            futures::future::pending().await
        }
        async fn scan_keys(&self, _fragment: &str) -> CacheResult<Vec<String>> {
            futures::future::pending().await
        }
        async fn delete(&self, _keys: &[String]) -> CacheResult<usize> {
            futures::future::pending().await
        }
        async fn ping(&self) -> CacheResult<bool> {
            futures::future::pending().await
        }
        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    fn records() -> Vec<Record> {
        vec![json!({"id": "comp_1"}).as_object().cloned().unwrap()]
    }

    #[tokio::test]
    async fn test_round_trip_with_compression() {
        let store = Arc::new(MemoryRemoteStore::new(Arc::new(ManualClock::starting_now())));
        let tier = RemoteTier::new(store, PayloadCodec::new(true), Duration::from_millis(100));
        let key = CacheKey::new("search:abc");

        tier.set(&key, &records(), 120).await.unwrap();
        assert_eq!(tier.get(&key).await.into_records(), Some(records()));
        assert!(matches!(tier.get(&CacheKey::new("other")).await, RemoteLookup::Miss));
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_unavailable() {
        let tier = RemoteTier::new(Arc::new(StalledStore), PayloadCodec::new(false), Duration::from_millis(20));
        let key = CacheKey::new("search:abc");

        let lookup = tier.get(&key).await;
        assert!(matches!(lookup, RemoteLookup::Unavailable(CacheError::Timeout { .. })));
        assert!(matches!(tier.set(&key, &records(), 60).await, Err(CacheError::Timeout { .. })));
        assert!(!tier.ping().await);
        assert_eq!(tier.error_count(), 3);
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_unavailable() {
        let store = Arc::new(MemoryRemoteStore::new(Arc::new(ManualClock::starting_now())));
        store.set_with_ttl("search:bad", b"Zgarbage", Duration::from_secs(60)).await.unwrap();
        let tier = RemoteTier::new(store, PayloadCodec::new(true), Duration::from_millis(100));

        assert!(tier.get(&CacheKey::new("search:bad")).await.is_unavailable());
    }

    #[tokio::test]
    async fn test_delete_matching() {
        let store = Arc::new(MemoryRemoteStore::new(Arc::new(ManualClock::starting_now())));
        let tier = RemoteTier::new(store.clone(), PayloadCodec::new(false), Duration::from_millis(100));

        tier.set(&CacheKey::new("component:comp_42"), &records(), 60).await.unwrap();
        tier.set(&CacheKey::new("component:comp_7"), &records(), 60).await.unwrap();

        assert_eq!(tier.delete_matching("comp_42").await.unwrap(), 1);
        assert!(store.contains_key("component:comp_7"));
    }

    #[tokio::test]
    async fn test_delete_matching_where_skips_filtered_keys() {
        let store = Arc::new(MemoryRemoteStore::new(Arc::new(ManualClock::starting_now())));
        let tier = RemoteTier::new(store.clone(), PayloadCodec::new(false), Duration::from_millis(100));

        tier.set(&CacheKey::new("legacy:comp_7"), &records(), 60).await.unwrap();
        tier.set(&CacheKey::new("pinned:comp_7"), &records(), 60).await.unwrap();

        let removed = tier
            .delete_matching_where("comp_7", |key| !key.starts_with("pinned:"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.contains_key("pinned:comp_7"));
        assert!(!store.contains_key("legacy:comp_7"));
    }
}
