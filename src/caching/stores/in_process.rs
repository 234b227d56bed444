//! In-process implementation of the remote store contract, for single-node
//! deployments and tests.

use super::RemoteStore;
use crate::core::clock::Clock;
use crate::core::error::CacheResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct StoredValue {
    payload: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// TTL-aware shared store held in process memory
#[derive(Debug, Clone)]
pub struct MemoryRemoteStore {
    values: Arc<DashMap<String, StoredValue>>,
    clock: Arc<dyn Clock>,
}

impl MemoryRemoteStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            values: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Number of live (unexpired) keys
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.values.iter().filter(|v| v.value().expires_at >= now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.values.get(key).map(|v| v.expires_at >= now).unwrap_or(false)
    }

    /// Remaining TTL of a key in whole seconds
    pub fn ttl_of(&self, key: &str) -> Option<u64> {
        let now = self.clock.now();
        self.values
            .get(key)
            .map(|v| (v.expires_at - now).num_seconds().max(0) as u64)
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = self.clock.now();
        let expired = match self.values.get(key) {
            Some(stored) if stored.expires_at >= now => return Ok(Some(stored.payload.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.values.remove(key);
        }
        Ok(None)
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::days(365));
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.values.insert(
            key.to_string(),
            StoredValue {
                payload: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn scan_keys(&self, fragment: &str) -> CacheResult<Vec<String>> {
        let now = self.clock.now();
        Ok(self
            .values
            .iter()
            .filter(|entry| entry.value().expires_at >= now && entry.key().contains(fragment))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<usize> {
        Ok(keys.iter().filter(|key| self.values.remove(key.as_str()).is_some()).count())
    }

    async fn ping(&self) -> CacheResult<bool> {
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;

    #[tokio::test]
    async fn test_set_get_and_expiry() {
        let clock = Arc::new(ManualClock::starting_now());
        let store = MemoryRemoteStore::new(clock.clone());

        store.set_with_ttl("a", b"payload", Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"payload".to_vec()));
        assert_eq!(store.ttl_of("a"), Some(10));

        clock.advance(Duration::from_secs(11));
        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_scan_and_delete() {
        let store = MemoryRemoteStore::new(Arc::new(ManualClock::starting_now()));
        for key in ["search:comp_42:x", "component:comp_42", "search:comp_7"] {
            store.set_with_ttl(key, b"v", Duration::from_secs(60)).await.unwrap();
        }

        let mut keys = store.scan_keys("comp_42").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["component:comp_42".to_string(), "search:comp_42:x".to_string()]);

        assert_eq!(store.delete(&keys).await.unwrap(), 2);
        assert!(store.contains_key("search:comp_7"));
        assert_eq!(store.len(), 1);
    }
}
