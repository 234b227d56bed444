//! # Cache Stores Module
//!
//! The local (in-process) tier, the remote store contract and its
//! implementations, and the best-effort remote tier wrapper.

pub mod in_process;
pub mod memory;
pub mod redis_store;
pub mod remote;

pub use in_process::MemoryRemoteStore;
pub use memory::{LocalCache, LocalCacheStats};
pub use redis_store::RedisStore;
pub use remote::{RemoteLookup, RemoteTier};

use crate::core::error::CacheResult;
use crate::core::types::{CacheKey, Record};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cache entry with metadata, owned by the tier that stores it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,

    pub value: Vec<Record>,

    pub created_at: DateTime<Utc>,

    pub last_accessed: DateTime<Utc>,

    pub access_count: u64,

    pub ttl_seconds: u64,

    /// Estimated serialized size
    pub size_bytes: usize,
}

impl CacheEntry {
    /// Create a new entry stamped at `now`
    pub fn new(key: CacheKey, value: Vec<Record>, ttl_seconds: u64, now: DateTime<Utc>) -> Self {
        let size_bytes = estimate_size(&value);
        Self {
            key,
            value,
            created_at: now,
            last_accessed: now,
            access_count: 0,
            ttl_seconds,
            size_bytes,
        }
    }

    /// An entry is expired once `now` is strictly past `created_at + ttl`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        let ttl = i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX);
        self.created_at
            .checked_add_signed(ChronoDuration::seconds(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn mark_accessed(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_accessed = now;
    }
}

/// Estimated serialized size of a result list, in bytes
pub fn estimate_size(records: &[Record]) -> usize {
    serde_json::to_vec(records).map(|bytes| bytes.len()).unwrap_or(0)
}

/// Contract the shared remote store must satisfy
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch a raw payload
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store a raw payload with an expiry
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Enumerate stored keys whose text contains `fragment`
    async fn scan_keys(&self, fragment: &str) -> CacheResult<Vec<String>>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> CacheResult<usize>;

    /// Connectivity check
    async fn ping(&self) -> CacheResult<bool>;

    /// Store name for logs
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_expiry_boundary() {
        let now = Utc::now();
        let entry = CacheEntry::new(CacheKey::new("k"), vec![], 1, now);

        assert!(!entry.is_expired(now));
        assert!(!entry.is_expired(now + ChronoDuration::seconds(1)));
        assert!(entry.is_expired(now + ChronoDuration::milliseconds(1001)));
    }

    #[test]
    fn test_entry_size_estimate() {
        let record = json!({"id": "a"}).as_object().cloned().unwrap();
        let entry = CacheEntry::new(CacheKey::new("k"), vec![record], 60, Utc::now());
        assert_eq!(entry.size_bytes, r#"[{"id":"a"}]"#.len());
    }

    #[test]
    fn test_mark_accessed() {
        let now = Utc::now();
        let mut entry = CacheEntry::new(CacheKey::new("k"), vec![], 60, now);
        let later = now + ChronoDuration::seconds(5);
        entry.mark_accessed(later);

        assert_eq!(entry.access_count, 1);
        assert_eq!(entry.last_accessed, later);
    }
}
