//! # Redis Cache Store
//!
//! Redis-backed implementation of the remote store contract. Keys are
//! namespaced with a prefix; enumeration uses `SCAN MATCH` so invalidation
//! never blocks the server with `KEYS`.

use super::RemoteStore;
use crate::core::error::{CacheError, CacheResult};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, info};

const SCAN_BATCH: usize = 1000;

/// Redis remote store
#[derive(Clone)]
pub struct RedisStore {
    url: String,
    key_prefix: String,
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis at `url`
    pub async fn connect(url: &str, key_prefix: &str) -> CacheResult<Self> {
        let client = Client::open(url).map_err(CacheError::Redis)?;
        let connection = ConnectionManager::new(client).await.map_err(CacheError::Redis)?;

        info!("Redis cache connected to {}", url);

        Ok(Self {
            url: url.to_string(),
            key_prefix: key_prefix.to_string(),
            connection,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn strip_prefix(&self, key: String) -> String {
        match key.strip_prefix(&self.key_prefix) {
            Some(stripped) => stripped.to_string(),
            None => key,
        }
    }

    /// Build a `SCAN MATCH` pattern that matches keys containing `fragment` literally
    fn match_pattern(&self, fragment: &str) -> String {
        format!("{}*{}*", escape_glob(&self.key_prefix), escape_glob(fragment))
    }
}

/// Escape Redis glob metacharacters
fn escape_glob(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\' | '^') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = conn.get(self.full_key(key)).await?;
        debug!(key, hit = value.is_some(), "Redis lookup");
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let mut conn = self.connection.clone();
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(self.full_key(key), value, seconds).await?;
        debug!(key, ttl_seconds = seconds, "Set Redis cache key");
        Ok(())
    }

    async fn scan_keys(&self, fragment: &str) -> CacheResult<Vec<String>> {
        let mut conn = self.connection.clone();
        let pattern = self.match_pattern(fragment);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            keys.extend(batch.into_iter().map(|key| self.strip_prefix(key)));

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection.clone();
        let full_keys: Vec<String> = keys.iter().map(|key| self.full_key(key)).collect();
        let deleted: usize = conn.del(full_keys).await?;
        debug!(deleted, "Deleted Redis cache keys");
        Ok(deleted)
    }

    async fn ping(&self) -> CacheResult<bool> {
        let mut conn = self.connection.clone();
        let response: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(response == "PONG")
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("url", &self.url)
            .field("key_prefix", &self.key_prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_glob() {
        assert_eq!(escape_glob("comp_42"), "comp_42");
        assert_eq!(escape_glob("a*b?[c]"), "a\\*b\\?\\[c\\]");
    }

    #[tokio::test]
    #[ignore] // Requires a Redis server on localhost:6379
    async fn test_basic_operations() {
        let store = RedisStore::connect("redis://localhost:6379", "search-cache-test:")
            .await
            .unwrap();

        store.set_with_ttl("comp_42:a", b"value", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("comp_42:a").await.unwrap(), Some(b"value".to_vec()));

        let keys = store.scan_keys("comp_42").await.unwrap();
        assert_eq!(keys, vec!["comp_42:a".to_string()]);

        assert_eq!(store.delete(&keys).await.unwrap(), 1);
        assert_eq!(store.get("comp_42:a").await.unwrap(), None);
        assert!(store.ping().await.unwrap());
    }
}
