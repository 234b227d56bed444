//! # Cache Key Generator
//!
//! Derives deterministic cache keys from a search request. The canonical form
//! is a JSON object with sorted keys:
//!
//! ```text
//! {"context":{"category":"","tech_stack":[]},"filters":{...},"query":"<normalized>"}
//! ```
//!
//! which is hashed with SHA-256 and prefixed. Only `tech_stack` and `category`
//! from the context participate, so freshness hints never fragment the cache.

use crate::core::types::{CacheKey, SearchRequest};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Cache key generator
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new("search:")
    }
}

impl KeyGenerator {
    /// Create a key generator with the given prefix
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Derive the cache key for a request
    pub fn derive(&self, request: &SearchRequest) -> CacheKey {
        let canonical = Self::canonical_form(request);

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let hash = hasher.finalize();

        CacheKey::new(format!("{}{:x}", self.prefix, hash))
    }

    /// Whether `key` has the shape of a key this generator derives:
    /// the prefix followed by a lower-case hex SHA-256 digest
    pub fn is_derived(&self, key: &str) -> bool {
        key.strip_prefix(self.prefix.as_str())
            .map(|digest| digest.len() == DIGEST_HEX_LEN && digest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')))
            .unwrap_or(false)
    }

    /// Canonical serialization that the key hash is computed over
    pub fn canonical_form(request: &SearchRequest) -> String {
        let context = &request.context;
        let object = json!({
            "query": request.normalized_query(),
            "filters": canonicalize(&Value::Object(request.filters.clone())),
            "context": {
                "tech_stack": context.tech_stack,
                "category": context.category.clone().unwrap_or_default(),
            },
        });

        canonicalize(&object).to_string()
    }
}

const DIGEST_HEX_LEN: usize = 64;

/// Rebuild a value with every object's keys in sorted order
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.cmp(b));

            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key.clone(), canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
