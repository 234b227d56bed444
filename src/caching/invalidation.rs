//! # Cache Invalidation Module
//!
//! Maps domain events to cache-clearing actions. Each action builds a key
//! predicate from the event payload and applies it to both tiers:
//!
//! - keys recorded under the matching tag when the entry was stored
//! - keys written outside the service whose text contains the identifier
//!   fragment
//!
//! Keys the service derived itself are hashes, so they are only ever matched
//! through the tag index. Unknown event types are ignored.

use super::key_generator::KeyGenerator;
use super::stores::{LocalCache, RemoteTier};
use crate::core::types::{CacheKey, Record};
use chrono::{DateTime, Utc};
use crate::observability::metrics as names;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Priority at or above which an entry is tagged `popular`
pub const POPULAR_PRIORITY: u8 = 8;

pub const POPULAR_TAG: &str = "popular";

/// Action bound to an event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationAction {
    InvalidateComponent,
    InvalidateCategory,
    InvalidatePopular,
    ClearAll,
}

impl InvalidationAction {
    /// Event table
    pub fn for_event(event_type: &str) -> Option<Self> {
        match event_type {
            "component_updated" => Some(Self::InvalidateComponent),
            "new_component_added" => Some(Self::InvalidateCategory),
            "popularity_changed" => Some(Self::InvalidatePopular),
            "cache_cleared" => Some(Self::ClearAll),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidateComponent => "invalidate_component",
            Self::InvalidateCategory => "invalidate_category",
            Self::InvalidatePopular => "invalidate_popular",
            Self::ClearAll => "clear_all",
        }
    }
}

/// What an invalidation removed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvalidationOutcome {
    pub action: Option<InvalidationAction>,
    pub local_removed: usize,
    pub remote_removed: usize,
}

impl InvalidationOutcome {
    pub fn total(&self) -> usize {
        self.local_removed + self.remote_removed
    }
}

/// Tag -> keys mapping, with the reverse mapping for cleanup
#[derive(Debug, Default)]
pub struct TagIndex {
    inner: RwLock<TagIndexInner>,
}

#[derive(Debug, Default)]
struct TagIndexInner {
    by_tag: HashMap<String, HashSet<CacheKey>>,
    by_key: HashMap<CacheKey, TaggedKey>,
}

#[derive(Debug)]
struct TaggedKey {
    tags: HashSet<String>,
    /// Latest expiry of any tier's copy of the entry
    expires_at: DateTime<Utc>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags for a stored entry
    pub fn tags_for(records: &[Record], priority: u8) -> HashSet<String> {
        let mut tags = HashSet::new();
        for record in records {
            if let Some(id) = record.get("id").and_then(value_text) {
                tags.insert(format!("component:{}", id));
            }
            if let Some(category) = record.get("category").and_then(value_text) {
                tags.insert(format!("category:{}", category.to_lowercase()));
            }
        }
        if priority >= POPULAR_PRIORITY {
            tags.insert(POPULAR_TAG.to_string());
        }
        tags
    }

    /// Replace the tags recorded for `key`, valid until `expires_at`
    pub fn record(&self, key: &CacheKey, tags: HashSet<String>, expires_at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        inner.detach(key);
        if tags.is_empty() {
            return;
        }
        for tag in &tags {
            inner.by_tag.entry(tag.clone()).or_default().insert(key.clone());
        }
        inner.by_key.insert(key.clone(), TaggedKey { tags, expires_at });
    }

    /// Drop keys whose entries have expired in every tier
    pub fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write();
        let stale: Vec<CacheKey> = inner
            .by_key
            .iter()
            .filter(|(_, tagged)| tagged.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            inner.detach(key);
        }
        stale.len()
    }

    pub fn keys_for(&self, tag: &str) -> Vec<CacheKey> {
        self.inner
            .read()
            .by_tag
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn tags_of(&self, key: &CacheKey) -> HashSet<String> {
        self.inner
            .read()
            .by_key
            .get(key)
            .map(|tagged| tagged.tags.clone())
            .unwrap_or_default()
    }

    pub fn forget(&self, keys: &[CacheKey]) {
        let mut inner = self.inner.write();
        for key in keys {
            inner.detach(key);
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_tag.clear();
        inner.by_key.clear();
    }

    pub fn tracked_keys(&self) -> usize {
        self.inner.read().by_key.len()
    }
}

impl TagIndexInner {
    fn detach(&mut self, key: &CacheKey) {
        let Some(tagged) = self.by_key.remove(key) else {
            return;
        };
        for tag in tagged.tags {
            if let Some(keys) = self.by_tag.get_mut(&tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(&tag);
                }
            }
        }
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Key selection derived from an event payload
#[derive(Debug, Default)]
struct Selection {
    fragment: Option<String>,
    tag: Option<String>,
}

/// Event-driven invalidation over both tiers
pub struct Invalidator {
    local: Arc<LocalCache>,
    remote: Option<Arc<RemoteTier>>,
    tags: Arc<TagIndex>,
    /// Recognises keys this cache derived; its prefix scopes remote clears
    keys: KeyGenerator,
}

impl Invalidator {
    pub fn new(local: Arc<LocalCache>, remote: Option<Arc<RemoteTier>>, tags: Arc<TagIndex>) -> Self {
        Self {
            local,
            remote,
            tags,
            keys: KeyGenerator::new(""),
        }
    }

    /// Key prefix the cache derives keys under. Remote clears are
    /// restricted to keys containing it.
    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.keys = KeyGenerator::new(namespace);
        self
    }

    pub fn tags(&self) -> &Arc<TagIndex> {
        &self.tags
    }

    /// Run the action bound to `event_type`. Unknown events return an empty outcome.
    pub async fn invalidate_by_event(&self, event_type: &str, event_data: &Map<String, Value>) -> InvalidationOutcome {
        let Some(action) = InvalidationAction::for_event(event_type) else {
            debug!(event_type, "Ignoring unknown invalidation event");
            return InvalidationOutcome::default();
        };

        let outcome = match action {
            InvalidationAction::ClearAll => self.clear_all().await,
            _ => {
                let selection = Self::select(action, event_data);
                if selection.fragment.is_none() && selection.tag.is_none() {
                    warn!(event_type, "Invalidation event carried no usable identifier");
                    InvalidationOutcome {
                        action: Some(action),
                        ..Default::default()
                    }
                } else {
                    self.apply(action, selection).await
                }
            }
        };

        metrics::counter!(names::INVALIDATIONS_TOTAL, "action" => action.as_str()).increment(1);
        info!(
            event_type,
            action = action.as_str(),
            local_removed = outcome.local_removed,
            remote_removed = outcome.remote_removed,
            "Cache invalidated"
        );
        outcome
    }

    /// Remove specific keys from both tiers
    pub async fn invalidate_keys(&self, keys: &[CacheKey]) -> InvalidationOutcome {
        let local_removed = keys.iter().filter(|key| self.local.remove(key)).count();
        let remote_removed = match &self.remote {
            Some(remote) => remote.delete_keys(keys).await.unwrap_or(0),
            None => 0,
        };
        self.tags.forget(keys);

        InvalidationOutcome {
            action: None,
            local_removed,
            remote_removed,
        }
    }

    fn select(action: InvalidationAction, data: &Map<String, Value>) -> Selection {
        let field = |names: &[&str]| names.iter().find_map(|name| data.get(*name).and_then(value_text));

        match action {
            InvalidationAction::InvalidateComponent => {
                let id = field(&["component_id", "id"]);
                Selection {
                    tag: id.as_ref().map(|id| format!("component:{}", id)),
                    fragment: id,
                }
            }
            InvalidationAction::InvalidateCategory => {
                let category = field(&["category"]);
                Selection {
                    tag: category.as_ref().map(|c| format!("category:{}", c.to_lowercase())),
                    fragment: category,
                }
            }
            InvalidationAction::InvalidatePopular => Selection {
                fragment: field(&["component_id", "id"]),
                tag: Some(POPULAR_TAG.to_string()),
            },
            InvalidationAction::ClearAll => Selection::default(),
        }
    }

    async fn apply(&self, action: InvalidationAction, selection: Selection) -> InvalidationOutcome {
        let tagged: HashSet<CacheKey> = selection
            .tag
            .as_deref()
            .map(|tag| self.tags.keys_for(tag).into_iter().collect())
            .unwrap_or_default();

        let fragment = selection.fragment.as_deref();
        let foreign = |key: &str| !self.keys.is_derived(key);
        let removed_local = self.local.remove_matching(|key| {
            tagged.contains(key) || fragment.map(|f| foreign(key.as_str()) && key.as_str().contains(f)).unwrap_or(false)
        });

        let mut remote_removed = 0;
        if let Some(remote) = &self.remote {
            if let Some(fragment) = fragment {
                match remote.delete_matching_where(fragment, foreign).await {
                    Ok(count) => remote_removed += count,
                    Err(e) => warn!(action = action.as_str(), error = %e, "Remote pattern invalidation failed"),
                }
            }
            if !tagged.is_empty() {
                let keys: Vec<CacheKey> = tagged.iter().cloned().collect();
                match remote.delete_keys(&keys).await {
                    Ok(count) => remote_removed += count,
                    Err(e) => warn!(action = action.as_str(), error = %e, "Remote tag invalidation failed"),
                }
            }
        }

        let mut forgotten: Vec<CacheKey> = tagged.into_iter().collect();
        forgotten.extend(removed_local.iter().cloned());
        self.tags.forget(&forgotten);

        InvalidationOutcome {
            action: Some(action),
            local_removed: removed_local.len(),
            remote_removed,
        }
    }

    async fn clear_all(&self) -> InvalidationOutcome {
        let local_removed = self.local.clear();
        let remote_removed = match &self.remote {
            Some(remote) => remote.delete_matching(self.keys.prefix()).await.unwrap_or_else(|e| {
                warn!(error = %e, "Remote clear failed");
                0
            }),
            None => 0,
        };
        self.tags.clear();

        InvalidationOutcome {
            action: Some(InvalidationAction::ClearAll),
            local_removed,
            remote_removed,
        }
    }
}

impl std::fmt::Debug for Invalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invalidator")
            .field("remote", &self.remote.as_ref().map(|r| r.store_name()))
            .field("tagged_keys", &self.tags.tracked_keys())
            .finish()
    }
}
