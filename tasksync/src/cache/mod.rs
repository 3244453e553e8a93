//! Local cache of the last successfully synced lists and tasks.
//!
//! Each cache entry is a [`SyncSnapshot`]: the collection returned by the
//! last successful fetch for one [`CacheKey`] plus the time of that fetch.
//! The cache never propagates failures: unreadable entries read back as an
//! empty collection and failed writes are logged and reported as `false`, so
//! a broken disk degrades to "no offline data" instead of breaking callers.

pub mod store;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use tasksync_proto::ListId;

pub use store::{FileStore, InMemoryStore, KeyValueStore, StoreError};

/// Key holding the bearer credential.
pub const AUTH_TOKEN_KEY: &str = "authToken";

/// Key holding the serialized signed-in user.
pub const USER_KEY: &str = "user";

/// Key holding the RFC 3339 time of the last complete sync.
pub const LAST_SYNC_KEY: &str = "lastSync";

/// Key of the task list snapshot (also its clearing prefix).
pub const TASK_LISTS_KEY: &str = "taskLists";

/// Prefix of per-list task snapshots.
pub const TASKS_KEY_PREFIX: &str = "tasks_";

/// Prefixes removed by [`LocalCache::clear`] when wiping synced data.
pub const CACHE_PREFIXES: [&str; 2] = [TASK_LISTS_KEY, TASKS_KEY_PREFIX];

/// Composite key of a cached collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// All task lists visible to the user.
    TaskLists,
    /// Tasks of one list.
    Tasks(ListId),
}

impl CacheKey {
    /// The storage key, e.g. `taskLists` or `tasks_12`.
    #[must_use]
    pub fn as_key(&self) -> String {
        match self {
            Self::TaskLists => TASK_LISTS_KEY.to_string(),
            Self::Tasks(list) => format!("{TASKS_KEY_PREFIX}{list}"),
        }
    }

    const fn entity(self) -> EntityKind {
        match self {
            Self::TaskLists => EntityKind::TaskLists,
            Self::Tasks(_) => EntityKind::Tasks,
        }
    }

    const fn list_id(self) -> Option<ListId> {
        match self {
            Self::TaskLists => None,
            Self::Tasks(list) => Some(list),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

/// Which collection a snapshot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A `Vec<TaskList>`.
    TaskLists,
    /// A `Vec<Task>` of one list.
    Tasks,
}

/// A cached collection as persisted under its [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot<T> {
    /// Kind of entity stored.
    pub entity: EntityKind,
    /// Parent list for task snapshots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_id: Option<ListId>,
    /// The collection from the last successful fetch.
    pub items: Vec<T>,
    /// When that fetch completed.
    pub synced_at: DateTime<Utc>,
}

/// Typed, failure-tolerant view over a [`KeyValueStore`].
pub struct LocalCache<S: KeyValueStore> {
    store: Arc<S>,
}

impl<S: KeyValueStore> Clone for LocalCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KeyValueStore> LocalCache<S> {
    /// Wrap a shared store.
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Persist `items` under `key` as a fresh snapshot taken at `synced_at`.
    ///
    /// Returns `false` (after logging) if serialization or storage failed.
    pub async fn put<T: Serialize + Sync>(
        &self,
        key: CacheKey,
        items: &[T],
        synced_at: DateTime<Utc>,
    ) -> bool {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct SnapshotRef<'a, T> {
            entity: EntityKind,
            #[serde(skip_serializing_if = "Option::is_none")]
            list_id: Option<ListId>,
            items: &'a [T],
            synced_at: DateTime<Utc>,
        }

        let snapshot = SnapshotRef {
            entity: key.entity(),
            list_id: key.list_id(),
            items,
            synced_at,
        };
        let json = match serde_json::to_string(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache serialization failed");
                return false;
            }
        };
        match self.store.set(&key.as_key(), json).await {
            Ok(()) => {
                tracing::debug!(key = %key, count = items.len(), "cache entry written");
                true
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache write failed");
                false
            }
        }
    }

    /// Read the snapshot stored under `key`, if present and decodable.
    pub async fn snapshot<T: DeserializeOwned>(&self, key: CacheKey) -> Option<SyncSnapshot<T>> {
        let raw = match self.store.get(&key.as_key()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache entry is corrupt, ignoring");
                None
            }
        }
    }

    /// Read the collection stored under `key`, or an empty one.
    pub async fn get<T: DeserializeOwned>(&self, key: CacheKey) -> Vec<T> {
        self.snapshot(key)
            .await
            .map(|snapshot| snapshot.items)
            .unwrap_or_default()
    }

    /// Remove every key starting with one of `prefixes`.
    ///
    /// Returns how many keys were removed; failures are logged and skipped.
    pub async fn clear(&self, prefixes: &[&str]) -> usize {
        let removed = self
            .remove_where(|k| prefixes.iter().any(|p| k.starts_with(p)))
            .await;
        tracing::debug!(removed, "cache cleared");
        removed
    }

    /// Remove the task snapshots of every list not in `keep`.
    pub async fn retain_tasks(&self, keep: &[ListId]) -> usize {
        let kept: HashSet<String> = keep
            .iter()
            .map(|list| CacheKey::Tasks(*list).as_key())
            .collect();
        let removed = self
            .remove_where(|k| k.starts_with(TASKS_KEY_PREFIX) && !kept.contains(k))
            .await;
        if removed > 0 {
            tracing::debug!(removed, "task snapshots of vanished lists removed");
        }
        removed
    }

    async fn remove_where(&self, doomed: impl Fn(&str) -> bool) -> usize {
        let keys = match self.store.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "cache key listing failed");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys.iter().filter(|k| doomed(k)) {
            match self.store.remove(key).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(key = %key, error = %e, "cache removal failed"),
            }
        }
        removed
    }
}
