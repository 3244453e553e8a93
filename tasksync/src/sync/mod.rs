//! Sync orchestrator: decides between remote fetch and cached data, writes
//! the cache through on success and keeps the sync status honest.
//!
//! Each public sync operation follows the same protocol:
//!
//! 1. If another sync is in flight, return [`SyncOutcome::Skipped`] without
//!    touching anything.
//! 2. If the backend is unreachable, leave cache and projection alone and
//!    report `pending`.
//! 3. Otherwise fetch. On success overwrite the cache entry, project the
//!    result into [`AppState`] and report `synced`. On failure leave the
//!    cache alone and report `error`.
//!
//! Only successful fetches ever write the cache, so the last good data
//! survives any number of failed or offline attempts.

mod background;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;

use tasksync_proto::{ListId, Task, TaskList};

use crate::cache::{CACHE_PREFIXES, CacheKey, KeyValueStore, LAST_SYNC_KEY, LocalCache};
use crate::connectivity::ConnectivityMonitor;
use crate::gateway::{GatewayError, RemoteGateway};
use crate::state::{AppState, SyncStatus};

pub use background::BackgroundHandle;

/// Default period of the background refresh.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Tunables of the orchestrator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period of the background refresh while synced.
    pub interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

/// Result of one sync call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Fresh data was fetched, cached and projected.
    Synced,
    /// The backend was unreachable; nothing changed.
    Pending,
    /// The backend was reachable but the fetch failed.
    Failed(GatewayError),
    /// Another sync was in flight; this call did nothing.
    Skipped,
}

impl SyncOutcome {
    /// The status this outcome leaves behind, or `None` for [`Skipped`](Self::Skipped).
    #[must_use]
    pub const fn status(&self) -> Option<SyncStatus> {
        match self {
            Self::Synced => Some(SyncStatus::Synced),
            Self::Pending => Some(SyncStatus::Pending),
            Self::Failed(_) => Some(SyncStatus::Error),
            Self::Skipped => None,
        }
    }
}

/// Why a fetch step did not complete.
enum Interrupt {
    Offline,
    Failed(GatewayError),
}

/// Clears the in-flight flag when dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Coordinates gateway, cache, connectivity and state.
pub struct SyncOrchestrator<G: RemoteGateway, S: KeyValueStore> {
    gateway: Arc<G>,
    cache: LocalCache<S>,
    monitor: Arc<ConnectivityMonitor>,
    state: Arc<AppState>,
    in_flight: AtomicBool,
    config: SyncConfig,
}

impl<G: RemoteGateway, S: KeyValueStore> SyncOrchestrator<G, S> {
    /// Wire an orchestrator from its collaborators.
    pub fn new(
        gateway: Arc<G>,
        cache: LocalCache<S>,
        monitor: Arc<ConnectivityMonitor>,
        state: Arc<AppState>,
        config: SyncConfig,
    ) -> Self {
        Self {
            gateway,
            cache,
            monitor,
            state,
            in_flight: AtomicBool::new(false),
            config,
        }
    }

    /// The projection this orchestrator writes into.
    #[must_use]
    pub const fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Whether a sync call is currently running.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Refresh the task lists.
    pub async fn sync_task_lists(&self) -> SyncOutcome {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            tracing::debug!("sync already in flight, skipping task lists");
            return SyncOutcome::Skipped;
        };
        if !self.monitor.is_reachable() {
            return self.conclude(Err(Interrupt::Offline));
        }
        self.state.begin_sync();
        let result = self.pull_task_lists().await.map(drop);
        self.conclude(result)
    }

    /// Refresh the tasks of one list.
    pub async fn sync_tasks(&self, list: ListId) -> SyncOutcome {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            tracing::debug!(%list, "sync already in flight, skipping tasks");
            return SyncOutcome::Skipped;
        };
        if !self.monitor.is_reachable() {
            return self.conclude(Err(Interrupt::Offline));
        }
        self.state.begin_sync();
        let result = self.pull_tasks(list).await;
        self.conclude(result)
    }

    /// Refresh the lists, then the tasks of every list concurrently.
    ///
    /// Persists the completion time under `lastSync` when everything synced.
    pub async fn sync_all(&self) -> SyncOutcome {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            tracing::debug!("sync already in flight, skipping full sync");
            return SyncOutcome::Skipped;
        };
        if !self.monitor.is_reachable() {
            return self.conclude(Err(Interrupt::Offline));
        }
        self.state.begin_sync();

        let lists = match self.pull_task_lists().await {
            Ok(lists) => lists,
            Err(interrupt) => return self.conclude(Err(interrupt)),
        };

        let results = join_all(lists.into_iter().map(|list| self.pull_tasks(list))).await;
        let mut offline = false;
        let mut first_failure = None;
        for result in results {
            match result {
                Ok(()) => {}
                Err(Interrupt::Offline) => offline = true,
                Err(Interrupt::Failed(e)) => {
                    first_failure.get_or_insert(e);
                }
            }
        }
        let aggregate = match (first_failure, offline) {
            (Some(e), _) => Err(Interrupt::Failed(e)),
            (None, true) => Err(Interrupt::Offline),
            (None, false) => Ok(()),
        };

        let outcome = self.conclude(aggregate);
        if outcome == SyncOutcome::Synced {
            self.persist_last_sync().await;
        }
        outcome
    }

    /// Lists from the last successful sync, without touching the network.
    pub async fn cached_task_lists(&self) -> Vec<TaskList> {
        self.cache.get(CacheKey::TaskLists).await
    }

    /// Tasks of `list` from the last successful sync.
    pub async fn cached_tasks(&self, list: ListId) -> Vec<Task> {
        self.cache.get(CacheKey::Tasks(list)).await
    }

    /// Hydrate the projection from the cache (startup, or while offline).
    ///
    /// Returns the number of lists loaded.
    pub async fn load_cached(&self) -> usize {
        let lists = self.cached_task_lists().await;
        let count = lists.len();
        for list in &lists {
            let tasks = self.cached_tasks(list.id).await;
            self.state.replace_tasks(list.id, tasks);
        }
        self.state.replace_task_lists(lists);
        tracing::debug!(lists = count, "projection loaded from cache");
        count
    }

    /// Completion time of the last full sync, as persisted.
    pub async fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        let raw = match self.cache.store().get(LAST_SYNC_KEY).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "could not read last sync time");
                return None;
            }
        };
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .inspect_err(|e| tracing::warn!(error = %e, "stored last sync time is corrupt"))
            .ok()
    }

    /// Remove every cached list and task entry and reset the status to
    /// `pending`. Credentials are left alone.
    ///
    /// Returns the number of cache entries removed.
    pub async fn clear_cache(&self) -> usize {
        let removed = self.cache.clear(&CACHE_PREFIXES).await;
        self.state.reset_sync();
        tracing::info!(removed, "sync cache cleared");
        removed
    }

    /// Start the background driver (auto-sync on reconnect, periodic refresh).
    ///
    /// The driver stops when the returned handle is dropped.
    pub fn spawn_background(self: &Arc<Self>) -> BackgroundHandle {
        background::spawn(Arc::clone(self), self.config.interval)
    }

    async fn pull_task_lists(&self) -> Result<Vec<ListId>, Interrupt> {
        if !self.monitor.is_reachable() {
            return Err(Interrupt::Offline);
        }
        let lists = self.gateway.list_task_lists().await.map_err(|e| {
            tracing::warn!(error = %e, kind = e.kind(), "task list fetch failed");
            Interrupt::Failed(e)
        })?;
        self.cache.put(CacheKey::TaskLists, &lists, Utc::now()).await;
        let ids: Vec<ListId> = lists.iter().map(|l| l.id).collect();
        self.cache.retain_tasks(&ids).await;
        tracing::debug!(count = lists.len(), "task lists fetched");
        self.state.replace_task_lists(lists);
        Ok(ids)
    }

    async fn pull_tasks(&self, list: ListId) -> Result<(), Interrupt> {
        if !self.monitor.is_reachable() {
            return Err(Interrupt::Offline);
        }
        let tasks = self.gateway.tasks_for_list(list).await.map_err(|e| {
            tracing::warn!(%list, error = %e, kind = e.kind(), "task fetch failed");
            Interrupt::Failed(e)
        })?;
        self.cache.put(CacheKey::Tasks(list), &tasks, Utc::now()).await;
        tracing::debug!(%list, count = tasks.len(), "tasks fetched");
        self.state.replace_tasks(list, tasks);
        Ok(())
    }

    /// Turn a pull result into an outcome and publish the resulting status.
    fn conclude(&self, result: Result<(), Interrupt>) -> SyncOutcome {
        let now = Utc::now();
        let outcome = match result {
            Ok(()) => {
                self.state.finish_sync(SyncStatus::Synced, None, now);
                SyncOutcome::Synced
            }
            Err(Interrupt::Offline) => {
                self.state.finish_sync(SyncStatus::Pending, None, now);
                SyncOutcome::Pending
            }
            Err(Interrupt::Failed(e)) => {
                self.state
                    .finish_sync(SyncStatus::Error, Some(e.to_string()), now);
                SyncOutcome::Failed(e)
            }
        };
        tracing::info!(status = ?outcome.status(), "sync finished");
        outcome
    }

    async fn persist_last_sync(&self) {
        let Some(at) = self.state.sync_state().last_sync else {
            return;
        };
        if let Err(e) = self
            .cache
            .store()
            .set(LAST_SYNC_KEY, at.to_rfc3339())
            .await
        {
            tracing::warn!(error = %e, "could not persist last sync time");
        }
    }
}
