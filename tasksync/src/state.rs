//! Application state store: the in-memory projection presentation reads.
//!
//! [`AppState`] is constructed explicitly and shared by `Arc`. Data changes
//! only through its command methods; queries hand out clones, so no lock is
//! ever held by a caller. Sync state is additionally published on a `watch`
//! channel for anything that wants to react to it.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::watch;

use tasksync_proto::{ListId, Task, TaskId, TaskList, User};

/// Tri-state sync status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SyncStatus {
    /// The most recent fetch for the active scope succeeded.
    Synced,
    /// Offline, or an attempt was deferred. Nothing has failed.
    #[default]
    Pending,
    /// A reachable attempt failed.
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synced => write!(f, "synced"),
            Self::Pending => write!(f, "pending"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Snapshot of the sync machinery, as presented to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    /// Current tri-state status.
    pub status: SyncStatus,
    /// Whether the backend was last seen reachable.
    pub online: bool,
    /// Completion time of the last successful sync in this process.
    pub last_sync: Option<DateTime<Utc>>,
    /// Message of the last failure, cleared by the next success.
    pub last_error: Option<String>,
    /// Whether a sync pass is running.
    pub syncing: bool,
}

#[derive(Debug, Default)]
struct Data {
    lists: Vec<TaskList>,
    tasks: HashMap<ListId, Vec<Task>>,
    current_list: Option<ListId>,
    user: Option<User>,
}

/// Shared in-memory projection of lists, tasks, session and sync state.
#[derive(Debug)]
pub struct AppState {
    data: RwLock<Data>,
    sync: watch::Sender<SyncState>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Empty state: no data, status `pending`, offline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Data::default()),
            sync: watch::Sender::new(SyncState::default()),
        }
    }

    // -- lists --

    /// Replace every list.
    ///
    /// Tasks and the selection of lists missing from `lists` are dropped.
    pub fn replace_task_lists(&self, lists: Vec<TaskList>) {
        let mut data = self.data.write();
        data.tasks.retain(|id, _| lists.iter().any(|l| l.id == *id));
        if data
            .current_list
            .is_some_and(|id| !lists.iter().any(|l| l.id == id))
        {
            data.current_list = None;
        }
        data.lists = lists;
    }

    /// Replace the list with the same id, or append it.
    pub fn upsert_task_list(&self, list: TaskList) {
        let mut data = self.data.write();
        match data.lists.iter_mut().find(|l| l.id == list.id) {
            Some(slot) => *slot = list,
            None => data.lists.push(list),
        }
    }

    /// Drop a list, its tasks and (if selected) the selection.
    pub fn remove_task_list(&self, id: ListId) {
        let mut data = self.data.write();
        data.lists.retain(|l| l.id != id);
        data.tasks.remove(&id);
        if data.current_list == Some(id) {
            data.current_list = None;
        }
    }

    /// All lists.
    #[must_use]
    pub fn task_lists(&self) -> Vec<TaskList> {
        self.data.read().lists.clone()
    }

    /// One list by id.
    #[must_use]
    pub fn task_list(&self, id: ListId) -> Option<TaskList> {
        self.data.read().lists.iter().find(|l| l.id == id).cloned()
    }

    // -- tasks --

    /// Replace the tasks of one list.
    pub fn replace_tasks(&self, list: ListId, tasks: Vec<Task>) {
        self.data.write().tasks.insert(list, tasks);
    }

    /// Replace the task with the same id in its list, or append it.
    ///
    /// A task that moved lists is removed from its previous one.
    pub fn upsert_task(&self, task: Task) {
        let mut data = self.data.write();
        for (list, tasks) in &mut data.tasks {
            if *list != task.task_list {
                tasks.retain(|t| t.id != task.id);
            }
        }
        let tasks = data.tasks.entry(task.task_list).or_default();
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => *slot = task,
            None => tasks.push(task),
        }
    }

    /// Drop a task from whichever list holds it.
    pub fn remove_task(&self, id: TaskId) {
        for tasks in self.data.write().tasks.values_mut() {
            tasks.retain(|t| t.id != id);
        }
    }

    /// Tasks of one list (empty if never loaded).
    #[must_use]
    pub fn tasks(&self, list: ListId) -> Vec<Task> {
        self.data
            .read()
            .tasks
            .get(&list)
            .cloned()
            .unwrap_or_default()
    }

    /// One task by id.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<Task> {
        self.data
            .read()
            .tasks
            .values()
            .flatten()
            .find(|t| t.id == id)
            .cloned()
    }

    // -- selection and session --

    /// Select (or deselect) the list being viewed.
    pub fn set_current_list(&self, list: Option<ListId>) {
        self.data.write().current_list = list;
    }

    /// The selected list.
    #[must_use]
    pub fn current_list(&self) -> Option<ListId> {
        self.data.read().current_list
    }

    /// Publish the signed-in user (or `None` after logout).
    pub fn set_user(&self, user: Option<User>) {
        self.data.write().user = user;
    }

    /// The signed-in user.
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.data.read().user.clone()
    }

    // -- sync state --

    /// Mark a sync pass as running.
    pub fn begin_sync(&self) {
        self.sync.send_modify(|s| s.syncing = true);
    }

    /// Record the end of a sync pass.
    ///
    /// A `synced` result stamps `last_sync` with `at` and clears the last
    /// error; an `error` result records `error`.
    pub fn finish_sync(&self, status: SyncStatus, error: Option<String>, at: DateTime<Utc>) {
        self.sync.send_modify(|s| {
            s.syncing = false;
            s.status = status;
            match status {
                SyncStatus::Synced => {
                    s.last_sync = Some(at);
                    s.last_error = None;
                }
                SyncStatus::Error => s.last_error = error,
                SyncStatus::Pending => {}
            }
        });
    }

    /// Mirror reachability. Going offline makes the status `pending`.
    pub fn set_network_online(&self, online: bool) {
        self.sync.send_if_modified(|s| {
            let before = s.clone();
            s.online = online;
            if !online {
                s.status = SyncStatus::Pending;
            }
            *s != before
        });
    }

    /// Forget sync progress: status `pending`, no last sync, no last error.
    pub fn reset_sync(&self) {
        self.sync.send_modify(|s| {
            s.status = SyncStatus::Pending;
            s.last_sync = None;
            s.last_error = None;
        });
    }

    /// Current sync state.
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.sync.borrow().clone()
    }

    /// Receive every change of the sync state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.sync.subscribe()
    }
}
