//! Server-confirmed writes.
//!
//! Every action needs the backend to be reachable; offline writes fail with
//! [`GatewayError::Network`] before any request is made and nothing is
//! queued. On success the entity returned by the server is reflected into
//! [`AppState`]. The cache is left to the next sync.

use std::sync::Arc;

use tasksync_proto::api::{TaskDraft, TaskListDraft, TaskListPatch, TaskPatch};
use tasksync_proto::{ListId, Task, TaskId, TaskList, TaskStatus, UserId};

use crate::connectivity::ConnectivityMonitor;
use crate::gateway::{GatewayError, RemoteGateway};
use crate::state::AppState;

/// Write operations on lists and tasks.
pub struct Actions<G: RemoteGateway> {
    gateway: Arc<G>,
    monitor: Arc<ConnectivityMonitor>,
    state: Arc<AppState>,
}

impl<G: RemoteGateway> Actions<G> {
    /// Wire actions to a gateway, a monitor and the projection.
    pub const fn new(
        gateway: Arc<G>,
        monitor: Arc<ConnectivityMonitor>,
        state: Arc<AppState>,
    ) -> Self {
        Self {
            gateway,
            monitor,
            state,
        }
    }

    fn ensure_online(&self, action: &'static str) -> Result<(), GatewayError> {
        if self.monitor.is_reachable() {
            Ok(())
        } else {
            tracing::info!(action, "rejecting write while offline");
            Err(GatewayError::Network(format!(
                "cannot {action} while offline"
            )))
        }
    }

    /// Create a list owned by the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if offline or if the backend rejects the draft.
    pub async fn create_task_list(&self, draft: TaskListDraft) -> Result<TaskList, GatewayError> {
        self.ensure_online("create a task list")?;
        let list = self.gateway.create_task_list(draft).await?;
        tracing::info!(list_id = %list.id, "task list created");
        self.state.upsert_task_list(list.clone());
        Ok(list)
    }

    /// Change a list.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if offline or if the backend rejects the change.
    pub async fn update_task_list(
        &self,
        id: ListId,
        patch: TaskListPatch,
    ) -> Result<TaskList, GatewayError> {
        self.ensure_online("update a task list")?;
        let list = self.gateway.update_task_list(id, patch).await?;
        self.state.upsert_task_list(list.clone());
        Ok(list)
    }

    /// Delete a list and its tasks.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if offline or if the backend refuses.
    pub async fn delete_task_list(&self, id: ListId) -> Result<(), GatewayError> {
        self.ensure_online("delete a task list")?;
        self.gateway.delete_task_list(id).await?;
        tracing::info!(list_id = %id, "task list deleted");
        self.state.remove_task_list(id);
        Ok(())
    }

    /// Share a list with another user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if offline or if the backend refuses.
    pub async fn add_collaborator(
        &self,
        list: ListId,
        user: UserId,
    ) -> Result<TaskList, GatewayError> {
        self.ensure_online("share a task list")?;
        let list = self.gateway.add_collaborator(list, user).await?;
        self.state.upsert_task_list(list.clone());
        Ok(list)
    }

    /// Stop sharing a list with a user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if offline or if the backend refuses.
    pub async fn remove_collaborator(
        &self,
        list: ListId,
        user: UserId,
    ) -> Result<TaskList, GatewayError> {
        self.ensure_online("unshare a task list")?;
        let list = self.gateway.remove_collaborator(list, user).await?;
        self.state.upsert_task_list(list.clone());
        Ok(list)
    }

    /// Create a task.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if offline or if the backend rejects the draft.
    pub async fn create_task(&self, draft: TaskDraft) -> Result<Task, GatewayError> {
        self.ensure_online("create a task")?;
        let task = self.gateway.create_task(draft).await?;
        tracing::info!(task_id = %task.id, list_id = %task.task_list, "task created");
        self.state.upsert_task(task.clone());
        Ok(task)
    }

    /// Change a task.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if offline or if the backend rejects the change.
    pub async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task, GatewayError> {
        self.ensure_online("update a task")?;
        let task = self.gateway.update_task(id, patch).await?;
        self.state.upsert_task(task.clone());
        Ok(task)
    }

    /// Move a task to `status`; the server maintains the completion time.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if offline or if the backend refuses.
    pub async fn update_task_status(
        &self,
        id: TaskId,
        status: TaskStatus,
    ) -> Result<Task, GatewayError> {
        self.update_task(id, TaskPatch::status(status)).await
    }

    /// Delete a task.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if offline or if the backend refuses.
    pub async fn delete_task(&self, id: TaskId) -> Result<(), GatewayError> {
        self.ensure_online("delete a task")?;
        self.gateway.delete_task(id).await?;
        self.state.remove_task(id);
        Ok(())
    }
}
