//! In-process gateway for tests and offline demos.
//!
//! Data lives in memory; nothing crosses a socket. On top of the normal trait
//! surface the loopback gateway counts calls per operation, records task
//! queries, can be told to fail specific operations, and can hold every call
//! in flight until released (to observe re-entrancy).

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;

use tasksync_proto::api::{TaskDraft, TaskListDraft, TaskListPatch, TaskPatch, TaskQuery};
use tasksync_proto::auth::{AuthResponse, RegisterRequest, ResetPasswordRequest};
use tasksync_proto::{ListId, Task, TaskId, TaskList, TaskStatus, User, UserId};

use super::{AuthProvider, GatewayError, RemoteGateway};

/// Gateway operations, as counted by [`LoopbackGateway::calls`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    /// `list_task_lists`
    ListTaskLists,
    /// `get_task_list`
    GetTaskList,
    /// `create_task_list`
    CreateTaskList,
    /// `update_task_list`
    UpdateTaskList,
    /// `delete_task_list`
    DeleteTaskList,
    /// `list_tasks`
    ListTasks,
    /// `get_task`
    GetTask,
    /// `create_task`
    CreateTask,
    /// `update_task`
    UpdateTask,
    /// `delete_task`
    DeleteTask,
    /// Any [`AuthProvider`] operation.
    Auth,
}

struct Account {
    user: User,
    password: String,
}

#[derive(Default)]
struct Inner {
    lists: BTreeMap<ListId, TaskList>,
    tasks: BTreeMap<TaskId, Task>,
    accounts: Vec<Account>,
    signed_in: Option<UserId>,
    next_id: u64,
    calls: HashMap<GatewayOp, usize>,
    queries: Vec<TaskQuery>,
    fail_next: HashMap<GatewayOp, VecDeque<GatewayError>>,
    fail_always: HashMap<GatewayOp, GatewayError>,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn actor(&self) -> UserId {
        self.signed_in.unwrap_or(LoopbackGateway::DEFAULT_USER)
    }

    fn list_with_tasks(&self, id: ListId) -> Option<TaskList> {
        let mut list = self.lists.get(&id)?.clone();
        list.tasks = self
            .tasks
            .values()
            .filter(|t| t.task_list == id)
            .cloned()
            .collect();
        Some(list)
    }

    fn injected_failure(&mut self, op: GatewayOp) -> Option<GatewayError> {
        if let Some(err) = self.fail_next.get_mut(&op).and_then(VecDeque::pop_front) {
            return Some(err);
        }
        self.fail_always.get(&op).cloned()
    }

    fn session(&mut self, user: User) -> AuthResponse {
        self.signed_in = Some(user.id);
        AuthResponse {
            jwt: format!("loopback-{}", user.id),
            user,
        }
    }
}

/// In-memory [`RemoteGateway`] and [`AuthProvider`].
///
/// No access rules are enforced; the signed-in user (or
/// [`DEFAULT_USER`](Self::DEFAULT_USER)) owns everything it creates.
pub struct LoopbackGateway {
    inner: Mutex<Inner>,
    hold: watch::Sender<bool>,
}

impl Default for LoopbackGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackGateway {
    /// Owner of created lists when nobody has signed in.
    pub const DEFAULT_USER: UserId = UserId::new(1);

    /// Create an empty gateway.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            hold: watch::Sender::new(false),
        }
    }

    /// Insert a list directly, bypassing counters and failures.
    pub fn seed_list(&self, title: &str) -> TaskList {
        let mut inner = self.inner.lock();
        let id = ListId::new(inner.next_id());
        let list = TaskList {
            id,
            title: title.to_string(),
            description: String::new(),
            is_public: false,
            owner: inner.actor(),
            collaborators: std::collections::BTreeSet::new(),
            tasks: Vec::new(),
        };
        inner.lists.insert(id, list.clone());
        list
    }

    /// Insert a task directly, bypassing counters and failures.
    pub fn seed_task(&self, list: ListId, title: &str) -> Task {
        let mut inner = self.inner.lock();
        let id = TaskId::new(inner.next_id());
        let task = Task {
            id,
            title: title.to_string(),
            description: None,
            status: TaskStatus::Pending,
            estimated_minutes: 0,
            assigned_to: None,
            due_date: None,
            completed_at: None,
            task_list: list,
        };
        inner.tasks.insert(id, task.clone());
        task
    }

    /// Register an account directly.
    pub fn seed_user(&self, username: &str, email: &str, password: &str) -> User {
        let mut inner = self.inner.lock();
        let user = User {
            id: UserId::new(inner.next_id()),
            username: username.to_string(),
            email: email.to_string(),
        };
        inner.accounts.push(Account {
            user: user.clone(),
            password: password.to_string(),
        });
        user
    }

    /// How many times `op` has been called.
    #[must_use]
    pub fn calls(&self, op: GatewayOp) -> usize {
        self.inner.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Every query passed to `list_tasks`, in call order.
    #[must_use]
    pub fn task_queries(&self) -> Vec<TaskQuery> {
        self.inner.lock().queries.clone()
    }

    /// Make the next call of `op` fail with `error`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, op: GatewayOp, error: GatewayError) {
        self.inner
            .lock()
            .fail_next
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Make every call of `op` fail with `error` until [`clear_failures`](Self::clear_failures).
    pub fn fail_always(&self, op: GatewayOp, error: GatewayError) {
        self.inner.lock().fail_always.insert(op, error);
    }

    /// Drop every injected failure.
    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock();
        inner.fail_next.clear();
        inner.fail_always.clear();
    }

    /// Park every subsequent call (after it is counted) until [`release`](Self::release).
    pub fn hold(&self) {
        self.hold.send_replace(true);
    }

    /// Let held and future calls proceed.
    pub fn release(&self) {
        self.hold.send_replace(false);
    }

    /// Count the call, wait while held, then apply any injected failure.
    async fn enter(&self, op: GatewayOp) -> Result<(), GatewayError> {
        *self.inner.lock().calls.entry(op).or_default() += 1;
        let mut rx = self.hold.subscribe();
        // The sender lives in `self`, so this only errors if `self` is gone.
        let _ = rx.wait_for(|held| !held).await;
        match self.inner.lock().injected_failure(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl RemoteGateway for LoopbackGateway {
    async fn list_task_lists(&self) -> Result<Vec<TaskList>, GatewayError> {
        self.enter(GatewayOp::ListTaskLists).await?;
        let inner = self.inner.lock();
        Ok(inner
            .lists
            .keys()
            .filter_map(|id| inner.list_with_tasks(*id))
            .collect())
    }

    async fn get_task_list(&self, id: ListId) -> Result<TaskList, GatewayError> {
        self.enter(GatewayOp::GetTaskList).await?;
        self.inner
            .lock()
            .list_with_tasks(id)
            .ok_or_else(|| GatewayError::NotFound(format!("task list {id}")))
    }

    async fn create_task_list(&self, draft: TaskListDraft) -> Result<TaskList, GatewayError> {
        self.enter(GatewayOp::CreateTaskList).await?;
        draft
            .validate()
            .map_err(|e| GatewayError::Validation(e.to_string()))?;
        let mut inner = self.inner.lock();
        let id = ListId::new(inner.next_id());
        let list = TaskList {
            id,
            title: draft.title,
            description: draft.description,
            is_public: draft.is_public,
            owner: inner.actor(),
            collaborators: std::collections::BTreeSet::new(),
            tasks: Vec::new(),
        };
        inner.lists.insert(id, list.clone());
        Ok(list)
    }

    async fn update_task_list(
        &self,
        id: ListId,
        patch: TaskListPatch,
    ) -> Result<TaskList, GatewayError> {
        self.enter(GatewayOp::UpdateTaskList).await?;
        patch
            .validate()
            .map_err(|e| GatewayError::Validation(e.to_string()))?;
        let mut inner = self.inner.lock();
        let list = inner
            .lists
            .get_mut(&id)
            .ok_or_else(|| GatewayError::NotFound(format!("task list {id}")))?;
        if let Some(title) = patch.title {
            list.title = title;
        }
        if let Some(description) = patch.description {
            list.description = description;
        }
        if let Some(is_public) = patch.is_public {
            list.is_public = is_public;
        }
        if let Some(change) = patch.collaborators {
            list.collaborators.extend(change.connect);
            for user in &change.disconnect {
                list.collaborators.remove(user);
            }
        }
        inner
            .list_with_tasks(id)
            .ok_or_else(|| GatewayError::NotFound(format!("task list {id}")))
    }

    async fn delete_task_list(&self, id: ListId) -> Result<(), GatewayError> {
        self.enter(GatewayOp::DeleteTaskList).await?;
        let mut inner = self.inner.lock();
        if inner.lists.remove(&id).is_none() {
            return Err(GatewayError::NotFound(format!("task list {id}")));
        }
        inner.tasks.retain(|_, t| t.task_list != id);
        Ok(())
    }

    async fn list_tasks(&self, query: TaskQuery) -> Result<Vec<Task>, GatewayError> {
        self.inner.lock().queries.push(query.clone());
        self.enter(GatewayOp::ListTasks).await?;
        if query.task_list.is_none() && query.assigned_to.is_none() {
            return Err(GatewayError::Validation(
                "taskList or assignedTo is required".to_string(),
            ));
        }
        let inner = self.inner.lock();
        Ok(inner
            .tasks
            .values()
            .filter(|t| query.task_list.is_none_or(|l| t.task_list == l))
            .filter(|t| query.status.is_none_or(|s| t.status == s))
            .filter(|t| query.assigned_to.is_none_or(|u| t.assigned_to == Some(u)))
            .cloned()
            .collect())
    }

    async fn get_task(&self, id: TaskId) -> Result<Task, GatewayError> {
        self.enter(GatewayOp::GetTask).await?;
        self.inner
            .lock()
            .tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("task {id}")))
    }

    async fn create_task(&self, draft: TaskDraft) -> Result<Task, GatewayError> {
        self.enter(GatewayOp::CreateTask).await?;
        draft
            .validate()
            .map_err(|e| GatewayError::Validation(e.to_string()))?;
        let mut inner = self.inner.lock();
        if !inner.lists.contains_key(&draft.task_list) {
            return Err(GatewayError::NotFound(format!(
                "task list {}",
                draft.task_list
            )));
        }
        let id = TaskId::new(inner.next_id());
        let task = Task {
            id,
            title: draft.title,
            description: draft.description,
            status: TaskStatus::Pending,
            estimated_minutes: draft.estimated_minutes,
            assigned_to: draft.assigned_to,
            due_date: draft.due_date,
            completed_at: None,
            task_list: draft.task_list,
        };
        inner.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<Task, GatewayError> {
        self.enter(GatewayOp::UpdateTask).await?;
        patch
            .validate()
            .map_err(|e| GatewayError::Validation(e.to_string()))?;
        let mut inner = self.inner.lock();
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or_else(|| GatewayError::NotFound(format!("task {id}")))?;
        if let Some(title) = patch.title {
            task.title = title;
        }
        if patch.description.is_some() {
            task.description = patch.description;
        }
        if let Some(minutes) = patch.estimated_minutes {
            task.estimated_minutes = minutes;
        }
        if patch.assigned_to.is_some() {
            task.assigned_to = patch.assigned_to;
        }
        if patch.due_date.is_some() {
            task.due_date = patch.due_date;
        }
        if let Some(status) = patch.status {
            task.apply_status(status, Utc::now());
        }
        Ok(task.clone())
    }

    async fn delete_task(&self, id: TaskId) -> Result<(), GatewayError> {
        self.enter(GatewayOp::DeleteTask).await?;
        match self.inner.lock().tasks.remove(&id) {
            Some(_) => Ok(()),
            None => Err(GatewayError::NotFound(format!("task {id}"))),
        }
    }
}

impl AuthProvider for LoopbackGateway {
    async fn login(&self, identifier: &str, password: &str) -> Result<AuthResponse, GatewayError> {
        self.enter(GatewayOp::Auth).await?;
        let mut inner = self.inner.lock();
        let user = inner
            .accounts
            .iter()
            .find(|a| {
                (a.user.username == identifier || a.user.email == identifier)
                    && a.password == password
            })
            .map(|a| a.user.clone())
            .ok_or_else(|| GatewayError::Validation("invalid identifier or password".into()))?;
        Ok(inner.session(user))
    }

    async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, GatewayError> {
        self.enter(GatewayOp::Auth).await?;
        let mut inner = self.inner.lock();
        let taken = inner
            .accounts
            .iter()
            .any(|a| a.user.username == request.username || a.user.email == request.email);
        if taken {
            return Err(GatewayError::Validation(
                "username or email already taken".into(),
            ));
        }
        let user = User {
            id: UserId::new(inner.next_id()),
            username: request.username,
            email: request.email,
        };
        inner.accounts.push(Account {
            user: user.clone(),
            password: request.password,
        });
        Ok(inner.session(user))
    }

    async fn forgot_password(&self, _email: &str) -> Result<(), GatewayError> {
        self.enter(GatewayOp::Auth).await
    }

    async fn reset_password(
        &self,
        request: ResetPasswordRequest,
    ) -> Result<AuthResponse, GatewayError> {
        self.enter(GatewayOp::Auth).await?;
        if request.password != request.password_confirmation {
            return Err(GatewayError::Validation("passwords do not match".into()));
        }
        // The reset code is the e-mail address of the account.
        let mut inner = self.inner.lock();
        let account = inner
            .accounts
            .iter_mut()
            .find(|a| a.user.email == request.code)
            .ok_or_else(|| GatewayError::Validation("incorrect code provided".into()))?;
        account.password = request.password;
        let user = account.user.clone();
        Ok(inner.session(user))
    }

    async fn current_user(&self) -> Result<User, GatewayError> {
        self.enter(GatewayOp::Auth).await?;
        let inner = self.inner.lock();
        let id = inner
            .signed_in
            .ok_or_else(|| GatewayError::Unauthorized("not signed in".into()))?;
        inner
            .accounts
            .iter()
            .find(|a| a.user.id == id)
            .map(|a| a.user.clone())
            .ok_or_else(|| GatewayError::Unauthorized("unknown user".into()))
    }
}
