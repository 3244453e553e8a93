//! In-memory accounts, sessions, lists and tasks with row-level access rules.
//!
//! - A list is visible to its owner and its collaborators; only the owner may
//!   change or delete it.
//! - A task is visible to, and may be changed by, anyone who can see its list.
//! - Deleting a list deletes its tasks.
//!
//! Passwords are kept as salted SHA-256 digests. Bearer tokens and reset
//! codes are random hex strings.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use tasksync_proto::api::{TaskDraft, TaskListDraft, TaskListPatch, TaskPatch, TaskQuery};
use tasksync_proto::auth::{AuthResponse, LoginRequest, RegisterRequest, ResetPasswordRequest};
use tasksync_proto::{ListId, Task, TaskId, TaskList, TaskStatus, User, UserId};

use crate::error::ApiError;

/// Minimum password length accepted at registration and reset.
pub const MIN_PASSWORD_LENGTH: usize = 6;

struct Account {
    user: User,
    salt: [u8; 16],
    digest: String,
}

impl Account {
    fn verify(&self, password: &str) -> bool {
        digest(&self.salt, password) == self.digest
    }

    fn set_password(&mut self, password: &str) {
        self.salt = random_bytes();
        self.digest = digest(&self.salt, password);
    }
}

fn digest(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes[..]);
    bytes
}

fn random_token() -> String {
    hex::encode(random_bytes::<32>())
}

#[derive(Default)]
struct Db {
    accounts: Vec<Account>,
    sessions: HashMap<String, UserId>,
    reset_codes: HashMap<String, UserId>,
    lists: BTreeMap<ListId, TaskList>,
    tasks: BTreeMap<TaskId, Task>,
    next_id: u64,
}

impl Db {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn issue_session(&mut self, user: User) -> AuthResponse {
        let jwt = random_token();
        self.sessions.insert(jwt.clone(), user.id);
        AuthResponse { jwt, user }
    }

    fn visible_list(&self, user: UserId, id: ListId) -> Result<&TaskList, ApiError> {
        let list = self
            .lists
            .get(&id)
            .ok_or_else(|| ApiError::NotFound(format!("task list {id} not found")))?;
        if list.can_access(user) {
            Ok(list)
        } else {
            Err(ApiError::Forbidden(
                "you do not have access to this task list".into(),
            ))
        }
    }

    fn owned_list(&mut self, user: UserId, id: ListId) -> Result<&mut TaskList, ApiError> {
        let list = self
            .lists
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("task list {id} not found")))?;
        if list.is_owner(user) {
            Ok(list)
        } else {
            Err(ApiError::Forbidden(
                "only the owner can change this task list".into(),
            ))
        }
    }

    fn visible_task(&self, user: UserId, id: TaskId) -> Result<&Task, ApiError> {
        let task = self
            .tasks
            .get(&id)
            .ok_or_else(|| ApiError::NotFound(format!("task {id} not found")))?;
        self.visible_list(user, task.task_list)
            .map_err(|e| match e {
                ApiError::Forbidden(_) => {
                    ApiError::Forbidden("you do not have access to this task".into())
                }
                other => other,
            })?;
        Ok(task)
    }

    fn populated(&self, list: &TaskList) -> TaskList {
        let mut list = list.clone();
        list.tasks = self
            .tasks
            .values()
            .filter(|t| t.task_list == list.id)
            .cloned()
            .collect();
        list
    }
}

/// The backend's data, shared by every request handler.
#[derive(Default)]
pub struct TaskStore {
    db: RwLock<Db>,
}

impl TaskStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- accounts --

    /// Create an account and open a session for it.
    ///
    /// # Errors
    ///
    /// `BadRequest` for blank or taken names, malformed e-mail or short password.
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, ApiError> {
        if req.username.trim().is_empty() {
            return Err(ApiError::BadRequest("username is required".into()));
        }
        if !req.email.contains('@') {
            return Err(ApiError::BadRequest("email is invalid".into()));
        }
        if req.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ApiError::BadRequest(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        let mut db = self.db.write().await;
        let taken = db.accounts.iter().any(|a| {
            a.user.username == req.username || a.user.email.eq_ignore_ascii_case(&req.email)
        });
        if taken {
            return Err(ApiError::BadRequest(
                "email or username are already taken".into(),
            ));
        }

        let user = User {
            id: UserId::new(db.next_id()),
            username: req.username,
            email: req.email,
        };
        let salt = random_bytes();
        db.accounts.push(Account {
            user: user.clone(),
            salt,
            digest: digest(&salt, &req.password),
        });
        tracing::info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(db.issue_session(user))
    }

    /// Open a session for a username or e-mail and password.
    ///
    /// # Errors
    ///
    /// `BadRequest` if the identifier is unknown or the password is wrong.
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, ApiError> {
        let mut db = self.db.write().await;
        let user = db
            .accounts
            .iter()
            .find(|a| {
                a.user.username == req.identifier
                    || a.user.email.eq_ignore_ascii_case(&req.identifier)
            })
            .filter(|a| a.verify(&req.password))
            .map(|a| a.user.clone())
            .ok_or_else(|| ApiError::BadRequest("invalid identifier or password".into()))?;
        tracing::debug!(user_id = %user.id, "login");
        Ok(db.issue_session(user))
    }

    /// The user a bearer token belongs to.
    ///
    /// # Errors
    ///
    /// `Unauthorized` if the token is unknown.
    pub async fn authenticate(&self, token: &str) -> Result<User, ApiError> {
        let db = self.db.read().await;
        let id = db
            .sessions
            .get(token)
            .copied()
            .ok_or_else(|| ApiError::Unauthorized("invalid credentials".into()))?;
        db.accounts
            .iter()
            .find(|a| a.user.id == id)
            .map(|a| a.user.clone())
            .ok_or_else(|| ApiError::Unauthorized("invalid credentials".into()))
    }

    /// Issue a reset code for `email` if it has an account.
    ///
    /// The code is logged, never returned. Unknown addresses are not reported.
    pub async fn forgot_password(&self, email: &str) {
        let mut db = self.db.write().await;
        let Some(id) = db
            .accounts
            .iter()
            .find(|a| a.user.email.eq_ignore_ascii_case(email))
            .map(|a| a.user.id)
        else {
            tracing::debug!("password reset requested for unknown address");
            return;
        };
        let code = random_token();
        tracing::info!(user_id = %id, %code, "password reset code issued");
        db.reset_codes.insert(code, id);
    }

    /// Set a new password with a reset code and open a session.
    ///
    /// # Errors
    ///
    /// `BadRequest` if the passwords differ, the password is too short, or the
    /// code is unknown.
    pub async fn reset_password(&self, req: ResetPasswordRequest) -> Result<AuthResponse, ApiError> {
        if req.password != req.password_confirmation {
            return Err(ApiError::BadRequest("passwords do not match".into()));
        }
        if req.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(ApiError::BadRequest(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        let mut db = self.db.write().await;
        let id = db
            .reset_codes
            .remove(&req.code)
            .ok_or_else(|| ApiError::BadRequest("incorrect code provided".into()))?;
        let account = db
            .accounts
            .iter_mut()
            .find(|a| a.user.id == id)
            .ok_or_else(|| ApiError::BadRequest("incorrect code provided".into()))?;
        account.set_password(&req.password);
        let user = account.user.clone();
        // Existing sessions die with the old password.
        db.sessions.retain(|_, owner| *owner != id);
        tracing::info!(user_id = %id, "password reset");
        Ok(db.issue_session(user))
    }

    /// Reset code most recently issued for `email`, for tests and local use.
    pub async fn reset_code_for(&self, email: &str) -> Option<String> {
        let db = self.db.read().await;
        let id = db
            .accounts
            .iter()
            .find(|a| a.user.email.eq_ignore_ascii_case(email))?
            .user
            .id;
        db.reset_codes
            .iter()
            .find(|(_, owner)| **owner == id)
            .map(|(code, _)| code.clone())
    }

    /// Invalidate every session (forces 401 on the next request).
    pub async fn revoke_all_sessions(&self) {
        self.db.write().await.sessions.clear();
    }

    // -- lists --

    /// Lists `user` owns or collaborates on, with their tasks.
    pub async fn lists_for(&self, user: UserId) -> Vec<TaskList> {
        let db = self.db.read().await;
        db.lists
            .values()
            .filter(|l| l.can_access(user))
            .map(|l| db.populated(l))
            .collect()
    }

    /// One visible list, with its tasks.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Forbidden`.
    pub async fn get_list(&self, user: UserId, id: ListId) -> Result<TaskList, ApiError> {
        let db = self.db.read().await;
        let list = db.visible_list(user, id)?;
        Ok(db.populated(list))
    }

    /// Create a list owned by `user`.
    ///
    /// # Errors
    ///
    /// `BadRequest` for an invalid title.
    pub async fn create_list(&self, user: UserId, draft: TaskListDraft) -> Result<TaskList, ApiError> {
        draft.validate()?;
        let mut db = self.db.write().await;
        let id = ListId::new(db.next_id());
        let list = TaskList {
            id,
            title: draft.title,
            description: draft.description,
            is_public: draft.is_public,
            owner: user,
            collaborators: BTreeSet::new(),
            tasks: Vec::new(),
        };
        db.lists.insert(id, list.clone());
        tracing::info!(list_id = %id, owner = %user, "task list created");
        Ok(list)
    }

    /// Change a list owned by `user`.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Forbidden` for non-owners, `BadRequest` for an invalid
    /// title or unknown collaborator.
    pub async fn update_list(
        &self,
        user: UserId,
        id: ListId,
        patch: TaskListPatch,
    ) -> Result<TaskList, ApiError> {
        patch.validate()?;
        let mut db = self.db.write().await;
        if let Some(change) = &patch.collaborators {
            let unknown = change
                .connect
                .iter()
                .find(|c| !db.accounts.iter().any(|a| a.user.id == **c));
            if let Some(c) = unknown {
                return Err(ApiError::BadRequest(format!("user {c} does not exist")));
            }
        }

        let list = db.owned_list(user, id)?;
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
            list.collaborators
                .extend(change.connect.into_iter().filter(|c| *c != user));
            for c in &change.disconnect {
                list.collaborators.remove(c);
            }
        }
        let list = list.clone();
        tracing::debug!(list_id = %id, "task list updated");
        Ok(db.populated(&list))
    }

    /// Delete a list owned by `user` and every task in it.
    ///
    /// # Errors
    ///
    /// `NotFound`, or `Forbidden` for non-owners.
    pub async fn delete_list(&self, user: UserId, id: ListId) -> Result<TaskList, ApiError> {
        let mut db = self.db.write().await;
        db.owned_list(user, id)?;
        let list = db
            .lists
            .remove(&id)
            .ok_or_else(|| ApiError::NotFound(format!("task list {id} not found")))?;
        let before = db.tasks.len();
        db.tasks.retain(|_, t| t.task_list != id);
        tracing::info!(list_id = %id, tasks = before - db.tasks.len(), "task list deleted");
        Ok(list)
    }

    // -- tasks --

    /// Tasks matching `query` that `user` may see.
    ///
    /// # Errors
    ///
    /// `BadRequest` without `taskList` or `assignedTo`; `NotFound` or
    /// `Forbidden` for an inaccessible `taskList`.
    pub async fn list_tasks(&self, user: UserId, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        let db = self.db.read().await;
        if let Some(list) = query.task_list {
            db.visible_list(user, list)?;
        } else if query.assigned_to.is_none() {
            return Err(ApiError::BadRequest(
                "taskList or assignedTo query parameter is required".into(),
            ));
        }
        Ok(db
            .tasks
            .values()
            .filter(|t| query.task_list.is_none_or(|l| t.task_list == l))
            .filter(|t| query.status.is_none_or(|s| t.status == s))
            .filter(|t| query.assigned_to.is_none_or(|u| t.assigned_to == Some(u)))
            .filter(|t| db.lists.get(&t.task_list).is_some_and(|l| l.can_access(user)))
            .cloned()
            .collect())
    }

    /// One visible task.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Forbidden`.
    pub async fn get_task(&self, user: UserId, id: TaskId) -> Result<Task, ApiError> {
        let db = self.db.read().await;
        db.visible_task(user, id).cloned()
    }

    /// Create a task in a list `user` can access. New tasks start `pending`.
    ///
    /// # Errors
    ///
    /// `BadRequest`, `NotFound` or `Forbidden`.
    pub async fn create_task(&self, user: UserId, draft: TaskDraft) -> Result<Task, ApiError> {
        draft.validate()?;
        let mut db = self.db.write().await;
        db.visible_list(user, draft.task_list)?;
        let id = TaskId::new(db.next_id());
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
        db.tasks.insert(id, task.clone());
        tracing::info!(task_id = %id, list_id = %task.task_list, "task created");
        Ok(task)
    }

    /// Change a visible task; the completion time follows the status.
    ///
    /// # Errors
    ///
    /// `BadRequest`, `NotFound` or `Forbidden`.
    pub async fn update_task(
        &self,
        user: UserId,
        id: TaskId,
        patch: TaskPatch,
    ) -> Result<Task, ApiError> {
        patch.validate()?;
        let mut db = self.db.write().await;
        db.visible_task(user, id)?;
        let task = db
            .tasks
            .get_mut(&id)
            .ok_or_else(|| ApiError::NotFound(format!("task {id} not found")))?;
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
        tracing::debug!(task_id = %id, status = %task.status, "task updated");
        Ok(task.clone())
    }

    /// Delete a visible task.
    ///
    /// # Errors
    ///
    /// `NotFound` or `Forbidden`.
    pub async fn delete_task(&self, user: UserId, id: TaskId) -> Result<Task, ApiError> {
        let mut db = self.db.write().await;
        db.visible_task(user, id)?;
        db.tasks
            .remove(&id)
            .ok_or_else(|| ApiError::NotFound(format!("task {id} not found")))
    }
}
