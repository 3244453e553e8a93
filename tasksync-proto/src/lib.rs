//! Shared data model and JSON wire types for `tasksync`.
//!
//! Everything the client and the reference backend exchange over HTTP is
//! defined here so that both sides agree on field names and shapes.

pub mod api;
pub mod auth;
pub mod model;

pub use model::{ListId, Task, TaskId, TaskList, TaskStatus, User, UserId};
