//! `tasksync`: offline-aware task list client.
//!
//! The sync core ([`sync`]) decides whether data comes from the backend or
//! from the local cache ([`cache`]), driven by reachability from
//! [`connectivity`] and projected into [`state`]. Writes go through
//! [`actions`], credentials through [`auth`], and the backend is reached via
//! the [`gateway`] traits.

pub mod actions;
pub mod auth;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod gateway;
pub mod state;
pub mod sync;
