//! `tasksync` reference backend library.
//!
//! An in-memory implementation of the REST surface the client consumes,
//! with the same ownership and collaborator rules. Exposed as a library so
//! integration tests can start it in-process.

pub mod api;
pub mod config;
pub mod error;
pub mod store;
