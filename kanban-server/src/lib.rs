//! Kanban board server library.
//!
//! Exposes the ordering engine, the identity provider, the project service,
//! and the HTTP router for use in tests and embedding. The engine keeps every
//! `(project, status)` column numbered `0..n` across concurrent writers by
//! running each operation inside one SQLite write transaction.

pub mod api;
pub mod auth;
pub mod board;
pub mod config;
pub mod error;
pub mod projects;
pub mod store;
