//! Kanban client library.
//!
//! A typed HTTP client for the board server, a local board that applies
//! moves optimistically and reconciles with the server, and the layered
//! configuration of the `kanban` CLI.

pub mod board;
pub mod client;
pub mod config;
