//! Shared wire types and ordering rules for the Kanban board.

pub mod ids;
pub mod ordering;
pub mod project;
pub mod task;
pub mod user;
pub mod validation;
