//! Core domain types
//!
//! These types represent the fundamental business entities and are shared
//! between the store (for persistence), the project workers (for execution),
//! and the HTTP layer (for snapshots).

pub mod project;
pub mod registry;
pub mod state;
pub mod task;
