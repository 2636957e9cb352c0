//! Service Module
//!
//! Business logic layer for the server: the per-project workers, the action
//! table and executor they drive, the event bus, and the project/registry
//! operations behind the HTTP handlers.

pub mod action;
pub mod events;
pub mod executor;
pub mod projects;
pub mod prune;
pub mod registry;
pub mod worker;

// Re-export for convenience
pub use projects as projects_service;
pub use registry as registry_service;
