//! RACS Core
//!
//! Core types for the RACS continuous-build service.
//!
//! This crate contains:
//! - The pipeline state ladder and its numeric contract
//! - Project, task, and registry records shared between the store,
//!   the workers, and the HTTP layer

pub mod domain;
