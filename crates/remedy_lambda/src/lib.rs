//! AWS-oriented adapters and handlers for security-alert auto-remediation.
//!
//! This crate owns runtime integration details (the Lambda dispatch handler,
//! credential resolution, and the runbook implementations) and exposes a
//! single runtime module boundary over the alert contract and registries.

pub mod adapters;
pub mod handlers;
pub mod runbooks;
pub mod runtime;
