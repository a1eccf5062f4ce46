//! Shared auto-remediation domain primitives.
//!
//! This crate owns the inbound alert contract, the policy-to-runbook
//! registry, and invoker identity parsing. It intentionally excludes AWS SDK
//! and Lambda runtime concerns.

pub mod contract;
pub mod identity;
pub mod registry;
