//! Remediation runbooks and their registration table.
//!
//! Each runbook module keeps its provider calls behind a narrow API trait so
//! the remediation sequence is testable against recording mocks; the live
//! AWS implementation lives at the bottom of the same module. Runbooks log
//! and absorb the provider errors they anticipate (missing resource, access
//! denied); an `Err` return is reserved for conditions the runbook does not
//! understand and is fatal for the message being dispatched.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use remedy_core::contract::NormalizedAlert;
use remedy_core::identity::InvocationIdentity;

use crate::adapters::credentials::ProviderSession;

pub mod bucket_versioning;
pub mod caller_identity_probe;
pub mod key_rotation;
pub mod rds_public_access;
pub mod security_group_ingress;
pub mod trail_encryption;

pub trait Runbook: Sync {
    fn remediate(
        &self,
        session: &ProviderSession,
        alert: &NormalizedAlert,
        invocation: &InvocationIdentity,
    ) -> Result<(), String>;
}

/// Lookup seam between the dispatcher and the registered runbooks.
pub trait RunbookResolver {
    fn resolve(&self, runbook_id: &str) -> Option<&dyn Runbook>;
}

static TRAIL_ENCRYPTION: trail_encryption::TrailEncryptionRunbook =
    trail_encryption::TrailEncryptionRunbook;
static BUCKET_VERSIONING: bucket_versioning::BucketVersioningRunbook =
    bucket_versioning::BucketVersioningRunbook;
static KEY_ROTATION: key_rotation::KeyRotationRunbook = key_rotation::KeyRotationRunbook;
static SECURITY_GROUP_INGRESS: security_group_ingress::SecurityGroupIngressRunbook =
    security_group_ingress::SecurityGroupIngressRunbook;
static RDS_PUBLIC_ACCESS: rds_public_access::RdsPublicAccessRunbook =
    rds_public_access::RdsPublicAccessRunbook;
static CALLER_IDENTITY_PROBE: caller_identity_probe::CallerIdentityProbeRunbook =
    caller_identity_probe::CallerIdentityProbeRunbook;

/// Static registration table from runbook id to implementation, built once
/// at process start. Registration here replaces any runtime string-to-code
/// resolution: an id the policy table knows but this table does not is a
/// dispatch failure naming both identifiers.
pub struct RunbookRegistry {
    entries: BTreeMap<&'static str, &'static dyn Runbook>,
}

impl RunbookRegistry {
    pub fn builtin() -> Self {
        let mut entries: BTreeMap<&'static str, &'static dyn Runbook> = BTreeMap::new();
        entries.insert("AWS-CLT-002", &TRAIL_ENCRYPTION);
        entries.insert("AWS-SSS-001", &BUCKET_VERSIONING);
        entries.insert("AWS-KMS-001", &KEY_ROTATION);
        entries.insert("AWS-EC2-039", &SECURITY_GROUP_INGRESS);
        entries.insert("AWS-RDS-005", &RDS_PUBLIC_ACCESS);
        entries.insert("AWS-TEST-001", &CALLER_IDENTITY_PROBE);
        Self { entries }
    }

    pub fn runbook_ids(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }
}

impl RunbookResolver for RunbookRegistry {
    fn resolve(&self, runbook_id: &str) -> Option<&dyn Runbook> {
        self.entries.get(runbook_id).copied()
    }
}

pub(crate) fn log_runbook_info(runbook: &str, event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "runbook",
            "runbook": runbook,
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

pub(crate) fn log_runbook_error(runbook: &str, event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "runbook",
            "runbook": runbook,
            "level": "error",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_resolves_every_registered_id() {
        let registry = RunbookRegistry::builtin();
        for runbook_id in registry.runbook_ids() {
            assert!(
                registry.resolve(runbook_id).is_some(),
                "expected runbook registered for {runbook_id}"
            );
        }
    }

    #[test]
    fn unknown_runbook_id_resolves_to_none() {
        let registry = RunbookRegistry::builtin();
        assert!(registry.resolve("AWS-ELB-009").is_none());
    }

    #[test]
    fn connectivity_probe_is_registered() {
        let registry = RunbookRegistry::builtin();
        assert!(registry.resolve("AWS-TEST-001").is_some());
    }
}
