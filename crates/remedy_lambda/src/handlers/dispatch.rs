//! Sequential dispatch of one batch of alert messages.
//!
//! Messages are processed strictly in order, each with its own normalized
//! alert, session, and runbook call. Test notifications are informational
//! and never fail a batch; every other failure aborts the remaining
//! messages so the queue redelivers them (retry lives upstream, not here).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use remedy_core::contract::{alert_fingerprint, parse_alert, NormalizedAlert, ParsedAlert};
use remedy_core::identity::InvocationIdentity;
use remedy_core::registry::PolicyRegistry;

use crate::adapters::credentials::{resolve_session, RoleAssumer};
use crate::runbooks::{Runbook, RunbookResolver};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Role assumed in the target account for cross-account alerts. Read
    /// once at startup; same-account dispatches work without it.
    pub cross_account_role_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchSummary {
    pub records_received: usize,
    pub remediations_invoked: usize,
    pub test_notifications: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchError {
    pub message: String,
}

impl DispatchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DispatchError {}

pub struct DispatchDependencies<'a> {
    pub policies: &'a PolicyRegistry,
    pub runbooks: &'a dyn RunbookResolver,
    pub role_assumer: &'a dyn RoleAssumer,
    pub config: &'a DispatchConfig,
    pub invocation: &'a InvocationIdentity,
}

/// Drives every message of the batch through parse, credential resolution,
/// and runbook invocation. Returns the summary on full success; the first
/// fatal condition aborts the batch with messages already completed left as
/// they are.
pub fn handle_alert_batch(
    bodies: &[String],
    deps: &DispatchDependencies<'_>,
) -> Result<DispatchSummary, DispatchError> {
    log_dispatch_info("batch_received", json!({ "records": bodies.len() }));

    let mut summary = DispatchSummary {
        records_received: bodies.len(),
        remediations_invoked: 0,
        test_notifications: 0,
    };

    for body in bodies {
        let fingerprint = alert_fingerprint(body);

        let alert = match parse_alert(body, deps.policies) {
            Ok(ParsedAlert::TestNotification) => {
                log_dispatch_info("test_notification", json!({
                    "message_fingerprint": fingerprint,
                }));
                summary.test_notifications += 1;
                continue;
            }
            Ok(ParsedAlert::Alert(alert)) => alert,
            Err(error) => {
                log_dispatch_error("alert_parse_failed", json!({
                    "message_fingerprint": fingerprint,
                    "error": error.message(),
                }));
                return Err(DispatchError::new(format!(
                    "Failed to parse alert message: {}",
                    error.message()
                )));
            }
        };

        dispatch_alert(&alert, &fingerprint, deps)?;
        summary.remediations_invoked += 1;
    }

    log_dispatch_info("batch_completed", json!({
        "records": summary.records_received,
        "remediations_invoked": summary.remediations_invoked,
        "test_notifications": summary.test_notifications,
    }));

    Ok(summary)
}

fn dispatch_alert(
    alert: &NormalizedAlert,
    fingerprint: &str,
    deps: &DispatchDependencies<'_>,
) -> Result<(), DispatchError> {
    let Some(runbook_id) = alert.runbook_id.as_deref() else {
        log_dispatch_error("runbook_unmapped", json!({
            "alert_id": alert.alert_id,
            "policy_id": alert.policy_id,
            "resource_id": alert.resource_id,
        }));
        return Err(DispatchError::new(format!(
            "No runbook mapped for policy {} (alert {})",
            alert.policy_id, alert.alert_id
        )));
    };

    let Some(runbook) = deps.runbooks.resolve(runbook_id) else {
        log_dispatch_error("runbook_unregistered", json!({
            "alert_id": alert.alert_id,
            "policy_id": alert.policy_id,
            "runbook_id": runbook_id,
        }));
        return Err(DispatchError::new(format!(
            "No runbook registered for {runbook_id} ({})",
            alert.policy_id
        )));
    };

    let session = resolve_session(
        &alert.account.account_number,
        &deps.invocation.account_id,
        &alert.region,
        deps.config.cross_account_role_name.as_deref(),
        deps.role_assumer,
    )
    .map_err(|error| {
        log_dispatch_error("credential_resolution_failed", json!({
            "alert_id": alert.alert_id,
            "account_number": alert.account.account_number,
            "error": error,
        }));
        DispatchError::new(error)
    })?;

    log_dispatch_info("remediation_started", json!({
        "alert_id": alert.alert_id,
        "runbook_id": runbook_id,
        "resource_id": alert.resource_id,
        "region": alert.region,
        "account_name": alert.account.name,
        "account_number": alert.account.account_number,
        "cross_account": session.is_cross_account(),
        "message_fingerprint": fingerprint,
    }));

    runbook
        .remediate(&session, alert, deps.invocation)
        .map_err(|error| {
            log_dispatch_error("remediation_failed", json!({
                "alert_id": alert.alert_id,
                "runbook_id": runbook_id,
                "resource_id": alert.resource_id,
                "error": error,
            }));
            DispatchError::new(format!(
                "Runbook {runbook_id} failed for alert {}: {error}",
                alert.alert_id
            ))
        })?;

    log_dispatch_info("remediation_completed", json!({
        "alert_id": alert.alert_id,
        "runbook_id": runbook_id,
        "resource_id": alert.resource_id,
    }));

    Ok(())
}

fn log_dispatch_info(event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "dispatch",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}

fn log_dispatch_error(event: &str, details: Value) {
    eprintln!(
        "{}",
        json!({
            "component": "dispatch",
            "level": "error",
            "event": event,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "details": details,
        })
    );
}
