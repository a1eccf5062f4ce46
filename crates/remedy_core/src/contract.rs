use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::registry::PolicyRegistry;

/// Alert id the posture-management source sends for connectivity checks.
pub const TEST_NOTIFICATION_ALERT_ID: &str = "P-0";

/// Region literal used for resources without a regional home (IAM, S3 ACLs).
pub const GLOBAL_REGION: &str = "global";

/// Region substituted whenever an alert arrives with the global sentinel.
pub const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountRef {
    pub name: String,
    pub account_number: String,
}

/// Validated form of one inbound alert. Constructed once per message and
/// immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedAlert {
    pub alert_id: String,
    pub policy_id: String,
    pub region: String,
    pub resource_id: String,
    pub account: AccountRef,
    /// `None` when the policy id has no registry mapping. The parser treats
    /// that as a representable outcome; the dispatcher decides it is fatal.
    pub runbook_id: Option<String>,
    /// Opaque resource detail blob, interpreted only by the invoked runbook.
    pub metadata: Value,
}

/// Outcome of parsing one raw message body. Test notifications share the
/// wire shape of real alerts but must never reach credential resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAlert {
    TestNotification,
    Alert(NormalizedAlert),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAlertMessage {
    alert_id: String,
    policy_id: String,
    resource_region_id: String,
    resource_id: String,
    account_name: String,
    account_id: String,
    resource: Value,
}

/// Decodes one raw queue message body into a [`ParsedAlert`].
///
/// The test-notification check runs before full field extraction because
/// those messages carry only the alert id. Region canonicalization and the
/// policy lookup both happen here so the dispatcher only ever sees
/// normalized alerts.
pub fn parse_alert(raw: &str, registry: &PolicyRegistry) -> Result<ParsedAlert, ParseError> {
    let document: Value = serde_json::from_str(raw)
        .map_err(|error| ParseError::new(format!("Malformed alert message: {error}")))?;

    let alert_id = document
        .get("alertId")
        .and_then(Value::as_str)
        .ok_or_else(|| ParseError::new("Alert message is missing required key 'alertId'"))?;

    if alert_id == TEST_NOTIFICATION_ALERT_ID {
        return Ok(ParsedAlert::TestNotification);
    }

    let message: RawAlertMessage = serde_json::from_value(document)
        .map_err(|error| ParseError::new(format!("Incomplete alert message: {error}")))?;

    let region = canonicalize_region(&message.resource_region_id)
        .ok_or_else(|| ParseError::new("Alert field 'resourceRegionId' cannot be empty"))?;

    let runbook_id = registry.resolve(&message.policy_id).map(str::to_string);

    Ok(ParsedAlert::Alert(NormalizedAlert {
        alert_id: message.alert_id,
        policy_id: message.policy_id,
        region,
        resource_id: message.resource_id,
        account: AccountRef {
            name: message.account_name,
            account_number: message.account_id,
        },
        runbook_id,
        metadata: message.resource,
    }))
}

fn canonicalize_region(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed == GLOBAL_REGION {
        return Some(DEFAULT_REGION.to_string());
    }
    Some(trimmed.to_string())
}

/// Stable identifier for one raw message body, used to correlate audit log
/// lines without echoing untrusted payloads into every log event.
pub fn alert_fingerprint(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}
