//! AWS-KMS-001: customer master key rotation disabled.

use serde_json::json;

use remedy_core::contract::NormalizedAlert;
use remedy_core::identity::InvocationIdentity;

use crate::adapters::credentials::ProviderSession;
use crate::adapters::sdk::{load_sdk_config, run_blocking};
use crate::runbooks::{log_runbook_error, log_runbook_info, Runbook};

const RUNBOOK_ID: &str = "AWS-KMS-001";

pub trait KeyRotationApi {
    fn rotation_enabled(&self, key_id: &str) -> Result<bool, String>;
    fn enable_rotation(&self, key_id: &str) -> Result<(), String>;
}

pub fn remediate(api: &impl KeyRotationApi, alert: &NormalizedAlert) -> Result<(), String> {
    let key_id = alert.resource_id.as_str();

    let enabled = match api.rotation_enabled(key_id) {
        Ok(enabled) => enabled,
        Err(error) => {
            log_runbook_error(RUNBOOK_ID, "rotation_status_failed", json!({
                "key_id": key_id,
                "error": error,
            }));
            return Ok(());
        }
    };

    if enabled {
        log_runbook_info(RUNBOOK_ID, "already_remediated", json!({ "key_id": key_id }));
        return Ok(());
    }

    match api.enable_rotation(key_id) {
        Ok(()) => {
            log_runbook_info(RUNBOOK_ID, "rotation_enabled", json!({ "key_id": key_id }));
        }
        Err(error) => {
            log_runbook_error(RUNBOOK_ID, "enable_rotation_failed", json!({
                "key_id": key_id,
                "error": error,
            }));
        }
    }

    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct KeyRotationRunbook;

impl Runbook for KeyRotationRunbook {
    fn remediate(
        &self,
        session: &ProviderSession,
        alert: &NormalizedAlert,
        _invocation: &InvocationIdentity,
    ) -> Result<(), String> {
        let config = load_sdk_config(session);
        let api = AwsKeyRotationApi {
            kms_client: aws_sdk_kms::Client::new(&config),
        };
        remediate(&api, alert)
    }
}

struct AwsKeyRotationApi {
    kms_client: aws_sdk_kms::Client,
}

impl KeyRotationApi for AwsKeyRotationApi {
    fn rotation_enabled(&self, key_id: &str) -> Result<bool, String> {
        let client = self.kms_client.clone();
        let key_id = key_id.to_string();

        run_blocking(async move {
            client
                .get_key_rotation_status()
                .key_id(key_id)
                .send()
                .await
                .map(|output| output.key_rotation_enabled())
                .map_err(|error| format!("failed to read key rotation status: {error}"))
        })
    }

    fn enable_rotation(&self, key_id: &str) -> Result<(), String> {
        let client = self.kms_client.clone();
        let key_id = key_id.to_string();

        run_blocking(async move {
            client
                .enable_key_rotation()
                .key_id(key_id)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to enable key rotation: {error}"))
        })
    }
}
