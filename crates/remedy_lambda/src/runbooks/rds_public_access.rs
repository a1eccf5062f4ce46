//! AWS-RDS-005: RDS database instance is publicly accessible.

use serde_json::json;

use remedy_core::contract::NormalizedAlert;
use remedy_core::identity::InvocationIdentity;

use crate::adapters::credentials::ProviderSession;
use crate::adapters::sdk::{load_sdk_config, run_blocking};
use crate::runbooks::{log_runbook_error, log_runbook_info, Runbook};

const RUNBOOK_ID: &str = "AWS-RDS-005";

pub trait RdsInstanceApi {
    /// Public-accessibility flag, `None` when the instance does not exist.
    fn publicly_accessible(&self, instance_id: &str) -> Result<Option<bool>, String>;
    fn disable_public_access(&self, instance_id: &str) -> Result<(), String>;
}

pub fn remediate(api: &impl RdsInstanceApi, alert: &NormalizedAlert) -> Result<(), String> {
    let instance_id = alert.resource_id.as_str();

    let public = match api.publicly_accessible(instance_id) {
        Ok(Some(public)) => public,
        Ok(None) => {
            log_runbook_error(RUNBOOK_ID, "instance_not_found", json!({
                "instance_id": instance_id,
            }));
            return Ok(());
        }
        Err(error) => {
            log_runbook_error(RUNBOOK_ID, "describe_instance_failed", json!({
                "instance_id": instance_id,
                "error": error,
            }));
            return Ok(());
        }
    };

    if !public {
        log_runbook_info(RUNBOOK_ID, "already_remediated", json!({
            "instance_id": instance_id,
        }));
        return Ok(());
    }

    match api.disable_public_access(instance_id) {
        Ok(()) => {
            log_runbook_info(RUNBOOK_ID, "public_access_disabled", json!({
                "instance_id": instance_id,
            }));
        }
        Err(error) => {
            log_runbook_error(RUNBOOK_ID, "modify_instance_failed", json!({
                "instance_id": instance_id,
                "error": error,
            }));
        }
    }

    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RdsPublicAccessRunbook;

impl Runbook for RdsPublicAccessRunbook {
    fn remediate(
        &self,
        session: &ProviderSession,
        alert: &NormalizedAlert,
        _invocation: &InvocationIdentity,
    ) -> Result<(), String> {
        let config = load_sdk_config(session);
        let api = AwsRdsInstanceApi {
            rds_client: aws_sdk_rds::Client::new(&config),
        };
        remediate(&api, alert)
    }
}

struct AwsRdsInstanceApi {
    rds_client: aws_sdk_rds::Client,
}

impl RdsInstanceApi for AwsRdsInstanceApi {
    fn publicly_accessible(&self, instance_id: &str) -> Result<Option<bool>, String> {
        let client = self.rds_client.clone();
        let instance_id = instance_id.to_string();

        run_blocking(async move {
            let output = client
                .describe_db_instances()
                .db_instance_identifier(instance_id)
                .send()
                .await
                .map_err(|error| format!("failed to describe db instance: {error}"))?;

            Ok(output
                .db_instances()
                .first()
                .map(|instance| instance.publicly_accessible().unwrap_or(false)))
        })
    }

    fn disable_public_access(&self, instance_id: &str) -> Result<(), String> {
        let client = self.rds_client.clone();
        let instance_id = instance_id.to_string();

        run_blocking(async move {
            client
                .modify_db_instance()
                .db_instance_identifier(instance_id)
                .publicly_accessible(false)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to modify db instance: {error}"))
        })
    }
}
