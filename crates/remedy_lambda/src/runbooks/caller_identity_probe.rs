//! AWS-TEST-001: end-to-end connectivity probe.
//!
//! Paired with the all-ones policy id so operators can exercise the full
//! dispatch and credential path without touching any resource. The identity
//! call is the one runbook step that escalates on failure, because a failing
//! probe means the pipeline itself is broken.

use serde_json::json;

use remedy_core::contract::NormalizedAlert;
use remedy_core::identity::InvocationIdentity;

use crate::adapters::credentials::ProviderSession;
use crate::adapters::sdk::{load_sdk_config, run_blocking};
use crate::runbooks::{log_runbook_info, Runbook};

const RUNBOOK_ID: &str = "AWS-TEST-001";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub account: Option<String>,
    pub arn: Option<String>,
    pub user_id: Option<String>,
}

pub trait CallerIdentityApi {
    fn caller_identity(&self) -> Result<CallerIdentity, String>;
}

pub fn remediate(
    api: &impl CallerIdentityApi,
    alert: &NormalizedAlert,
    invocation: &InvocationIdentity,
) -> Result<(), String> {
    log_runbook_info(RUNBOOK_ID, "probe_started", json!({
        "alert_id": alert.alert_id,
        "invoked_function_arn": invocation.invoked_function_arn,
    }));

    let identity = api
        .caller_identity()
        .map_err(|error| format!("connectivity probe failed: {error}"))?;

    log_runbook_info(RUNBOOK_ID, "probe_identity", json!({
        "account": identity.account,
        "arn": identity.arn,
        "user_id": identity.user_id,
    }));

    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CallerIdentityProbeRunbook;

impl Runbook for CallerIdentityProbeRunbook {
    fn remediate(
        &self,
        session: &ProviderSession,
        alert: &NormalizedAlert,
        invocation: &InvocationIdentity,
    ) -> Result<(), String> {
        let config = load_sdk_config(session);
        let api = AwsCallerIdentityApi {
            sts_client: aws_sdk_sts::Client::new(&config),
        };
        remediate(&api, alert, invocation)
    }
}

struct AwsCallerIdentityApi {
    sts_client: aws_sdk_sts::Client,
}

impl CallerIdentityApi for AwsCallerIdentityApi {
    fn caller_identity(&self) -> Result<CallerIdentity, String> {
        let client = self.sts_client.clone();

        run_blocking(async move {
            client
                .get_caller_identity()
                .send()
                .await
                .map(|output| CallerIdentity {
                    account: output.account().map(str::to_string),
                    arn: output.arn().map(str::to_string),
                    user_id: output.user_id().map(str::to_string),
                })
                .map_err(|error| format!("failed to read caller identity: {error}"))
        })
    }
}
