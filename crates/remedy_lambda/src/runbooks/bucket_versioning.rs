//! AWS-SSS-001: S3 object versioning not enabled.
//!
//! Versioning protects bucket contents against destructive overwrites.
//! Once enabled it can only be suspended, never removed, so the runbook
//! checks the current status and touches the bucket only when needed.

use serde_json::json;

use remedy_core::contract::NormalizedAlert;
use remedy_core::identity::InvocationIdentity;

use crate::adapters::credentials::ProviderSession;
use crate::adapters::sdk::{load_sdk_config, run_blocking};
use crate::runbooks::{log_runbook_error, log_runbook_info, Runbook};

const RUNBOOK_ID: &str = "AWS-SSS-001";
const ENABLED_STATUS: &str = "Enabled";

pub trait BucketVersioningApi {
    /// Current versioning status, `None` when the bucket has never had a
    /// versioning configuration.
    fn versioning_status(&self, bucket: &str) -> Result<Option<String>, String>;
    fn enable_versioning(&self, bucket: &str) -> Result<(), String>;
}

pub fn remediate(api: &impl BucketVersioningApi, alert: &NormalizedAlert) -> Result<(), String> {
    let bucket = alert.resource_id.as_str();

    let status = match api.versioning_status(bucket) {
        Ok(status) => status,
        Err(error) => {
            log_runbook_error(RUNBOOK_ID, "versioning_status_failed", json!({
                "bucket": bucket,
                "error": error,
            }));
            return Ok(());
        }
    };

    if status.as_deref() == Some(ENABLED_STATUS) {
        log_runbook_info(RUNBOOK_ID, "already_remediated", json!({ "bucket": bucket }));
        return Ok(());
    }

    match api.enable_versioning(bucket) {
        Ok(()) => {
            log_runbook_info(RUNBOOK_ID, "versioning_enabled", json!({ "bucket": bucket }));
        }
        Err(error) => {
            log_runbook_error(RUNBOOK_ID, "enable_versioning_failed", json!({
                "bucket": bucket,
                "error": error,
            }));
        }
    }

    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BucketVersioningRunbook;

impl Runbook for BucketVersioningRunbook {
    fn remediate(
        &self,
        session: &ProviderSession,
        alert: &NormalizedAlert,
        _invocation: &InvocationIdentity,
    ) -> Result<(), String> {
        let config = load_sdk_config(session);
        let api = AwsBucketVersioningApi {
            s3_client: aws_sdk_s3::Client::new(&config),
        };
        remediate(&api, alert)
    }
}

struct AwsBucketVersioningApi {
    s3_client: aws_sdk_s3::Client,
}

impl BucketVersioningApi for AwsBucketVersioningApi {
    fn versioning_status(&self, bucket: &str) -> Result<Option<String>, String> {
        let client = self.s3_client.clone();
        let bucket = bucket.to_string();

        run_blocking(async move {
            client
                .get_bucket_versioning()
                .bucket(bucket)
                .send()
                .await
                .map(|output| output.status().map(|status| status.as_str().to_string()))
                .map_err(|error| format!("failed to read bucket versioning: {error}"))
        })
    }

    fn enable_versioning(&self, bucket: &str) -> Result<(), String> {
        let client = self.s3_client.clone();
        let bucket = bucket.to_string();

        run_blocking(async move {
            client
                .put_bucket_versioning()
                .bucket(bucket)
                .versioning_configuration(
                    aws_sdk_s3::types::VersioningConfiguration::builder()
                        .status(aws_sdk_s3::types::BucketVersioningStatus::Enabled)
                        .build(),
                )
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to enable bucket versioning: {error}"))
        })
    }
}
