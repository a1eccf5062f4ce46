//! AWS-CLT-002: CloudTrail log files are not encrypted with SSE-KMS.
//!
//! Multi-region trails surface one alert per region; only the trail's home
//! region performs the remediation so a single key is created. The customer
//! managed key lands in the region of the trail's S3 logging bucket, which
//! is not necessarily the alert region.

use serde_json::{json, Value};

use remedy_core::contract::NormalizedAlert;
use remedy_core::identity::{account_id_from_arn, InvocationIdentity};

use crate::adapters::credentials::ProviderSession;
use crate::adapters::sdk::{load_sdk_config, run_blocking};
use crate::runbooks::{log_runbook_error, log_runbook_info, Runbook};

const RUNBOOK_ID: &str = "AWS-CLT-002";
const KEY_DESCRIPTION: &str = "CMK for CloudTrail Logs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailDescription {
    pub trail_arn: String,
    pub home_region: String,
    pub kms_key_id: Option<String>,
    pub s3_bucket_name: Option<String>,
}

pub trait TrailEncryptionApi {
    /// Trail details, `None` when no trail matches the name.
    fn describe_trail(&self, trail_name: &str) -> Result<Option<TrailDescription>, String>;
    /// Raw S3 location constraint, `None` for the legacy us-east-1 form.
    fn bucket_location(&self, bucket: &str) -> Result<Option<String>, String>;
    /// Creates the customer managed key, returning its ARN.
    fn create_key(&self, key_region: &str, policy_document: &str) -> Result<String, String>;
    fn create_alias(&self, key_region: &str, alias_name: &str, key_arn: &str)
        -> Result<(), String>;
    fn update_trail_key(&self, trail_name: &str, key_arn: &str) -> Result<(), String>;
}

/// Maps the S3 location-constraint quirks onto a usable region name: the
/// constraint is absent for us-east-1 and reported as `EU` for eu-west-1.
pub fn normalize_bucket_region(constraint: Option<&str>) -> String {
    match constraint {
        None | Some("") => "us-east-1".to_string(),
        Some("EU") => "eu-west-1".to_string(),
        Some(region) => region.to_string(),
    }
}

pub fn trail_key_alias(trail_name: &str) -> String {
    format!("alias/{trail_name}-cloudtrail-key")
}

/// Key policy granting CloudTrail encrypt rights while keeping decryption
/// restricted to principals of the owning account.
pub fn trail_key_policy(account_id: &str) -> Value {
    let trail_arn_pattern = format!("arn:aws:cloudtrail:*:{account_id}:trail/*");
    json!({
        "Version": "2012-10-17",
        "Id": "Key policy created by CloudTrail",
        "Statement": [
            {
                "Sid": "Enable IAM User Permissions",
                "Effect": "Allow",
                "Principal": { "AWS": [format!("arn:aws:iam::{account_id}:root")] },
                "Action": "kms:*",
                "Resource": "*"
            },
            {
                "Sid": "Allow CloudTrail to encrypt logs",
                "Effect": "Allow",
                "Principal": { "Service": "cloudtrail.amazonaws.com" },
                "Action": "kms:GenerateDataKey*",
                "Resource": "*",
                "Condition": {
                    "StringLike": {
                        "kms:EncryptionContext:aws:cloudtrail:arn": trail_arn_pattern.clone()
                    }
                }
            },
            {
                "Sid": "Allow CloudTrail to describe key",
                "Effect": "Allow",
                "Principal": { "Service": "cloudtrail.amazonaws.com" },
                "Action": "kms:DescribeKey",
                "Resource": "*"
            },
            {
                "Sid": "Allow principals in the account to decrypt log files",
                "Effect": "Allow",
                "Principal": { "AWS": "*" },
                "Action": ["kms:Decrypt", "kms:ReEncryptFrom"],
                "Resource": "*",
                "Condition": {
                    "StringEquals": { "kms:CallerAccount": account_id },
                    "StringLike": {
                        "kms:EncryptionContext:aws:cloudtrail:arn": trail_arn_pattern
                    }
                }
            }
        ]
    })
}

pub fn remediate(api: &impl TrailEncryptionApi, alert: &NormalizedAlert) -> Result<(), String> {
    let trail_name = alert.resource_id.as_str();

    let trail = match api.describe_trail(trail_name) {
        Ok(Some(trail)) => trail,
        Ok(None) => {
            log_runbook_error(RUNBOOK_ID, "trail_not_found", json!({ "trail": trail_name }));
            return Ok(());
        }
        Err(error) => {
            log_runbook_error(RUNBOOK_ID, "describe_trail_failed", json!({
                "trail": trail_name,
                "error": error,
            }));
            return Ok(());
        }
    };

    // Shadow copies of a multi-region trail are remediated from home only.
    if trail.home_region != alert.region {
        log_runbook_info(RUNBOOK_ID, "skipped_shadow_trail", json!({
            "trail": trail_name,
            "home_region": trail.home_region,
            "alert_region": alert.region,
        }));
        return Ok(());
    }

    if trail.kms_key_id.is_some() {
        log_runbook_info(RUNBOOK_ID, "already_remediated", json!({ "trail": trail_name }));
        return Ok(());
    }

    let Some(account_id) = account_id_from_arn(&trail.trail_arn).map(str::to_string) else {
        log_runbook_error(RUNBOOK_ID, "trail_arn_unparseable", json!({
            "trail": trail_name,
            "trail_arn": trail.trail_arn,
        }));
        return Ok(());
    };

    let Some(bucket) = trail.s3_bucket_name.as_deref() else {
        log_runbook_error(RUNBOOK_ID, "logging_bucket_missing", json!({ "trail": trail_name }));
        return Ok(());
    };

    let constraint = match api.bucket_location(bucket) {
        Ok(constraint) => constraint,
        Err(error) => {
            log_runbook_error(RUNBOOK_ID, "bucket_location_failed", json!({
                "trail": trail_name,
                "bucket": bucket,
                "error": error,
            }));
            return Ok(());
        }
    };
    let key_region = normalize_bucket_region(constraint.as_deref());

    let policy_document = trail_key_policy(&account_id).to_string();
    let key_arn = match api.create_key(&key_region, &policy_document) {
        Ok(key_arn) => key_arn,
        Err(error) => {
            log_runbook_error(RUNBOOK_ID, "create_key_failed", json!({
                "trail": trail_name,
                "key_region": key_region,
                "error": error,
            }));
            return Ok(());
        }
    };

    // Alias creation is best-effort; the trail update below still proceeds.
    let alias_name = trail_key_alias(trail_name);
    if let Err(error) = api.create_alias(&key_region, &alias_name, &key_arn) {
        log_runbook_error(RUNBOOK_ID, "create_alias_failed", json!({
            "trail": trail_name,
            "alias": alias_name,
            "error": error,
        }));
    }

    match api.update_trail_key(trail_name, &key_arn) {
        Ok(()) => {
            log_runbook_info(RUNBOOK_ID, "trail_encrypted", json!({
                "trail": trail_name,
                "key_arn": key_arn,
            }));
        }
        Err(error) => {
            log_runbook_error(RUNBOOK_ID, "update_trail_failed", json!({
                "trail": trail_name,
                "key_arn": key_arn,
                "error": error,
            }));
        }
    }

    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TrailEncryptionRunbook;

impl Runbook for TrailEncryptionRunbook {
    fn remediate(
        &self,
        session: &ProviderSession,
        alert: &NormalizedAlert,
        _invocation: &InvocationIdentity,
    ) -> Result<(), String> {
        let config = load_sdk_config(session);
        let api = AwsTrailEncryptionApi {
            cloudtrail_client: aws_sdk_cloudtrail::Client::new(&config),
            s3_client: aws_sdk_s3::Client::new(&config),
            sdk_config: config,
        };
        remediate(&api, alert)
    }
}

struct AwsTrailEncryptionApi {
    cloudtrail_client: aws_sdk_cloudtrail::Client,
    s3_client: aws_sdk_s3::Client,
    sdk_config: aws_config::SdkConfig,
}

impl AwsTrailEncryptionApi {
    /// The key lives in the logging bucket's region, so the KMS client is
    /// built per call rather than once per session.
    fn kms_client_for(&self, key_region: &str) -> aws_sdk_kms::Client {
        let config = aws_sdk_kms::config::Builder::from(&self.sdk_config)
            .region(aws_config::Region::new(key_region.to_string()))
            .build();
        aws_sdk_kms::Client::from_conf(config)
    }
}

impl TrailEncryptionApi for AwsTrailEncryptionApi {
    fn describe_trail(&self, trail_name: &str) -> Result<Option<TrailDescription>, String> {
        let client = self.cloudtrail_client.clone();
        let trail_name = trail_name.to_string();

        run_blocking(async move {
            let output = client
                .describe_trails()
                .trail_name_list(trail_name)
                .include_shadow_trails(false)
                .send()
                .await
                .map_err(|error| format!("failed to describe trail: {error}"))?;

            let Some(trail) = output.trail_list().first() else {
                return Ok(None);
            };

            let trail_arn = trail
                .trail_arn()
                .ok_or_else(|| "trail description is missing its ARN".to_string())?
                .to_string();
            let home_region = trail
                .home_region()
                .ok_or_else(|| "trail description is missing its home region".to_string())?
                .to_string();

            Ok(Some(TrailDescription {
                trail_arn,
                home_region,
                kms_key_id: trail.kms_key_id().map(str::to_string),
                s3_bucket_name: trail.s3_bucket_name().map(str::to_string),
            }))
        })
    }

    fn bucket_location(&self, bucket: &str) -> Result<Option<String>, String> {
        let client = self.s3_client.clone();
        let bucket = bucket.to_string();

        run_blocking(async move {
            client
                .get_bucket_location()
                .bucket(bucket)
                .send()
                .await
                .map(|output| {
                    output
                        .location_constraint()
                        .map(|constraint| constraint.as_str().to_string())
                })
                .map_err(|error| format!("failed to read bucket location: {error}"))
        })
    }

    fn create_key(&self, key_region: &str, policy_document: &str) -> Result<String, String> {
        let client = self.kms_client_for(key_region);
        let policy_document = policy_document.to_string();

        run_blocking(async move {
            let output = client
                .create_key()
                .description(KEY_DESCRIPTION)
                .key_usage(aws_sdk_kms::types::KeyUsageType::EncryptDecrypt)
                .origin(aws_sdk_kms::types::OriginType::AwsKms)
                .bypass_policy_lockout_safety_check(true)
                .policy(policy_document)
                .send()
                .await
                .map_err(|error| format!("failed to create customer managed key: {error}"))?;

            output
                .key_metadata()
                .and_then(|metadata| metadata.arn())
                .map(str::to_string)
                .ok_or_else(|| "create-key response is missing the key ARN".to_string())
        })
    }

    fn create_alias(
        &self,
        key_region: &str,
        alias_name: &str,
        key_arn: &str,
    ) -> Result<(), String> {
        let client = self.kms_client_for(key_region);
        let alias_name = alias_name.to_string();
        let key_arn = key_arn.to_string();

        run_blocking(async move {
            client
                .create_alias()
                .alias_name(alias_name)
                .target_key_id(key_arn)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to create key alias: {error}"))
        })
    }

    fn update_trail_key(&self, trail_name: &str, key_arn: &str) -> Result<(), String> {
        let client = self.cloudtrail_client.clone();
        let trail_name = trail_name.to_string();
        let key_arn = key_arn.to_string();

        run_blocking(async move {
            client
                .update_trail()
                .name(trail_name)
                .kms_key_id(key_arn)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to update trail: {error}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use remedy_core::contract::AccountRef;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum ApiCall {
        CreateKey { key_region: String },
        CreateAlias { key_region: String, alias_name: String, key_arn: String },
        UpdateTrail { trail_name: String, key_arn: String },
    }

    struct RecordingApi {
        trail: Result<Option<TrailDescription>, String>,
        location: Result<Option<String>, String>,
        create_key_response: Result<String, String>,
        alias_response: Result<(), String>,
        calls: Mutex<Vec<ApiCall>>,
    }

    impl RecordingApi {
        fn new(trail: Result<Option<TrailDescription>, String>) -> Self {
            Self {
                trail,
                location: Ok(Some("eu-central-1".to_string())),
                create_key_response: Ok("arn:aws:kms:eu-central-1:111111111111:key/k-1".to_string()),
                alias_response: Ok(()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<ApiCall> {
            self.calls.lock().expect("poisoned mutex").clone()
        }
    }

    impl TrailEncryptionApi for RecordingApi {
        fn describe_trail(&self, _trail_name: &str) -> Result<Option<TrailDescription>, String> {
            self.trail.clone()
        }

        fn bucket_location(&self, _bucket: &str) -> Result<Option<String>, String> {
            self.location.clone()
        }

        fn create_key(&self, key_region: &str, policy_document: &str) -> Result<String, String> {
            let parsed: serde_json::Value = serde_json::from_str(policy_document)
                .expect("key policy should be valid json");
            assert_eq!(parsed["Version"], "2012-10-17");
            self.calls.lock().expect("poisoned mutex").push(ApiCall::CreateKey {
                key_region: key_region.to_string(),
            });
            self.create_key_response.clone()
        }

        fn create_alias(
            &self,
            key_region: &str,
            alias_name: &str,
            key_arn: &str,
        ) -> Result<(), String> {
            self.calls.lock().expect("poisoned mutex").push(ApiCall::CreateAlias {
                key_region: key_region.to_string(),
                alias_name: alias_name.to_string(),
                key_arn: key_arn.to_string(),
            });
            self.alias_response.clone()
        }

        fn update_trail_key(&self, trail_name: &str, key_arn: &str) -> Result<(), String> {
            self.calls.lock().expect("poisoned mutex").push(ApiCall::UpdateTrail {
                trail_name: trail_name.to_string(),
                key_arn: key_arn.to_string(),
            });
            Ok(())
        }
    }

    fn unencrypted_trail() -> TrailDescription {
        TrailDescription {
            trail_arn: "arn:aws:cloudtrail:us-east-1:111111111111:trail/trail-1".to_string(),
            home_region: "us-east-1".to_string(),
            kms_key_id: None,
            s3_bucket_name: Some("trail-logs".to_string()),
        }
    }

    fn sample_alert() -> NormalizedAlert {
        NormalizedAlert {
            alert_id: "A-2".to_string(),
            policy_id: "c2b84f89-7ec8-473e-a6af-404feeeb96c5".to_string(),
            region: "us-east-1".to_string(),
            resource_id: "trail-1".to_string(),
            account: AccountRef {
                name: "acct".to_string(),
                account_number: "111111111111".to_string(),
            },
            runbook_id: Some("AWS-CLT-002".to_string()),
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn encrypts_trail_with_key_in_bucket_region() {
        let api = RecordingApi::new(Ok(Some(unencrypted_trail())));
        remediate(&api, &sample_alert()).expect("runbook should succeed");

        let calls = api.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0],
            ApiCall::CreateKey {
                key_region: "eu-central-1".to_string()
            }
        );
        assert_eq!(
            calls[1],
            ApiCall::CreateAlias {
                key_region: "eu-central-1".to_string(),
                alias_name: "alias/trail-1-cloudtrail-key".to_string(),
                key_arn: "arn:aws:kms:eu-central-1:111111111111:key/k-1".to_string(),
            }
        );
        assert_eq!(
            calls[2],
            ApiCall::UpdateTrail {
                trail_name: "trail-1".to_string(),
                key_arn: "arn:aws:kms:eu-central-1:111111111111:key/k-1".to_string(),
            }
        );
    }

    #[test]
    fn second_run_issues_no_mutating_call() {
        let mut trail = unencrypted_trail();
        trail.kms_key_id = Some("arn:aws:kms:us-east-1:111111111111:key/k-1".to_string());
        let api = RecordingApi::new(Ok(Some(trail)));
        remediate(&api, &sample_alert()).expect("runbook should succeed");
        assert!(api.calls().is_empty());
    }

    #[test]
    fn shadow_trail_region_is_skipped() {
        let mut trail = unencrypted_trail();
        trail.home_region = "eu-west-1".to_string();
        let api = RecordingApi::new(Ok(Some(trail)));
        remediate(&api, &sample_alert()).expect("runbook should succeed");
        assert!(api.calls().is_empty());
    }

    #[test]
    fn missing_trail_is_absorbed_without_mutation() {
        let api = RecordingApi::new(Ok(None));
        remediate(&api, &sample_alert()).expect("missing trail should not escalate");
        assert!(api.calls().is_empty());
    }

    #[test]
    fn alias_failure_still_updates_the_trail() {
        let mut api = RecordingApi::new(Ok(Some(unencrypted_trail())));
        api.alias_response = Err("AlreadyExistsException".to_string());
        remediate(&api, &sample_alert()).expect("runbook should succeed");

        assert!(api
            .calls()
            .iter()
            .any(|call| matches!(call, ApiCall::UpdateTrail { .. })));
    }

    #[test]
    fn create_key_failure_leaves_trail_untouched() {
        let mut api = RecordingApi::new(Ok(Some(unencrypted_trail())));
        api.create_key_response = Err("AccessDenied".to_string());
        remediate(&api, &sample_alert()).expect("anticipated provider error should not escalate");

        assert!(!api
            .calls()
            .iter()
            .any(|call| matches!(call, ApiCall::UpdateTrail { .. })));
    }

    #[test]
    fn normalizes_legacy_bucket_locations() {
        assert_eq!(normalize_bucket_region(None), "us-east-1");
        assert_eq!(normalize_bucket_region(Some("")), "us-east-1");
        assert_eq!(normalize_bucket_region(Some("EU")), "eu-west-1");
        assert_eq!(normalize_bucket_region(Some("ap-south-1")), "ap-south-1");
    }

    #[test]
    fn key_policy_scopes_decryption_to_owning_account() {
        let policy = trail_key_policy("111111111111");
        let statements = policy["Statement"]
            .as_array()
            .expect("policy should carry statements");
        assert_eq!(statements.len(), 4);
        assert_eq!(
            statements[3]["Condition"]["StringEquals"]["kms:CallerAccount"],
            "111111111111"
        );
    }
}
