//! AWS-EC2-039: security group allows unrestricted inbound traffic.
//!
//! Revokes ingress rules open to the world, matching the posture policy's
//! definition: a global CIDR combined with either the all-protocols marker
//! or the full TCP/UDP port range. Narrower world-open rules are covered by
//! other policies and left untouched here.

use serde_json::json;

use remedy_core::contract::NormalizedAlert;
use remedy_core::identity::InvocationIdentity;

use crate::adapters::credentials::ProviderSession;
use crate::adapters::sdk::{load_sdk_config, run_blocking};
use crate::runbooks::{log_runbook_error, log_runbook_info, Runbook};

const RUNBOOK_ID: &str = "AWS-EC2-039";
const ALL_PROTOCOLS: &str = "-1";
const FULL_RANGE_START: i32 = 0;
const FULL_RANGE_END: i32 = 65535;

pub const GLOBAL_CIDRS: [&str; 2] = ["0.0.0.0/0", "::/0"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    pub ip_protocol: String,
    pub from_port: Option<i32>,
    pub to_port: Option<i32>,
    pub ipv4_ranges: Vec<String>,
    pub ipv6_ranges: Vec<String>,
}

/// One revocation, scoped to a single offending range so a partial failure
/// leaves the remaining rules untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeRule {
    pub ip_protocol: String,
    pub from_port: Option<i32>,
    pub to_port: Option<i32>,
    pub cidr_v4: Option<String>,
    pub cidr_v6: Option<String>,
}

pub trait SecurityGroupApi {
    /// Ingress rules of the group, `None` when the group does not exist.
    fn ingress_rules(&self, group_id: &str) -> Result<Option<Vec<IngressRule>>, String>;
    fn revoke_ingress(&self, group_id: &str, rule: &RevokeRule) -> Result<(), String>;
}

/// Plans the revocations for a rule set. A rule qualifies when it carries a
/// global CIDR and is either protocol-agnostic or spans the full port range.
pub fn offending_revocations(rules: &[IngressRule]) -> Vec<RevokeRule> {
    let mut revocations = Vec::new();

    for rule in rules {
        let qualifies = rule.ip_protocol == ALL_PROTOCOLS
            || (rule.from_port == Some(FULL_RANGE_START) && rule.to_port == Some(FULL_RANGE_END));
        if !qualifies {
            continue;
        }

        // The all-protocols marker carries no port range on the wire.
        let (from_port, to_port) = if rule.ip_protocol == ALL_PROTOCOLS {
            (None, None)
        } else {
            (rule.from_port, rule.to_port)
        };

        for cidr in &rule.ipv4_ranges {
            if GLOBAL_CIDRS.contains(&cidr.as_str()) {
                revocations.push(RevokeRule {
                    ip_protocol: rule.ip_protocol.clone(),
                    from_port,
                    to_port,
                    cidr_v4: Some(cidr.clone()),
                    cidr_v6: None,
                });
            }
        }

        for cidr in &rule.ipv6_ranges {
            if GLOBAL_CIDRS.contains(&cidr.as_str()) {
                revocations.push(RevokeRule {
                    ip_protocol: rule.ip_protocol.clone(),
                    from_port,
                    to_port,
                    cidr_v4: None,
                    cidr_v6: Some(cidr.clone()),
                });
            }
        }
    }

    revocations
}

pub fn remediate(api: &impl SecurityGroupApi, alert: &NormalizedAlert) -> Result<(), String> {
    let group_id = alert.resource_id.as_str();

    let rules = match api.ingress_rules(group_id) {
        Ok(Some(rules)) => rules,
        Ok(None) => {
            log_runbook_error(RUNBOOK_ID, "group_not_found", json!({ "group_id": group_id }));
            return Ok(());
        }
        Err(error) => {
            log_runbook_error(RUNBOOK_ID, "describe_group_failed", json!({
                "group_id": group_id,
                "error": error,
            }));
            return Ok(());
        }
    };

    let revocations = offending_revocations(&rules);
    if revocations.is_empty() {
        log_runbook_info(RUNBOOK_ID, "already_remediated", json!({ "group_id": group_id }));
        return Ok(());
    }

    for revocation in &revocations {
        match api.revoke_ingress(group_id, revocation) {
            Ok(()) => {
                log_runbook_info(RUNBOOK_ID, "ingress_revoked", json!({
                    "group_id": group_id,
                    "ip_protocol": revocation.ip_protocol,
                    "cidr": revocation.cidr_v4.as_deref().or(revocation.cidr_v6.as_deref()),
                }));
            }
            Err(error) => {
                log_runbook_error(RUNBOOK_ID, "revoke_ingress_failed", json!({
                    "group_id": group_id,
                    "ip_protocol": revocation.ip_protocol,
                    "error": error,
                }));
            }
        }
    }

    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SecurityGroupIngressRunbook;

impl Runbook for SecurityGroupIngressRunbook {
    fn remediate(
        &self,
        session: &ProviderSession,
        alert: &NormalizedAlert,
        _invocation: &InvocationIdentity,
    ) -> Result<(), String> {
        let config = load_sdk_config(session);
        let api = AwsSecurityGroupApi {
            ec2_client: aws_sdk_ec2::Client::new(&config),
        };
        remediate(&api, alert)
    }
}

struct AwsSecurityGroupApi {
    ec2_client: aws_sdk_ec2::Client,
}

impl SecurityGroupApi for AwsSecurityGroupApi {
    fn ingress_rules(&self, group_id: &str) -> Result<Option<Vec<IngressRule>>, String> {
        let client = self.ec2_client.clone();
        let group_id = group_id.to_string();

        run_blocking(async move {
            let output = client
                .describe_security_groups()
                .group_ids(group_id)
                .send()
                .await
                .map_err(|error| format!("failed to describe security group: {error}"))?;

            let Some(group) = output.security_groups().first() else {
                return Ok(None);
            };

            let rules = group
                .ip_permissions()
                .iter()
                .map(|permission| IngressRule {
                    ip_protocol: permission.ip_protocol().unwrap_or_default().to_string(),
                    from_port: permission.from_port(),
                    to_port: permission.to_port(),
                    ipv4_ranges: permission
                        .ip_ranges()
                        .iter()
                        .filter_map(|range| range.cidr_ip().map(str::to_string))
                        .collect(),
                    ipv6_ranges: permission
                        .ipv6_ranges()
                        .iter()
                        .filter_map(|range| range.cidr_ipv6().map(str::to_string))
                        .collect(),
                })
                .collect();

            Ok(Some(rules))
        })
    }

    fn revoke_ingress(&self, group_id: &str, rule: &RevokeRule) -> Result<(), String> {
        let client = self.ec2_client.clone();
        let group_id = group_id.to_string();
        let rule = rule.clone();

        run_blocking(async move {
            let mut permission = aws_sdk_ec2::types::IpPermission::builder()
                .ip_protocol(rule.ip_protocol.clone())
                .set_from_port(rule.from_port)
                .set_to_port(rule.to_port);
            if let Some(cidr) = rule.cidr_v4 {
                permission = permission
                    .ip_ranges(aws_sdk_ec2::types::IpRange::builder().cidr_ip(cidr).build());
            }
            if let Some(cidr) = rule.cidr_v6 {
                permission = permission.ipv6_ranges(
                    aws_sdk_ec2::types::Ipv6Range::builder().cidr_ipv6(cidr).build(),
                );
            }

            client
                .revoke_security_group_ingress()
                .group_id(group_id)
                .ip_permissions(permission.build())
                .send()
                .await
                .map(|_| ())
                .map_err(|error| format!("failed to revoke ingress rule: {error}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::Value;

    use remedy_core::contract::AccountRef;

    use super::*;

    struct RecordingApi {
        rules: Result<Option<Vec<IngressRule>>, String>,
        revocations: Mutex<Vec<RevokeRule>>,
    }

    impl RecordingApi {
        fn with_rules(rules: Result<Option<Vec<IngressRule>>, String>) -> Self {
            Self {
                rules,
                revocations: Mutex::new(Vec::new()),
            }
        }

        fn revocations(&self) -> Vec<RevokeRule> {
            self.revocations.lock().expect("poisoned mutex").clone()
        }
    }

    impl SecurityGroupApi for RecordingApi {
        fn ingress_rules(&self, _group_id: &str) -> Result<Option<Vec<IngressRule>>, String> {
            self.rules.clone()
        }

        fn revoke_ingress(&self, _group_id: &str, rule: &RevokeRule) -> Result<(), String> {
            self.revocations
                .lock()
                .expect("poisoned mutex")
                .push(rule.clone());
            Ok(())
        }
    }

    fn sample_alert() -> NormalizedAlert {
        NormalizedAlert {
            alert_id: "A-7".to_string(),
            policy_id: "566686e8-0581-4df5-ae22-5a901ed37b58".to_string(),
            region: "us-east-1".to_string(),
            resource_id: "sg-0123456789abcdef0".to_string(),
            account: AccountRef {
                name: "acct".to_string(),
                account_number: "111111111111".to_string(),
            },
            runbook_id: Some("AWS-EC2-039".to_string()),
            metadata: Value::Null,
        }
    }

    fn world_open_all_protocols() -> IngressRule {
        IngressRule {
            ip_protocol: "-1".to_string(),
            from_port: None,
            to_port: None,
            ipv4_ranges: vec!["0.0.0.0/0".to_string()],
            ipv6_ranges: vec!["::/0".to_string()],
        }
    }

    #[test]
    fn revokes_global_ranges_for_all_protocol_rule() {
        let api = RecordingApi::with_rules(Ok(Some(vec![world_open_all_protocols()])));
        remediate(&api, &sample_alert()).expect("runbook should succeed");

        let revocations = api.revocations();
        assert_eq!(revocations.len(), 2);
        assert_eq!(revocations[0].cidr_v4.as_deref(), Some("0.0.0.0/0"));
        assert_eq!(revocations[0].from_port, None);
        assert_eq!(revocations[1].cidr_v6.as_deref(), Some("::/0"));
    }

    #[test]
    fn revokes_full_port_range_rule_with_ports() {
        let rule = IngressRule {
            ip_protocol: "tcp".to_string(),
            from_port: Some(0),
            to_port: Some(65535),
            ipv4_ranges: vec!["0.0.0.0/0".to_string()],
            ipv6_ranges: Vec::new(),
        };
        let api = RecordingApi::with_rules(Ok(Some(vec![rule])));
        remediate(&api, &sample_alert()).expect("runbook should succeed");

        let revocations = api.revocations();
        assert_eq!(revocations.len(), 1);
        assert_eq!(revocations[0].from_port, Some(0));
        assert_eq!(revocations[0].to_port, Some(65535));
    }

    #[test]
    fn leaves_scoped_rules_untouched() {
        let narrow_world_open = IngressRule {
            ip_protocol: "tcp".to_string(),
            from_port: Some(443),
            to_port: Some(443),
            ipv4_ranges: vec!["0.0.0.0/0".to_string()],
            ipv6_ranges: Vec::new(),
        };
        let internal_full_range = IngressRule {
            ip_protocol: "tcp".to_string(),
            from_port: Some(0),
            to_port: Some(65535),
            ipv4_ranges: vec!["10.0.0.0/8".to_string()],
            ipv6_ranges: Vec::new(),
        };
        let api = RecordingApi::with_rules(Ok(Some(vec![narrow_world_open, internal_full_range])));
        remediate(&api, &sample_alert()).expect("runbook should succeed");
        assert!(api.revocations().is_empty());
    }

    #[test]
    fn second_run_issues_no_mutating_call() {
        let remediated = IngressRule {
            ip_protocol: "tcp".to_string(),
            from_port: Some(22),
            to_port: Some(22),
            ipv4_ranges: vec!["10.1.0.0/16".to_string()],
            ipv6_ranges: Vec::new(),
        };
        let api = RecordingApi::with_rules(Ok(Some(vec![remediated])));
        remediate(&api, &sample_alert()).expect("runbook should succeed");
        assert!(api.revocations().is_empty());
    }

    #[test]
    fn missing_group_is_absorbed_without_mutation() {
        let api = RecordingApi::with_rules(Ok(None));
        remediate(&api, &sample_alert()).expect("missing group should not escalate");
        assert!(api.revocations().is_empty());
    }
}
