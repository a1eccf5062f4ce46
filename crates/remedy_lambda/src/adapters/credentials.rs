use remedy_core::identity::cross_account_role_arn;

/// Session name recorded on every cross-account role assumption.
pub const REMEDIATION_SESSION_NAME: &str = "SecurityAutoRemediation";

/// Temporary credentials returned by a cross-account role assumption.
/// They live for the duration of a single dispatch and are never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: String,
}

/// Region-scoped handle a runbook issues provider calls through.
/// `credentials == None` means the invoker's ambient identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    pub region: String,
    pub credentials: Option<TemporaryCredentials>,
}

impl ProviderSession {
    pub fn ambient(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(region: impl Into<String>, credentials: TemporaryCredentials) -> Self {
        Self {
            region: region.into(),
            credentials: Some(credentials),
        }
    }

    pub fn is_cross_account(&self) -> bool {
        self.credentials.is_some()
    }
}

pub trait RoleAssumer {
    fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<TemporaryCredentials, String>;
}

/// Resolves the session a remediation runs under.
///
/// Same-account alerts use the invoker's ambient identity without any
/// network call. Cross-account alerts require the configured role name and
/// perform exactly one role assumption; there is no fallback credential
/// source, so any failure here is final for the message.
pub fn resolve_session(
    target_account: &str,
    invoker_account: &str,
    region: &str,
    cross_account_role_name: Option<&str>,
    assumer: &dyn RoleAssumer,
) -> Result<ProviderSession, String> {
    if target_account == invoker_account {
        return Ok(ProviderSession::ambient(region));
    }

    let role_name = match cross_account_role_name {
        Some(value) if !value.trim().is_empty() => value.trim(),
        _ => {
            return Err(
                "CROSS_ACCOUNT_ROLE_NAME must be configured to remediate resources in other accounts"
                    .to_string(),
            )
        }
    };

    let role_arn = cross_account_role_arn(target_account, role_name);
    let credentials = assumer
        .assume_role(&role_arn, REMEDIATION_SESSION_NAME)
        .map_err(|error| format!("Failed to assume role {role_arn}: {error}"))?;

    Ok(ProviderSession::with_credentials(region, credentials))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct CapturingAssumer {
        requests: Mutex<Vec<(String, String)>>,
        response: Result<TemporaryCredentials, String>,
    }

    impl CapturingAssumer {
        fn returning(response: Result<TemporaryCredentials, String>) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                response,
            }
        }

        fn requests(&self) -> Vec<(String, String)> {
            self.requests.lock().expect("poisoned mutex").clone()
        }
    }

    impl RoleAssumer for CapturingAssumer {
        fn assume_role(
            &self,
            role_arn: &str,
            session_name: &str,
        ) -> Result<TemporaryCredentials, String> {
            self.requests
                .lock()
                .expect("poisoned mutex")
                .push((role_arn.to_string(), session_name.to_string()));
            self.response.clone()
        }
    }

    fn sample_credentials() -> TemporaryCredentials {
        TemporaryCredentials {
            access_key_id: "AKIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expiration: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn same_account_uses_ambient_identity_without_assuming() {
        let assumer = CapturingAssumer::returning(Ok(sample_credentials()));
        let session = resolve_session(
            "111111111111",
            "111111111111",
            "us-east-1",
            Some("remediation-target-role"),
            &assumer,
        )
        .expect("same-account session should resolve");

        assert!(!session.is_cross_account());
        assert_eq!(session.region, "us-east-1");
        assert!(assumer.requests().is_empty());
    }

    #[test]
    fn cross_account_assumes_exactly_once_with_fixed_arn() {
        let assumer = CapturingAssumer::returning(Ok(sample_credentials()));
        let session = resolve_session(
            "210987654321",
            "111111111111",
            "eu-west-1",
            Some("remediation-target-role"),
            &assumer,
        )
        .expect("cross-account session should resolve");

        assert!(session.is_cross_account());
        assert_eq!(
            assumer.requests(),
            vec![(
                "arn:aws:iam::210987654321:role/remediation-target-role".to_string(),
                REMEDIATION_SESSION_NAME.to_string(),
            )]
        );
    }

    #[test]
    fn missing_role_name_fails_before_any_exchange() {
        let assumer = CapturingAssumer::returning(Ok(sample_credentials()));
        let error = resolve_session("210987654321", "111111111111", "us-east-1", None, &assumer)
            .expect_err("missing configuration should fail");

        assert!(error.contains("CROSS_ACCOUNT_ROLE_NAME"));
        assert!(assumer.requests().is_empty());
    }

    #[test]
    fn blank_role_name_is_treated_as_unset() {
        let assumer = CapturingAssumer::returning(Ok(sample_credentials()));
        let error = resolve_session(
            "210987654321",
            "111111111111",
            "us-east-1",
            Some("  "),
            &assumer,
        )
        .expect_err("blank configuration should fail");

        assert!(error.contains("CROSS_ACCOUNT_ROLE_NAME"));
        assert!(assumer.requests().is_empty());
    }

    #[test]
    fn assume_failure_is_returned_as_error_result() {
        let assumer = CapturingAssumer::returning(Err("AccessDenied".to_string()));
        let error = resolve_session(
            "210987654321",
            "111111111111",
            "us-east-1",
            Some("remediation-target-role"),
            &assumer,
        )
        .expect_err("assume failure should surface");

        assert!(error.contains("Failed to assume role"));
        assert!(error.contains("AccessDenied"));
        assert_eq!(assumer.requests().len(), 1);
    }
}
