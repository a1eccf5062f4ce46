/// Partition for role ARNs built by the credential resolver.
pub const AWS_PARTITION: &str = "aws";

/// Identity of the function invocation currently being served. The account
/// id is the only field the dispatcher consults; the full ARN is kept for
/// audit logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationIdentity {
    pub invoked_function_arn: String,
    pub account_id: String,
}

impl InvocationIdentity {
    /// Derives the invoker's own account number from the invoked-function
    /// ARN (`arn:aws:lambda:<region>:<account>:function:<name>`).
    pub fn from_invoked_function_arn(arn: &str) -> Option<Self> {
        let account_id = account_id_from_arn(arn)?;
        Some(Self {
            invoked_function_arn: arn.to_string(),
            account_id: account_id.to_string(),
        })
    }
}

/// Extracts the account-number field of an ARN, the fifth colon-separated
/// segment. Returns `None` for ARNs without one (for example S3 bucket
/// ARNs, where the segment is empty).
pub fn account_id_from_arn(arn: &str) -> Option<&str> {
    let field = arn.split(':').nth(4)?;
    if field.is_empty() {
        None
    } else {
        Some(field)
    }
}

/// Formats the fixed cross-account role ARN used for credential exchange.
pub fn cross_account_role_arn(account_number: &str, role_name: &str) -> String {
    format!("arn:{AWS_PARTITION}:iam::{account_number}:role/{role_name}")
}
