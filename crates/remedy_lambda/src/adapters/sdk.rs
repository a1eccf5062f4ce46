use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;

use crate::adapters::credentials::ProviderSession;

const CREDENTIALS_PROVIDER_NAME: &str = "cross_account_assume_role";

/// Runs one SDK future to completion from synchronous handler code.
/// Requires the multi-threaded runtime the Lambda binary starts with.
pub fn run_blocking<F, T>(future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

/// Builds the SDK configuration for one remediation session: the ambient
/// identity chain when the alert targets the invoker's own account, or the
/// assumed-role temporary credentials otherwise, scoped to the alert region
/// either way.
pub fn load_sdk_config(session: &ProviderSession) -> SdkConfig {
    let region = Region::new(session.region.clone());
    let credentials = session.credentials.clone();

    run_blocking(async move {
        let loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
        match credentials {
            Some(temporary) => {
                loader
                    .credentials_provider(Credentials::new(
                        temporary.access_key_id,
                        temporary.secret_access_key,
                        Some(temporary.session_token),
                        None,
                        CREDENTIALS_PROVIDER_NAME,
                    ))
                    .load()
                    .await
            }
            None => loader.load().await,
        }
    })
}
