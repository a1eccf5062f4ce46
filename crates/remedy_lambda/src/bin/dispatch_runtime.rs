use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::Value;

use remedy_lambda::adapters::credentials::{RoleAssumer, TemporaryCredentials};
use remedy_lambda::handlers::dispatch::{
    handle_alert_batch, DispatchConfig, DispatchDependencies,
};
use remedy_lambda::runbooks::RunbookRegistry;
use remedy_lambda::runtime::identity::InvocationIdentity;
use remedy_lambda::runtime::registry::PolicyRegistry;

struct StsRoleAssumer {
    sts_client: aws_sdk_sts::Client,
}

impl RoleAssumer for StsRoleAssumer {
    fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<TemporaryCredentials, String> {
        let client = self.sts_client.clone();
        let role_arn = role_arn.to_string();
        let session_name = session_name.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let response = client
                    .assume_role()
                    .role_arn(role_arn)
                    .role_session_name(session_name)
                    .send()
                    .await
                    .map_err(|error| format!("assume-role call failed: {error}"))?;

                let credentials = response
                    .credentials()
                    .ok_or_else(|| "assume-role response is missing credentials".to_string())?;

                Ok(TemporaryCredentials {
                    access_key_id: credentials.access_key_id().to_string(),
                    secret_access_key: credentials.secret_access_key().to_string(),
                    session_token: credentials.session_token().to_string(),
                    expiration: credentials.expiration().to_string(),
                })
            })
        })
    }
}

async fn handle_request(event: LambdaEvent<Value>) -> Result<Value, Error> {
    if !is_sqs_event(&event.payload) {
        return Err(Error::from("expected an SQS event with Records"));
    }
    let bodies = decode_sqs_bodies(&event.payload)?;

    let invocation =
        InvocationIdentity::from_invoked_function_arn(&event.context.invoked_function_arn)
            .ok_or_else(|| {
                Error::from(format!(
                    "cannot extract account id from invoked function arn: {}",
                    event.context.invoked_function_arn
                ))
            })?;

    let config = DispatchConfig {
        cross_account_role_name: std::env::var("CROSS_ACCOUNT_ROLE_NAME").ok(),
    };

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let role_assumer = StsRoleAssumer {
        sts_client: aws_sdk_sts::Client::new(&aws_config),
    };
    let policies = PolicyRegistry::builtin();
    let runbooks = RunbookRegistry::builtin();

    let summary = handle_alert_batch(
        &bodies,
        &DispatchDependencies {
            policies: &policies,
            runbooks: &runbooks,
            role_assumer: &role_assumer,
            config: &config,
            invocation: &invocation,
        },
    )
    .map_err(|error| Error::from(error.message))?;

    serde_json::to_value(summary)
        .map_err(|error| Error::from(format!("failed to serialize dispatch summary: {error}")))
}

fn is_sqs_event(event: &Value) -> bool {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(|records| {
            !records.is_empty()
                && records.iter().all(|record| {
                    record
                        .get("eventSource")
                        .and_then(Value::as_str)
                        .map(|source| source == "aws:sqs")
                        .unwrap_or(false)
                })
        })
        .unwrap_or(false)
}

fn decode_sqs_bodies(event: &Value) -> Result<Vec<String>, Error> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::from("SQS event must include Records array"))?;

    let mut bodies = Vec::with_capacity(records.len());
    for record in records {
        let body = record
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::from("SQS record body must be a string"))?;
        bodies.push(body.to_string());
    }

    Ok(bodies)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    lambda_runtime::run(service_fn(handle_request)).await
}
