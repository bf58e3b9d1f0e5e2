// ABOUTME: Credential probe backed by `aws sts get-caller-identity`.

use async_trait::async_trait;
use serde::Deserialize;

use super::AwsCli;
use crate::preflight::{CallerIdentity, CredentialProbe, PreconditionError};
use crate::process::ToolError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetCallerIdentity {
    account: String,
    arn: String,
    user_id: String,
}

#[derive(Debug, Clone)]
pub struct StsCredentialProbe {
    cli: AwsCli,
}

impl StsCredentialProbe {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl CredentialProbe for StsCredentialProbe {
    async fn caller_identity(&self) -> Result<CallerIdentity, PreconditionError> {
        let response: GetCallerIdentity = self
            .cli
            .command("sts", "get-caller-identity")
            .run_json()
            .await
            .map_err(|e| PreconditionError::InvalidCredentials(credential_reason(&e)))?;

        Ok(CallerIdentity {
            account: response.account,
            arn: response.arn,
            user_id: response.user_id,
        })
    }
}

fn credential_reason(err: &ToolError) -> String {
    match err.stderr().map(str::trim).filter(|s| !s.is_empty()) {
        Some(stderr) => stderr.to_string(),
        None => err.to_string(),
    }
}
