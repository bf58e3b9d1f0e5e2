// ABOUTME: SageMaker endpoint status probe and invoker backed by the AWS CLI.
// ABOUTME: Maps provider endpoint states onto the poller's resource status.

use async_trait::async_trait;
use serde::Deserialize;

use super::AwsCli;
use crate::poll::{ProbeError, ResourceStatus, StatusProbe, StatusReport};
use crate::verify::{EndpointInvoker, InvocationPayload, VerifyError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeEndpoint {
    endpoint_status: String,
    #[serde(default)]
    failure_reason: Option<String>,
}

/// Map a SageMaker `EndpointStatus` onto a resource status.
pub(crate) fn map_endpoint_status(status: &str) -> ResourceStatus {
    match status {
        "InService" => ResourceStatus::InService,
        "Failed" | "OutOfService" | "Deleting" => ResourceStatus::Failed,
        "Creating" | "Updating" | "SystemUpdating" | "RollingBack" => ResourceStatus::Creating,
        _ => ResourceStatus::Pending,
    }
}

fn is_missing_endpoint(stderr: &str) -> bool {
    stderr.contains("Could not find endpoint")
}

#[derive(Debug, Clone)]
pub struct SageMakerEndpoints {
    cli: AwsCli,
}

impl SageMakerEndpoints {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl StatusProbe for SageMakerEndpoints {
    async fn describe_status(&self, resource_id: &str) -> Result<StatusReport, ProbeError> {
        let output = self
            .cli
            .command("sagemaker", "describe-endpoint")
            .args(["--endpoint-name", resource_id])
            .output()
            .await
            .map_err(|e| ProbeError(e.to_string()))?;

        if !output.success() {
            if is_missing_endpoint(&output.stderr) {
                return Ok(ResourceStatus::Pending.into());
            }
            return Err(ProbeError(output.stderr.trim().to_string()));
        }

        let described: DescribeEndpoint = serde_json::from_str(&output.stdout)
            .map_err(|e| ProbeError(format!("unreadable describe-endpoint output: {e}")))?;
        let status = map_endpoint_status(&described.endpoint_status);
        Ok(StatusReport {
            status,
            failure_reason: match status {
                ResourceStatus::Failed => described
                    .failure_reason
                    .or(Some(described.endpoint_status)),
                _ => None,
            },
        })
    }
}

#[async_trait]
impl EndpointInvoker for SageMakerEndpoints {
    async fn invoke(
        &self,
        endpoint: &str,
        payload: &InvocationPayload,
    ) -> Result<Vec<u8>, VerifyError> {
        let outfile =
            std::env::temp_dir().join(format!("sagedeploy-invoke-{}.out", uuid::Uuid::new_v4()));

        let result = self
            .cli
            .command("sagemaker-runtime", "invoke-endpoint")
            .args([
                "--endpoint-name",
                endpoint,
                "--content-type",
                payload.content_type.as_str(),
                "--body",
                payload.body.as_str(),
                "--cli-binary-format",
                "raw-in-base64-out",
            ])
            .arg(outfile.as_os_str())
            .run()
            .await;

        let body = match result {
            Ok(_) => tokio::fs::read(&outfile).await.map_err(|e| VerifyError::Invocation {
                endpoint: endpoint.to_string(),
                message: format!("could not read response: {e}"),
            }),
            Err(e) => Err(VerifyError::Invocation {
                endpoint: endpoint.to_string(),
                message: e
                    .stderr()
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|| e.to_string()),
            }),
        };

        if let Err(e) = tokio::fs::remove_file(&outfile).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::debug!("Could not remove {}: {}", outfile.display(), e);
        }

        body
    }
}
