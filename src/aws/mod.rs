// ABOUTME: AWS CLI adapters for credentials, object storage, and endpoint status.
// ABOUTME: Every call is an argument vector passed to the `aws` executable.

mod s3;
mod sagemaker;
mod sts;

pub use s3::S3ObjectStore;
pub use sagemaker::SageMakerEndpoints;
pub use sts::StsCredentialProbe;

use crate::process::ToolCommand;

/// Shared invocation settings for the `aws` executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCli {
    binary: String,
    region: String,
    profile: Option<String>,
}

impl AwsCli {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            binary: "aws".to_string(),
            region: region.into(),
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// `aws <service> <operation> --region R [--profile P] --output json`
    pub(crate) fn command(&self, service: &str, operation: &str) -> ToolCommand {
        let mut cmd = ToolCommand::new(&self.binary)
            .args([service, operation, "--region", self.region.as_str()])
            .args(["--output", "json"]);
        if let Some(profile) = &self.profile {
            cmd = cmd.args(["--profile", profile.as_str()]);
        }
        cmd
    }
}
