// ABOUTME: S3 object store backed by `aws s3api`.
// ABOUTME: Classifies CLI failures into transient, permission, and fatal errors.

use async_trait::async_trait;
use std::path::Path;

use super::AwsCli;
use crate::process::{ToolError, ToolErrorKind};
use crate::stage::{ObjectStore, StoreError};
use crate::types::RemoteUri;

#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    cli: AwsCli,
}

impl S3ObjectStore {
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }
}

/// Sort an `aws s3api` error message into a store error.
pub(crate) fn classify(stderr: &str) -> StoreError {
    let message = stderr.trim().to_string();
    if message.contains("AccessDenied") || message.contains("(403)") || message.contains("Forbidden")
    {
        StoreError::PermissionDenied(message)
    } else if message.contains("NoSuchBucket") {
        StoreError::Fatal(message)
    } else {
        StoreError::Transient(message)
    }
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("(404)") || stderr.contains("Not Found") || stderr.contains("NoSuchKey")
}

fn tool_error(err: ToolError) -> StoreError {
    match err.kind() {
        ToolErrorKind::NotStarted => StoreError::Fatal(err.to_string()),
        _ => match err.stderr() {
            Some(stderr) => classify(stderr),
            None => StoreError::Transient(err.to_string()),
        },
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn exists(&self, uri: &RemoteUri) -> Result<bool, StoreError> {
        let output = self
            .cli
            .command("s3api", "head-object")
            .args(["--bucket", uri.bucket().as_str(), "--key", uri.key().as_str()])
            .output()
            .await
            .map_err(tool_error)?;

        if output.success() {
            Ok(true)
        } else if is_not_found(&output.stderr) {
            Ok(false)
        } else {
            Err(classify(&output.stderr))
        }
    }

    async fn upload(&self, path: &Path, uri: &RemoteUri, sha256: &str) -> Result<(), StoreError> {
        self.cli
            .command("s3api", "put-object")
            .args(["--bucket", uri.bucket().as_str(), "--key", uri.key().as_str()])
            .arg("--body")
            .arg(path.as_os_str())
            .args(["--metadata".to_string(), format!("sha256={sha256}")])
            .run()
            .await
            .map_err(tool_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_denied_is_permission_error() {
        let err = classify(
            "An error occurred (AccessDenied) when calling the PutObject operation: Access Denied",
        );
        assert!(matches!(err, StoreError::PermissionDenied(_)));
        assert!(matches!(
            classify("An error occurred (403) when calling the HeadObject operation: Forbidden"),
            StoreError::PermissionDenied(_)
        ));
    }

    #[test]
    fn missing_bucket_is_fatal() {
        let err = classify("An error occurred (NoSuchBucket) when calling the PutObject operation");
        assert!(matches!(err, StoreError::Fatal(_)));
    }

    #[test]
    fn other_failures_are_transient() {
        let err = classify("Connection was closed before we received a valid response");
        assert!(matches!(err, StoreError::Transient(_)));
    }

    #[test]
    fn head_object_404_means_absent() {
        assert!(is_not_found(
            "An error occurred (404) when calling the HeadObject operation: Not Found"
        ));
        assert!(!is_not_found("An error occurred (403) when calling the HeadObject operation"));
    }
}
