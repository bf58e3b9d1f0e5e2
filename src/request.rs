// ABOUTME: The immutable input to one deployment run.
// ABOUTME: Built once from CLI arguments and passed by value through the pipeline.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::types::{BucketName, RemoteKey, RemoteUri, ResourceName};

/// Everything one run needs to know about what to deploy and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub artifact_source: PathBuf,
    pub remote_bucket: BucketName,
    pub resource_name: ResourceName,
    /// Extra container environment, overriding project configuration.
    pub extra_config: BTreeMap<String, String>,
    /// Python packages written into the artifact's `requirements.txt`.
    pub requirements: Vec<String>,
    /// Re-upload even when the artifact already exists remotely.
    pub overwrite: bool,
}

impl DeploymentRequest {
    pub fn new(
        artifact_source: impl Into<PathBuf>,
        remote_bucket: BucketName,
        resource_name: ResourceName,
    ) -> Self {
        Self {
            artifact_source: artifact_source.into(),
            remote_bucket,
            resource_name,
            extra_config: BTreeMap::new(),
            requirements: Vec::new(),
            overwrite: false,
        }
    }

    pub fn with_extra_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_config.insert(key.into(), value.into());
        self
    }

    pub fn with_requirements<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements = packages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn artifact_source(&self) -> &Path {
        &self.artifact_source
    }

    /// Where the packaged artifact lives: `s3://<bucket>/models/<name>.tar.gz`.
    pub fn artifact_destination(&self) -> RemoteUri {
        RemoteUri::new(
            self.remote_bucket.clone(),
            RemoteKey::for_model_archive(&self.resource_name.archive_name()),
        )
    }
}
