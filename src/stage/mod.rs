// ABOUTME: Artifact staging: package the model directory and upload it once.
// ABOUTME: Skips when the object already exists, retries transient upload failures.

mod package;
mod retry;

pub use package::{INFERENCE_SCRIPT, PackagedArtifact, hash_file, package_model};
pub use retry::RetryPolicy;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::types::RemoteUri;

/// Errors from a remote object store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Worth retrying: throttling, timeouts, dropped connections.
    #[error("{0}")]
    Transient(String),

    #[error("access denied: {0}")]
    PermissionDenied(String),

    /// Not retryable, e.g. the bucket does not exist.
    #[error("{0}")]
    Fatal(String),
}

/// Remote storage for model artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, uri: &RemoteUri) -> Result<bool, StoreError>;

    /// Upload `path` to `uri`, recording `sha256` as object metadata.
    async fn upload(&self, path: &Path, uri: &RemoteUri, sha256: &str) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("model directory not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("failed to package model: {0}")]
    Packaging(String),

    #[error("upload failed after {attempts} attempt(s): {message}")]
    UploadFailed { attempts: u32, message: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("object store error: {0}")]
    Store(String),

    #[error("staging was cancelled")]
    Cancelled,
}

impl StageError {
    /// Whether a later run could succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(self, StageError::UploadFailed { .. })
    }
}

/// Where the artifact ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArtifact {
    pub uri: RemoteUri,
    /// Content hash, absent when the upload was skipped.
    pub sha256: Option<String>,
    /// True when an existing object was reused.
    pub skipped: bool,
    pub attempts: u32,
    pub archive: Option<PathBuf>,
}

pub struct ArtifactStager {
    store: Box<dyn ObjectStore>,
    output_dir: PathBuf,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ArtifactStager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStager")
            .field("output_dir", &self.output_dir)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ArtifactStager {
    pub fn new(store: Box<dyn ObjectStore>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            output_dir: output_dir.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stage `source` at `destination`.
    ///
    /// An existing object is reused unless `overwrite` is set, so repeating a
    /// run never uploads twice. The archive name is the last segment of the
    /// destination key.
    pub async fn stage(
        &self,
        source: &Path,
        requirements: &[String],
        destination: &RemoteUri,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<StagedArtifact, StageError> {
        if !source.is_dir() {
            return Err(StageError::SourceNotFound(source.to_path_buf()));
        }

        if !overwrite && self.store.exists(destination).await.map_err(store_error)? {
            tracing::info!("{} already exists, skipping upload", destination);
            return Ok(StagedArtifact {
                uri: destination.clone(),
                sha256: None,
                skipped: true,
                attempts: 0,
                archive: None,
            });
        }

        let archive_name = destination
            .key()
            .as_str()
            .rsplit('/')
            .next()
            .unwrap_or("model.tar.gz")
            .to_string();
        let output = self.output_dir.join(archive_name);
        let packaged = {
            let source = source.to_path_buf();
            let requirements = requirements.to_vec();
            tokio::task::spawn_blocking(move || package_model(&source, &requirements, &output))
                .await
                .map_err(|e| StageError::Packaging(e.to_string()))?
                .map_err(|e| StageError::Packaging(e.to_string()))?
        };
        tracing::info!(
            "Packaged {} ({} bytes, sha256 {})",
            packaged.path.display(),
            packaged.size,
            &packaged.sha256[..12]
        );

        let attempts = self.upload_with_retry(&packaged, destination, cancel).await?;

        Ok(StagedArtifact {
            uri: destination.clone(),
            sha256: Some(packaged.sha256),
            skipped: false,
            attempts,
            archive: Some(packaged.path),
        })
    }

    async fn upload_with_retry(
        &self,
        packaged: &PackagedArtifact,
        destination: &RemoteUri,
        cancel: &CancellationToken,
    ) -> Result<u32, StageError> {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(StageError::Cancelled);
            }
            attempt += 1;

            match self
                .store
                .upload(&packaged.path, destination, &packaged.sha256)
                .await
            {
                Ok(()) => {
                    tracing::info!("Uploaded {} (attempt {})", destination, attempt);
                    return Ok(attempt);
                }
                Err(StoreError::Transient(message)) if attempt < self.retry.max_attempts => {
                    let backoff = self.retry.backoff_after(attempt);
                    tracing::warn!(
                        "Upload attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        self.retry.max_attempts,
                        message,
                        backoff
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(StageError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
                Err(StoreError::Transient(message)) => {
                    return Err(StageError::UploadFailed {
                        attempts: attempt,
                        message,
                    });
                }
                Err(other) => return Err(store_error(other)),
            }
        }
    }
}

fn store_error(err: StoreError) -> StageError {
    match err {
        StoreError::PermissionDenied(m) => StageError::PermissionDenied(m),
        StoreError::Transient(m) | StoreError::Fatal(m) => StageError::Store(m),
    }
}
