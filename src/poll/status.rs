// ABOUTME: Observed state of an externally provisioned resource.
// ABOUTME: Read-only; this crate never owns the resource's lifecycle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Not visible yet, or queued.
    Pending,
    /// Being provisioned or updated.
    Creating,
    /// Ready to serve.
    InService,
    /// Terminal failure reported by the provider.
    Failed,
}

impl ResourceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResourceStatus::InService | ResourceStatus::Failed)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceStatus::Pending => "pending",
            ResourceStatus::Creating => "creating",
            ResourceStatus::InService => "in service",
            ResourceStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One observation, with the provider's reason when it reports failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: ResourceStatus,
    pub failure_reason: Option<String>,
}

impl From<ResourceStatus> for StatusReport {
    fn from(status: ResourceStatus) -> Self {
        Self {
            status,
            failure_reason: None,
        }
    }
}

/// The probe itself could not obtain a status.
#[derive(Debug, thiserror::Error)]
#[error("status probe failed: {0}")]
pub struct ProbeError(pub String);

/// Source of status observations for a resource.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn describe_status(&self, resource_id: &str) -> Result<StatusReport, ProbeError>;
}
