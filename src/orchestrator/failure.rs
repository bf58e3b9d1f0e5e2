// ABOUTME: User-facing description of a fatal pipeline failure.
// ABOUTME: Each failure kind maps to a concrete remedy the operator can act on.

use serde::Serialize;
use std::fmt;

use crate::engine::{ApplyError, PlanError};
use crate::outcome::StepName;
use crate::poll::PollError;
use crate::preflight::PreconditionError;
use crate::stage::StageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingDependency,
    InvalidCredentials,
    SourceNotFound,
    Packaging,
    UploadFailed,
    PermissionDenied,
    Store,
    DriftDetected,
    PlanFailed,
    ConfirmationDeclined,
    StaleHandle,
    StateLocked,
    PartialApply,
    ApplyFailed,
    ResourceFailed,
    PollTimeout,
    ProbeFailed,
    VerificationFailed,
    Cancelled,
}

impl FailureKind {
    pub fn remedy(self) -> &'static str {
        match self {
            FailureKind::MissingDependency => {
                "install the missing tools and make sure they are on PATH"
            }
            FailureKind::InvalidCredentials => {
                "run `aws configure` (or `aws sso login`) to set up credentials, then retry"
            }
            FailureKind::SourceNotFound => "check --model-dir points at the model directory",
            FailureKind::Packaging => "check the model directory is readable and the output directory is writable",
            FailureKind::UploadFailed => "check network connectivity and retry; the upload is idempotent",
            FailureKind::PermissionDenied => {
                "grant s3:PutObject and s3:GetObject on the bucket to the deploying identity"
            }
            FailureKind::Store => "check the bucket exists in the configured region",
            FailureKind::DriftDetected | FailureKind::StateLocked => {
                "wait for the other operation to finish, or run `terraform force-unlock <lock id>` if it is stale"
            }
            FailureKind::PlanFailed => "run `terraform plan` in the terraform directory to see the full error",
            FailureKind::ConfirmationDeclined => {
                "nothing was changed; re-run and approve the plan, or pass --auto-approve"
            }
            FailureKind::StaleHandle => "re-run the deployment to compute a fresh plan",
            FailureKind::PartialApply => {
                "inspect the failed resources listed above, fix the cause and re-run; completed resources are kept"
            }
            FailureKind::ApplyFailed => "run `terraform apply` in the terraform directory to see the full error",
            FailureKind::ResourceFailed => {
                "check the endpoint's FailureReason and CloudWatch logs, fix the model or image and re-run"
            }
            FailureKind::PollTimeout => {
                "the endpoint may still become ready; check `aws sagemaker describe-endpoint`"
            }
            FailureKind::ProbeFailed => {
                "check `aws sagemaker describe-endpoint` manually; the infrastructure was applied"
            }
            FailureKind::VerificationFailed => {
                "invoke the endpoint manually and check its CloudWatch logs"
            }
            FailureKind::Cancelled => {
                "re-run to resume; completed steps are idempotent and will be skipped or re-planned"
            }
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&name)
    }
}

impl From<&PreconditionError> for FailureKind {
    fn from(err: &PreconditionError) -> Self {
        match err {
            PreconditionError::MissingDependency(_) => FailureKind::MissingDependency,
            PreconditionError::InvalidCredentials(_) => FailureKind::InvalidCredentials,
        }
    }
}

impl From<&StageError> for FailureKind {
    fn from(err: &StageError) -> Self {
        match err {
            StageError::SourceNotFound(_) => FailureKind::SourceNotFound,
            StageError::Packaging(_) => FailureKind::Packaging,
            StageError::UploadFailed { .. } => FailureKind::UploadFailed,
            StageError::PermissionDenied(_) => FailureKind::PermissionDenied,
            StageError::Store(_) => FailureKind::Store,
            StageError::Cancelled => FailureKind::Cancelled,
        }
    }
}

impl From<&PlanError> for FailureKind {
    fn from(err: &PlanError) -> Self {
        match err {
            PlanError::DriftDetected { .. } => FailureKind::DriftDetected,
            PlanError::Render(_) | PlanError::Engine(_) => FailureKind::PlanFailed,
        }
    }
}

impl From<&ApplyError> for FailureKind {
    fn from(err: &ApplyError) -> Self {
        match err {
            ApplyError::StaleHandle(_) => FailureKind::StaleHandle,
            ApplyError::Partial { .. } => FailureKind::PartialApply,
            ApplyError::StateLocked { .. } => FailureKind::StateLocked,
            ApplyError::Engine(_) => FailureKind::ApplyFailed,
        }
    }
}

impl From<&PollError> for FailureKind {
    fn from(err: &PollError) -> Self {
        match err {
            PollError::ResourceFailed { .. } => FailureKind::ResourceFailed,
            PollError::PollTimeout { .. } => FailureKind::PollTimeout,
            PollError::Cancelled { .. } => FailureKind::Cancelled,
            PollError::ProbeFailed { .. } => FailureKind::ProbeFailed,
        }
    }
}

/// What the operator sees when a run stops early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineFailure {
    pub step: StepName,
    pub kind: FailureKind,
    pub message: String,
    pub remedy: String,
}

impl PipelineFailure {
    pub fn new(step: StepName, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            step,
            kind,
            message: message.into(),
            remedy: kind.remedy().to_string(),
        }
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} step failed ({}): {}\n  remedy: {}",
            self.step, self.kind, self.message, self.remedy
        )
    }
}
