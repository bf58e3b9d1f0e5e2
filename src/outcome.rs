// ABOUTME: Typed step outcomes and the append-only deployment log.
// ABOUTME: One outcome per pipeline step, never mutated once recorded.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::engine::{ApplySummary, PlanSummary, ResourceFailure};
use crate::orchestrator::FailureKind;
use crate::poll::ResourceStatus;
use crate::types::RemoteUri;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Precondition,
    Stage,
    Plan,
    Apply,
    Poll,
    Verify,
    Done,
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepName::Precondition => "precondition",
            StepName::Stage => "stage",
            StepName::Plan => "plan",
            StepName::Apply => "apply",
            StepName::Poll => "poll",
            StepName::Verify => "verify",
            StepName::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Success => write!(f, "ok"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Structured payload attached to an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepDetail {
    Identity {
        account: String,
        arn: String,
    },
    Artifact {
        uri: RemoteUri,
        sha256: Option<String>,
        attempts: u32,
    },
    Plan(PlanSummary),
    Apply(ApplySummary),
    /// What an interrupted apply did and did not change.
    PartialApply {
        succeeded: Vec<String>,
        failed: Vec<ResourceFailure>,
    },
    Poll {
        status: ResourceStatus,
        elapsed_secs: u64,
    },
    PollTimeout {
        elapsed_secs: u64,
        last_status: ResourceStatus,
    },
    Verify {
        response: String,
    },
    Failure {
        kind: FailureKind,
        remedy: String,
    },
}

/// Result of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: StepName,
    pub status: StepStatus,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<StepDetail>,
}

impl StepOutcome {
    fn finish(
        step: StepName,
        status: StepStatus,
        message: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            step,
            status,
            message: message.into(),
            started_at,
            finished_at: Utc::now(),
            detail: None,
        }
    }

    pub fn success(step: StepName, message: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self::finish(step, StepStatus::Success, message, started_at)
    }

    pub fn failed(step: StepName, message: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self::finish(step, StepStatus::Failed, message, started_at)
    }

    pub fn skipped(step: StepName, message: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self::finish(step, StepStatus::Skipped, message, started_at)
    }

    pub fn with_detail(mut self, detail: StepDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// Ordered record of a run. Entries can be appended, never changed or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DeploymentLog {
    entries: Vec<StepOutcome>,
}

impl DeploymentLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: StepOutcome) {
        tracing::info!("[{}] {}: {}", outcome.step, outcome.status, outcome.message);
        self.entries.push(outcome);
    }

    pub fn entries(&self) -> &[StepOutcome] {
        &self.entries
    }

    pub fn steps(&self) -> Vec<StepName> {
        self.entries.iter().map(|e| e.step).collect()
    }

    pub fn get(&self, step: StepName) -> Option<&StepOutcome> {
        self.entries.iter().find(|e| e.step == step)
    }

    pub fn last(&self) -> Option<&StepOutcome> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Success,
    /// Infrastructure applied, but readiness or verification unconfirmed.
    PartialSuccess,
    Failed,
}

impl OverallStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            OverallStatus::Failed => 1,
            OverallStatus::Success | OverallStatus::PartialSuccess => 0,
        }
    }

    /// Combine with a best-effort step failure. Never drops below partial.
    pub fn downgrade(self) -> Self {
        match self {
            OverallStatus::Success => OverallStatus::PartialSuccess,
            other => other,
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallStatus::Success => write!(f, "success"),
            OverallStatus::PartialSuccess => write!(f, "partial success"),
            OverallStatus::Failed => write!(f, "failed"),
        }
    }
}
