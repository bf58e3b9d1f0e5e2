// ABOUTME: Plan/apply adapter over the declarative infrastructure engine.
// ABOUTME: Defines the engine trait, change-set types, and plan/apply error taxonomy.

mod adapter;
mod events;
mod graph;
mod outputs;
mod terraform;

pub use adapter::{PlanApplyAdapter, PlanHandle};
pub use graph::{DeploymentSettings, ResourceGraph, SETTINGS_FILENAME, SettingsTemplate};
pub use outputs::{DeploymentOutputs, OutputsError};
pub use terraform::TerraformEngine;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::process::ToolError;
use crate::types::PlanId;

/// Capabilities the orchestrator needs from a declarative infrastructure engine.
///
/// Implementations compute a diff against live state, apply a previously
/// computed diff, and report named outputs. They do not track handle
/// lifetimes; [`PlanApplyAdapter`] does that.
#[async_trait]
pub trait PlanApplyEngine: Send + Sync {
    /// Render the graph's settings and compute a change-set against current state.
    async fn plan(&self, graph: &ResourceGraph) -> Result<PlanDiff, PlanError>;

    /// Apply a change-set produced by [`plan`](Self::plan).
    async fn apply(&self, diff: &PlanDiff) -> Result<ApplySummary, ApplyError>;

    /// Read the named outputs of the applied configuration.
    async fn outputs(&self) -> Result<DeploymentOutputs, OutputsError>;
}

/// What the engine intends to do to a single resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
    Replace,
    Read,
    NoOp,
}

impl ChangeAction {
    /// Whether this action mutates live infrastructure.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, ChangeAction::Read | ChangeAction::NoOp)
    }

    /// Map an engine action list (e.g. `["delete", "create"]`) to a single action.
    pub fn from_actions(actions: &[String]) -> Option<Self> {
        let actions: Vec<&str> = actions.iter().map(String::as_str).collect();
        match actions.as_slice() {
            ["no-op"] => Some(ChangeAction::NoOp),
            ["create"] => Some(ChangeAction::Create),
            ["read"] => Some(ChangeAction::Read),
            ["update"] => Some(ChangeAction::Update),
            ["delete"] => Some(ChangeAction::Delete),
            ["delete", "create"] | ["create", "delete"] => Some(ChangeAction::Replace),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            ChangeAction::Create => "+",
            ChangeAction::Update => "~",
            ChangeAction::Delete => "-",
            ChangeAction::Replace => "-/+",
            ChangeAction::Read => "<=",
            ChangeAction::NoOp => " ",
        };
        write!(f, "{symbol}")
    }
}

/// A planned change to one resource address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChange {
    pub address: String,
    pub action: ChangeAction,
}

/// A computed change-set.
#[derive(Debug, Clone, Default)]
pub struct PlanDiff {
    pub changes: Vec<ResourceChange>,
    /// Engine-specific saved plan, applied verbatim so apply matches what was confirmed.
    pub plan_file: Option<PathBuf>,
}

impl PlanDiff {
    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(|c| c.action.is_mutation())
    }

    /// Changes that mutate infrastructure, in plan order.
    pub fn mutations(&self) -> impl Iterator<Item = &ResourceChange> {
        self.changes.iter().filter(|c| c.action.is_mutation())
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for change in &self.changes {
            match change.action {
                ChangeAction::Create => summary.to_create += 1,
                ChangeAction::Update => summary.to_update += 1,
                ChangeAction::Delete => summary.to_destroy += 1,
                ChangeAction::Replace => summary.to_replace += 1,
                ChangeAction::Read | ChangeAction::NoOp => {}
            }
        }
        summary
    }
}

/// Counts of planned changes by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub to_create: u32,
    pub to_update: u32,
    pub to_destroy: u32,
    pub to_replace: u32,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A replacement is both an add and a destroy.
        write!(
            f,
            "{} to add, {} to change, {} to destroy",
            self.to_create + self.to_replace,
            self.to_update,
            self.to_destroy + self.to_replace
        )
    }
}

/// Counts of what an apply actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub resources_created: u32,
    pub resources_updated: u32,
    pub resources_destroyed: u32,
}

impl fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} destroyed",
            self.resources_created, self.resources_updated, self.resources_destroyed
        )
    }
}

/// A resource the engine failed to apply, with the engine's reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFailure {
    pub address: String,
    pub message: String,
}

/// Errors computing a change-set.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// State is locked by a concurrent operation. Never retried automatically.
    #[error("infrastructure state is locked by another operation{}", lock_suffix(.lock_id))]
    DriftDetected { lock_id: Option<String> },

    /// The settings file could not be written.
    #[error("failed to render settings: {0}")]
    Render(String),

    /// The engine rejected the configuration or failed to run.
    #[error("plan failed: {0}")]
    Engine(String),
}

/// Errors applying a change-set.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// The handle was already applied or belongs to another run.
    #[error("plan {0} has already been applied or belongs to another run")]
    StaleHandle(PlanId),

    /// Some resources were applied before the failure.
    #[error(
        "apply failed for {} resource(s) after {} succeeded",
        .failed.len(),
        .succeeded.len()
    )]
    Partial {
        succeeded: Vec<String>,
        failed: Vec<ResourceFailure>,
    },

    /// State was locked when apply started; nothing was changed.
    #[error("infrastructure state is locked by another operation{}", lock_suffix(.lock_id))]
    StateLocked { lock_id: Option<String> },

    /// The engine failed before touching any resource.
    #[error("apply failed: {0}")]
    Engine(String),
}

fn lock_suffix(lock_id: &Option<String>) -> String {
    lock_id
        .as_ref()
        .map(|id| format!(" (lock ID {id})"))
        .unwrap_or_default()
}

impl From<ToolError> for PlanError {
    fn from(err: ToolError) -> Self {
        PlanError::Engine(err.to_string())
    }
}

impl From<ToolError> for ApplyError {
    fn from(err: ToolError) -> Self {
        ApplyError::Engine(err.to_string())
    }
}
