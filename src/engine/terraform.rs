// ABOUTME: Terraform CLI implementation of the plan/apply engine.
// ABOUTME: Saved plans, JSON apply events, and lock detection, all via argument vectors.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;

use super::events::{is_lock_error, parse_apply_stream, parse_lock_id, parse_plan_changes};
use super::{
    ApplyError, ApplySummary, DeploymentOutputs, OutputsError, PlanApplyEngine, PlanDiff,
    PlanError, ResourceFailure, ResourceGraph,
};
use crate::process::ToolCommand;

/// Saved plan written next to the configuration.
const PLAN_FILENAME: &str = "sagedeploy.tfplan";

/// Drives a Terraform configuration directory.
#[derive(Debug)]
pub struct TerraformEngine {
    binary: String,
    working_dir: PathBuf,
    initialized: OnceCell<()>,
}

impl TerraformEngine {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: "terraform".to_string(),
            working_dir: working_dir.into(),
            initialized: OnceCell::new(),
        }
    }

    /// Use a specific executable instead of `terraform` from `PATH`.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn command(&self) -> ToolCommand {
        ToolCommand::new(&self.binary)
            .current_dir(&self.working_dir)
            .env("TF_IN_AUTOMATION", "1")
    }

    /// `init` once per engine instance.
    async fn ensure_initialized(&self) -> Result<(), PlanError> {
        self.initialized
            .get_or_try_init(|| async {
                tracing::info!("Initializing {}", self.working_dir.display());
                let output = self
                    .command()
                    .args(["init", "-input=false", "-no-color"])
                    .output()
                    .await?;
                if output.success() {
                    Ok(())
                } else if is_lock_error(&output.stderr) {
                    Err(PlanError::DriftDetected {
                        lock_id: parse_lock_id(&output.stderr),
                    })
                } else {
                    Err(PlanError::Engine(format!(
                        "init failed: {}",
                        output.stderr.trim()
                    )))
                }
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl PlanApplyEngine for TerraformEngine {
    async fn plan(&self, graph: &ResourceGraph) -> Result<PlanDiff, PlanError> {
        let settings_path = graph
            .settings
            .write_to(&graph.working_dir)
            .await
            .map_err(|e| PlanError::Render(e.to_string()))?;
        tracing::debug!("Wrote settings to {}", settings_path.display());

        self.ensure_initialized().await?;

        let output = self
            .command()
            .args([
                "plan",
                "-input=false",
                "-no-color",
                "-lock-timeout=0s",
            ])
            .arg(format!("-out={PLAN_FILENAME}"))
            .output()
            .await?;

        if !output.success() {
            if is_lock_error(&output.stderr) {
                return Err(PlanError::DriftDetected {
                    lock_id: parse_lock_id(&output.stderr),
                });
            }
            return Err(PlanError::Engine(output.stderr.trim().to_string()));
        }

        let shown = self
            .command()
            .args(["show", "-json", "-no-color", PLAN_FILENAME])
            .run()
            .await?;
        let changes = parse_plan_changes(&shown.stdout)
            .map_err(|e| PlanError::Engine(format!("unreadable plan: {e}")))?;

        Ok(PlanDiff {
            changes,
            plan_file: Some(self.working_dir.join(PLAN_FILENAME)),
        })
    }

    async fn apply(&self, diff: &PlanDiff) -> Result<ApplySummary, ApplyError> {
        let plan_file = diff
            .plan_file
            .as_ref()
            .ok_or_else(|| ApplyError::Engine("change-set has no saved plan".to_string()))?;

        let output = self
            .command()
            .args(["apply", "-input=false", "-no-color", "-json", "-lock-timeout=0s"])
            .arg(plan_file.as_os_str())
            .output()
            .await?;

        let (report, actions) = parse_apply_stream(&output.stdout);

        if output.success() {
            return Ok(report.summary_or_counted(&actions));
        }

        let all_errors = report.errors.join("; ");
        if is_lock_error(&all_errors) || is_lock_error(&output.stderr) {
            return Err(ApplyError::StateLocked {
                lock_id: parse_lock_id(&output.stderr),
            });
        }

        if report.completed.is_empty() && report.errored.is_empty() {
            let reason = if all_errors.is_empty() {
                output.stderr.trim().to_string()
            } else {
                all_errors
            };
            return Err(ApplyError::Engine(reason));
        }

        let mut failed = report.errored;
        if failed.is_empty() {
            failed.push(ResourceFailure {
                address: "(unattributed)".to_string(),
                message: if all_errors.is_empty() {
                    output.stderr.trim().to_string()
                } else {
                    all_errors
                },
            });
        }

        Err(ApplyError::Partial {
            succeeded: report.completed,
            failed,
        })
    }

    async fn outputs(&self) -> Result<DeploymentOutputs, OutputsError> {
        let output = self
            .command()
            .args(["output", "-json", "-no-color"])
            .run()
            .await?;
        DeploymentOutputs::from_engine_json(&output.stdout)
            .map_err(|e| OutputsError::Engine(format!("unreadable outputs: {e}")))
    }
}
