// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use serde::Serialize;
use std::time::Instant;

use crate::engine::PlanDiff;
use crate::orchestrator::DeploymentReport;
use crate::outcome::{OverallStatus, StepOutcome, StepStatus};

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a non-fatal warning.
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Warning: {message}"),
            OutputMode::Json => self.emit_err("warning", message),
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    println!("{message} ({:.1}s)", elapsed);
                } else {
                    println!("{message}");
                }
            }
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.emit("success", message),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => self.emit_err("error", message),
        }
    }

    /// Show a change-set before asking for approval. Written to stderr in
    /// every mode, since the prompt that follows needs it even under
    /// `--json` or `--quiet`.
    pub fn plan(&self, diff: &PlanDiff) {
        eprint!("{}", render_plan(diff));
    }

    /// One line per recorded step.
    pub fn step(&self, outcome: &StepOutcome) {
        if self.mode != OutputMode::Normal {
            return;
        }
        let marker = match outcome.status {
            StepStatus::Success => "✓",
            StepStatus::Skipped => "-",
            StepStatus::Failed => "✗",
        };
        println!("  {marker} {:<12} {}", outcome.step.to_string(), outcome.message);
    }

    /// Final rendering of a run.
    pub fn report(&self, report: &DeploymentReport) {
        if self.mode == OutputMode::Json {
            if let Ok(json) = serde_json::to_string(report) {
                println!("{json}");
            }
            return;
        }

        for outcome in report.log.entries() {
            self.step(outcome);
        }

        if self.mode == OutputMode::Normal
            && let Some(outputs) = &report.outputs
            && !outputs.is_empty()
        {
            println!("Outputs:");
            for (name, value) in outputs.iter() {
                println!("  {name} = {value}");
            }
        }

        for warning in &report.warnings {
            self.warning(&warning.message);
        }

        match report.status {
            OverallStatus::Success => self.success("Deployment complete!"),
            OverallStatus::PartialSuccess => {
                let reason = report
                    .failure
                    .as_ref()
                    .map(|f| format!(": {} ({})", f.message, f.remedy))
                    .unwrap_or_default();
                self.success(&format!(
                    "Deployment applied, but not fully confirmed{reason}"
                ));
            }
            OverallStatus::Failed => match &report.failure {
                Some(failure) => self.error(&failure.to_string()),
                None => self.error("deployment failed"),
            },
        }
    }

    fn event(&self, event: &str, message: &str) -> Option<String> {
        serde_json::to_string(&JsonEvent {
            event,
            message,
            duration_secs: self.duration(),
        })
        .ok()
    }

    fn emit(&self, event: &str, message: &str) {
        if let Some(json) = self.event(event, message) {
            println!("{json}");
        }
    }

    fn emit_err(&self, event: &str, message: &str) {
        if let Some(json) = self.event(event, message) {
            eprintln!("{json}");
        }
    }
}

/// The change list followed by the summary line.
pub fn render_plan(diff: &PlanDiff) -> String {
    let mut rendered = String::from("Planned changes:\n");
    for change in diff.mutations() {
        rendered.push_str(&format!("  {} {}\n", change.action, change.address));
    }
    rendered.push_str(&format!("Plan: {}\n", diff.summary()));
    rendered
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}
