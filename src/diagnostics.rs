// ABOUTME: Diagnostics accumulator for non-fatal warnings during a deployment run.
// ABOUTME: Collects best-effort failures that shouldn't fail a run but should be shown to users.

use serde::Serialize;

/// Collects non-fatal warnings during a run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Engine outputs could not be read after apply.
    pub fn outputs_unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::OutputsUnavailable,
            message: message.into(),
        }
    }

    /// The smoke-test invocation failed.
    pub fn verification_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::VerificationFailed,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Outputs missing; endpoint name falls back to the conventional one.
    OutputsUnavailable,
    /// Endpoint deployed but the sample invocation failed.
    VerificationFailed,
}
