// ABOUTME: How the pipeline obtains approval between plan and apply.

use std::fmt;

use crate::engine::PlanDiff;

type Prompt = Box<dyn Fn(&PlanDiff) -> bool + Send + Sync>;

/// Approval policy for applying a change-set. Defaults to declining.
#[derive(Default)]
pub enum ConfirmationPolicy {
    AutoApprove,
    /// Ask a callback, typically a terminal prompt.
    Interactive(Prompt),
    #[default]
    Deny,
}

impl ConfirmationPolicy {
    pub fn interactive(prompt: impl Fn(&PlanDiff) -> bool + Send + Sync + 'static) -> Self {
        ConfirmationPolicy::Interactive(Box::new(prompt))
    }

    pub fn confirm(&self, diff: &PlanDiff) -> bool {
        match self {
            ConfirmationPolicy::AutoApprove => true,
            ConfirmationPolicy::Interactive(prompt) => prompt(diff),
            ConfirmationPolicy::Deny => false,
        }
    }
}

impl fmt::Debug for ConfirmationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmationPolicy::AutoApprove => write!(f, "AutoApprove"),
            ConfirmationPolicy::Interactive(_) => write!(f, "Interactive(..)"),
            ConfirmationPolicy::Deny => write!(f, "Deny"),
        }
    }
}
