// ABOUTME: Pipeline states and the transitions allowed between them.
// ABOUTME: Failed is absorbing and reachable from every non-terminal state.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    CheckingPreconditions,
    Staging,
    Planning,
    AwaitingConfirmation,
    Applying,
    Polling,
    Verifying,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;

        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Idle, CheckingPreconditions)
                | (CheckingPreconditions, Staging)
                | (Staging, Planning)
                | (Planning, AwaitingConfirmation)
                // nothing to apply
                | (Planning, Polling)
                | (AwaitingConfirmation, Applying)
                | (Applying, Polling)
                | (Polling, Verifying)
                | (Polling, Done)
                | (Verifying, Done)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::CheckingPreconditions => "checking preconditions",
            PipelineState::Staging => "staging",
            PipelineState::Planning => "planning",
            PipelineState::AwaitingConfirmation => "awaiting confirmation",
            PipelineState::Applying => "applying",
            PipelineState::Polling => "polling",
            PipelineState::Verifying => "verifying",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}
