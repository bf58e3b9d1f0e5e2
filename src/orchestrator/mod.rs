// ABOUTME: Orchestrates a deployment run across the pipeline components.
// ABOUTME: State machine, confirmation policy, and user-facing failures.

mod confirmation;
mod failure;
mod pipeline;
mod state;

pub use confirmation::ConfirmationPolicy;
pub use failure::{FailureKind, PipelineFailure};
pub use pipeline::{Collaborators, DeploymentReport, Orchestrator, PipelineOptions};
pub use state::PipelineState;
