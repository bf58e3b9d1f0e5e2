// ABOUTME: Readiness polling for asynchronously provisioned resources.
// ABOUTME: Exports the status model, the probe trait, and wait_until_ready.

mod poller;
mod status;

pub use poller::{PollError, PollSettings, wait_until_ready};
pub use status::{ProbeError, ResourceStatus, StatusProbe, StatusReport};
