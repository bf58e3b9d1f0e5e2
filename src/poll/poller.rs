// ABOUTME: Polls a status probe until the resource is ready, fails, or time runs out.
// ABOUTME: Fixed interval with jitter, clamped to the deadline, cancellable between polls.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{ResourceStatus, StatusProbe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
    /// Upper bound of random delay added to each interval.
    pub jitter: Duration,
    /// Consecutive probe errors tolerated before giving up.
    pub max_probe_errors: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            timeout: Duration::from_secs(600),
            jitter: Duration::from_secs(2),
            max_probe_errors: 3,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// The provider reported a terminal failure. Not retryable.
    #[error("{resource} failed{}", reason_suffix(.reason))]
    ResourceFailed {
        resource: String,
        reason: Option<String>,
    },

    /// Still not ready when the timeout elapsed. It may become ready later.
    #[error("{resource} not ready after {}s (last status: {last_status})", .elapsed.as_secs())]
    PollTimeout {
        resource: String,
        elapsed: Duration,
        last_status: ResourceStatus,
    },

    #[error("polling {resource} was cancelled")]
    Cancelled { resource: String },

    #[error("could not read status of {resource}: {message}")]
    ProbeFailed { resource: String, message: String },
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

fn jittered(interval: Duration, jitter: Duration) -> Duration {
    let max_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return interval;
    }
    interval + Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

/// Wait until `resource_id` is in service.
///
/// Returns as soon as the probe reports `InService` or `Failed`; a failure is
/// never waited out. Sleeps are clamped to the deadline, so a resource that
/// stays pending times out within one interval of `settings.timeout`. A
/// probe call still outstanding at the deadline is abandoned.
pub async fn wait_until_ready(
    resource_id: &str,
    probe: &dyn StatusProbe,
    settings: &PollSettings,
    cancel: &CancellationToken,
) -> Result<ResourceStatus, PollError> {
    let start = Instant::now();
    let deadline = start + settings.timeout;
    let mut last_status = ResourceStatus::Pending;
    let mut probe_errors = 0u32;

    loop {
        let observed = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(PollError::Cancelled { resource: resource_id.to_string() });
            }
            result = tokio::time::timeout_at(deadline, probe.describe_status(resource_id)) => match result {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("Status probe for {} did not answer before the deadline", resource_id);
                    return Err(PollError::PollTimeout {
                        resource: resource_id.to_string(),
                        elapsed: start.elapsed(),
                        last_status,
                    });
                }
            },
        };

        match observed {
            Ok(report) => {
                probe_errors = 0;
                if report.status != last_status {
                    tracing::info!("{} is {}", resource_id, report.status);
                }
                match report.status {
                    ResourceStatus::InService => return Ok(ResourceStatus::InService),
                    ResourceStatus::Failed => {
                        return Err(PollError::ResourceFailed {
                            resource: resource_id.to_string(),
                            reason: report.failure_reason,
                        });
                    }
                    status => last_status = status,
                }
            }
            Err(e) => {
                probe_errors += 1;
                tracing::warn!(
                    "Status probe for {} failed ({}/{}): {}",
                    resource_id,
                    probe_errors,
                    settings.max_probe_errors,
                    e
                );
                if probe_errors >= settings.max_probe_errors {
                    return Err(PollError::ProbeFailed {
                        resource: resource_id.to_string(),
                        message: e.0,
                    });
                }
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(PollError::PollTimeout {
                resource: resource_id.to_string(),
                elapsed: now - start,
                last_status,
            });
        }

        let wait = jittered(settings.interval, settings.jitter).min(deadline - now);
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(PollError::Cancelled { resource: resource_id.to_string() });
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
