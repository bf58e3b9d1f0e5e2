// ABOUTME: Endpoint readiness polling configuration.
// ABOUTME: Interval, jitter and overall timeout with defaults matching managed endpoint start-up.

use serde::Deserialize;
use std::time::Duration;

use crate::poll::PollSettings;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollConfig {
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_jitter", with = "humantime_serde")]
    pub jitter: Duration,

    #[serde(default = "default_max_probe_errors")]
    pub max_probe_errors: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            timeout: default_timeout(),
            jitter: default_jitter(),
            max_probe_errors: default_max_probe_errors(),
        }
    }
}

impl From<&PollConfig> for PollSettings {
    fn from(config: &PollConfig) -> Self {
        PollSettings {
            interval: config.interval,
            timeout: config.timeout,
            jitter: config.jitter,
            max_probe_errors: config.max_probe_errors,
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_jitter() -> Duration {
    Duration::from_secs(2)
}

fn default_max_probe_errors() -> u32 {
    3
}
