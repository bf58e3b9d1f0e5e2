// ABOUTME: Configuration types and parsing for sagedeploy.yml.
// ABOUTME: Handles YAML parsing, env var interpolation, and conversion into pipeline settings.

mod env_value;
mod poll;
mod upload;
mod verify;

pub use env_value::{EnvValue, resolve_env_map};
pub use poll::PollConfig;
pub use upload::UploadConfig;
pub use verify::VerifyConfig;

use crate::engine::SettingsTemplate;
use crate::error::{Error, Result};
use crate::types::ImageRef;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub const CONFIG_FILENAME: &str = "sagedeploy.yml";
pub const CONFIG_FILENAME_ALT: &str = "sagedeploy.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".sagedeploy/config.yml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default)]
    pub profile: Option<String>,

    #[serde(default = "default_terraform_dir")]
    pub terraform_dir: PathBuf,

    #[serde(default = "default_instance_type")]
    pub instance_type: String,

    #[serde(default = "default_instance_count")]
    pub instance_count: u32,

    #[serde(default = "default_container_image")]
    pub container_image: ImageRef,

    #[serde(default)]
    pub environment: BTreeMap<String, EnvValue>,

    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    #[serde(default = "default_required_tools")]
    pub required_tools: BTreeSet<String>,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub verify: VerifyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            region: default_region(),
            profile: None,
            terraform_dir: default_terraform_dir(),
            instance_type: default_instance_type(),
            instance_count: default_instance_count(),
            container_image: default_container_image(),
            environment: BTreeMap::new(),
            tags: BTreeMap::new(),
            required_tools: default_required_tools(),
            poll: PollConfig::default(),
            upload: UploadConfig::default(),
            verify: VerifyConfig::default(),
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_terraform_dir() -> PathBuf {
    PathBuf::from("terraform")
}

fn default_instance_type() -> String {
    "ml.t2.medium".to_string()
}

fn default_instance_count() -> u32 {
    1
}

fn default_container_image() -> ImageRef {
    ImageRef::default_serving()
}

fn default_required_tools() -> BTreeSet<String> {
    ["terraform", "aws"].into_iter().map(String::from).collect()
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Look for a config file in `dir`. Returns `None` when there is none,
    /// in which case the built-in defaults apply.
    pub fn discover(dir: &Path) -> Result<Option<Self>> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!("Loading config from {}", path.display());
                return Self::load(path).map(Some);
            }
        }

        Ok(None)
    }

    /// Load an explicit path, or discover one in `dir`, or fall back to defaults.
    pub fn resolve(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        match explicit {
            Some(path) if !path.exists() => Err(Error::ConfigNotFound(path.to_path_buf())),
            Some(path) => Self::load(path),
            None => Ok(Self::discover(dir)?.unwrap_or_default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.instance_count == 0 {
            return Err(Error::InvalidConfig(
                "instance_count must be at least 1".to_string(),
            ));
        }
        if self.instance_type.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "instance_type cannot be empty".to_string(),
            ));
        }
        if self.upload.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "upload.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.poll.interval.is_zero() {
            return Err(Error::InvalidConfig(
                "poll.interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve environment references and produce the per-run settings template.
    pub fn settings_template(&self) -> Result<SettingsTemplate> {
        Ok(SettingsTemplate {
            region: self.region.clone(),
            container_image: self.container_image.clone(),
            instance_type: self.instance_type.clone(),
            instance_count: self.instance_count,
            environment: resolve_env_map(&self.environment)?,
            tags: self.tags.clone(),
        })
    }
}
