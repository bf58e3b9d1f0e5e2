// ABOUTME: Typed deployment settings rendered into the engine's variables file.
// ABOUTME: Serialized with serde so values are never spliced into text by hand.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::request::DeploymentRequest;
use crate::types::{BucketName, ImageRef, RemoteUri, ResourceName};

/// Variables file the engine loads automatically from its working directory.
pub const SETTINGS_FILENAME: &str = "terraform.tfvars.json";

/// Entry script the serving container runs inside the packaged artifact.
const DEFAULT_PROGRAM: &str = "inference.py";

/// Every variable the resource definitions consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentSettings {
    pub aws_region: String,
    pub model_name: ResourceName,
    pub endpoint_name: String,
    pub endpoint_config_name: String,
    pub model_data_url: RemoteUri,
    pub bucket_name: BucketName,
    pub container_image: ImageRef,
    pub instance_type: String,
    pub instance_count: u32,
    pub environment_variables: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

impl DeploymentSettings {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Write the variables file into `dir`, returning its path.
    pub async fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(SETTINGS_FILENAME);
        let json = self.to_json().map_err(std::io::Error::other)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }

    pub async fn read_from(path: &Path) -> std::io::Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json).map_err(std::io::Error::other)
    }
}

/// Project-level settings that apply to every run; combined with a request
/// and the staged artifact location to produce [`DeploymentSettings`].
#[derive(Debug, Clone)]
pub struct SettingsTemplate {
    pub region: String,
    pub container_image: ImageRef,
    pub instance_type: String,
    pub instance_count: u32,
    pub environment: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

impl SettingsTemplate {
    /// Settings for one run. Request-level extra config overrides the
    /// template environment; serving defaults fill in what neither sets.
    pub fn render(
        &self,
        request: &DeploymentRequest,
        model_data_url: &RemoteUri,
    ) -> DeploymentSettings {
        let mut environment = BTreeMap::from([
            ("SAGEMAKER_PROGRAM".to_string(), DEFAULT_PROGRAM.to_string()),
            (
                "SAGEMAKER_SUBMIT_DIRECTORY".to_string(),
                model_data_url.to_string(),
            ),
        ]);
        environment.extend(self.environment.clone());
        environment.extend(request.extra_config.clone());

        let mut tags = self.tags.clone();
        tags.entry("ManagedBy".to_string())
            .or_insert_with(|| "sagedeploy".to_string());
        tags.entry("ModelName".to_string())
            .or_insert_with(|| request.resource_name.to_string());

        DeploymentSettings {
            aws_region: self.region.clone(),
            model_name: request.resource_name.clone(),
            endpoint_name: request.resource_name.endpoint_name(),
            endpoint_config_name: request.resource_name.endpoint_config_name(),
            model_data_url: model_data_url.clone(),
            bucket_name: request.remote_bucket.clone(),
            container_image: self.container_image.clone(),
            instance_type: self.instance_type.clone(),
            instance_count: self.instance_count,
            environment_variables: environment,
            tags,
        }
    }
}

/// Desired infrastructure: the engine configuration directory and the
/// typed settings it is evaluated with.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    pub working_dir: PathBuf,
    pub settings: DeploymentSettings,
}

impl ResourceGraph {
    pub fn new(working_dir: impl Into<PathBuf>, settings: DeploymentSettings) -> Self {
        Self {
            working_dir: working_dir.into(),
            settings,
        }
    }
}
