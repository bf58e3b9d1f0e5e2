// ABOUTME: Named string outputs exposed by the applied configuration.
// ABOUTME: Endpoint, model, and bucket identifiers consumed after apply.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::process::ToolError;

#[derive(Debug, thiserror::Error)]
pub enum OutputsError {
    #[error("failed to read outputs: {0}")]
    Engine(String),
}

impl From<ToolError> for OutputsError {
    fn from(err: ToolError) -> Self {
        OutputsError::Engine(err.to_string())
    }
}

/// String outputs keyed by output name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentOutputs(BTreeMap<String, String>);

/// One entry of `terraform output -json`.
#[derive(Debug, Deserialize)]
struct RawOutput {
    value: serde_json::Value,
    #[serde(default)]
    sensitive: bool,
}

impl DeploymentOutputs {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self(values)
    }

    /// Parse engine output JSON, keeping non-sensitive string values.
    pub fn from_engine_json(json: &str) -> serde_json::Result<Self> {
        let raw: BTreeMap<String, RawOutput> = serde_json::from_str(json)?;
        let values = raw
            .into_iter()
            .filter(|(_, output)| !output.sensitive)
            .filter_map(|(name, output)| match output.value {
                serde_json::Value::String(s) => Some((name, s)),
                _ => None,
            })
            .collect();
        Ok(Self(values))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn endpoint_name(&self) -> Option<&str> {
        self.get("endpoint_name")
    }

    pub fn endpoint_arn(&self) -> Option<&str> {
        self.get("endpoint_arn")
    }

    pub fn model_name(&self) -> Option<&str> {
        self.get("model_name")
    }

    pub fn bucket_name(&self) -> Option<&str> {
        self.get("bucket_name")
    }

    pub fn bucket_arn(&self) -> Option<&str> {
        self.get("bucket_arn")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
