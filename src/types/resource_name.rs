// ABOUTME: Validated name for the deployed model and its endpoint resources.
// ABOUTME: Follows SageMaker naming rules so derived endpoint names stay valid.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Longest name SageMaker accepts for models, endpoint configs and endpoints.
const MAX_LEN: usize = 63;

/// Longest suffix appended when deriving resource names (`-endpoint-config`).
const LONGEST_SUFFIX: usize = "-endpoint-config".len();

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceNameError {
    #[error("resource name cannot be empty")]
    Empty,

    #[error("resource name exceeds maximum length of {0} characters")]
    TooLong(usize),

    #[error("resource name must start with a letter or digit")]
    BadStart,

    #[error("resource name cannot end with a hyphen")]
    EndsWithHyphen,

    #[error("invalid character in resource name: '{0}'")]
    InvalidChar(char),
}

/// Name of the model being deployed.
///
/// Endpoint and endpoint-config names are derived from it by appending a
/// suffix, so the accepted length leaves room for the longest suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceName(String);

impl ResourceName {
    pub fn new(value: &str) -> Result<Self, ResourceNameError> {
        if value.is_empty() {
            return Err(ResourceNameError::Empty);
        }

        let limit = MAX_LEN - LONGEST_SUFFIX;
        if value.len() > limit {
            return Err(ResourceNameError::TooLong(limit));
        }

        if !value.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(ResourceNameError::BadStart);
        }

        if value.ends_with('-') {
            return Err(ResourceNameError::EndsWithHyphen);
        }

        if let Some(c) = value
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '-')
        {
            return Err(ResourceNameError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the serving endpoint for this model.
    pub fn endpoint_name(&self) -> String {
        format!("{}-endpoint", self.0)
    }

    /// Name of the endpoint configuration for this model.
    pub fn endpoint_config_name(&self) -> String {
        format!("{}-endpoint-config", self.0)
    }

    /// File name of the packaged artifact.
    pub fn archive_name(&self) -> String {
        format!("{}.tar.gz", self.0)
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ResourceName {
    type Err = ResourceNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for ResourceName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ResourceName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}
