// ABOUTME: Object-store locations: a key within a bucket and its s3:// URI.
// ABOUTME: Parses and formats fully-qualified artifact references.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use super::{BucketName, BucketNameError};

const SCHEME: &str = "s3://";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseRemoteUriError {
    #[error("remote URI must start with {SCHEME}: {0}")]
    MissingScheme(String),

    #[error("remote URI has no object key: {0}")]
    MissingKey(String),

    #[error("invalid bucket in remote URI: {0}")]
    Bucket(#[from] BucketNameError),
}

/// Object key within a bucket, e.g. `models/churn.tar.gz`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteKey(String);

impl RemoteKey {
    /// Build a key, stripping leading slashes. Returns `None` for an empty key.
    pub fn new(value: &str) -> Option<Self> {
        let trimmed = value.trim_start_matches('/');
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    /// Conventional location of a packaged model: `models/<archive>`.
    pub fn for_model_archive(archive_name: &str) -> Self {
        Self(format!("models/{archive_name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key prefix up to and including the last `/`, or empty.
    pub fn prefix(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..=idx],
            None => "",
        }
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fully-qualified reference to an object: `s3://bucket/key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteUri {
    bucket: BucketName,
    key: RemoteKey,
}

impl RemoteUri {
    pub fn new(bucket: BucketName, key: RemoteKey) -> Self {
        Self { bucket, key }
    }

    pub fn parse(input: &str) -> Result<Self, ParseRemoteUriError> {
        let rest = input
            .trim()
            .strip_prefix(SCHEME)
            .ok_or_else(|| ParseRemoteUriError::MissingScheme(input.to_string()))?;

        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| ParseRemoteUriError::MissingKey(input.to_string()))?;

        let key =
            RemoteKey::new(key).ok_or_else(|| ParseRemoteUriError::MissingKey(input.to_string()))?;

        Ok(Self {
            bucket: BucketName::new(bucket)?,
            key,
        })
    }

    pub fn bucket(&self) -> &BucketName {
        &self.bucket
    }

    pub fn key(&self) -> &RemoteKey {
        &self.key
    }
}

impl fmt::Display for RemoteUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}/{}", self.bucket, self.key)
    }
}

impl Serialize for RemoteUri {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RemoteUri {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
