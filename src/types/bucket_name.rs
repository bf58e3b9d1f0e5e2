// ABOUTME: S3 bucket name validation.
// ABOUTME: Rejects names the object store would refuse before anything is uploaded.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BucketNameError {
    #[error("bucket name must be between 3 and 63 characters")]
    BadLength,

    #[error("invalid character in bucket name: '{0}'")]
    InvalidChar(char),

    #[error("bucket name must start and end with a lowercase letter or digit")]
    BadEdge,

    #[error("bucket name cannot contain consecutive dots")]
    ConsecutiveDots,

    #[error("bucket name cannot be formatted as an IP address")]
    IpAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketName(String);

impl BucketName {
    pub fn new(value: &str) -> Result<Self, BucketNameError> {
        if !(3..=63).contains(&value.len()) {
            return Err(BucketNameError::BadLength);
        }

        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '.' || *c == '-'))
        {
            return Err(BucketNameError::InvalidChar(c));
        }

        let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        if !edge_ok(value.chars().next()) || !edge_ok(value.chars().last()) {
            return Err(BucketNameError::BadEdge);
        }

        if value.contains("..") {
            return Err(BucketNameError::ConsecutiveDots);
        }

        if value.parse::<Ipv4Addr>().is_ok() {
            return Err(BucketNameError::IpAddress);
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BucketName {
    type Err = BucketNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for BucketName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BucketName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}
