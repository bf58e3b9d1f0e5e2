// ABOUTME: Pre-flight checks run before anything is mutated.
// ABOUTME: Required tools must resolve and the credential probe must confirm an identity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreconditionError {
    /// Every missing tool, sorted.
    #[error("missing required tools: {}", .0.join(", "))]
    MissingDependency(Vec<String>),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Locates an executable by name.
pub trait ToolResolver: Send + Sync {
    fn resolve(&self, tool: &str) -> Option<PathBuf>;
}

/// Resolves tools through `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathResolver;

impl ToolResolver for PathResolver {
    fn resolve(&self, tool: &str) -> Option<PathBuf> {
        which::which(tool).ok()
    }
}

/// Identity confirmed by the credential probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    pub user_id: String,
}

#[async_trait]
pub trait CredentialProbe: Send + Sync {
    /// Confirm that usable credentials are configured.
    async fn caller_identity(&self) -> Result<CallerIdentity, PreconditionError>;
}

/// Check tools, then credentials. Read-only.
///
/// Tools are checked first and all missing ones are reported together; the
/// credential probe only runs once every tool resolves.
pub async fn check(
    resolver: &dyn ToolResolver,
    required_tools: &BTreeSet<String>,
    credentials: &dyn CredentialProbe,
) -> Result<CallerIdentity, PreconditionError> {
    let missing: Vec<String> = required_tools
        .iter()
        .filter(|tool| match resolver.resolve(tool) {
            Some(path) => {
                tracing::debug!("Found {} at {}", tool, path.display());
                false
            }
            None => true,
        })
        .cloned()
        .collect();

    if !missing.is_empty() {
        return Err(PreconditionError::MissingDependency(missing));
    }

    let identity = credentials.caller_identity().await?;
    tracing::info!("Authenticated as {} (account {})", identity.arn, identity.account);
    Ok(identity)
}
