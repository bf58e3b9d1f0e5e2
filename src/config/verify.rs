// ABOUTME: Smoke-test invocation configuration.
// ABOUTME: The fixed sample payload sent to the endpoint after it is in service.

use serde::Deserialize;

use crate::verify::InvocationPayload;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyConfig {
    #[serde(default = "default_payload")]
    pub payload: String,

    #[serde(default = "default_content_type")]
    pub content_type: String,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            payload: default_payload(),
            content_type: default_content_type(),
        }
    }
}

impl From<&VerifyConfig> for InvocationPayload {
    fn from(config: &VerifyConfig) -> Self {
        InvocationPayload {
            body: config.payload.clone(),
            content_type: config.content_type.clone(),
        }
    }
}

fn default_payload() -> String {
    InvocationPayload::default().body
}

fn default_content_type() -> String {
    InvocationPayload::default().content_type
}
