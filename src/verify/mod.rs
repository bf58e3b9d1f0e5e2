// ABOUTME: Best-effort smoke test of a deployed endpoint.
// ABOUTME: Invokes it once with a fixed sample payload.

use async_trait::async_trait;

pub const DEFAULT_PAYLOAD: &str = r#"{"instances": [[1.0, 2.0, 3.0, 4.0]]}"#;
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationPayload {
    pub body: String,
    pub content_type: String,
}

impl Default for InvocationPayload {
    fn default() -> Self {
        Self {
            body: DEFAULT_PAYLOAD.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("endpoint {endpoint} rejected the request: {message}")]
    Invocation { endpoint: String, message: String },

    #[error("endpoint {endpoint} returned an empty response")]
    EmptyResponse { endpoint: String },
}

#[async_trait]
pub trait EndpointInvoker: Send + Sync {
    /// Send `payload` to `endpoint` and return the raw response body.
    async fn invoke(&self, endpoint: &str, payload: &InvocationPayload)
    -> Result<Vec<u8>, VerifyError>;
}

/// Invoke `endpoint` once and return the response as text.
pub async fn verify_endpoint(
    invoker: &dyn EndpointInvoker,
    endpoint: &str,
    payload: &InvocationPayload,
) -> Result<String, VerifyError> {
    tracing::info!("Invoking {} with sample payload", endpoint);
    let body = invoker.invoke(endpoint, payload).await?;
    if body.is_empty() {
        return Err(VerifyError::EmptyResponse {
            endpoint: endpoint.to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&body).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Replies(Vec<u8>);

    #[async_trait]
    impl EndpointInvoker for Replies {
        async fn invoke(
            &self,
            _endpoint: &str,
            _payload: &InvocationPayload,
        ) -> Result<Vec<u8>, VerifyError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn returns_response_text() {
        let invoker = Replies(b"{\"predictions\": [1]}\n".to_vec());
        let body = verify_endpoint(&invoker, "churn-endpoint", &InvocationPayload::default())
            .await
            .unwrap();
        assert_eq!(body, "{\"predictions\": [1]}");
    }

    #[tokio::test]
    async fn empty_response_is_an_error() {
        let invoker = Replies(Vec::new());
        let err = verify_endpoint(&invoker, "churn-endpoint", &InvocationPayload::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::EmptyResponse { .. }));
    }

    #[test]
    fn default_payload_is_json() {
        let payload = InvocationPayload::default();
        let parsed: serde_json::Value = serde_json::from_str(&payload.body).unwrap();
        assert_eq!(parsed["instances"][0].as_array().map(Vec::len), Some(4));
    }
}
