use std::time::Duration;

use async_trait::async_trait;
use bon::bon;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{ConversationMessage, ConverseRequest, ModelClient, ModelError};

/// Client for the Bedrock Runtime `Converse` API authenticated with a Bedrock API key.
///
/// Requests go to `<endpoint>/model/<model-id>/converse` with the key as bearer token.
/// Use [BedrockClient](super::BedrockClient) to sign requests with AWS credentials instead.
///
/// ```
/// use factstream::enrich::ConverseClient;
///
/// let client = ConverseClient::builder()
///     .model_id("anthropic.claude-3-haiku-20240307-v1:0")
///     .region("us-east-1")
///     .build()
///     .unwrap();
/// ```
pub struct ConverseClient {
    http: reqwest::Client,
    url: Url,
    model_id: String,
    api_key: Option<String>,
}

#[bon]
impl ConverseClient {
    #[builder(on(String, into))]
    pub fn new(
        model_id: String,
        region: String,
        /// Override the regional endpoint, e.g. for a VPC endpoint or a local mock
        endpoint: Option<String>,
        api_key: Option<String>,
        /// Timeout for a single model invocation
        #[builder(default = Duration::from_secs(30))]
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let endpoint =
            endpoint.unwrap_or_else(|| format!("https://bedrock-runtime.{region}.amazonaws.com"));
        let mut url = Url::parse(&endpoint).map_err(|_| ModelError::Endpoint(endpoint.clone()))?;
        url.path_segments_mut()
            .map_err(|_| ModelError::Endpoint(endpoint.clone()))?
            .pop_if_empty()
            .extend(["model", model_id.as_str(), "converse"]);
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url,
            model_id,
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct ConverseResponse {
    output: ConverseOutput,
}

#[derive(Deserialize)]
struct ConverseOutput {
    message: Option<ConversationMessage>,
}

#[derive(Deserialize, Default)]
struct ServiceError {
    #[serde(alias = "Message", default)]
    message: String,
}

#[async_trait]
impl ModelClient for ConverseClient {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn converse(&self, request: &ConverseRequest) -> Result<String, ModelError> {
        let mut builder = self.http.post(self.url.clone()).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error: ServiceError = response.json().await.unwrap_or_default();
            debug!("Model invocation failed with status {status}");
            return Err(ModelError::Status {
                status: status.as_u16(),
                message: error.message,
            });
        }
        let body: ConverseResponse = response.json().await?;
        body.output
            .message
            .and_then(|msg| msg.content.into_iter().find_map(|block| block.text))
            .filter(|text| !text.is_empty())
            .ok_or(ModelError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrich::{Enricher, InferenceConfig};
    use crate::testing::serve;
    use axum::{
        extract::Path,
        http::{HeaderMap, StatusCode},
        routing::post,
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::sync::Arc;

    const MODEL_ID: &str = "anthropic.claude-3-haiku-20240307-v1:0";

    async fn converse(
        Path(model_id): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        if headers.get("authorization").is_none() {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({"message": "Missing Authentication Token"})),
            );
        }
        assert_eq!(model_id, MODEL_ID);
        assert_eq!(body["inferenceConfig"]["maxTokens"], 512);
        let prompt = body["messages"][0]["content"][0]["text"].as_str().unwrap();
        let number = prompt.trim_end_matches('\'').rsplit('\'').next().unwrap();
        (
            StatusCode::OK,
            Json(json!({
                "output": {"message": {
                    "role": "assistant",
                    "content": [{"text": format!("{number} is a number.")}]
                }},
                "stopReason": "end_turn"
            })),
        )
    }

    fn client(endpoint: &Url, api_key: Option<&str>) -> ConverseClient {
        ConverseClient::builder()
            .model_id(MODEL_ID)
            .region("us-east-1")
            .endpoint(endpoint.to_string())
            .maybe_api_key(api_key.map(str::to_owned))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn converses_with_model() {
        let endpoint = serve(Router::new().route("/model/:model_id/converse", post(converse))).await;
        let client = client(&endpoint, Some("secret"));
        let request = ConverseRequest::single_turn(Enricher::prompt(7), InferenceConfig::default());
        assert_eq!(client.converse(&request).await.unwrap(), "7 is a number.");
    }

    #[tokio::test]
    async fn error_status_carries_service_message() {
        let endpoint = serve(Router::new().route("/model/:model_id/converse", post(converse))).await;
        let enricher = Enricher::new(Arc::new(client(&endpoint, None)));
        assert_eq!(
            enricher.enrich(7).await,
            format!(
                "ERROR: Can't invoke {MODEL_ID}  Reason: Missing Authentication Token (status 403)"
            )
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_becomes_error_text() {
        let endpoint = Url::parse("http://127.0.0.1:1").unwrap();
        let enricher = Enricher::new(Arc::new(client(&endpoint, None)));
        let text = enricher.enrich(7).await;
        assert!(text.starts_with(&format!("ERROR: Can't invoke {MODEL_ID}  Reason: ")));
    }

    #[test]
    fn builds_regional_url() {
        let client = ConverseClient::builder()
            .model_id(MODEL_ID)
            .region("eu-central-1")
            .build()
            .unwrap();
        assert_eq!(
            client.url.as_str(),
            "https://bedrock-runtime.eu-central-1.amazonaws.com/model/\
             anthropic.claude-3-haiku-20240307-v1:0/converse"
        );
    }

    #[test]
    fn rejects_invalid_endpoint() {
        let result = ConverseClient::builder()
            .model_id(MODEL_ID)
            .region("eu-central-1")
            .endpoint("not a url".to_owned())
            .build();
        assert!(matches!(result, Err(ModelError::Endpoint(_))));
    }
}
