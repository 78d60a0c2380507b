use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_bedrockruntime::{
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::converse::ConverseError,
    types::{ContentBlock, ConversationRole, InferenceConfiguration, Message},
    Client,
};
use tracing::debug;

use super::{ConversationMessage, ConverseRequest, InferenceConfig, ModelClient, ModelError, Role};

/// Client for the Bedrock Runtime `Converse` API signing its requests with AWS credentials.
///
/// ```no_run
/// # async fn client() {
/// use std::time::Duration;
/// use factstream::{aws, enrich::BedrockClient};
///
/// let config = aws::config_loader("us-east-1", None, Duration::from_secs(30))
///     .load()
///     .await;
/// let client = BedrockClient::new(&config, "anthropic.claude-3-haiku-20240307-v1:0");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BedrockClient {
    client: Client,
    model_id: String,
}

impl BedrockClient {
    /// Create a client invoking `model_id` with the given AWS configuration
    pub fn new(config: &SdkConfig, model_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(config),
            model_id: model_id.into(),
        }
    }
}

fn message(message: &ConversationMessage) -> Result<Message, ModelError> {
    let role = match message.role {
        Role::User => ConversationRole::User,
        Role::Assistant => ConversationRole::Assistant,
    };
    let content = message
        .content
        .iter()
        .filter_map(|block| block.text.clone())
        .map(ContentBlock::Text)
        .collect();
    Message::builder()
        .role(role)
        .set_content(Some(content))
        .build()
        .map_err(ModelError::from_error)
}

fn inference_configuration(config: &InferenceConfig) -> InferenceConfiguration {
    InferenceConfiguration::builder()
        .max_tokens(i32::try_from(config.max_tokens).unwrap_or(i32::MAX))
        .temperature(config.temperature as f32)
        .top_p(config.top_p as f32)
        .build()
}

fn model_error(err: SdkError<ConverseError>) -> ModelError {
    match err {
        SdkError::ServiceError(context) => {
            let status = context.raw().status().as_u16();
            ModelError::Status {
                status,
                message: context.err().message().unwrap_or_default().to_owned(),
            }
        }
        err => ModelError::Sdk(DisplayErrorContext(&err).to_string()),
    }
}

#[async_trait]
impl ModelClient for BedrockClient {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn converse(&self, request: &ConverseRequest) -> Result<String, ModelError> {
        let messages = request
            .messages
            .iter()
            .map(message)
            .collect::<Result<Vec<_>, _>>()?;
        let response = self
            .client
            .converse()
            .model_id(&self.model_id)
            .set_messages(Some(messages))
            .inference_config(inference_configuration(&request.inference_config))
            .send()
            .await
            .map_err(model_error)?;
        debug!("Model stopped with reason {:?}", response.stop_reason());
        response
            .output()
            .and_then(|output| output.as_message().ok())
            .and_then(|message| message.content().iter().find_map(|block| block.as_text().ok()))
            .filter(|text| !text.is_empty())
            .cloned()
            .ok_or(ModelError::EmptyResponse)
    }
}
