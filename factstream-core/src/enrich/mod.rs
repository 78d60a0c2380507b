//! Enrichment of records with text generated by a language model.
//!
//! Enrichment never fails: if the model can not be invoked, the derived text is a message
//! starting with [ERROR_PREFIX] which names the model and the cause. This keeps the stream
//! flowing during model outages, at the cost of records carrying error text.
use std::{error::Error, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

mod bedrock;
mod converse;

pub use bedrock::BedrockClient;
pub use converse::ConverseClient;

/// Prefix of the text produced when enrichment failed
pub const ERROR_PREFIX: &str = "ERROR:";

/// Returns true if the text is the result of a failed enrichment
pub fn is_error_text(text: &str) -> bool {
    text.starts_with(ERROR_PREFIX)
}

/// Inference parameters sent along with every request
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    /// Maximum number of tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f64,
    /// Nucleus sampling probability mass
    pub top_p: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.5,
            top_p: 0.9,
        }
    }
}

/// Author of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message written by the caller
    User,
    /// Message generated by the model
    Assistant,
}

/// A block of message content. Only text content is of interest here, other kinds of
/// blocks deserialize with `text` unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Text of this block, if it is a text block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A single message of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Who wrote the message
    pub role: Role,
    /// Content of the message
    pub content: Vec<ContentBlock>,
}

/// A request to a conversational model
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConverseRequest {
    /// The conversation so far
    pub messages: Vec<ConversationMessage>,
    /// Inference parameters
    pub inference_config: InferenceConfig,
}

impl ConverseRequest {
    /// A conversation consisting of a single user message
    pub fn single_turn(text: impl Into<String>, inference_config: InferenceConfig) -> Self {
        Self {
            messages: vec![ConversationMessage {
                role: Role::User,
                content: vec![ContentBlock {
                    text: Some(text.into()),
                }],
            }],
            inference_config,
        }
    }
}

/// Errors which can occur invoking a model
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message} (status {status})")]
    Status { status: u16, message: String },
    #[error("model response contained no text")]
    EmptyResponse,
    #[error("{0}")]
    Sdk(String),
    #[error("invalid model endpoint `{0}`")]
    Endpoint(String),
    #[error(transparent)]
    Client(Box<dyn Error + Send + Sync>),
}

impl ModelError {
    /// Wrap an error of any other model client
    pub fn from_error<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::Client(Box::new(err))
    }
}

/// A client able to invoke a conversational model
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Identifier of the invoked model
    fn model_id(&self) -> &str;

    /// Send the conversation to the model and return the generated text
    async fn converse(&self, request: &ConverseRequest) -> Result<String, ModelError>;
}

/// Derives a "fun fact" text from a number by asking a model.
///
/// Clones share the same client.
#[derive(Clone)]
pub struct Enricher {
    client: Arc<dyn ModelClient>,
    inference: InferenceConfig,
}

impl Enricher {
    /// Create an enricher using the default [InferenceConfig]
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            inference: InferenceConfig::default(),
        }
    }

    /// Use different inference parameters
    pub fn with_inference(mut self, inference: InferenceConfig) -> Self {
        self.inference = inference;
        self
    }

    /// Identifier of the model used for enrichment
    pub fn model_id(&self) -> &str {
        self.client.model_id()
    }

    /// The prompt sent for a value
    pub fn prompt(value: i64) -> String {
        format!("Give me a fun fact about the number '{value}'")
    }

    /// Generate the text for a value.
    ///
    /// Returns the generated text, or `ERROR: Can't invoke <model-id>  Reason: <cause>` if the
    /// model could not be invoked. The result is never empty.
    pub async fn enrich(&self, value: i64) -> String {
        let request = ConverseRequest::single_turn(Self::prompt(value), self.inference);
        match self.client.converse(&request).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => self.error_text(&ModelError::EmptyResponse),
            Err(e) => self.error_text(&e),
        }
    }

    fn error_text(&self, cause: &ModelError) -> String {
        let text = format!(
            "{ERROR_PREFIX} Can't invoke {}  Reason: {cause}",
            self.model_id()
        );
        warn!("{text}");
        text
    }
}
