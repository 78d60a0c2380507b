//! Shared helpers for unit tests
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use aws_config::SdkConfig;
use axum::Router;
use chrono::{DateTime, Utc};
use url::Url;

use crate::{
    aws::Credentials,
    catalog::{CatalogError, SchemaProvider},
    enrich::{ConverseRequest, Enricher, ModelClient, ModelError},
    sinks::{Sink, SinkError},
    types::{EnrichedRecord, FieldFormat, FieldSpec, FieldType, Record, Schema},
};

/// Schema of the `random_numbers` table: a timestamp and a number in `[0, 100]`
pub(crate) fn random_numbers_schema() -> Schema {
    Schema::new()
        .with_field(
            "seed_time",
            FieldSpec::new(FieldType::String).with_format(FieldFormat::DateTime),
            true,
        )
        .with_field(
            "a_number",
            FieldSpec::new(FieldType::Integer)
                .with_minimum(0.0)
                .with_maximum(100.0),
            true,
        )
}

/// Create a record from an RFC 3339 timestamp
pub(crate) fn record(seed_time: &str, a_number: i32) -> Record {
    let seed_time = DateTime::parse_from_rfc3339(seed_time).unwrap().with_timezone(&Utc);
    Record::new(seed_time, a_number)
}

/// AWS configuration with static test credentials, pointing every client at `endpoint`
pub(crate) async fn aws_config(endpoint: &str, timeout: Duration) -> SdkConfig {
    crate::aws::config_loader("us-east-1", Some(endpoint.trim_end_matches('/')), timeout)
        .credentials_provider(Credentials::new("test-key", "test-secret", None, None, "test"))
        .load()
        .await
}

/// Serve the router on a random local port and return its base url
pub(crate) async fn serve(router: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    Url::parse(&format!("http://{addr}")).unwrap()
}

/// A schema provider counting how often it is asked
pub(crate) struct CountingProvider {
    schema: Option<Schema>,
    calls: AtomicUsize,
}

impl CountingProvider {
    pub(crate) fn random_numbers() -> Self {
        Self {
            schema: Some(random_numbers_schema()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A provider whose table never exists
    pub(crate) fn failing() -> Self {
        Self {
            schema: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemaProvider for CountingProvider {
    async fn fetch_schema(&self) -> Result<Schema, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.schema.clone().ok_or_else(|| CatalogError::NotFound {
            database: "test_db".to_owned(),
            table: "random_numbers".to_owned(),
        })
    }
}

/// A model always answering with the same text
pub(crate) struct FixedModel {
    model_id: String,
    reply: String,
    last_request: Mutex<Option<ConverseRequest>>,
}

impl FixedModel {
    pub(crate) fn new(model_id: &str, reply: &str) -> Self {
        Self {
            model_id: model_id.to_owned(),
            reply: reply.to_owned(),
            last_request: Mutex::new(None),
        }
    }

    pub(crate) fn last_request(&self) -> Option<ConverseRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for FixedModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn converse(&self, request: &ConverseRequest) -> Result<String, ModelError> {
        *self.last_request.lock().unwrap() = Some(request.clone());
        Ok(self.reply.clone())
    }
}

/// A model answering with the prompt it received
pub(crate) struct EchoModel {
    model_id: String,
}

impl EchoModel {
    pub(crate) fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_owned(),
        }
    }
}

#[async_trait]
impl ModelClient for EchoModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn converse(&self, request: &ConverseRequest) -> Result<String, ModelError> {
        let prompt = request
            .messages
            .iter()
            .flat_map(|msg| msg.content.iter())
            .find_map(|block| block.text.clone())
            .unwrap_or_default();
        // vary latency so out of order completion would be noticed
        let delay = (prompt.len() % 3) as u64;
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        Ok(prompt)
    }
}

/// A model which is never reachable
pub(crate) struct FailingModel {
    model_id: String,
    reason: String,
}

impl FailingModel {
    pub(crate) fn new(model_id: &str, reason: &str) -> Self {
        Self {
            model_id: model_id.to_owned(),
            reason: reason.to_owned(),
        }
    }
}

#[async_trait]
impl ModelClient for FailingModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn converse(&self, _request: &ConverseRequest) -> Result<String, ModelError> {
        Err(ModelError::Status {
            status: 503,
            message: self.reason.clone(),
        })
    }
}

/// A sink rejecting every record
pub(crate) struct FailingSink;

#[async_trait]
impl Sink for FailingSink {
    async fn sink(&mut self, _record: EnrichedRecord) -> Result<(), SinkError> {
        Err(SinkError::from_error(std::io::Error::other("sink is closed")))
    }
}

/// An enricher answering with the prompt
pub(crate) fn echo_enricher() -> Enricher {
    Enricher::new(std::sync::Arc::new(EchoModel::new("echo-model")))
}
