use std::{future::Future, sync::Arc, time::Duration};

use aws_config::SdkConfig;
use factstream::{
    aws::{self, Credentials},
    catalog::{CachedSchemaProvider, GlueCatalog},
    enrich::{BedrockClient, ConverseClient, Enricher, ModelClient, ModelError},
    pipeline::{Pipeline, PipelineError, PipelineSummary},
    sinks::{Sink, StdOutSink},
    sources::{DataGenError, DataGenSource},
};
use factstream_kafka::{KafkaSink, KafkaSinkError};
use factstream_kinesis::KinesisSink;
use thiserror::Error;
use tracing::info;

use crate::config::{
    BedrockConfig, CatalogConfig, ConfigError, Connector, JobConfig, OutputStreamConfig,
};

/// Timeout of a single request to an AWS service
const AWS_TIMEOUT: Duration = Duration::from_secs(30);

/// Wire up the pipeline described by `config` and run it until the source is exhausted
/// or `shutdown` resolves.
///
/// AWS requests are signed with `credentials`, or with credentials from the default
/// provider chain if none are given.
pub async fn run<F>(
    config: JobConfig,
    bedrock_api_key: Option<String>,
    credentials: Option<Credentials>,
    shutdown: F,
) -> Result<PipelineSummary, JobError>
where
    F: Future<Output = ()>,
{
    info!(
        "Output stream {} in {} via {} connector",
        config.output.stream_name, config.output.region, config.output.connector
    );

    let catalog = CachedSchemaProvider::new(glue_catalog(&config.catalog, &credentials).await);
    let client = model_client(config.bedrock, bedrock_api_key, &credentials).await?;
    let source = DataGenSource::builder()
        .rows_per_second(config.datagen.rows_per_second)
        .min(config.datagen.min)
        .max(config.datagen.max)
        .maybe_number_of_rows(config.datagen.number_of_rows)
        .build()?;

    let mut pipeline = Pipeline::builder()
        .source(Box::new(source))
        .sink(output_sink(&config.output, &credentials).await?)
        .enricher(Enricher::new(client))
        .parallelism(config.parallelism)
        .build();
    pipeline.configure(&catalog).await?;
    Ok(pipeline.run_until(shutdown).await?)
}

async fn aws_config(
    region: &str,
    endpoint: Option<&str>,
    credentials: &Option<Credentials>,
) -> SdkConfig {
    let loader = aws::config_loader(region, endpoint, AWS_TIMEOUT);
    match credentials {
        Some(credentials) => loader.credentials_provider(credentials.clone()),
        None => loader,
    }
    .load()
    .await
}

async fn glue_catalog(config: &CatalogConfig, credentials: &Option<Credentials>) -> GlueCatalog {
    info!(
        "Schema of {}.{} from the catalog in {}",
        config.database, config.table, config.region
    );
    let sdk_config = aws_config(&config.region, config.endpoint.as_deref(), credentials).await;
    let mut builder = GlueCatalog::builder();
    for (column, bounds) in &config.bounds {
        builder = builder.bounds(column.clone(), *bounds);
    }
    builder
        .sdk_config(&sdk_config)
        .database(config.database.clone())
        .table(config.table.clone())
        .build()
}

async fn model_client(
    config: BedrockConfig,
    api_key: Option<String>,
    credentials: &Option<Credentials>,
) -> Result<Arc<dyn ModelClient>, JobError> {
    info!(
        "Enriching with model {} in {}",
        config.model_id, config.region
    );
    match api_key {
        Some(api_key) => {
            info!("Authenticating with Bedrock API key");
            let client = ConverseClient::builder()
                .model_id(config.model_id)
                .region(config.region)
                .maybe_endpoint(config.endpoint)
                .api_key(api_key)
                .timeout(AWS_TIMEOUT)
                .build()?;
            Ok(Arc::new(client))
        }
        None => {
            let sdk_config =
                aws_config(&config.region, config.endpoint.as_deref(), credentials).await;
            Ok(Arc::new(BedrockClient::new(&sdk_config, config.model_id)))
        }
    }
}

async fn output_sink(
    config: &OutputStreamConfig,
    credentials: &Option<Credentials>,
) -> Result<Box<dyn Sink>, JobError> {
    match config.connector {
        Connector::Print => Ok(Box::new(StdOutSink::new())),
        Connector::Kinesis => {
            let sdk_config =
                aws_config(&config.region, config.endpoint.as_deref(), credentials).await;
            let sink = KinesisSink::builder()
                .sdk_config(&sdk_config)
                .stream_name(config.stream_name.clone())
                .batch_max_size(config.batch_max_size)
                .partition_field(config.partition_field.clone())
                .build();
            Ok(Box::new(sink))
        }
        Connector::Kafka => {
            if config.bootstrap_servers.is_empty() {
                return Err(JobError::NoBrokers);
            }
            let sink = KafkaSink::builder()
                .broker(config.bootstrap_servers.join(","))
                .topic(config.stream_name.clone())
                .batch_max_size(config.batch_max_size)
                .partition_field(config.partition_field.clone())
                .conf("client.id", "factstream")
                .build()?;
            Ok(Box::new(sink))
        }
    }
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Failed to create model client")]
    Model(#[from] ModelError),
    #[error("Invalid data generator settings")]
    DataGen(#[from] DataGenError),
    #[error("Failed to create Kafka sink")]
    Kafka(#[from] KafkaSinkError),
    #[error("Pipeline failed")]
    Pipeline(#[from] PipelineError),
    #[error("No bootstrap servers configured for the kafka connector")]
    NoBrokers,
}
