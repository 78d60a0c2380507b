use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_kinesis::{
    error::{BuildError, SdkError},
    operation::put_records::PutRecordsError,
    primitives::Blob,
    types::PutRecordsRequestEntry,
    Client,
};
use bon::bon;
use factstream::{
    sinks::{Sink, SinkError},
    types::EnrichedRecord,
};
use kinesis_sink_builder::{IsUnset, SetClient, State};
use thiserror::Error;
use tracing::debug;

/// Most records a single `PutRecords` request may carry
pub const MAX_BATCH_SIZE: usize = 500;

/// Writes enriched records to a Kinesis data stream as JSON.
///
/// Records are partitioned by the value of the partition field and buffered until
/// `batch_max_size` records are collected or the sink is flushed. A batch is sent with a
/// single `PutRecords` request, rejected records fail the sink.
///
/// ```no_run
/// # async fn sink() {
/// use std::time::Duration;
/// use factstream::aws;
/// use factstream_kinesis::KinesisSink;
///
/// let config = aws::config_loader("us-east-1", None, Duration::from_secs(30))
///     .load()
///     .await;
/// let sink = KinesisSink::builder()
///     .sdk_config(&config)
///     .stream_name("facts")
///     .build();
/// # }
/// ```
pub struct KinesisSink {
    client: Client,
    stream_name: String,
    partition_field: String,
    batch_max_size: usize,
    batch: Vec<PutRecordsRequestEntry>,
}

#[bon]
impl KinesisSink {
    /// Create a sink writing to `stream_name`
    #[builder(on(String, into))]
    pub fn new(
        client: Client,
        stream_name: String,
        /// Number of records sent with a single request, at most [MAX_BATCH_SIZE]
        #[builder(default = 5)]
        batch_max_size: usize,
        /// Field of the enriched record whose value becomes the partition key
        #[builder(default = "a_number".to_owned())]
        partition_field: String,
    ) -> Self {
        let batch_max_size = batch_max_size.clamp(1, MAX_BATCH_SIZE);
        Self {
            client,
            stream_name,
            partition_field,
            batch_max_size,
            batch: Vec::with_capacity(batch_max_size),
        }
    }
}

impl<S: State> KinesisSinkBuilder<S> {
    /// Create the Kinesis client from a loaded AWS configuration
    pub fn sdk_config(self, config: &SdkConfig) -> KinesisSinkBuilder<SetClient<S>>
    where
        S::Client: IsUnset,
    {
        self.client(Client::new(config))
    }
}

impl KinesisSink {
    /// Number of records waiting for the batch to fill up
    pub fn buffered(&self) -> usize {
        self.batch.len()
    }

    fn entry(&self, record: &EnrichedRecord) -> Result<PutRecordsRequestEntry, KinesisSinkError> {
        let (payload, key) = record
            .to_keyed_json(&self.partition_field)
            .map_err(KinesisSinkError::Encode)?;
        let key =
            key.ok_or_else(|| KinesisSinkError::MissingPartitionField(self.partition_field.clone()))?;
        PutRecordsRequestEntry::builder()
            .data(Blob::new(payload))
            .partition_key(key)
            .build()
            .map_err(KinesisSinkError::Entry)
    }

    async fn send_batch(&mut self) -> Result<(), KinesisSinkError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let records = std::mem::take(&mut self.batch);
        let total = records.len();
        debug!("Sending batch of {total} records to {}", self.stream_name);
        let output = self
            .client
            .put_records()
            .stream_name(&self.stream_name)
            .set_records(Some(records))
            .send()
            .await
            .map_err(|source| KinesisSinkError::PutRecords {
                stream: self.stream_name.clone(),
                source,
            })?;

        let failed = output.failed_record_count().unwrap_or_default();
        if failed > 0 {
            let code = output
                .records()
                .iter()
                .find_map(|entry| entry.error_code())
                .unwrap_or("unknown");
            return Err(KinesisSinkError::Rejected {
                stream: self.stream_name.clone(),
                failed,
                total,
                code: code.to_owned(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for KinesisSink {
    async fn sink(&mut self, record: EnrichedRecord) -> Result<(), SinkError> {
        let entry = self.entry(&record).map_err(SinkError::from_error)?;
        self.batch.push(entry);
        if self.batch.len() >= self.batch_max_size {
            self.send_batch().await.map_err(SinkError::from_error)?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.send_batch().await.map_err(SinkError::from_error)
    }
}

/// Errors of the Kinesis sink
#[derive(Debug, Error)]
pub enum KinesisSinkError {
    #[error("Failed to put records to stream `{stream}`")]
    PutRecords {
        stream: String,
        #[source]
        source: SdkError<PutRecordsError>,
    },
    #[error("Stream `{stream}` rejected {failed} of {total} records: {code}")]
    Rejected {
        stream: String,
        failed: i32,
        total: usize,
        code: String,
    },
    #[error("Failed to encode record")]
    Encode(#[source] serde_json::Error),
    #[error("Record has no value for partition field `{0}`")]
    MissingPartitionField(String),
    #[error("Invalid stream record")]
    Entry(#[source] BuildError),
}

/// missing stream name
/// ```compile_fail
/// use factstream_kinesis::KinesisSink;
/// # async fn sink(config: aws_config::SdkConfig) {
/// KinesisSink::builder()
/// .sdk_config(&config)
/// .build();
/// # }
/// ```
struct _CompileTests;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use chrono::Utc;
    use factstream::{aws, types::Record};
    use serde_json::{json, Value};
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    async fn config(endpoint: &str) -> SdkConfig {
        aws::config_loader("us-east-1", Some(endpoint), Duration::from_secs(2))
            .credentials_provider(aws::Credentials::new(
                "test-key",
                "test-secret",
                None,
                None,
                "test",
            ))
            .load()
            .await
    }

    #[derive(Clone, Default)]
    struct MockStream {
        reject: bool,
        /// Partition keys of every request
        requests: Arc<Mutex<Vec<Vec<String>>>>,
    }

    async fn put_records(
        State(stream): State<MockStream>,
        headers: HeaderMap,
        body: String,
    ) -> Json<Value> {
        assert_eq!(headers["x-amz-target"], "Kinesis_20131202.PutRecords");
        assert!(headers.contains_key("authorization"));
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["StreamName"], "facts");
        let keys: Vec<String> = body["Records"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["PartitionKey"].as_str().unwrap().to_owned())
            .collect();
        let mut results: Vec<Value> = keys
            .iter()
            .map(|_| json!({"SequenceNumber": "1", "ShardId": "shardId-000000000000"}))
            .collect();
        if stream.reject {
            results[0] = json!({
                "ErrorCode": "ProvisionedThroughputExceededException",
                "ErrorMessage": "Rate exceeded"
            });
        }
        stream.requests.lock().unwrap().push(keys);
        Json(json!({"FailedRecordCount": i32::from(stream.reject), "Records": results}))
    }

    async fn serve(stream: MockStream) -> String {
        let router = Router::new()
            .route("/", post(put_records))
            .with_state(stream);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        format!("http://{addr}")
    }

    async fn sink(endpoint: &str, batch_max_size: usize) -> KinesisSink {
        KinesisSink::builder()
            .sdk_config(&config(endpoint).await)
            .stream_name("facts")
            .batch_max_size(batch_max_size)
            .build()
    }

    fn enriched(a_number: i32) -> EnrichedRecord {
        EnrichedRecord::new(Record::new(Utc::now(), a_number), true, "fact".to_owned())
    }

    #[tokio::test]
    async fn sends_full_batches_keyed_by_partition_field() {
        let stream = MockStream::default();
        let mut sink = sink(&serve(stream.clone()).await, 2).await;
        for i in 1..=3 {
            sink.sink(enriched(i)).await.unwrap();
        }
        assert_eq!(sink.buffered(), 1);
        assert_eq!(*stream.requests.lock().unwrap(), vec![vec!["1", "2"]]);

        sink.flush().await.unwrap();
        assert_eq!(sink.buffered(), 0);
        assert_eq!(stream.requests.lock().unwrap()[1], vec!["3"]);
    }

    #[tokio::test]
    async fn rejected_records_fail_the_sink() {
        let stream = MockStream {
            reject: true,
            ..Default::default()
        };
        let mut sink = sink(&serve(stream).await, 5).await;
        sink.sink(enriched(1)).await.unwrap();
        let err = sink.flush().await.unwrap_err();
        assert!(err.to_string().contains("ProvisionedThroughputExceededException"));
    }

    #[tokio::test]
    async fn unreachable_stream_fails_the_sink() {
        let mut sink = sink("http://127.0.0.1:1", 2).await;
        sink.sink(enriched(1)).await.unwrap();
        assert_eq!(sink.buffered(), 1);
        assert!(sink.sink(enriched(2)).await.is_err());
    }

    #[tokio::test]
    async fn flushing_nothing_sends_nothing() {
        let stream = MockStream::default();
        let mut sink = sink(&serve(stream.clone()).await, 5).await;
        sink.flush().await.unwrap();
        assert!(stream.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_partition_field_is_an_error() {
        let mut sink = KinesisSink::builder()
            .sdk_config(&config("http://127.0.0.1:1").await)
            .stream_name("facts")
            .partition_field("colour")
            .build();
        assert!(sink.sink(enriched(1)).await.is_err());
    }

    #[tokio::test]
    async fn batch_size_is_limited() {
        let sink = sink("http://127.0.0.1:1", 10_000).await;
        assert_eq!(sink.batch_max_size, MAX_BATCH_SIZE);
    }
}
