use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use bon::bon;
use factstream::{
    sinks::{Sink, SinkError},
    types::EnrichedRecord,
};
use kafka_sink_builder::SetAtLeastOneBroker;
use rdkafka::{
    error::KafkaError,
    producer::{BaseProducer, DefaultProducerContext, Producer},
    types::RDKafkaErrorCode,
    ClientConfig,
};
use thiserror::Error;
use tracing::debug;

use crate::KafkaRecord;

/// Writes enriched records to a Kafka topic as JSON.
///
/// Records are keyed by the value of the partition field and buffered until
/// `batch_max_size` records are collected or the sink is flushed.
pub struct KafkaSink {
    producer: BaseProducer<DefaultProducerContext>,
    topic: String,
    partition_field: String,
    batch_max_size: usize,
    flush_timeout: Duration,
    batch: Vec<KafkaRecord>,
}

#[bon]
impl KafkaSink {
    #[builder]
    #[builder(on(String, into))]
    pub fn new(
        #[builder(field)] kafka_config: HashMap<String, String>,
        #[builder(field)] brokers: Vec<String>,
        /// this is a workaround to check if at least one broker was provided
        #[builder(overwritable, setters(vis = "", name = "at_least_one_broker"))]
        _at_least_one_broker: (),
        topic: String,
        /// Number of records collected before they are handed to the producer
        #[builder(default = 5)]
        batch_max_size: usize,
        /// Field of the enriched record whose value becomes the message key
        #[builder(default = "a_number".to_owned())]
        partition_field: String,
        /// Maximum time to wait for outstanding messages on flush
        #[builder(default = Duration::from_secs(30))]
        flush_timeout: Duration,
    ) -> Result<Self, KafkaSinkError> {
        let mut kafka_conf = ClientConfig::new();
        for (k, v) in kafka_config.iter() {
            kafka_conf.set(k, v);
        }
        let producer = kafka_conf
            .set("bootstrap.servers", brokers.join(","))
            .create()
            .map_err(KafkaSinkError::CreateProducer)?;
        let batch_max_size = batch_max_size.max(1);
        Ok(Self {
            producer,
            topic,
            partition_field,
            batch_max_size,
            flush_timeout,
            batch: Vec::with_capacity(batch_max_size),
        })
    }
}

impl<S: kafka_sink_builder::State> KafkaSinkBuilder<S> {
    /// Provide an additional config for the Kafka producer.
    /// Note that the `bootstrap.servers` config is ignored,
    /// use [KafkaSinkBuilder::broker] to supply brokers.
    pub fn conf(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.kafka_config.insert(key.into(), value.into());
        self
    }
    /// Add a broker URL to produce records to
    pub fn broker(mut self, url: impl Into<String>) -> KafkaSinkBuilder<SetAtLeastOneBroker<S>> {
        self.brokers.push(url.into());
        self.at_least_one_broker(())
    }
}

impl KafkaSink {
    /// Number of records waiting for the batch to fill up
    pub fn buffered(&self) -> usize {
        self.batch.len()
    }

    fn send_batch(&mut self) -> Result<(), KafkaSinkError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        debug!("Sending batch of {} records to {}", self.batch.len(), self.topic);
        for record in self.batch.drain(..) {
            let mut base_record = record.base_record();
            loop {
                match self.producer.send(base_record) {
                    Ok(()) => break,
                    // local queue is full, serve delivery callbacks to make room
                    Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), rec)) => {
                        base_record = rec;
                        self.producer.poll(Duration::from_millis(100));
                    }
                    Err((e, _)) => return Err(KafkaSinkError::Send(e)),
                }
            }
        }
        self.producer.poll(Duration::ZERO);
        Ok(())
    }
}

#[async_trait]
impl Sink for KafkaSink {
    async fn sink(&mut self, record: EnrichedRecord) -> Result<(), SinkError> {
        let record = KafkaRecord::from_enriched(&self.topic, &record, &self.partition_field)
            .map_err(SinkError::from_error)?;
        self.batch.push(record);
        if self.batch.len() >= self.batch_max_size {
            self.send_batch().map_err(SinkError::from_error)?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.send_batch().map_err(SinkError::from_error)?;
        self.producer
            .flush(self.flush_timeout)
            .map_err(|e| SinkError::from_error(KafkaSinkError::Flush(e)))
    }
}

/// Errors of the Kafka sink
#[derive(Debug, Error)]
pub enum KafkaSinkError {
    #[error("Failed to send message")]
    Send(#[source] KafkaError),
    #[error("Failed to flush outstanding messages")]
    Flush(#[source] KafkaError),
    #[error("Failed to create Kafka Producer")]
    CreateProducer(#[source] KafkaError),
    #[error("Failed to encode record")]
    Encode(#[source] serde_json::Error),
    #[error("Record has no value for partition field `{0}`")]
    MissingPartitionField(String),
}

/// Doctests to assert some bad builders do not compile
/// see: https://stackoverflow.com/a/55327334
/// this should not compile because the broker is missing
/// ```compile_fail
/// use factstream_kafka::KafkaSink;
/// KafkaSink::builder()
/// .topic("facts")
/// .build();
/// ```
/// missing topic
/// ```compile_fail
/// use factstream_kafka::KafkaSink;
/// KafkaSink::builder()
/// .broker("broker.com")
/// .build();
/// ```
struct _CompileTests;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use factstream::types::Record;

    fn sink(batch_max_size: usize) -> KafkaSink {
        KafkaSink::builder()
            .broker("localhost:1")
            .topic("facts")
            .batch_max_size(batch_max_size)
            .conf("log_level", "3")
            .build()
            .unwrap()
    }

    fn enriched(a_number: i32) -> EnrichedRecord {
        EnrichedRecord::new(Record::new(Utc::now(), a_number), true, "fact".to_owned())
    }

    #[test]
    fn test_sink_builder() {
        let _sink = KafkaSink::builder()
            .broker("foo.com")
            .broker("bar.com")
            .topic("facts")
            .partition_field("seed_time")
            .conf("log_level", "3")
            .build()
            .unwrap();
    }

    #[tokio::test]
    async fn buffers_until_batch_is_full() {
        let mut sink = sink(3);
        sink.sink(enriched(1)).await.unwrap();
        sink.sink(enriched(2)).await.unwrap();
        assert_eq!(sink.buffered(), 2);
        // third record completes the batch which is handed to the producer
        sink.sink(enriched(3)).await.unwrap();
        assert_eq!(sink.buffered(), 0);
        assert_eq!(sink.producer.in_flight_count(), 3);
    }

    #[tokio::test]
    async fn unknown_partition_field_is_an_error() {
        let mut sink = KafkaSink::builder()
            .broker("localhost:1")
            .topic("facts")
            .partition_field("colour")
            .conf("log_level", "3")
            .build()
            .unwrap();
        assert!(sink.sink(enriched(1)).await.is_err());
    }
}
