use factstream::types::EnrichedRecord;
use rdkafka::producer::BaseRecord;

use crate::KafkaSinkError;

/// A single record as sent to Kafka
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaRecord {
    /// Topic the record is produced to
    pub topic: String,
    /// JSON encoded enriched record
    pub payload: Vec<u8>,
    /// Partition key, records with the same key land on the same partition
    pub key: Vec<u8>,
    /// Milliseconds since the epoch
    pub timestamp: i64,
}

impl KafkaRecord {
    /// Encode an enriched record, keyed by the value of `partition_field`
    pub fn from_enriched(
        topic: &str,
        record: &EnrichedRecord,
        partition_field: &str,
    ) -> Result<Self, KafkaSinkError> {
        let (payload, key) = record
            .to_keyed_json(partition_field)
            .map_err(KafkaSinkError::Encode)?;
        let key = key
            .ok_or_else(|| KafkaSinkError::MissingPartitionField(partition_field.to_owned()))?;
        Ok(Self {
            topic: topic.to_owned(),
            payload,
            key: key.into_bytes(),
            timestamp: record.seed_time.timestamp_millis(),
        })
    }

    pub(crate) fn base_record(&self) -> BaseRecord<'_, Vec<u8>, Vec<u8>> {
        BaseRecord::to(&self.topic)
            .payload(&self.payload)
            .key(&self.key)
            .timestamp(self.timestamp)
    }
}
