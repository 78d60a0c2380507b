//! A durable, partitioned and batched Kafka sink for factstream pipelines.
mod record;
mod sink;

pub use record::KafkaRecord;
pub use sink::{KafkaSink, KafkaSinkError};
