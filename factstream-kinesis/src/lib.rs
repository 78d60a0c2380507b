//! A partitioned and batched Kinesis Data Streams sink for factstream pipelines.
mod sink;

pub use sink::{KinesisSink, KinesisSinkError};
