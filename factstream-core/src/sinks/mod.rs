//! Sinks for writing the records of a pipeline
mod stdout;
mod vec_sink;

pub use stdout::StdOutSink;
pub use vec_sink::VecSink;

use async_trait::async_trait;

use crate::types::EnrichedRecord;

/// The terminal destination of a pipeline.
///
/// A failing sink is not recoverable, the pipeline stops once a sink returns an error.
#[async_trait]
pub trait Sink: Send + 'static {
    /// Write a single record
    async fn sink(&mut self, record: EnrichedRecord) -> Result<(), SinkError>;

    /// Write out any records buffered by this sink.
    /// Called once the pipeline stops.
    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[async_trait]
impl Sink for Box<dyn Sink> {
    async fn sink(&mut self, record: EnrichedRecord) -> Result<(), SinkError> {
        self.as_mut().sink(record).await
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.as_mut().flush().await
    }
}

/// Error returned by a sink which failed to write records
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct SinkError(#[from] Box<dyn std::error::Error + Send + Sync>);

impl SinkError {
    /// Wrap the error of a sink implementation
    pub fn from_error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Box::new(err))
    }
}
