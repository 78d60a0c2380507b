use std::io::{Stdout, Write};

use async_trait::async_trait;

use super::{Sink, SinkError};
use crate::types::EnrichedRecord;

/// Prints every record as a changelog line: `+I[<seed_time>, <a_number>, <is_valid>, <fun_fact>]`.
///
/// Writes to stdout unless constructed with another writer.
pub struct StdOutSink<W = Stdout> {
    writer: W,
}

impl StdOutSink {
    /// Create a sink printing to stdout
    pub fn new() -> Self {
        Self {
            writer: std::io::stdout(),
        }
    }
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> StdOutSink<W>
where
    W: Write + Send + 'static,
{
    /// Create a sink printing to the given writer
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Take back the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> Sink for StdOutSink<W>
where
    W: Write + Send + 'static,
{
    async fn sink(&mut self, record: EnrichedRecord) -> Result<(), SinkError> {
        writeln!(
            self.writer,
            "+I[{}, {}, {}, {}]",
            record.seed_time_iso(),
            record.a_number,
            record.is_valid,
            record.fun_fact
        )
        .map_err(SinkError::from_error)
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().map_err(SinkError::from_error)
    }
}
