//! Sources producing the records of a pipeline
mod datagen;
mod iterator;

pub use datagen::{DataGenError, DataGenSource};
pub use iterator::IteratorSource;

use crate::types::Record;

/// A source of records.
///
/// Sources are polled by the pipeline and must not block: if no record is ready yet,
/// `poll` returns `None` and the pipeline polls again a short while later.
pub trait Source: Send + 'static {
    /// Poll this source, return the next record if one is ready
    fn poll(&mut self) -> Option<Record>;

    /// Return true if this source is exhausted and will never yield another record
    fn is_finished(&mut self) -> bool;
}

impl Source for Box<dyn Source> {
    fn poll(&mut self) -> Option<Record> {
        self.as_mut().poll()
    }

    fn is_finished(&mut self) -> bool {
        self.as_mut().is_finished()
    }
}
