use std::{
    ops::RangeBounds,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;

use super::{Sink, SinkError};
use crate::types::EnrichedRecord;

/// A Helper to write values into a shared vector and take them out
/// again.
/// This is mainly useful to extract records from a pipeline in tests.
/// This struct uses an Arc<Mutex<Vec<T>> internally, so it can be freely
/// cloned
#[derive(Clone)]
pub struct VecSink<T> {
    inner: Arc<Mutex<Vec<T>>>,
}
impl<T> Default for VecSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> VecSink<T> {
    /// Create a new sink which collects all values into a `Vec`
    pub fn new() -> Self {
        VecSink {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Put a value into this sink
    pub fn give(&self, value: T) {
        self.lock().push(value)
    }

    /// Take the given range out of this sink
    pub fn drain_vec<R: RangeBounds<usize>>(&self, range: R) -> Vec<T> {
        self.lock().drain(range).collect()
    }

    /// Number of values currently held
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True if the sink holds no values
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // a panic while pushing can not leave the Vec in an inconsistent state
    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> IntoIterator for VecSink<T> {
    type Item = T;

    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.drain_vec(..).into_iter()
    }
}

#[async_trait]
impl Sink for VecSink<EnrichedRecord> {
    async fn sink(&mut self, record: EnrichedRecord) -> Result<(), SinkError> {
        self.give(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    #[test]
    fn test_vec_collector() {
        let col = VecSink::new();
        let col_a = col.clone();

        for i in 0..5 {
            col.give(i)
        }
        assert_eq!(col.len(), 5);

        // the cloned one should return these values
        let collected = col_a.drain_vec(..);
        assert_eq!(collected, (0..5).collect_vec());
        assert!(col.is_empty());
    }
}
