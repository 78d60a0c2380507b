use std::iter::Peekable;

use super::Source;
use crate::types::Record;

/// A source which yields the records of an iterator, as fast as they are polled.
///
/// # Example
/// ```rust
/// use chrono::Utc;
/// use factstream::sources::{IteratorSource, Source};
/// use factstream::types::Record;
///
/// let mut source = IteratorSource::new((0..3).map(|x| Record::new(Utc::now(), x)));
/// let mut numbers = Vec::new();
/// while let Some(record) = source.poll() {
///     numbers.push(record.a_number);
/// }
/// assert_eq!(numbers, vec![0, 1, 2]);
/// assert!(source.is_finished());
/// ```
pub struct IteratorSource(Peekable<Box<dyn Iterator<Item = Record> + Send>>);

impl IteratorSource {
    /// Create a new source from an iterable value
    pub fn new<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = Record>,
        <I as IntoIterator>::IntoIter: Send + 'static,
    {
        let boxed: Box<dyn Iterator<Item = Record> + Send> = Box::new(iter.into_iter());
        Self(boxed.peekable())
    }
}

impl Source for IteratorSource {
    fn poll(&mut self) -> Option<Record> {
        self.0.next()
    }

    fn is_finished(&mut self) -> bool {
        self.0.peek().is_none()
    }
}
