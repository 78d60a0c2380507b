use std::time::{Duration, Instant};

use bon::bon;
use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use thiserror::Error;

use super::Source;
use crate::types::Record;

/// A synthetic source generating records at a fixed rate.
///
/// `seed_time` is the emission time with millisecond precision and never decreases,
/// `a_number` is drawn uniformly from the inclusive range `[min, max]`.
/// Without `number_of_rows` the source is unbounded.
///
/// ```
/// use factstream::sources::{DataGenSource, Source};
///
/// let mut source = DataGenSource::builder()
///     .rows_per_second(1000)
///     .min(0)
///     .max(100)
///     .number_of_rows(10)
///     .build()
///     .unwrap();
/// let mut emitted = 0;
/// while !source.is_finished() {
///     if let Some(record) = source.poll() {
///         assert!((0..=100).contains(&record.a_number));
///         emitted += 1;
///     }
/// }
/// assert_eq!(emitted, 10);
/// ```
pub struct DataGenSource {
    period: Duration,
    min: i32,
    max: i32,
    remaining: Option<u64>,
    rng: StdRng,
    next_emit: Option<Instant>,
    last_seed_time: Option<DateTime<Utc>>,
}

#[bon]
impl DataGenSource {
    #[builder]
    pub fn new(
        #[builder(default = 1)] rows_per_second: u32,
        #[builder(default = 0)] min: i32,
        #[builder(default = 100)] max: i32,
        /// Total number of records to emit, unbounded if unset
        number_of_rows: Option<u64>,
        /// Seed for the random number generator, for reproducible values
        seed: Option<u64>,
    ) -> Result<Self, DataGenError> {
        if rows_per_second == 0 {
            return Err(DataGenError::ZeroRate);
        }
        if min > max {
            return Err(DataGenError::EmptyRange { min, max });
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            period: Duration::from_secs(1) / rows_per_second,
            min,
            max,
            remaining: number_of_rows,
            rng,
            next_emit: None,
            last_seed_time: None,
        })
    }
}

impl DataGenSource {
    fn next_seed_time(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let seed_time = self.last_seed_time.map_or(now, |last| last.max(now));
        self.last_seed_time = Some(seed_time);
        seed_time
    }
}

impl Source for DataGenSource {
    fn poll(&mut self) -> Option<Record> {
        if self.remaining == Some(0) {
            return None;
        }
        let now = Instant::now();
        match self.next_emit {
            Some(next) if now < next => return None,
            // fixed rate: the next slot is relative to the planned one, not to `now`
            Some(next) => self.next_emit = Some(next + self.period),
            None => self.next_emit = Some(now + self.period),
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        let seed_time = self.next_seed_time();
        let a_number = self.rng.gen_range(self.min..=self.max);
        Some(Record::new(seed_time, a_number))
    }

    fn is_finished(&mut self) -> bool {
        self.remaining == Some(0)
    }
}

/// Invalid generator settings
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataGenError {
    #[error("rows per second must be greater than zero")]
    ZeroRate,
    #[error("empty value range: min {min} is greater than max {max}")]
    EmptyRange { min: i32, max: i32 },
}
