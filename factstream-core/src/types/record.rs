use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single record as produced by a source.
///
/// Timestamps carry millisecond precision and serialize as ISO-8601 / RFC 3339 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Time at which the record was generated
    pub seed_time: DateTime<Utc>,
    /// The value enrichment is derived from
    pub a_number: i32,
}

impl Record {
    /// Create a new record. Sub-millisecond precision of `seed_time` is dropped.
    pub fn new(seed_time: DateTime<Utc>, a_number: i32) -> Self {
        Self {
            seed_time: seed_time.trunc_subsecs(3),
            a_number,
        }
    }

    /// Serialize this record into the JSON text the validator consumes
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A record together with the fields derived from it, as written to a sink.
/// Original fields are carried over untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    /// Time at which the original record was generated
    pub seed_time: DateTime<Utc>,
    /// Value of the original record
    pub a_number: i32,
    /// Whether the original record satisfied the schema
    pub is_valid: bool,
    /// Generated text, or an `ERROR:` prefixed message if generation failed
    pub fun_fact: String,
}

impl EnrichedRecord {
    /// Extend a record with its derived fields
    pub fn new(record: Record, is_valid: bool, fun_fact: String) -> Self {
        Self {
            seed_time: record.seed_time,
            a_number: record.a_number,
            is_valid,
            fun_fact,
        }
    }

    /// Encode this record as JSON, together with the value of `partition_field` as
    /// partitioning key.
    ///
    /// String values are used as key verbatim, any other value in its JSON form. The key is
    /// `None` if the record has no such field.
    pub fn to_keyed_json(
        &self,
        partition_field: &str,
    ) -> Result<(Vec<u8>, Option<String>), serde_json::Error> {
        let value = serde_json::to_value(self)?;
        let key = match value.get(partition_field) {
            Some(Value::String(text)) => Some(text.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        Ok((serde_json::to_vec(&value)?, key))
    }

    /// The timestamp as ISO-8601 text with millisecond precision
    pub fn seed_time_iso(&self) -> String {
        self.seed_time.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}
