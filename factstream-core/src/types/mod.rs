//! Contains Factstream's record and schema types.
mod record;
mod schema;

pub use record::{EnrichedRecord, Record};
pub use schema::{FieldFormat, FieldSpec, FieldType, Schema};
