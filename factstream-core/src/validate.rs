//! Validation of serialized records against a [Schema].
//!
//! Validation never fails the caller: an invalid record is reported as `false` and a
//! diagnostic is logged. Use [check] to get the reason.
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::types::{FieldFormat, FieldSpec, FieldType, Record, Schema};

/// Reasons a record does not satisfy a schema
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("record is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("required field `{0}` is missing")]
    MissingField(String),
    #[error("field `{field}` is not of type {expected}")]
    TypeMismatch { field: String, expected: FieldType },
    #[error("field `{field}` does not match format {format}")]
    Format { field: String, format: FieldFormat },
    #[error("field `{field}` value {value} is less than the minimum of {minimum}")]
    BelowMinimum {
        field: String,
        value: f64,
        minimum: f64,
    },
    #[error("field `{field}` value {value} is greater than the maximum of {maximum}")]
    AboveMaximum {
        field: String,
        value: f64,
        maximum: f64,
    },
}

/// Check a serialized record against the schema and return the first violated constraint.
///
/// Fields present in the record but not declared in the schema are ignored.
pub fn check(serialized_record: &str, schema: &Schema) -> Result<(), ValidationError> {
    let Value::Object(fields) = serde_json::from_str::<Value>(serialized_record)? else {
        return Err(ValidationError::NotAnObject);
    };
    if let Some(missing) = schema
        .required()
        .iter()
        .find(|name| !fields.contains_key(name.as_str()))
    {
        return Err(ValidationError::MissingField(missing.clone()));
    }
    for (name, spec) in schema.properties() {
        if let Some(value) = fields.get(name) {
            check_field(name, value, spec)?;
        }
    }
    Ok(())
}

/// Returns true if the serialized record satisfies the schema.
/// Failures are logged and reported as `false`, never propagated.
pub fn validate(serialized_record: &str, schema: &Schema) -> bool {
    match check(serialized_record, schema) {
        Ok(()) => true,
        Err(e) => {
            warn!("Validation error: {e}");
            false
        }
    }
}

fn check_field(name: &str, value: &Value, spec: &FieldSpec) -> Result<(), ValidationError> {
    let mismatch = || ValidationError::TypeMismatch {
        field: name.to_owned(),
        expected: spec.kind,
    };
    match spec.kind {
        FieldType::String => {
            let text = value.as_str().ok_or_else(mismatch)?;
            match spec.format {
                Some(format) if !format.matches(text) => Err(ValidationError::Format {
                    field: name.to_owned(),
                    format,
                }),
                _ => Ok(()),
            }
        }
        FieldType::Integer => {
            let exact = value
                .as_i64()
                .map(i128::from)
                .or_else(|| value.as_u64().map(i128::from));
            if let Some(number) = exact {
                return check_integer_bounds(name, number, spec);
            }
            // 42.0 counts as an integer, 42.5 does not
            let number = value
                .as_f64()
                .filter(|x| x.fract() == 0.0)
                .ok_or_else(mismatch)?;
            check_bounds(name, number, spec)
        }
        FieldType::Number => {
            let number = value.as_f64().ok_or_else(mismatch)?;
            check_bounds(name, number, spec)
        }
        FieldType::Boolean => value.is_boolean().then_some(()).ok_or_else(mismatch),
    }
}

fn check_bounds(name: &str, value: f64, spec: &FieldSpec) -> Result<(), ValidationError> {
    if let Some(minimum) = spec.minimum.filter(|min| value < *min) {
        return Err(ValidationError::BelowMinimum {
            field: name.to_owned(),
            value,
            minimum,
        });
    }
    if let Some(maximum) = spec.maximum.filter(|max| value > *max) {
        return Err(ValidationError::AboveMaximum {
            field: name.to_owned(),
            value,
            maximum,
        });
    }
    Ok(())
}

/// Bounds check without rounding `value` to the nearest `f64`.
/// An integer is below `minimum` iff it is below its ceiling, above `maximum` iff it is
/// above its floor.
fn check_integer_bounds(name: &str, value: i128, spec: &FieldSpec) -> Result<(), ValidationError> {
    if let Some(minimum) = spec.minimum.filter(|min| value < min.ceil() as i128) {
        return Err(ValidationError::BelowMinimum {
            field: name.to_owned(),
            value: value as f64,
            minimum,
        });
    }
    if let Some(maximum) = spec.maximum.filter(|max| value > max.floor() as i128) {
        return Err(ValidationError::AboveMaximum {
            field: name.to_owned(),
            value: value as f64,
            maximum,
        });
    }
    Ok(())
}

/// Validates records against a schema shared between all clones of this validator.
/// Cloning is cheap, so one clone can be handed to every concurrent invocation.
#[derive(Debug, Clone)]
pub struct RecordValidator {
    schema: Arc<Schema>,
}

impl RecordValidator {
    /// Create a validator for the given schema
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    /// The schema records are validated against
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// See [validate]
    pub fn validate(&self, serialized_record: &str) -> bool {
        validate(serialized_record, &self.schema)
    }

    /// Serialize the record and validate the result
    pub fn validate_record(&self, record: &Record) -> bool {
        match record.to_json() {
            Ok(serialized) => self.validate(&serialized),
            Err(e) => {
                warn!("Validation error: could not serialize record: {e}");
                false
            }
        }
    }
}
