use std::fmt::Display;

use chrono::{DateTime, NaiveDate};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Primitive type of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Text
    String,
    /// Whole number
    Integer,
    /// Any number
    Number,
    /// `true` or `false`
    Boolean,
}

impl Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let matched = match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
        };
        f.write_str(matched)
    }
}

/// Format constraint on a string field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldFormat {
    /// RFC 3339 date and time, e.g. `2024-01-01T00:00:00Z`
    #[serde(rename = "date-time")]
    DateTime,
    /// Calendar date, e.g. `2024-01-01`
    #[serde(rename = "date")]
    Date,
}

impl FieldFormat {
    /// Check if the given text satisfies this format
    pub fn matches(&self, text: &str) -> bool {
        match self {
            FieldFormat::DateTime => DateTime::parse_from_rfc3339(text).is_ok(),
            // full-date only: four digit year, two digit month and day
            FieldFormat::Date => {
                let bytes = text.as_bytes();
                bytes.len() == 10
                    && bytes[4] == b'-'
                    && bytes[7] == b'-'
                    && NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
            }
        }
    }
}

impl Display for FieldFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let matched = match self {
            FieldFormat::DateTime => "date-time",
            FieldFormat::Date => "date",
        };
        f.write_str(matched)
    }
}

/// Type descriptor of a single field.
/// Bounds are inclusive and only apply to numeric fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Primitive type of the field
    #[serde(rename = "type")]
    pub kind: FieldType,
    /// Optional format constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FieldFormat>,
    /// Smallest allowed value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Largest allowed value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl FieldSpec {
    /// A field of the given type without further constraints
    pub fn new(kind: FieldType) -> Self {
        Self {
            kind,
            format: None,
            minimum: None,
            maximum: None,
        }
    }

    /// Constrain the field to a format
    pub fn with_format(mut self, format: FieldFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Constrain the field to a minimum value
    pub fn with_minimum(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    /// Constrain the field to a maximum value
    pub fn with_maximum(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SchemaKind {
    #[default]
    Object,
}

/// Structural contract for a record: which fields exist, their types and which of them
/// must be present.
///
/// A schema serializes to and from a JSON Schema shaped document:
/// ```
/// use factstream::types::{FieldType, Schema};
///
/// let schema = Schema::from_json(r#"{
///     "type": "object",
///     "properties": {
///         "a_number": {"type": "integer", "minimum": 0, "maximum": 100}
///     },
///     "required": ["a_number"]
/// }"#).unwrap();
/// assert_eq!(schema.field("a_number").unwrap().kind, FieldType::Integer);
/// assert!(schema.is_required("a_number"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type", default)]
    kind: SchemaKind,
    #[serde(default)]
    properties: IndexMap<String, FieldSpec>,
    #[serde(default)]
    required: IndexSet<String>,
}

impl Schema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field to this schema
    pub fn with_field(mut self, name: impl Into<String>, spec: FieldSpec, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.insert(name.clone());
        }
        self.properties.insert(name, spec);
        self
    }

    /// Parse a JSON Schema shaped document
    pub fn from_json(definition: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(definition)
    }

    /// Get the descriptor of a field
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.properties.get(name)
    }

    /// All declared fields in declaration order
    pub fn properties(&self) -> &IndexMap<String, FieldSpec> {
        &self.properties
    }

    /// Names of all fields which must be present
    pub fn required(&self) -> &IndexSet<String> {
        &self.required
    }

    /// True if the field must be present in every record
    pub fn is_required(&self, name: &str) -> bool {
        self.required.contains(name)
    }
}
