use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::CatalogError;
use crate::types::{FieldFormat, FieldSpec, FieldType, Schema};

/// Column parameter holding the inclusive lower bound of a numeric column
pub const MINIMUM_PARAMETER: &str = "minimum";
/// Column parameter holding the inclusive upper bound of a numeric column
pub const MAXIMUM_PARAMETER: &str = "maximum";

/// A table column as described by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Column {
    /// Column name, which becomes the field name
    pub name: String,
    /// Catalog type, e.g. `int`, `timestamp` or `varchar(32)`
    #[serde(rename = "Type")]
    pub data_type: String,
    /// Free-form key-value parameters attached to the column
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

impl Column {
    /// Create a column without parameters
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            parameters: HashMap::new(),
        }
    }

    /// Attach a parameter to this column
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Inclusive numeric bounds configured for a column
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldBounds {
    /// Smallest allowed value
    pub minimum: Option<f64>,
    /// Largest allowed value
    pub maximum: Option<f64>,
}

impl FieldBounds {
    /// Create new bounds, `None` leaves that side open
    pub fn new(minimum: Option<f64>, maximum: Option<f64>) -> Self {
        Self { minimum, maximum }
    }
}

/// Translate a catalog column list into a [Schema].
///
/// Every column becomes a required field. Bounds stored in the column parameters are
/// overlaid by `bounds`, where only the sides set there replace the stored ones.
pub fn schema_from_columns(
    columns: &[Column],
    bounds: &HashMap<String, FieldBounds>,
) -> Result<Schema, CatalogError> {
    columns.iter().try_fold(Schema::new(), |schema, column| {
        let mut spec = field_spec(column)?;
        if let Some(pinned) = bounds.get(&column.name) {
            spec.minimum = pinned.minimum.or(spec.minimum);
            spec.maximum = pinned.maximum.or(spec.maximum);
        }
        Ok(schema.with_field(column.name.clone(), spec, true))
    })
}

fn field_spec(column: &Column) -> Result<FieldSpec, CatalogError> {
    let normalized = column.data_type.trim().to_ascii_lowercase();
    // strip type arguments like in `varchar(32)` or `decimal(10,2)`
    let base = normalized
        .split_once('(')
        .map_or(normalized.as_str(), |(base, _)| base)
        .trim();
    let spec = match base {
        "timestamp" => FieldSpec::new(FieldType::String).with_format(FieldFormat::DateTime),
        "date" => FieldSpec::new(FieldType::String).with_format(FieldFormat::Date),
        "string" | "varchar" | "char" => FieldSpec::new(FieldType::String),
        "tinyint" | "smallint" | "int" | "integer" | "bigint" => {
            FieldSpec::new(FieldType::Integer)
        }
        "float" | "double" | "decimal" => FieldSpec::new(FieldType::Number),
        "boolean" => FieldSpec::new(FieldType::Boolean),
        _ => {
            return Err(CatalogError::UnsupportedType {
                column: column.name.clone(),
                data_type: column.data_type.clone(),
            })
        }
    };
    if !matches!(spec.kind, FieldType::Integer | FieldType::Number) {
        return Ok(spec);
    }
    Ok(FieldSpec {
        minimum: parse_bound(column, MINIMUM_PARAMETER)?,
        maximum: parse_bound(column, MAXIMUM_PARAMETER)?,
        ..spec
    })
}

fn parse_bound(column: &Column, parameter: &str) -> Result<Option<f64>, CatalogError> {
    column
        .parameters
        .get(parameter)
        .map(|value| {
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| CatalogError::InvalidParameter {
                    column: column.name.clone(),
                    parameter: parameter.to_owned(),
                    value: value.clone(),
                })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_types() {
        let columns = vec![
            Column::new("seed_time", "timestamp"),
            Column::new("day", "DATE"),
            Column::new("name", "varchar(32)"),
            Column::new("a_number", "int"),
            Column::new("price", "decimal(10,2)"),
            Column::new("flag", "boolean"),
        ];
        let schema = schema_from_columns(&columns, &HashMap::new()).unwrap();

        let seed_time = schema.field("seed_time").unwrap();
        assert_eq!(seed_time.kind, FieldType::String);
        assert_eq!(seed_time.format, Some(FieldFormat::DateTime));
        assert_eq!(schema.field("day").unwrap().format, Some(FieldFormat::Date));
        assert_eq!(schema.field("name").unwrap().kind, FieldType::String);
        assert_eq!(schema.field("a_number").unwrap().kind, FieldType::Integer);
        assert_eq!(schema.field("price").unwrap().kind, FieldType::Number);
        assert_eq!(schema.field("flag").unwrap().kind, FieldType::Boolean);
        // all columns are required
        assert_eq!(schema.required().len(), columns.len());
    }

    #[test]
    fn unsupported_type() {
        let columns = vec![Column::new("tags", "array<string>")];
        let err = schema_from_columns(&columns, &HashMap::new()).unwrap_err();
        assert!(matches!(err, CatalogError::UnsupportedType { column, .. } if column == "tags"));
    }

    #[test]
    fn bounds_from_parameters() {
        let columns = vec![Column::new("a_number", "int")
            .with_parameter("minimum", "0")
            .with_parameter("maximum", "100")];
        let schema = schema_from_columns(&columns, &HashMap::new()).unwrap();
        let spec = schema.field("a_number").unwrap();
        assert_eq!(spec.minimum, Some(0.0));
        assert_eq!(spec.maximum, Some(100.0));
    }

    #[test]
    fn configured_bounds_overlay_parameters() {
        let columns = vec![Column::new("a_number", "bigint")
            .with_parameter("minimum", "-5")
            .with_parameter("maximum", "5")];
        let bounds = HashMap::from([("a_number".to_owned(), FieldBounds::new(None, Some(100.0)))]);
        let schema = schema_from_columns(&columns, &bounds).unwrap();
        let spec = schema.field("a_number").unwrap();
        assert_eq!(spec.minimum, Some(-5.0));
        assert_eq!(spec.maximum, Some(100.0));
    }

    #[test]
    fn invalid_bound_parameter() {
        let columns = vec![Column::new("a_number", "int").with_parameter("maximum", "lots")];
        let err = schema_from_columns(&columns, &HashMap::new()).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidParameter { .. }));
    }

    #[test]
    fn deserializes_catalog_columns() {
        let column: Column = serde_json::from_str(
            r#"{"Name": "a_number", "Type": "int", "Parameters": {"maximum": "100"}}"#,
        )
        .unwrap();
        assert_eq!(column.name, "a_number");
        assert_eq!(column.data_type, "int");
        assert_eq!(column.parameters["maximum"], "100");
    }
}
