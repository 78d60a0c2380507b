use std::collections::HashMap;

use async_trait::async_trait;

use super::{schema_from_columns, CatalogError, Column, FieldBounds, SchemaProvider};
use crate::types::Schema;

/// A catalog backed by an in-memory column list.
/// Useful when running locally without access to a catalog service.
///
/// ```
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// use factstream::catalog::{Column, FieldBounds, SchemaProvider, StaticCatalog};
///
/// let catalog = StaticCatalog::new(vec![
///     Column::new("seed_time", "timestamp"),
///     Column::new("a_number", "int"),
/// ])
/// .with_bounds("a_number", FieldBounds::new(Some(0.0), Some(100.0)));
/// let schema = catalog.fetch_schema().await.unwrap();
/// assert_eq!(schema.field("a_number").unwrap().maximum, Some(100.0));
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    columns: Vec<Column>,
    bounds: HashMap<String, FieldBounds>,
}

impl StaticCatalog {
    /// Create a catalog describing a table with the given columns
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            bounds: HashMap::new(),
        }
    }

    /// Pin the bounds of a column, overriding any bounds stored with the column
    pub fn with_bounds(mut self, column: impl Into<String>, bounds: FieldBounds) -> Self {
        self.bounds.insert(column.into(), bounds);
        self
    }
}

#[async_trait]
impl SchemaProvider for StaticCatalog {
    async fn fetch_schema(&self) -> Result<Schema, CatalogError> {
        schema_from_columns(&self.columns, &self.bounds)
    }
}
