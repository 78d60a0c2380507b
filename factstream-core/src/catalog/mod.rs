//! Schema providers: where the [Schema] records are validated against comes from.
//!
//! A provider is queried once during pipeline configuration. Failing to fetch the schema is
//! fatal for a pipeline which validates records.
use std::{error::Error, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Schema;

mod cached;
mod columns;
mod glue;
mod static_catalog;

pub use cached::CachedSchemaProvider;
pub use columns::{schema_from_columns, Column, FieldBounds};
pub use glue::GlueCatalog;
pub use static_catalog::StaticCatalog;

/// A source of the record schema
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Fetch the schema from the external catalog.
    /// Repeated calls are idempotent reads.
    async fn fetch_schema(&self) -> Result<Schema, CatalogError>;
}

#[async_trait]
impl<P> SchemaProvider for Arc<P>
where
    P: SchemaProvider + ?Sized,
{
    async fn fetch_schema(&self) -> Result<Schema, CatalogError> {
        P::fetch_schema(self).await
    }
}

/// Errors which can occur when fetching a schema
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Catalog is unavailable")]
    Unavailable(#[source] Box<dyn Error + Send + Sync>),
    #[error("Table `{database}.{table}` does not exist in the catalog")]
    NotFound { database: String, table: String },
    #[error("Catalog responded with status {status}: {message}")]
    Service { status: u16, message: String },
    #[error("Catalog response could not be decoded")]
    MalformedResponse(#[source] Box<dyn Error + Send + Sync>),
    #[error("Failed to send catalog request")]
    Request(#[source] Box<dyn Error + Send + Sync>),
    #[error("Column `{column}` has unsupported type `{data_type}`")]
    UnsupportedType { column: String, data_type: String },
    #[error("Column `{column}` has invalid parameter `{parameter}` = `{value}`")]
    InvalidParameter {
        column: String,
        parameter: String,
        value: String,
    },
}
