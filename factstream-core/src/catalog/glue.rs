use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_glue::{
    error::{ProvideErrorMetadata, SdkError},
    operation::get_table::GetTableError,
    Client,
};
use bon::Builder;
use glue_catalog_builder::{IsUnset, SetClient, State};
use tracing::{debug, info};

use super::{schema_from_columns, CatalogError, Column, FieldBounds, SchemaProvider};
use crate::types::Schema;

/// Fetches the schema of a table from the AWS Glue data catalog.
///
/// ```no_run
/// # async fn catalog() {
/// use std::time::Duration;
/// use factstream::{aws, catalog::{FieldBounds, GlueCatalog}};
///
/// let config = aws::config_loader("eu-west-1", None, Duration::from_secs(30))
///     .load()
///     .await;
/// let catalog = GlueCatalog::builder()
///     .sdk_config(&config)
///     .database("streaming")
///     .table("random_numbers")
///     .bounds("a_number", FieldBounds::new(Some(0.0), Some(100.0)))
///     .build();
/// # }
/// ```
#[derive(Builder, Debug, Clone)]
#[builder(on(String, into))]
pub struct GlueCatalog {
    #[builder(field)]
    bounds: HashMap<String, FieldBounds>,
    client: Client,
    database: String,
    table: String,
}

impl<S: State> GlueCatalogBuilder<S> {
    /// Pin the bounds of a column, overriding any bounds the catalog stores for it
    pub fn bounds(mut self, column: impl Into<String>, bounds: FieldBounds) -> Self {
        self.bounds.insert(column.into(), bounds);
        self
    }

    /// Create the Glue client from a loaded AWS configuration
    pub fn sdk_config(self, config: &SdkConfig) -> GlueCatalogBuilder<SetClient<S>>
    where
        S::Client: IsUnset,
    {
        self.client(Client::new(config))
    }
}

impl GlueCatalog {
    fn catalog_error(&self, err: SdkError<GetTableError>) -> CatalogError {
        match err {
            SdkError::ServiceError(context) => {
                let status = context.raw().status().as_u16();
                let err = context.into_err();
                if err.is_entity_not_found_exception() {
                    CatalogError::NotFound {
                        database: self.database.clone(),
                        table: self.table.clone(),
                    }
                } else {
                    CatalogError::Service {
                        status,
                        message: err.message().unwrap_or_default().to_owned(),
                    }
                }
            }
            err @ (SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)) => {
                CatalogError::Unavailable(Box::new(err))
            }
            err @ SdkError::ResponseError(_) => CatalogError::MalformedResponse(Box::new(err)),
            err => CatalogError::Request(Box::new(err)),
        }
    }
}

fn column(glue: &aws_sdk_glue::types::Column) -> Column {
    Column {
        name: glue.name().to_owned(),
        data_type: glue.r#type().unwrap_or_default().to_owned(),
        parameters: glue.parameters().cloned().unwrap_or_default(),
    }
}

#[async_trait]
impl SchemaProvider for GlueCatalog {
    async fn fetch_schema(&self) -> Result<Schema, CatalogError> {
        debug!("Fetching table {}.{}", self.database, self.table);
        let output = self
            .client
            .get_table()
            .database_name(&self.database)
            .name(&self.table)
            .send()
            .await
            .map_err(|e| self.catalog_error(e))?;
        let Some(table) = output.table() else {
            return Err(CatalogError::NotFound {
                database: self.database.clone(),
                table: self.table.clone(),
            });
        };
        let columns: Vec<Column> = table
            .storage_descriptor()
            .map(|descriptor| descriptor.columns())
            .unwrap_or_default()
            .iter()
            .map(column)
            .collect();
        info!(
            "Fetched {} columns for table {}.{}",
            columns.len(),
            self.database,
            self.table
        );
        schema_from_columns(&columns, &self.bounds)
    }
}
