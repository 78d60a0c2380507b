use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::{CatalogError, SchemaProvider};
use crate::types::Schema;

/// Wraps a [SchemaProvider] so the schema is fetched at most once.
///
/// The first successful fetch is kept for the lifetime of this value and handed out to all
/// callers. A failed fetch is not cached.
pub struct CachedSchemaProvider<P> {
    inner: P,
    schema: OnceCell<Arc<Schema>>,
}

impl<P> CachedSchemaProvider<P>
where
    P: SchemaProvider,
{
    /// Cache the schema of the given provider
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            schema: OnceCell::new(),
        }
    }

    /// Get the schema, fetching it if this is the first call
    pub async fn get(&self) -> Result<Arc<Schema>, CatalogError> {
        self.schema
            .get_or_try_init(|| async { self.inner.fetch_schema().await.map(Arc::new) })
            .await
            .cloned()
    }
}

#[async_trait]
impl<P> SchemaProvider for CachedSchemaProvider<P>
where
    P: SchemaProvider,
{
    async fn fetch_schema(&self) -> Result<Schema, CatalogError> {
        self.get().await.map(|schema| Schema::clone(&schema))
    }
}
