//! Factstream is a schema-validated enrichment stage for record streams.
//!
//! Records flow one way through a [pipeline::Pipeline]: a [sources::Source] produces them,
//! they are checked against a [types::Schema] fetched once from a catalog
//! ([catalog::SchemaProvider]), enriched with text generated by a model
//! ([enrich::Enricher]) and finally written to a [sinks::Sink].
pub mod aws;
pub mod catalog;
pub mod enrich;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod types;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;
