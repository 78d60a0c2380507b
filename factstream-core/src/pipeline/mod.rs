//! The pipeline driver: source → validator → enricher → sink.
//!
//! A pipeline moves through the states of [PipelineState]:
//!
//! ```text
//! Uninitialized --configure--> Configured --run--> Running --> Completed
//!       |                                             |
//!       +------------------> Failed <-----------------+
//! ```
//!
//! Only configuration errors (the schema can not be fetched) and sink errors fail a
//! pipeline. Records which fail validation or enrichment are flagged and still emitted.
use std::{future::Future, pin::pin, sync::Arc, time::Duration};

use bon::bon;
use futures::{stream, Stream, StreamExt};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::{
    catalog::{CatalogError, SchemaProvider},
    enrich::{is_error_text, Enricher},
    sinks::{Sink, SinkError},
    sources::Source,
    types::{EnrichedRecord, Record},
    validate::RecordValidator,
};

mod state;

pub use state::PipelineState;

/// Counts of a finished pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Records written to the sink
    pub records: u64,
    /// Records flagged as not satisfying the schema
    pub invalid: u64,
    /// Records whose enrichment failed
    pub enrichment_failures: u64,
}

impl PipelineSummary {
    fn count(&mut self, record: &EnrichedRecord) {
        self.records += 1;
        if !record.is_valid {
            self.invalid += 1;
        }
        if is_error_text(&record.fun_fact) {
            self.enrichment_failures += 1;
        }
    }
}

/// Errors which stop a pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline must be configured before it can run")]
    NotConfigured,
    #[error("Operation not possible in pipeline state {0}")]
    InvalidState(PipelineState),
    #[error("Failed to fetch the record schema")]
    Schema(#[source] CatalogError),
    #[error("Failed to write to sink")]
    Sink(#[source] SinkError),
}

/// Validates and enriches the records of a source and writes them to a sink.
///
/// # Example
/// ```rust
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use factstream::catalog::{Column, StaticCatalog};
/// use factstream::enrich::{ConverseRequest, Enricher, ModelClient, ModelError};
/// use factstream::pipeline::{Pipeline, PipelineState};
/// use factstream::sinks::VecSink;
/// use factstream::sources::DataGenSource;
///
/// struct Shouting;
///
/// #[async_trait]
/// impl ModelClient for Shouting {
///     fn model_id(&self) -> &str {
///         "shouting"
///     }
///     async fn converse(&self, request: &ConverseRequest) -> Result<String, ModelError> {
///         let prompt = request.messages[0].content[0].text.clone().unwrap_or_default();
///         Ok(prompt.to_uppercase())
///     }
/// }
///
/// let catalog = StaticCatalog::new(vec![
///     Column::new("seed_time", "timestamp"),
///     Column::new("a_number", "int"),
/// ]);
/// let sink = VecSink::new();
/// let mut pipeline = Pipeline::builder()
///     .source(Box::new(
///         DataGenSource::builder().rows_per_second(1000).number_of_rows(5).build().unwrap(),
///     ))
///     .sink(Box::new(sink.clone()))
///     .enricher(Enricher::new(Arc::new(Shouting)))
///     .build();
///
/// pipeline.configure(&catalog).await.unwrap();
/// let summary = pipeline.run().await.unwrap();
///
/// assert_eq!(summary.records, 5);
/// assert_eq!(pipeline.state(), PipelineState::Completed);
/// assert!(sink.into_iter().all(|r| r.fun_fact.starts_with("GIVE ME A FUN FACT")));
/// # });
/// ```
pub struct Pipeline {
    source: Box<dyn Source>,
    sink: Box<dyn Sink>,
    enricher: Enricher,
    parallelism: usize,
    idle_wait: Duration,
    validator: Option<RecordValidator>,
    state: watch::Sender<PipelineState>,
}

#[bon]
impl Pipeline {
    #[builder]
    pub fn new(
        source: Box<dyn Source>,
        sink: Box<dyn Sink>,
        enricher: Enricher,
        /// Maximum number of records being enriched at the same time
        #[builder(default = 4)]
        parallelism: usize,
        /// Time to wait before polling a source again which had no record ready
        #[builder(default = Duration::from_millis(10))]
        idle_wait: Duration,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Uninitialized);
        Self {
            source,
            sink,
            enricher,
            parallelism: parallelism.max(1),
            idle_wait,
            validator: None,
            state,
        }
    }
}

impl Pipeline {
    /// The current state of this pipeline
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Observe state changes of this pipeline
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    fn transition(&self, next: PipelineState) {
        let previous = self.state.send_replace(next);
        debug!("Pipeline state {previous} -> {next}");
    }

    /// Fetch the schema and set up the validator.
    ///
    /// The schema is fetched exactly once: configuring an already configured pipeline is a
    /// no-op. If the schema can not be fetched the pipeline fails.
    pub async fn configure(&mut self, provider: &dyn SchemaProvider) -> Result<(), PipelineError> {
        match self.state() {
            PipelineState::Uninitialized => (),
            PipelineState::Configured => {
                debug!("Pipeline is already configured, not fetching the schema again");
                return Ok(());
            }
            other => return Err(PipelineError::InvalidState(other)),
        }
        match provider.fetch_schema().await {
            Ok(schema) => {
                info!(
                    "Fetched schema with {} fields, {} required",
                    schema.properties().len(),
                    schema.required().len()
                );
                self.validator = Some(RecordValidator::new(Arc::new(schema)));
                self.transition(PipelineState::Configured);
                Ok(())
            }
            Err(e) => {
                error!("Failed to fetch schema: {e}");
                self.transition(PipelineState::Failed);
                Err(PipelineError::Schema(e))
            }
        }
    }

    /// Run until the source is exhausted. Runs forever for unbounded sources.
    pub async fn run(&mut self) -> Result<PipelineSummary, PipelineError> {
        self.run_until(std::future::pending()).await
    }

    /// Run until the source is exhausted or `shutdown` resolves, whatever happens first.
    /// Records which are in flight when `shutdown` resolves are dropped, the sink is
    /// flushed in both cases.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<PipelineSummary, PipelineError>
    where
        F: Future<Output = ()>,
    {
        let validator = match (self.state(), &self.validator) {
            (PipelineState::Configured, Some(validator)) => validator.clone(),
            (PipelineState::Uninitialized, _) => return Err(PipelineError::NotConfigured),
            (other, _) => return Err(PipelineError::InvalidState(other)),
        };
        self.transition(PipelineState::Running);
        info!("Pipeline running with parallelism {}", self.parallelism);

        let result = self.drive(validator, shutdown).await;
        match &result {
            Ok(summary) => {
                info!(
                    "Pipeline completed: {} records, {} invalid, {} enrichment failures",
                    summary.records, summary.invalid, summary.enrichment_failures
                );
                self.transition(PipelineState::Completed);
            }
            Err(e) => {
                error!("Pipeline failed: {e}");
                self.transition(PipelineState::Failed);
            }
        }
        result
    }

    async fn drive<F>(
        &mut self,
        validator: RecordValidator,
        shutdown: F,
    ) -> Result<PipelineSummary, PipelineError>
    where
        F: Future<Output = ()>,
    {
        let mut summary = PipelineSummary::default();
        {
            let enricher = &self.enricher;
            let mut processed = pin!(poll_source(self.source.as_mut(), self.idle_wait)
                .map(|record| process(record, &validator, enricher))
                .buffered(self.parallelism));
            let mut shutdown = pin!(shutdown);

            loop {
                let next = tokio::select! {
                    _ = &mut shutdown => {
                        info!("Shutdown requested, stopping pipeline");
                        break;
                    }
                    next = processed.next() => next,
                };
                let Some(record) = next else {
                    info!("Source exhausted");
                    break;
                };
                summary.count(&record);
                self.sink.sink(record).await.map_err(PipelineError::Sink)?;
            }
        }
        self.sink.flush().await.map_err(PipelineError::Sink)?;
        Ok(summary)
    }
}

/// Turn a polled source into a stream, ending once the source is finished
fn poll_source(source: &mut dyn Source, idle_wait: Duration) -> impl Stream<Item = Record> + '_ {
    stream::unfold(source, move |source| async move {
        loop {
            if let Some(record) = source.poll() {
                return Some((record, source));
            }
            if source.is_finished() {
                return None;
            }
            tokio::time::sleep(idle_wait).await;
        }
    })
}

async fn process(record: Record, validator: &RecordValidator, enricher: &Enricher) -> EnrichedRecord {
    let is_valid = validator.validate_record(&record);
    let fun_fact = enricher.enrich(i64::from(record.a_number)).await;
    EnrichedRecord::new(record, is_valid, fun_fact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sinks::VecSink,
        sources::{DataGenSource, IteratorSource},
        testing::{echo_enricher as echo, record, CountingProvider, FailingModel, FailingSink},
    };
    use itertools::Itertools;

    fn pipeline_with(
        records: Vec<Record>,
        sink: Box<dyn Sink>,
        enricher: Enricher,
    ) -> Pipeline {
        Pipeline::builder()
            .source(Box::new(IteratorSource::new(records)))
            .sink(sink)
            .enricher(enricher)
            .parallelism(3)
            .build()
    }

    #[tokio::test]
    async fn run_requires_configuration() {
        let mut pipeline = pipeline_with(vec![], Box::new(VecSink::new()), echo());
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
        assert!(matches!(
            pipeline.run().await,
            Err(PipelineError::NotConfigured)
        ));
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
    }

    #[tokio::test]
    async fn validates_enriches_and_emits_in_order() {
        let sink = VecSink::new();
        let records = vec![
            record("2024-01-01T00:00:00Z", 42),
            record("2024-01-01T00:00:01Z", 150),
            record("2024-01-01T00:00:02Z", 7),
        ];
        let mut pipeline = pipeline_with(records.clone(), Box::new(sink.clone()), echo());
        pipeline
            .configure(&CountingProvider::random_numbers())
            .await
            .unwrap();
        assert_eq!(pipeline.state(), PipelineState::Configured);

        let summary = pipeline.run().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Completed);
        assert_eq!(
            summary,
            PipelineSummary {
                records: 3,
                invalid: 1,
                enrichment_failures: 0
            }
        );

        let out = sink.into_iter().collect_vec();
        // invalid records are flagged, not dropped
        assert_eq!(
            out.iter().map(|r| r.is_valid).collect_vec(),
            vec![true, false, true]
        );
        assert_eq!(
            out.iter().map(|r| r.seed_time).collect_vec(),
            records.iter().map(|r| r.seed_time).collect_vec()
        );
        assert_eq!(out[2].fun_fact, "Give me a fun fact about the number '7'");
    }

    #[tokio::test]
    async fn enrichment_failures_keep_running() {
        let sink = VecSink::new();
        let enricher = Enricher::new(Arc::new(FailingModel::new("broken-model", "offline")));
        let records = (0..5).map(|i| record("2024-01-01T00:00:00Z", i)).collect();
        let mut pipeline = pipeline_with(records, Box::new(sink.clone()), enricher);
        pipeline
            .configure(&CountingProvider::random_numbers())
            .await
            .unwrap();

        let summary = pipeline.run().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Completed);
        assert_eq!(summary.records, 5);
        assert_eq!(summary.enrichment_failures, 5);
        assert!(sink
            .into_iter()
            .all(|r| r.fun_fact.starts_with("ERROR: Can't invoke broken-model  Reason: ")));
    }

    #[tokio::test]
    async fn schema_failure_fails_pipeline() {
        let mut pipeline = pipeline_with(vec![], Box::new(VecSink::new()), echo());
        let result = pipeline.configure(&CountingProvider::failing()).await;
        assert!(matches!(result, Err(PipelineError::Schema(_))));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(matches!(
            pipeline.run().await,
            Err(PipelineError::InvalidState(PipelineState::Failed))
        ));
    }

    #[tokio::test]
    async fn schema_is_fetched_once() {
        let provider = CountingProvider::random_numbers();
        let mut pipeline = pipeline_with(vec![], Box::new(VecSink::new()), echo());
        pipeline.configure(&provider).await.unwrap();
        pipeline.configure(&provider).await.unwrap();
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn sink_error_fails_pipeline() {
        let records = vec![record("2024-01-01T00:00:00Z", 1)];
        let mut pipeline = pipeline_with(records, Box::new(FailingSink), echo());
        pipeline
            .configure(&CountingProvider::random_numbers())
            .await
            .unwrap();
        assert!(matches!(pipeline.run().await, Err(PipelineError::Sink(_))));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(pipeline.state().is_terminal());
    }

    #[tokio::test]
    async fn shutdown_stops_unbounded_source() {
        let sink = VecSink::new();
        let source = DataGenSource::builder()
            .rows_per_second(1000)
            .build()
            .unwrap();
        let mut pipeline = Pipeline::builder()
            .source(Box::new(source))
            .sink(Box::new(sink.clone()))
            .enricher(echo())
            .idle_wait(Duration::from_millis(1))
            .build();
        let states = pipeline.subscribe();
        pipeline
            .configure(&CountingProvider::random_numbers())
            .await
            .unwrap();

        let summary = pipeline
            .run_until(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(*states.borrow(), PipelineState::Completed);
        assert!(summary.records > 0);
        assert_eq!(summary.records as usize, sink.len());
        assert_eq!(summary.invalid, 0);
    }
}
