use clap::Parser;
use envconfig::Envconfig;
use tracing::{debug, info, warn};

use config::{ApplicationProperties, ConfigError, JobConfig, RuntimeEnv};
use job::JobError;

mod cli;
mod config;
mod job;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    match main_inner().await {
        Ok(_) => (),
        Err(e) => {
            panic!("{:?}", eyre::Report::new(e))
        }
    }
}

async fn main_inner() -> Result<(), JobError> {
    let args = cli::FactstreamJob::parse();
    debug!("Got the following args: {args:?}");
    let env = RuntimeEnv::init_from_env().map_err(ConfigError::from)?;

    let path = env.resolve_properties_path(args.properties);
    info!("Loading application properties from {}", path.display());
    let properties = ApplicationProperties::load(&path)?;
    let config = JobConfig::from_properties(&properties)?;

    let summary = job::run(config, env.bedrock_api_key, None, shutdown_signal()).await?;
    info!(
        "Job finished after {} records ({} invalid, {} enrichment failures)",
        summary.records, summary.invalid, summary.enrichment_failures
    );
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            warn!("Unable to listen for Ctrl-C, running until the source is exhausted: {e}");
            std::future::pending::<()>().await
        }
    }
}
