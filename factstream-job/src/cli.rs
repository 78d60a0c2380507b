use std::path::PathBuf;

/// Validates records against a catalog schema, enriches them with generated text and
/// writes them to the configured output stream.
#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct FactstreamJob {
    /// Path of the application-properties file.
    /// Takes precedence over `FACTSTREAM_PROPERTIES_PATH` and `IS_LOCAL`
    #[arg(short, long)]
    pub properties: Option<PathBuf>,
}
