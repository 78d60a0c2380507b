use std::fmt::Display;

/// Lifecycle state of a [Pipeline](super::Pipeline)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Created, the schema has not been fetched yet
    Uninitialized,
    /// Schema fetched, ready to run
    Configured,
    /// Processing records
    Running,
    /// The source was exhausted or shutdown was requested, all output is flushed
    Completed,
    /// Stopped by a configuration or sink error
    Failed,
}

impl PipelineState {
    /// True if the pipeline can not make any further progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
