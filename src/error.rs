use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Malformed source: {0}")]
    MalformedSource(String),

    #[error("No usable input rows: {0}")]
    EmptyInput(String),

    #[error("Query {query} failed: {reason}")]
    QueryComputation { query: String, reason: String },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Fetch and clean errors abort the whole run; everything else is
    /// scoped to a single artifact.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::SourceUnavailable(_)
                | PipelineError::MalformedSource(_)
                | PipelineError::EmptyInput(_)
                | PipelineError::Config(_)
                | PipelineError::Toml(_)
        )
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Write {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
