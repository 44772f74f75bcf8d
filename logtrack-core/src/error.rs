use logtrack_activity::SinkError;
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Failure while processing a single record or managing the tracker lifecycle.
#[derive(Debug, Error, Diagnostic)]
pub enum TrackError {
    /// An explicit structured attribute could not be coerced.
    #[error("invalid value '{value}' for '{key}': expected {expected}")]
    #[diagnostic(help("free-text annotations are lenient, but structured fields must parse"))]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

impl TrackError {
    pub fn invalid_value<K: ToString, V: ToString, E: ToString>(key: K, value: V, expected: E) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: expected.to_string(),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type TrackResult<T> = std::result::Result<T, TrackError>;
