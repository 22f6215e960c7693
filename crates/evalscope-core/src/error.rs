//! Error types for evalscope-core

use thiserror::Error;

/// Main error type for the evalscope-core library.
///
/// The log pipeline never produces these; missing directories and bad lines
/// degrade to less output instead. Errors come from configuration, the
/// results loaders and the chart pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration could not be decoded
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Bad task filter pattern
    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A results file row that cannot become an eval record
    #[error("results line {line}: {message}")]
    Results { line: usize, message: String },

    /// Results store failure
    #[error("store error: {0}")]
    Store(String),
}

/// Result type alias for evalscope-core
pub type Result<T> = std::result::Result<T, Error>;
