//! Error types shared across cliprelay crates.
//!
//! The first four variants form the pipeline's recovery taxonomy. Only
//! [`RelayError::Pipeline`] is meant to escape a pipeline run; the others are
//! recovered at the asset, usage, or upload boundary that produced them.

use std::path::PathBuf;

/// Top-level error type for cliprelay operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Source binary could not be resolved by any locator strategy.
    #[error("Source not found: {key}")]
    NotFound { key: String },

    /// A single usage could not be extracted (bad range, engine failure).
    #[error("Extraction error: {message}")]
    Extraction { message: String },

    /// Upload was rejected, malformed, or timed out.
    #[error("Publish error: {message}")]
    Publish { message: String },

    /// Precondition violation outside the per-asset/per-usage boundaries.
    #[error("Pipeline fault: {message}")]
    Pipeline { message: String },

    #[error("Media engine error: {message}")]
    Engine { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using RelayError.
pub type RelayResult<T> = Result<T, RelayError>;

impl RelayError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction {
            message: msg.into(),
        }
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish {
            message: msg.into(),
        }
    }

    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline {
            message: msg.into(),
        }
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether the pipeline recovers from this error locally instead of
    /// surfacing it to the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Pipeline { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_fault_is_not_recoverable() {
        assert!(!RelayError::pipeline("bad input").is_recoverable());
    }

    #[test]
    fn test_local_failures_are_recoverable() {
        assert!(RelayError::not_found("clip.mp4").is_recoverable());
        assert!(RelayError::extraction("range").is_recoverable());
        assert!(RelayError::publish("timeout").is_recoverable());
        assert!(RelayError::engine("ffmpeg exited with 1").is_recoverable());
    }

    #[test]
    fn test_display_includes_key() {
        let err = RelayError::not_found("device-1760637121685");
        assert_eq!(err.to_string(), "Source not found: device-1760637121685");
    }
}
