//! Error types for image operations.

use thiserror::Error;

/// Errors from image operations.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The reference (or one of its parts) is malformed.
    #[error("invalid image reference: {0}")]
    InvalidReference(String),

    /// The runtime binary could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The runtime ran but reported failure.
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Retag-and-publish aborted. The step that failed is kept as the source.
    #[error("existing image {source_ref} does not exist or retagging failed")]
    RetagFailed {
        source_ref: String,
        target_ref: String,
        #[source]
        cause: Box<ImageError>,
    },
}

impl ImageError {
    /// Returns true if this is the consolidated retag failure.
    pub fn is_retag_failure(&self) -> bool {
        matches!(self, ImageError::RetagFailed { .. })
    }
}
