//! Rollout errors.
//!
//! Unhealthy and timed-out rollouts are not errors; they come back as a
//! [`RolloutReport`](crate::RolloutReport).

use aca_image::ImageError;
use aca_revision::{BuildError, ConfigError, MaterializeError};
use thiserror::Error;

use crate::platform::PlatformError;

#[derive(Debug, Error)]
pub enum RolloutError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error("image build failed: {0}")]
    Image(#[from] ImageError),

    /// Create-or-update was refused or its operation failed. Never retried.
    #[error("platform rejected revision {revision}: {message}")]
    PlatformRejected {
        revision: String,
        code: Option<String>,
        message: String,
    },

    /// A platform call outside submission failed.
    #[error("platform error while {action}: {source}")]
    Platform {
        action: &'static str,
        #[source]
        source: PlatformError,
    },

    #[error("dry run needs image side effects: {}", actions.join("; "))]
    DryRunRefused { actions: Vec<String> },
}

impl RolloutError {
    /// True if the deploy never reached the platform.
    pub fn is_config_error(&self) -> bool {
        match self {
            RolloutError::Config(_) | RolloutError::DryRunRefused { .. } => true,
            RolloutError::Build(err) => err.is_config_error(),
            RolloutError::Materialize(err) => err.is_config_error(),
            _ => false,
        }
    }
}
