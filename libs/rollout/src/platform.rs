//! The hosting platform as seen by a rollout.

use aca_revision::{ContainerAppPayload, RevisionResource};
use async_trait::async_trait;
use thiserror::Error;

/// Handle for an asynchronous create-or-update operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationHandle {
    /// The platform finished synchronously.
    Completed,
    /// Poll `status_url` until the operation resolves.
    Pending { status_url: String },
}

/// State of an asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    InProgress,
    Succeeded,
    Failed {
        code: Option<String>,
        message: String,
    },
}

/// Errors talking to the platform.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// The platform refused the request.
    #[error("platform rejected the request ({status}): {code}: {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    #[error("resource not found: {0}")]
    NotFound(String),

    /// Network or connection failure.
    #[error("platform request failed: {0}")]
    Transport(String),

    /// A response did not match the expected structure.
    #[error("invalid platform response: {0}")]
    InvalidResponse(String),

    #[error("platform authentication failed: {0}")]
    Auth(String),
}

impl PlatformError {
    /// Errors that may go away on their own (network blips, throttling,
    /// server-side failures).
    pub fn is_transient(&self) -> bool {
        match self {
            PlatformError::Transport(_) => true,
            PlatformError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Container app management operations.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Create the app or update it in place.
    async fn create_or_update_app(
        &self,
        app: &str,
        payload: &ContainerAppPayload,
    ) -> Result<OperationHandle, PlatformError>;

    /// Current status of an operation returned by `create_or_update_app`.
    async fn operation_status(
        &self,
        handle: &OperationHandle,
    ) -> Result<OperationStatus, PlatformError>;

    /// Fetch a revision. `None` if the platform does not know it (yet).
    async fn get_revision(
        &self,
        app: &str,
        revision: &str,
    ) -> Result<Option<RevisionResource>, PlatformError>;

    /// Fetch the app as currently deployed. `None` if it does not exist.
    async fn get_app(&self, app: &str) -> Result<Option<ContainerAppPayload>, PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PlatformError::Transport("reset".to_string()).is_transient());
        assert!(PlatformError::Rejected {
            status: 503,
            code: "ServiceUnavailable".to_string(),
            message: String::new(),
        }
        .is_transient());
        assert!(PlatformError::Rejected {
            status: 429,
            code: "TooManyRequests".to_string(),
            message: String::new(),
        }
        .is_transient());
        assert!(!PlatformError::Rejected {
            status: 400,
            code: "InvalidParameterValue".to_string(),
            message: String::new(),
        }
        .is_transient());
        assert!(!PlatformError::Auth("expired".to_string()).is_transient());
    }
}
