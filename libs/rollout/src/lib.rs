//! Revision rollouts.
//!
//! A rollout submits a revision with create-or-update semantics, waits for
//! the platform operation, then polls the revision until it is healthy,
//! definitively failed, or out of time:
//!
//! ```text
//! [Building] -> Submitting -> Provisioning -> Activating -> Healthy
//!                                                       \-> Unhealthy
//!                                                       \-> TimedOut
//! ```
//!
//! Unhealthy and timed-out rollouts are reported, not raised. Platform
//! rejections are errors and are never retried here.

mod deploy;
mod error;
pub mod mock;
mod orchestrator;
mod platform;
mod report;
mod status;

pub use deploy::{ContainerProbeDiff, DeployPlan, Deployer, DryRun};
pub use error::RolloutError;
pub use orchestrator::Orchestrator;
pub use platform::{OperationHandle, OperationStatus, Platform, PlatformError};
pub use report::{PhaseRecord, RevisionDeploymentResult, RolloutPhase, RolloutReport};
pub use status::{query_latest_revision, query_revision};
