//! Health classification for revisions.
//!
//! A revision is healthy only when every one of these holds:
//!
//! - it is active
//! - the health state is `Healthy`
//! - the provisioning state is `Provisioned`
//! - the running state is not `Stopped`, `Degraded` or `Failed`
//!
//! No field dominates another. The rollout loop and the status query both
//! go through [`is_healthy`].

use serde::{Deserialize, Serialize};

use crate::state::{HealthState, ProvisioningState, RunningState};

/// Classify the four reported fields into a healthy/unhealthy verdict.
pub fn is_healthy(
    active: bool,
    health_state: &HealthState,
    provisioning_state: &ProvisioningState,
    running_state: &RunningState,
) -> bool {
    active
        && *health_state == HealthState::Healthy
        && *provisioning_state == ProvisioningState::Provisioned
        && !matches!(
            running_state,
            RunningState::Stopped | RunningState::Degraded | RunningState::Failed
        )
}

/// Outcome of classifying one observation during a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The revision satisfies the health rule.
    Healthy,

    /// The platform reported an unambiguous failure.
    Failed,

    /// Still converging (or not yet visible).
    Pending,
}

/// The four fields that decide revision health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSnapshot {
    pub active: bool,
    pub health_state: HealthState,
    pub provisioning_state: ProvisioningState,
    pub running_state: RunningState,
}

impl RevisionSnapshot {
    /// Snapshot used before the platform has reported anything.
    pub fn unobserved() -> Self {
        Self {
            active: false,
            health_state: HealthState::None,
            provisioning_state: ProvisioningState::Other("Unknown".to_string()),
            running_state: RunningState::Unknown,
        }
    }

    pub fn is_healthy(&self) -> bool {
        is_healthy(
            self.active,
            &self.health_state,
            &self.provisioning_state,
            &self.running_state,
        )
    }

    /// Returns true if the platform reports a failure that will not resolve
    /// by waiting.
    pub fn is_definitively_failed(&self) -> bool {
        self.provisioning_state == ProvisioningState::Failed
            || self.running_state == RunningState::Failed
    }

    /// Classify for the polling loop. Health is checked first.
    pub fn verdict(&self) -> Verdict {
        if self.is_healthy() {
            Verdict::Healthy
        } else if self.is_definitively_failed() {
            Verdict::Failed
        } else {
            Verdict::Pending
        }
    }
}
