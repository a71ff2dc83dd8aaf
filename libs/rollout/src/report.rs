//! Rollout phases and terminal reports.

use std::fmt;
use std::time::Duration;

use aca_reconcile::{HealthState, ProvisioningState, RevisionSnapshot, RunningState};
use serde::{Serialize, Serializer};

/// Phases of a rollout. The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutPhase {
    Building,
    Submitting,
    Provisioning,
    Activating,
    Healthy,
    Unhealthy,
    TimedOut,
}

impl RolloutPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RolloutPhase::Healthy | RolloutPhase::Unhealthy | RolloutPhase::TimedOut
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RolloutPhase::Building => "building",
            RolloutPhase::Submitting => "submitting",
            RolloutPhase::Provisioning => "provisioning",
            RolloutPhase::Activating => "activating",
            RolloutPhase::Healthy => "healthy",
            RolloutPhase::Unhealthy => "unhealthy",
            RolloutPhase::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for RolloutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed state of a revision at the end of a rollout or status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionDeploymentResult {
    pub revision_name: String,
    pub active: bool,
    pub health_state: HealthState,
    pub provisioning_state: ProvisioningState,
    pub running_state: RunningState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_url: Option<String>,
}

impl RevisionDeploymentResult {
    pub fn from_snapshot(
        revision_name: impl Into<String>,
        snapshot: RevisionSnapshot,
        revision_url: Option<String>,
    ) -> Self {
        Self {
            revision_name: revision_name.into(),
            active: snapshot.active,
            health_state: snapshot.health_state,
            provisioning_state: snapshot.provisioning_state,
            running_state: snapshot.running_state,
            revision_url,
        }
    }

    /// Active, healthy, provisioned and not stopped, degraded or failed.
    pub fn is_healthy(&self) -> bool {
        aca_reconcile::is_healthy(
            self.active,
            &self.health_state,
            &self.provisioning_state,
            &self.running_state,
        )
    }
}

/// When a phase was entered, relative to the start of the rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseRecord {
    pub phase: RolloutPhase,
    #[serde(rename = "at_ms", serialize_with = "as_millis")]
    pub at: Duration,
}

/// Outcome of a rollout that reached a terminal phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolloutReport {
    pub phase: RolloutPhase,
    pub result: RevisionDeploymentResult,
    pub phases: Vec<PhaseRecord>,
    /// Number of revision polls.
    pub polls: u32,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl RolloutReport {
    pub fn is_healthy(&self) -> bool {
        self.phase == RolloutPhase::Healthy
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_health_matches_classifier() {
        let healthy = RevisionDeploymentResult {
            revision_name: "myapp--prod-1".to_string(),
            active: true,
            health_state: HealthState::Healthy,
            provisioning_state: ProvisioningState::Provisioned,
            running_state: RunningState::Running,
            revision_url: None,
        };
        assert!(healthy.is_healthy());

        let inactive = RevisionDeploymentResult {
            active: false,
            ..healthy.clone()
        };
        assert!(!inactive.is_healthy());
    }

    #[test]
    fn test_report_json_shape() {
        let report = RolloutReport {
            phase: RolloutPhase::TimedOut,
            result: RevisionDeploymentResult::from_snapshot(
                "myapp--prod-1",
                RevisionSnapshot::unobserved(),
                None,
            ),
            phases: vec![PhaseRecord {
                phase: RolloutPhase::Submitting,
                at: Duration::ZERO,
            }],
            polls: 30,
            elapsed: Duration::from_secs(300),
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["phase"], "timed_out");
        assert_eq!(json["elapsed_ms"], 300_000);
        assert_eq!(json["phases"][0]["phase"], "submitting");
        assert_eq!(json["result"]["running_state"], "Unknown");
        assert!(json["result"].get("revision_url").is_none());
    }
}
