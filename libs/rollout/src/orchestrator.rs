//! Revision rollout state machine.
//!
//! `Submitting -> Provisioning -> Activating -> Healthy | Unhealthy | TimedOut`
//!
//! One deadline covers both the wait on the create-or-update operation and
//! the revision polls. It is checked at the top of every iteration and no
//! sleep runs past it.

use std::time::Instant;

use aca_reconcile::{Clock, Deadline, PollPolicy, RevisionSnapshot, Verdict};
use aca_revision::BuiltRevision;
use tracing::{debug, info, instrument, warn};

use crate::error::RolloutError;
use crate::platform::{OperationHandle, OperationStatus, Platform, PlatformError};
use crate::report::{PhaseRecord, RevisionDeploymentResult, RolloutPhase, RolloutReport};

/// Phase history of one rollout.
#[derive(Debug, Clone)]
pub(crate) struct PhaseLog {
    started: Instant,
    records: Vec<PhaseRecord>,
}

impl PhaseLog {
    pub(crate) fn start(now: Instant) -> Self {
        Self {
            started: now,
            records: Vec::new(),
        }
    }

    pub(crate) fn enter(&mut self, phase: RolloutPhase, now: Instant) {
        debug!(phase = %phase, "Entering rollout phase");
        self.records.push(PhaseRecord {
            phase,
            at: now.saturating_duration_since(self.started),
        });
    }
}

/// Last thing the platform told us about the revision.
struct Observation {
    snapshot: RevisionSnapshot,
    url: Option<String>,
}

enum OperationOutcome {
    Completed,
    Expired,
}

/// Drives one revision from submission to a terminal phase.
pub struct Orchestrator<'a> {
    platform: &'a dyn Platform,
    clock: &'a dyn Clock,
    policy: PollPolicy,
}

impl<'a> Orchestrator<'a> {
    pub fn new(platform: &'a dyn Platform, clock: &'a dyn Clock, policy: PollPolicy) -> Self {
        Self {
            platform,
            clock,
            policy,
        }
    }

    /// Submit `built` with create-or-update semantics and wait for a
    /// terminal phase.
    ///
    /// Returns a report for healthy, unhealthy and timed-out rollouts.
    /// Platform rejections are errors.
    pub async fn rollout(
        &self,
        app: &str,
        built: &BuiltRevision,
    ) -> Result<RolloutReport, RolloutError> {
        self.run(app, built, PhaseLog::start(self.clock.now())).await
    }

    #[instrument(skip_all, fields(app = %app, revision = %built.revision_name))]
    pub(crate) async fn run(
        &self,
        app: &str,
        built: &BuiltRevision,
        mut log: PhaseLog,
    ) -> Result<RolloutReport, RolloutError> {
        let revision = built.revision_name.as_str();

        log.enter(RolloutPhase::Submitting, self.clock.now());
        info!(spec_hash = %built.spec_hash, "Submitting revision");
        let handle = self
            .platform
            .create_or_update_app(app, &built.payload)
            .await
            .map_err(|e| rejected(revision, e))?;

        log.enter(RolloutPhase::Provisioning, self.clock.now());
        let deadline = self.policy.deadline_from(self.clock.now());
        let mut last = Observation {
            snapshot: RevisionSnapshot::unobserved(),
            url: None,
        };

        if let OperationOutcome::Expired = self.await_operation(revision, &handle, &deadline).await? {
            warn!("Deadline reached while waiting for the platform operation");
            return Ok(self.finish(RolloutPhase::TimedOut, revision, last, log, 0));
        }

        log.enter(RolloutPhase::Activating, self.clock.now());
        let mut polls = 0u32;

        loop {
            if deadline.is_expired(self.clock.now()) {
                warn!(
                    polls,
                    health_state = %last.snapshot.health_state,
                    provisioning_state = %last.snapshot.provisioning_state,
                    running_state = %last.snapshot.running_state,
                    "Revision did not converge before the deadline"
                );
                return Ok(self.finish(RolloutPhase::TimedOut, revision, last, log, polls));
            }

            polls += 1;
            match self.platform.get_revision(app, revision).await {
                Ok(Some(resource)) => {
                    last = Observation {
                        snapshot: resource.snapshot(),
                        url: resource.url(),
                    };
                    debug!(
                        poll = polls,
                        active = last.snapshot.active,
                        health_state = %last.snapshot.health_state,
                        provisioning_state = %last.snapshot.provisioning_state,
                        running_state = %last.snapshot.running_state,
                        "Observed revision"
                    );

                    match last.snapshot.verdict() {
                        Verdict::Healthy => {
                            info!(polls, "Revision is healthy");
                            return Ok(self.finish(RolloutPhase::Healthy, revision, last, log, polls));
                        }
                        Verdict::Failed => {
                            warn!(
                                polls,
                                provisioning_state = %last.snapshot.provisioning_state,
                                running_state = %last.snapshot.running_state,
                                "Revision failed"
                            );
                            return Ok(self.finish(
                                RolloutPhase::Unhealthy,
                                revision,
                                last,
                                log,
                                polls,
                            ));
                        }
                        Verdict::Pending => {}
                    }
                }
                Ok(None) => debug!(poll = polls, "Revision not visible yet"),
                Err(e) if e.is_transient() => {
                    warn!(poll = polls, error = %e, "Transient error polling revision")
                }
                Err(e) => {
                    return Err(RolloutError::Platform {
                        action: "polling the revision",
                        source: e,
                    })
                }
            }

            let now = self.clock.now();
            self.clock
                .sleep(deadline.next_sleep(now, self.policy.interval))
                .await;
        }
    }

    async fn await_operation(
        &self,
        revision: &str,
        handle: &OperationHandle,
        deadline: &Deadline,
    ) -> Result<OperationOutcome, RolloutError> {
        if *handle == OperationHandle::Completed {
            return Ok(OperationOutcome::Completed);
        }

        loop {
            if deadline.is_expired(self.clock.now()) {
                return Ok(OperationOutcome::Expired);
            }

            match self.platform.operation_status(handle).await {
                Ok(OperationStatus::Succeeded) => {
                    debug!("Platform operation succeeded");
                    return Ok(OperationOutcome::Completed);
                }
                Ok(OperationStatus::Failed { code, message }) => {
                    return Err(RolloutError::PlatformRejected {
                        revision: revision.to_string(),
                        code,
                        message,
                    });
                }
                Ok(OperationStatus::InProgress) => debug!("Platform operation in progress"),
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Transient error polling platform operation")
                }
                Err(e) => return Err(rejected(revision, e)),
            }

            let now = self.clock.now();
            self.clock
                .sleep(deadline.next_sleep(now, self.policy.interval))
                .await;
        }
    }

    fn finish(
        &self,
        phase: RolloutPhase,
        revision: &str,
        last: Observation,
        mut log: PhaseLog,
        polls: u32,
    ) -> RolloutReport {
        debug_assert!(phase.is_terminal());
        let now = self.clock.now();
        log.enter(phase, now);
        RolloutReport {
            phase,
            result: RevisionDeploymentResult::from_snapshot(revision, last.snapshot, last.url),
            phases: log.records,
            polls,
            elapsed: now.saturating_duration_since(log.started),
        }
    }
}

fn rejected(revision: &str, err: PlatformError) -> RolloutError {
    let (code, message) = match err {
        PlatformError::Rejected { code, message, .. } => (Some(code), message),
        other => (None, other.to_string()),
    };
    RolloutError::PlatformRejected {
        revision: revision.to_string(),
        code,
        message,
    }
}
