//! Scripted in-memory platform for tests.
//!
//! Create-or-update keeps one app per name and replaces it on resubmission.
//! Revision polls are served from a script; the last entry repeats once the
//! script runs out.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

use aca_reconcile::{HealthState, ProvisioningState, RunningState};
use aca_revision::payload::RevisionProperties;
use aca_revision::{ContainerAppPayload, RevisionResource};
use async_trait::async_trait;

use crate::platform::{OperationHandle, OperationStatus, Platform, PlatformError};

/// A recorded platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    CreateOrUpdate { app: String, revision_suffix: Option<String> },
    OperationStatus,
    GetRevision { app: String, revision: String },
    GetApp { app: String },
}

#[derive(Debug, Default)]
struct ScriptState {
    apps: BTreeMap<String, ContainerAppPayload>,
    revisions: BTreeSet<String>,
    creates: u32,
    updates: u32,
    calls: Vec<PlatformCall>,
    operation_script: VecDeque<Result<OperationStatus, PlatformError>>,
    revision_script: VecDeque<Result<Option<RevisionResource>, PlatformError>>,
    last_revision: Option<Result<Option<RevisionResource>, PlatformError>>,
}

/// Platform whose answers are scripted up front.
#[derive(Debug, Default)]
pub struct ScriptedPlatform {
    state: Mutex<ScriptState>,
    submit_error: Option<PlatformError>,
    async_operations: bool,
}

impl ScriptedPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an existing app.
    pub fn with_app(self, app: &str, payload: ContainerAppPayload) -> Self {
        self.lock().apps.insert(app.to_string(), payload);
        self
    }

    /// Reject every create-or-update.
    pub fn rejecting(mut self, error: PlatformError) -> Self {
        self.submit_error = Some(error);
        self
    }

    /// Return pending operation handles; statuses come from `statuses` and
    /// then `Succeeded`.
    pub fn with_operation_script(
        mut self,
        statuses: impl IntoIterator<Item = Result<OperationStatus, PlatformError>>,
    ) -> Self {
        self.async_operations = true;
        self.lock().operation_script.extend(statuses);
        self
    }

    /// Append revision poll results.
    pub fn with_revision_script(
        self,
        polls: impl IntoIterator<Item = Result<Option<RevisionResource>, PlatformError>>,
    ) -> Self {
        self.lock().revision_script.extend(polls);
        self
    }

    /// Append revision observations.
    pub fn with_revisions(self, revisions: impl IntoIterator<Item = RevisionResource>) -> Self {
        self.with_revision_script(revisions.into_iter().map(|r| Ok(Some(r))))
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.lock().calls.clone()
    }

    /// Number of revision polls served.
    pub fn revision_polls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, PlatformCall::GetRevision { .. }))
            .count()
    }

    pub fn creates(&self) -> u32 {
        self.lock().creates
    }

    pub fn updates(&self) -> u32 {
        self.lock().updates
    }

    /// Distinct revision suffixes ever submitted.
    pub fn revision_suffixes(&self) -> Vec<String> {
        self.lock().revisions.iter().cloned().collect()
    }

    pub fn app(&self, app: &str) -> Option<ContainerAppPayload> {
        self.lock().apps.get(app).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Platform for ScriptedPlatform {
    async fn create_or_update_app(
        &self,
        app: &str,
        payload: &ContainerAppPayload,
    ) -> Result<OperationHandle, PlatformError> {
        let mut state = self.lock();
        state.calls.push(PlatformCall::CreateOrUpdate {
            app: app.to_string(),
            revision_suffix: payload.revision_suffix().map(str::to_string),
        });

        if let Some(err) = &self.submit_error {
            return Err(err.clone());
        }

        if state.apps.insert(app.to_string(), payload.clone()).is_some() {
            state.updates += 1;
        } else {
            state.creates += 1;
        }
        if let Some(suffix) = payload.revision_suffix() {
            state.revisions.insert(suffix.to_string());
        }

        Ok(if self.async_operations {
            OperationHandle::Pending {
                status_url: format!("https://platform.test/operations/{app}"),
            }
        } else {
            OperationHandle::Completed
        })
    }

    async fn operation_status(
        &self,
        _handle: &OperationHandle,
    ) -> Result<OperationStatus, PlatformError> {
        let mut state = self.lock();
        state.calls.push(PlatformCall::OperationStatus);
        state
            .operation_script
            .pop_front()
            .unwrap_or(Ok(OperationStatus::Succeeded))
    }

    async fn get_revision(
        &self,
        app: &str,
        revision: &str,
    ) -> Result<Option<RevisionResource>, PlatformError> {
        let mut state = self.lock();
        state.calls.push(PlatformCall::GetRevision {
            app: app.to_string(),
            revision: revision.to_string(),
        });

        match state.revision_script.pop_front() {
            Some(next) => {
                state.last_revision = Some(next.clone());
                next
            }
            None => state.last_revision.clone().unwrap_or(Ok(None)),
        }
    }

    async fn get_app(&self, app: &str) -> Result<Option<ContainerAppPayload>, PlatformError> {
        let mut state = self.lock();
        state.calls.push(PlatformCall::GetApp {
            app: app.to_string(),
        });
        Ok(state.apps.get(app).cloned())
    }
}

/// Build a revision observation.
pub fn revision(
    name: &str,
    active: bool,
    health: &str,
    provisioning: &str,
    running: &str,
) -> RevisionResource {
    RevisionResource {
        name: name.to_string(),
        properties: RevisionProperties {
            active,
            health_state: HealthState::from(health),
            provisioning_state: ProvisioningState::from(provisioning),
            running_state: RunningState::from(running),
            fqdn: Some(format!("{name}.azurecontainerapps.io")),
            created_time: None,
            replicas: None,
            traffic_weight: None,
        },
    }
}
