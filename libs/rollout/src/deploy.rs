//! The full deploy pipeline.
//!
//! Configuration and environment are checked before any network call. Then
//! the current app is fetched and secrets are resolved. Images are built and
//! retagged next, the payload referencing them is assembled, and the revision
//! is rolled out last.

use aca_env::EnvProvider;
use aca_image::{build_and_publish, ImageRuntime};
use aca_reconcile::{Clock, PollPolicy};
use aca_revision::{
    assemble_revision, check_environment, diff_probes, extract_probes, plan_images,
    publish_retags, resolve_secrets, AppConfig, BuiltRevision, ContainerAppPayload,
    DeploymentTarget, ImageAction, ProbeChange, RevisionInputs, SecretBindings, SecretStore,
};
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::RolloutError;
use crate::orchestrator::{Orchestrator, PhaseLog};
use crate::platform::Platform;
use crate::report::{RolloutPhase, RolloutReport};

/// What to deploy and where.
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub config: AppConfig,
    pub target: DeploymentTarget,
}

/// Probe changes of one container against the running app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerProbeDiff {
    pub container: String,
    pub changes: Vec<ProbeChange>,
}

/// Result of a dry run.
#[derive(Debug, Clone)]
pub struct DryRun {
    pub built: BuiltRevision,
    /// Whether the app already exists (update) or not (create).
    pub app_exists: bool,
    pub probe_diffs: Vec<ContainerProbeDiff>,
}

/// Runs deploy plans against a platform.
pub struct Deployer<'a> {
    platform: &'a dyn Platform,
    images: &'a dyn ImageRuntime,
    secrets: &'a dyn SecretStore,
    env: &'a dyn EnvProvider,
    clock: &'a dyn Clock,
    policy: PollPolicy,
}

impl<'a> Deployer<'a> {
    pub fn new(
        platform: &'a dyn Platform,
        images: &'a dyn ImageRuntime,
        secrets: &'a dyn SecretStore,
        env: &'a dyn EnvProvider,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            platform,
            images,
            secrets,
            env,
            clock,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build, submit and watch one revision.
    #[instrument(skip_all, fields(app = %plan.target.app_name, suffix = %plan.target.revision_suffix))]
    pub async fn deploy(&self, plan: &DeployPlan) -> Result<RolloutReport, RolloutError> {
        let mut log = PhaseLog::start(self.clock.now());

        let actions = self.validate(plan)?;
        let prior = self.current_app(&plan.target.app_name).await?;
        let secrets = self.bind_secrets(plan).await?;

        let builds: Vec<_> = actions
            .iter()
            .filter_map(|action| match action {
                ImageAction::Build {
                    container,
                    dockerfile,
                    target,
                } => Some((container, dockerfile, target)),
                _ => None,
            })
            .collect();
        if !builds.is_empty() {
            log.enter(RolloutPhase::Building, self.clock.now());
            for (container, dockerfile, target) in builds {
                info!(container = %container, image = %target, "Building image");
                build_and_publish(self.images, dockerfile, target).await?;
            }
        }

        publish_retags(&actions, self.images).await?;
        let built = self.assemble(plan, prior.as_ref(), &secrets, &actions)?;

        Orchestrator::new(self.platform, self.clock, self.policy)
            .run(&plan.target.app_name, &built, log)
            .await
    }

    /// Assemble the payload without submitting it.
    ///
    /// Plans that would build or republish images are refused rather than
    /// silently skipping those steps.
    pub async fn plan_only(&self, plan: &DeployPlan) -> Result<DryRun, RolloutError> {
        let actions = self.validate(plan)?;

        let side_effects: Vec<String> = actions
            .iter()
            .filter(|a| a.has_side_effects())
            .map(ToString::to_string)
            .collect();
        if !side_effects.is_empty() {
            return Err(RolloutError::DryRunRefused {
                actions: side_effects,
            });
        }

        let prior = self.current_app(&plan.target.app_name).await?;
        let secrets = self.bind_secrets(plan).await?;
        let built = self.assemble(plan, prior.as_ref(), &secrets, &actions)?;

        let probe_diffs = match &prior {
            Some(prior) => probe_diffs(prior, &built.payload),
            None => Vec::new(),
        };

        Ok(DryRun {
            built,
            app_exists: prior.is_some(),
            probe_diffs,
        })
    }

    fn validate(&self, plan: &DeployPlan) -> Result<Vec<ImageAction>, RolloutError> {
        plan.target.validate()?;
        let actions = plan_images(&plan.config, &plan.target)?;
        check_environment(&plan.config, &plan.target, self.env)?;
        Ok(actions)
    }

    async fn current_app(&self, app: &str) -> Result<Option<ContainerAppPayload>, RolloutError> {
        self.platform
            .get_app(app)
            .await
            .map_err(|source| RolloutError::Platform {
                action: "fetching the current app",
                source,
            })
    }

    async fn bind_secrets(&self, plan: &DeployPlan) -> Result<SecretBindings, RolloutError> {
        Ok(resolve_secrets(
            self.secrets,
            &plan.config.secrets,
            &plan.target.identity_id,
        )
        .await?)
    }

    fn assemble(
        &self,
        plan: &DeployPlan,
        prior: Option<&ContainerAppPayload>,
        secrets: &SecretBindings,
        actions: &[ImageAction],
    ) -> Result<BuiltRevision, RolloutError> {
        Ok(assemble_revision(
            RevisionInputs {
                config: &plan.config,
                target: &plan.target,
                secrets,
                env: self.env,
                prior,
            },
            actions,
        )?)
    }
}

fn probe_diffs(prior: &ContainerAppPayload, desired: &ContainerAppPayload) -> Vec<ContainerProbeDiff> {
    desired
        .containers()
        .iter()
        .filter_map(|container| {
            let current = extract_probes(prior.containers(), &container.name)
                .map(|lookup| lookup.probes())
                .unwrap_or(&[]);
            let changes = diff_probes(current, &container.probes);
            (!changes.is_empty()).then(|| ContainerProbeDiff {
                container: container.name.clone(),
                changes,
            })
        })
        .collect()
}
