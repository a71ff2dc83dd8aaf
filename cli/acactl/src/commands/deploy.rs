//! Deploy command.

use std::path::PathBuf;

use aca_env::{EnvFile, LayeredEnv, ProcessEnv};
use aca_reconcile::TokioClock;
use aca_revision::{
    load_app_config, AppConfig, DeploymentTarget, RegistryAuth, RevisionSuffix, SecretStore,
    StaticSecretStore,
};
use aca_rollout::{DeployPlan, Deployer, DryRun, RolloutError, RolloutPhase};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{CliContext, PollSettings};
use crate::error::CliError;
use crate::hash::config_hash_from_path;
use crate::keyvault::KeyVaultStore;
use crate::output::{print_info, print_report, print_single, print_success, print_warning, OutputFormat};
use crate::token::{self, VAULT_AUDIENCE};

use super::{require, CommandContext};

/// Deploy one revision of a container app.
#[derive(Debug, Args)]
pub struct DeployCommand {
    /// Container app name.
    app: String,

    /// App config file (YAML).
    #[arg(long, short = 'c', value_name = "PATH", default_value = "app-config.yaml")]
    config: PathBuf,

    /// Dotenv file consulted after the process environment.
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Stage used in the default revision suffix.
    #[arg(long, default_value = "dev")]
    stage: String,

    /// Revision suffix. Defaults to `<stage>-<UTC timestamp>`.
    #[arg(long)]
    suffix: Option<String>,

    /// Image tag to publish and reference. Defaults to the revision suffix.
    #[arg(long)]
    tag: Option<String>,

    /// Managed environment name or resource ID.
    #[arg(long)]
    environment: Option<String>,

    /// Azure region of the app.
    #[arg(long)]
    location: Option<String>,

    /// Registry login server.
    #[arg(long)]
    registry: Option<String>,

    /// User-assigned identity name or resource ID.
    #[arg(long)]
    identity: Option<String>,

    /// Key vault holding the app's secrets.
    #[arg(long)]
    key_vault: Option<String>,

    /// Registry username. Switches registry auth from the managed identity to a password.
    #[arg(long, requires = "registry_password_env")]
    registry_username: Option<String>,

    /// Environment variable holding the registry password.
    #[arg(long, requires = "registry_username")]
    registry_password_env: Option<String>,

    /// Seconds between revision polls.
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Seconds to wait for the revision to become healthy.
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Assemble the revision and show it without deploying.
    #[arg(long)]
    dry_run: bool,
}

/// Dry-run summary.
#[derive(Debug, Serialize)]
struct PlanView<'a> {
    dry_run: bool,
    app: &'a str,
    revision_name: &'a str,
    spec_hash: String,
    config_hash: &'a str,
    app_exists: bool,
    images: Vec<String>,
    probe_diffs: &'a [aca_rollout::ContainerProbeDiff],
    payload: &'a aca_revision::ContainerAppPayload,
}

impl DeployCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let app_config = load_app_config(&self.config).map_err(RolloutError::from)?;
        let config_hash = config_hash_from_path(&self.config)?;
        info!(path = %self.config.display(), config_hash = %config_hash, "Loaded app config");

        let mut context = ctx.config.context.clone();
        context.merge(self.context_overrides());

        let target = self.target(&ctx, &context)?;
        let policy = self.poll_settings(ctx.config.polling).policy()?;

        let mut env = LayeredEnv::new().with_layer(ProcessEnv);
        if let Some(path) = &self.env_file {
            let file = EnvFile::read_from_file(path)
                .with_context(|| format!("failed to read env file {}", path.display()))?;
            debug!(
                path = %path.display(),
                keys = ?file.keys().collect::<Vec<_>>(),
                "Loaded env file"
            );
            env = env.with_layer(file);
        }

        let secrets = secret_store(&ctx, &context, &app_config).await?;
        let arm = ctx.arm().await?;
        let images = ctx.images();
        let clock = TokioClock;

        let deployer = Deployer::new(&arm, &images, secrets.as_ref(), &env, &clock).with_policy(policy);
        let plan = DeployPlan {
            config: app_config,
            target,
        };

        if self.dry_run {
            let dry_run = deployer.plan_only(&plan).await?;
            print_plan(&self.app, &config_hash, &dry_run, ctx.format);
            return Ok(());
        }

        info!(
            app = %self.app,
            revision = %plan.target.revision_name(),
            timeout_secs = policy.timeout.as_secs(),
            "Starting deploy"
        );
        let report = deployer.deploy(&plan).await?;
        print_report(&report, ctx.format);

        let revision = report.result.revision_name.clone();
        match report.phase {
            RolloutPhase::Healthy => {
                if ctx.format == OutputFormat::Table {
                    print_success(&format!("Revision {revision} is healthy"));
                }
                Ok(())
            }
            RolloutPhase::TimedOut => Err(CliError::TimedOut {
                revision,
                timeout_secs: policy.timeout.as_secs(),
            }
            .into()),
            _ => Err(CliError::Unhealthy { revision }.into()),
        }
    }

    fn context_overrides(&self) -> CliContext {
        CliContext {
            environment: self.environment.clone(),
            location: self.location.clone(),
            registry: self.registry.clone(),
            identity: self.identity.clone(),
            key_vault: self.key_vault.clone(),
            ..Default::default()
        }
    }

    fn poll_settings(&self, saved: PollSettings) -> PollSettings {
        PollSettings {
            interval_secs: self.poll_interval.unwrap_or(saved.interval_secs),
            timeout_secs: self.timeout.unwrap_or(saved.timeout_secs),
        }
    }

    fn target(&self, ctx: &CommandContext, context: &CliContext) -> Result<DeploymentTarget> {
        let scope = ctx.scope()?;
        let environment = require(context.environment.as_deref(), "managed environment", "--environment")?;
        let identity = require(context.identity.as_deref(), "identity", "--identity")?;
        let location = require(context.location.as_deref(), "location", "--location")?;
        let registry = require(context.registry.as_deref(), "registry", "--registry")?;

        let revision_suffix = match &self.suffix {
            Some(suffix) => RevisionSuffix::parse(suffix),
            None => RevisionSuffix::for_stage(&self.stage, Utc::now()),
        }
        .map_err(RolloutError::from)?;

        let registry_auth = match (&self.registry_username, &self.registry_password_env) {
            (Some(username), Some(password_env)) => RegistryAuth::Password {
                username: username.clone(),
                password_env: password_env.clone(),
            },
            _ => RegistryAuth::Identity,
        };

        Ok(DeploymentTarget {
            app_name: self.app.clone(),
            location: location.to_string(),
            environment_id: scope.managed_environment_id(environment)?,
            identity_id: scope.identity_id(identity)?,
            registry_server: registry.to_string(),
            registry_auth,
            image_tag: self
                .tag
                .clone()
                .unwrap_or_else(|| revision_suffix.as_str().to_string()),
            revision_suffix,
        })
    }
}

/// Key Vault when the config names secrets, otherwise an empty store.
async fn secret_store(
    ctx: &CommandContext,
    context: &CliContext,
    config: &AppConfig,
) -> Result<Box<dyn SecretStore>> {
    if config.secrets.is_empty() {
        return Ok(Box::new(StaticSecretStore::default()));
    }

    let vault = require(context.key_vault.as_deref(), "key vault", "--key-vault")?;
    let token = token::access_token(ctx.vault_token.as_deref(), VAULT_AUDIENCE).await?;
    Ok(Box::new(KeyVaultStore::new(vault, &token)?))
}

fn print_plan(app: &str, config_hash: &str, dry_run: &DryRun, format: OutputFormat) {
    let view = PlanView {
        dry_run: true,
        app,
        revision_name: &dry_run.built.revision_name,
        spec_hash: dry_run.built.spec_hash.to_string(),
        config_hash,
        app_exists: dry_run.app_exists,
        images: dry_run.built.images.iter().map(ToString::to_string).collect(),
        probe_diffs: &dry_run.probe_diffs,
        payload: &dry_run.built.payload,
    };

    match format {
        OutputFormat::Json => print_single(&view),
        OutputFormat::Table => {
            print_info("Plan (dry-run):");
            println!(
                "- {} app {}",
                if view.app_exists { "update" } else { "create" },
                view.app
            );
            println!("- revision: {}", view.revision_name);
            println!("- spec_hash: {}", view.spec_hash);
            println!("- config_hash: {}", view.config_hash);
            for image in &view.images {
                println!("- image: {image}");
            }
            if view.app_exists && view.probe_diffs.is_empty() {
                println!("- probes: unchanged");
            }
            for diff in view.probe_diffs {
                for change in &diff.changes {
                    print_warning(&format!("probe change in {}: {change}", diff.container));
                }
            }
        }
    }
}
