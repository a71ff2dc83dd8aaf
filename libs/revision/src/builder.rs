//! Revision payload assembly.
//!
//! Turns app configuration, a deployment target and resolved bindings into
//! the create-or-update payload for one revision. The only side effect is
//! republishing images configured with `existing_image_tag`; those retags
//! finish before the payload is handed out for submission.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

use aca_env::EnvProvider;
use aca_image::{retag_and_publish, ImageError, ImageRef, ImageRuntime};
use aca_reconcile::SpecHash;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::materialize::{
    container_environment, resolve_plain_env, secret_env_name, MaterializeError, SecretBindings,
};
use crate::model::{AppConfig, ContainerSpec, ImageSource, ProbeSpec};
use crate::payload::{
    AppConfiguration, AppProperties, ContainerAppPayload, IngressPayload, ManagedIdentity,
    PayloadContainer, RegistryCredentials, ResourcesPayload, RevisionTemplate, ScalePayload,
    SecretDefinition, ACTIVE_REVISIONS_MODE_SINGLE,
};
use crate::probes::{extract_probes, ProbeLookupError};

/// Maximum revision suffix length.
pub const MAX_SUFFIX_LENGTH: usize = 64;

/// Maximum container app name length.
pub const MAX_APP_NAME_LENGTH: usize = 32;

/// Name of the inline secret holding the registry password.
pub const REGISTRY_PASSWORD_SECRET: &str = "registry-password";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid deployment target: {0}")]
    InvalidTarget(String),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error("failed to hash revision payload: {0}")]
    Hash(#[from] serde_json::Error),
}

impl BuildError {
    /// True for errors caused by configuration rather than an external system.
    pub fn is_config_error(&self) -> bool {
        match self {
            BuildError::InvalidTarget(_) => true,
            BuildError::Materialize(err) => err.is_config_error(),
            BuildError::Image(ImageError::InvalidReference(_)) => true,
            BuildError::Image(_) | BuildError::Hash(_) => false,
        }
    }
}

// =============================================================================
// Names
// =============================================================================

/// A validated revision suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RevisionSuffix(String);

impl RevisionSuffix {
    pub fn parse(value: &str) -> Result<Self, BuildError> {
        validate_dns_label(value, "revision suffix", MAX_SUFFIX_LENGTH)?;
        Ok(Self(value.to_string()))
    }

    /// `<stage>-<UTC timestamp>`, e.g. `prod-20231215120000`.
    pub fn for_stage(stage: &str, now: DateTime<Utc>) -> Result<Self, BuildError> {
        Self::parse(&format!("{stage}-{}", now.format("%Y%m%d%H%M%S")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate a container app name.
pub fn validate_app_name(name: &str) -> Result<(), BuildError> {
    validate_dns_label(name, "app name", MAX_APP_NAME_LENGTH)
}

/// `<app>--<suffix>`.
pub fn revision_name(app: &str, suffix: &RevisionSuffix) -> String {
    format!("{app}--{suffix}")
}

fn validate_dns_label(value: &str, what: &str, max_len: usize) -> Result<(), BuildError> {
    let invalid = |reason: &str| BuildError::InvalidTarget(format!("{what} '{value}' {reason}"));

    if value.is_empty() {
        return Err(BuildError::InvalidTarget(format!("{what} cannot be empty")));
    }
    if value.len() > max_len {
        return Err(invalid(&format!("exceeds {max_len} characters")));
    }
    if !value.starts_with(|c: char| c.is_ascii_lowercase()) {
        return Err(invalid("must start with a lowercase letter"));
    }
    if value.ends_with('-') {
        return Err(invalid("must not end with '-'"));
    }
    if value.contains("--") {
        return Err(invalid("must not contain '--'"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid("may only contain lowercase letters, digits and '-'"));
    }
    Ok(())
}

// =============================================================================
// Target
// =============================================================================

/// How the platform authenticates to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryAuth {
    /// Pull with the app's user-assigned identity.
    Identity,
    /// Username plus a password read from the named environment variable.
    Password {
        username: String,
        password_env: String,
    },
}

/// Where and as what a revision is deployed.
#[derive(Debug, Clone)]
pub struct DeploymentTarget {
    pub app_name: String,
    pub location: String,
    pub environment_id: String,
    /// User-assigned identity resource ID.
    pub identity_id: String,
    pub registry_server: String,
    pub registry_auth: RegistryAuth,
    pub image_tag: String,
    pub revision_suffix: RevisionSuffix,
}

impl DeploymentTarget {
    pub fn validate(&self) -> Result<(), BuildError> {
        validate_app_name(&self.app_name)?;
        for (field, value) in [
            ("location", &self.location),
            ("environment_id", &self.environment_id),
            ("identity_id", &self.identity_id),
            ("registry_server", &self.registry_server),
        ] {
            if value.trim().is_empty() {
                return Err(BuildError::InvalidTarget(format!("{field} cannot be empty")));
            }
        }
        Ok(())
    }

    pub fn revision_name(&self) -> String {
        revision_name(&self.app_name, &self.revision_suffix)
    }

    /// Reference the container's image under the revision tag.
    pub fn image_for(&self, container: &ContainerSpec) -> Result<ImageRef, BuildError> {
        Ok(ImageRef::new(
            &self.registry_server,
            &container.image_name,
            &self.image_tag,
        )?)
    }
}

// =============================================================================
// Image plan
// =============================================================================

/// What has to happen to a container's image before submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageAction {
    Retag {
        container: String,
        source: ImageRef,
        target: ImageRef,
    },
    Build {
        container: String,
        dockerfile: PathBuf,
        target: ImageRef,
    },
    UsePublished {
        container: String,
        image: ImageRef,
    },
}

impl ImageAction {
    pub fn container(&self) -> &str {
        match self {
            ImageAction::Retag { container, .. }
            | ImageAction::Build { container, .. }
            | ImageAction::UsePublished { container, .. } => container,
        }
    }

    pub fn image(&self) -> &ImageRef {
        match self {
            ImageAction::Retag { target, .. } | ImageAction::Build { target, .. } => target,
            ImageAction::UsePublished { image, .. } => image,
        }
    }

    /// True if the action touches the registry.
    pub fn has_side_effects(&self) -> bool {
        !matches!(self, ImageAction::UsePublished { .. })
    }
}

impl fmt::Display for ImageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageAction::Retag {
                container,
                source,
                target,
            } => write!(f, "{container}: retag {source} -> {target}"),
            ImageAction::Build {
                container,
                dockerfile,
                target,
            } => write!(f, "{container}: build {} -> {target}", dockerfile.display()),
            ImageAction::UsePublished { container, image } => write!(f, "{container}: use {image}"),
        }
    }
}

/// Decide the image action for every container, in template order.
pub fn plan_images(
    config: &AppConfig,
    target: &DeploymentTarget,
) -> Result<Vec<ImageAction>, BuildError> {
    config
        .template
        .containers
        .iter()
        .map(|container| -> Result<ImageAction, BuildError> {
            let image = target.image_for(container)?;
            let name = container.name.clone();
            Ok(match container.image_source() {
                ImageSource::Retag(tag) => ImageAction::Retag {
                    container: name,
                    source: image.with_tag(tag)?,
                    target: image,
                },
                ImageSource::Build(dockerfile) => ImageAction::Build {
                    container: name,
                    dockerfile: dockerfile.clone(),
                    target: image,
                },
                ImageSource::Published => ImageAction::UsePublished {
                    container: name,
                    image,
                },
            })
        })
        .collect()
}

// =============================================================================
// Assembly
// =============================================================================

/// Inputs to payload assembly.
pub struct RevisionInputs<'a> {
    pub config: &'a AppConfig,
    pub target: &'a DeploymentTarget,
    pub secrets: &'a SecretBindings,
    pub env: &'a dyn EnvProvider,
    /// The app as currently deployed, if it exists.
    pub prior: Option<&'a ContainerAppPayload>,
}

/// A fully assembled revision, ready to submit.
#[derive(Debug, Clone)]
pub struct BuiltRevision {
    pub payload: ContainerAppPayload,
    pub revision_name: String,
    pub spec_hash: SpecHash,
    pub images: Vec<ImageRef>,
}

/// Run the retags a revision depends on, then assemble its payload.
///
/// The target and environment are checked first so configuration errors
/// surface before any image is republished.
pub async fn build_revision(
    inputs: RevisionInputs<'_>,
    runtime: &dyn ImageRuntime,
) -> Result<BuiltRevision, BuildError> {
    inputs.target.validate()?;
    let actions = plan_images(inputs.config, inputs.target)?;
    check_environment(inputs.config, inputs.target, inputs.env)?;
    publish_retags(&actions, runtime).await?;
    assemble_revision(inputs, &actions)
}

/// Run every retag in `actions`, in order.
pub async fn publish_retags(
    actions: &[ImageAction],
    runtime: &dyn ImageRuntime,
) -> Result<(), BuildError> {
    for action in actions {
        if let ImageAction::Retag {
            container,
            source,
            target,
        } = action
        {
            info!(container = %container, source = %source, target = %target, "Republishing image");
            retag_and_publish(runtime, source, target).await?;
        }
    }
    Ok(())
}

/// Check that every variable the revision needs is set.
///
/// Covers container variables and the registry password. All missing names
/// are reported in one error. A container variable named like a secret
/// binding is rejected here too, so assembly cannot fail on it later.
pub fn check_environment(
    config: &AppConfig,
    target: &DeploymentTarget,
    env: &dyn EnvProvider,
) -> Result<(), BuildError> {
    let secret_vars: HashSet<String> =
        config.secrets.iter().map(|s| secret_env_name(s)).collect();

    let mut missing = Vec::new();
    for container in &config.template.containers {
        if let Some(collision) = container.env_vars.iter().find(|v| secret_vars.contains(*v)) {
            return Err(MaterializeError::EnvCollision(collision.clone()).into());
        }
        match resolve_plain_env(env, &container.env_vars) {
            Ok(_) => {}
            Err(MaterializeError::MissingEnv { names }) => missing.extend(names),
            Err(err) => return Err(err.into()),
        }
    }
    missing.extend(missing_registry_password(target, env));

    if missing.is_empty() {
        return Ok(());
    }
    missing.sort();
    missing.dedup();
    Err(MaterializeError::MissingEnv { names: missing }.into())
}

/// Assemble the payload for already-resolved images. No side effects.
pub fn assemble_revision(
    inputs: RevisionInputs<'_>,
    actions: &[ImageAction],
) -> Result<BuiltRevision, BuildError> {
    let RevisionInputs {
        config,
        target,
        secrets,
        env,
        prior,
    } = inputs;
    target.validate()?;

    let mut missing = Vec::new();
    let mut containers = Vec::with_capacity(config.template.containers.len());
    let mut images = Vec::with_capacity(config.template.containers.len());

    for container in &config.template.containers {
        let image = match actions.iter().find(|a| a.container() == container.name) {
            Some(action) => action.image().clone(),
            None => target.image_for(container)?,
        };

        let plain = match resolve_plain_env(env, &container.env_vars) {
            Ok(plain) => plain,
            Err(MaterializeError::MissingEnv { names }) => {
                missing.extend(names);
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        containers.push(PayloadContainer {
            name: container.name.clone(),
            image: image.to_string(),
            resources: Some(ResourcesPayload {
                cpu: container.cpu,
                memory: container.memory.to_string(),
            }),
            env: container_environment(&plain, secrets)?,
            probes: effective_probes(container, prior),
        });
        images.push(image);
    }

    let (registry, registry_secret) = registry_credentials(target, env, &mut missing);

    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(MaterializeError::MissingEnv { names: missing }.into());
    }

    let mut secret_definitions = secrets.definitions();
    secret_definitions.extend(registry_secret);

    let payload = ContainerAppPayload {
        location: target.location.clone(),
        identity: Some(ManagedIdentity::user_assigned(&target.identity_id)),
        properties: AppProperties {
            managed_environment_id: Some(target.environment_id.clone()),
            configuration: AppConfiguration {
                active_revisions_mode: Some(ACTIVE_REVISIONS_MODE_SINGLE.to_string()),
                secrets: secret_definitions,
                registries: vec![registry],
                ingress: config.ingress.as_ref().map(|ingress| IngressPayload {
                    external: ingress.external,
                    target_port: ingress.target_port,
                    transport: Some(ingress.transport.to_string()),
                    fqdn: None,
                }),
            },
            template: RevisionTemplate {
                revision_suffix: Some(target.revision_suffix.to_string()),
                containers,
                scale: Some(ScalePayload {
                    min_replicas: Some(config.scale.min_replicas),
                    max_replicas: Some(config.scale.max_replicas),
                }),
            },
            provisioning_state: None,
            latest_revision_name: None,
            latest_ready_revision_name: None,
            latest_revision_fqdn: None,
        },
    };

    let spec_hash = SpecHash::of(&payload)?;
    let revision_name = target.revision_name();
    debug!(revision = %revision_name, spec_hash = %spec_hash, "Assembled revision payload");

    Ok(BuiltRevision {
        payload,
        revision_name,
        spec_hash,
        images,
    })
}

/// Declared probes, or the probes of the same-named container in the prior app.
fn effective_probes(
    container: &ContainerSpec,
    prior: Option<&ContainerAppPayload>,
) -> Vec<ProbeSpec> {
    if let Some(declared) = container.probes.as_ref().filter(|p| !p.is_empty()) {
        return declared.clone();
    }
    let Some(prior) = prior else {
        return Vec::new();
    };

    match extract_probes(prior.containers(), &container.name) {
        Ok(lookup) => {
            let inherited = lookup.probes().to_vec();
            if !inherited.is_empty() {
                debug!(
                    container = %container.name,
                    count = inherited.len(),
                    "Inheriting probes from running app"
                );
            }
            inherited
        }
        Err(ProbeLookupError::ContainerNotFound { .. }) => {
            debug!(container = %container.name, "New container, no probes to inherit");
            Vec::new()
        }
    }
}

/// The registry password variable, when password auth is used and it is unset.
fn missing_registry_password(target: &DeploymentTarget, env: &dyn EnvProvider) -> Option<String> {
    match &target.registry_auth {
        RegistryAuth::Password { password_env, .. } if env.get(password_env).is_none() => {
            Some(password_env.clone())
        }
        _ => None,
    }
}

fn registry_credentials(
    target: &DeploymentTarget,
    env: &dyn EnvProvider,
    missing: &mut Vec<String>,
) -> (RegistryCredentials, Option<SecretDefinition>) {
    match &target.registry_auth {
        RegistryAuth::Identity => (
            RegistryCredentials {
                server: target.registry_server.clone(),
                username: None,
                password_secret_ref: None,
                identity: Some(target.identity_id.clone()),
            },
            None,
        ),
        RegistryAuth::Password {
            username,
            password_env,
        } => {
            let secret = match env.get(password_env) {
                Some(password) => Some(SecretDefinition::inline(
                    REGISTRY_PASSWORD_SECRET,
                    password,
                )),
                None => {
                    missing.push(password_env.clone());
                    None
                }
            };
            (
                RegistryCredentials {
                    server: target.registry_server.clone(),
                    username: Some(username.clone()),
                    password_secret_ref: Some(REGISTRY_PASSWORD_SECRET.to_string()),
                    identity: None,
                },
                secret,
            )
        }
    }
}
