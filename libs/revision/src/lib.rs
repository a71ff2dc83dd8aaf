//! Container app revisions: model, configuration, and payload assembly.
//!
//! - [`model`]: containers, ingress, scale, probes
//! - [`config`]: YAML app configuration loader
//! - [`probes`]: probe lookup by container name and probe diffs
//! - [`materialize`]: secret and environment wiring
//! - [`payload`]: platform wire types
//! - [`builder`]: revision payload assembly

pub mod builder;
pub mod config;
mod error;
pub mod materialize;
pub mod model;
pub mod payload;
pub mod probes;

pub use builder::{
    assemble_revision, build_revision, check_environment, plan_images, publish_retags,
    revision_name, BuildError, BuiltRevision, DeploymentTarget, ImageAction, RegistryAuth,
    RevisionInputs, RevisionSuffix,
};
pub use config::{load_app_config, parse_app_config};
pub use error::ConfigError;
pub use materialize::{
    resolve_secrets, MaterializeError, SecretBindings, SecretStore, SecretStoreError,
    StaticSecretStore,
};
pub use model::{
    AppConfig, ApplicationTemplate, ContainerSpec, IngressSpec, ProbeKind, ProbeSpec,
    ScalingBounds, Transport,
};
pub use payload::{ContainerAppPayload, RevisionResource};
pub use probes::{diff_probes, extract_probes, ProbeChange, ProbeLookup, ProbeLookupError};
