//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors found while loading or validating app configuration.
///
/// All of these surface before any network call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("YAML file is empty")]
    Empty,

    #[error("YAML must contain 'containers' list")]
    MissingContainers,

    #[error("Each container must have a 'name'")]
    MissingContainerName,

    #[error("Container '{container}' must have '{field}'")]
    MissingField {
        container: String,
        field: &'static str,
    },

    #[error("Ingress must have 'target_port'")]
    MissingTargetPort,

    #[error("duplicate container name '{0}'")]
    DuplicateContainer(String),

    #[error("Container '{container}' declares more than one {kind} probe")]
    DuplicateProbe { container: String, kind: String },

    #[error("{0}")]
    Invalid(String),
}
