//! Secret and environment materialization.
//!
//! Secret names become app-level secret definitions that point at the secret
//! store, plus an environment variable on every container that references
//! them. Plain variables are read through an [`EnvProvider`]; nothing here
//! reads the process environment directly.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use aca_env::{require_all, EnvError, EnvProvider};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::model::SecretReference;
use crate::payload::{EnvVarPayload, SecretDefinition};

/// Errors from the secret store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretStoreError {
    #[error("secret '{0}' not found")]
    NotFound(String),

    #[error("access to secret '{name}' denied: {reason}")]
    Forbidden { name: String, reason: String },

    #[error("secret store unavailable: {0}")]
    Unavailable(String),
}

/// Resolves secret names to their store location.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Return the location (versionless URL) of the named secret.
    async fn resolve_secret(&self, name: &str) -> Result<String, SecretStoreError>;
}

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("missing environment variables: {}", names.join(", "))]
    MissingEnv { names: Vec<String> },

    #[error(transparent)]
    InvalidEnv(EnvError),

    #[error("duplicate secret '{0}'")]
    DuplicateSecret(String),

    #[error("environment variable '{0}' is defined both as a plain value and as a secret")]
    EnvCollision(String),

    #[error("failed to resolve secret '{name}': {source}")]
    SecretStore {
        name: String,
        #[source]
        source: SecretStoreError,
    },
}

impl MaterializeError {
    /// Configuration problems, as opposed to secret store failures.
    pub fn is_config_error(&self) -> bool {
        !matches!(self, MaterializeError::SecretStore { .. })
    }
}

impl From<EnvError> for MaterializeError {
    fn from(err: EnvError) -> Self {
        match err {
            EnvError::Missing { names } => MaterializeError::MissingEnv { names },
            other => MaterializeError::InvalidEnv(other),
        }
    }
}

/// Where an environment variable's value comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum EnvSource {
    Value(String),
    SecretRef(String),
}

impl fmt::Debug for EnvSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvSource::Value(_) => f.write_str("Value([REDACTED])"),
            EnvSource::SecretRef(name) => f.debug_tuple("SecretRef").field(name).finish(),
        }
    }
}

/// One container environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVarBinding {
    pub name: String,
    pub source: EnvSource,
}

impl From<&EnvVarBinding> for EnvVarPayload {
    fn from(binding: &EnvVarBinding) -> Self {
        match &binding.source {
            EnvSource::Value(value) => EnvVarPayload {
                name: binding.name.clone(),
                value: Some(value.clone()),
                secret_ref: None,
            },
            EnvSource::SecretRef(secret) => EnvVarPayload {
                name: binding.name.clone(),
                value: None,
                secret_ref: Some(secret.clone()),
            },
        }
    }
}

/// Secret definitions and the env bindings that reference them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretBindings {
    pub secrets: Vec<SecretReference>,
    pub env: Vec<EnvVarBinding>,
}

impl SecretBindings {
    /// App-level secret definitions for the payload.
    pub fn definitions(&self) -> Vec<SecretDefinition> {
        self.secrets
            .iter()
            .map(|s| SecretDefinition::key_vault(&s.name, &s.key_vault_url, &s.identity))
            .collect()
    }
}

/// Name of the app-level secret for a store secret.
pub fn secret_ref_name(secret: &str) -> String {
    secret.to_ascii_lowercase()
}

/// Environment variable name for a store secret.
pub fn secret_env_name(secret: &str) -> String {
    secret.to_ascii_uppercase().replace('-', "_")
}

/// Resolve each secret through the store and bind it to an env variable.
pub async fn resolve_secrets(
    store: &dyn SecretStore,
    names: &[String],
    identity: &str,
) -> Result<SecretBindings, MaterializeError> {
    let mut seen = HashSet::new();
    let mut bindings = SecretBindings::default();

    for name in names {
        let ref_name = secret_ref_name(name);
        if !seen.insert(ref_name.clone()) {
            return Err(MaterializeError::DuplicateSecret(name.clone()));
        }

        let env_name = secret_env_name(name);
        aca_env::validate_key(&env_name)?;

        let key_vault_url =
            store
                .resolve_secret(name)
                .await
                .map_err(|source| MaterializeError::SecretStore {
                    name: name.clone(),
                    source,
                })?;
        debug!(secret = %name, env = %env_name, "Resolved secret");

        bindings.secrets.push(SecretReference {
            name: ref_name.clone(),
            key_vault_url,
            identity: identity.to_string(),
        });
        bindings.env.push(EnvVarBinding {
            name: env_name,
            source: EnvSource::SecretRef(ref_name),
        });
    }

    if !bindings.secrets.is_empty() {
        info!(count = bindings.secrets.len(), "Secrets bound");
    }
    Ok(bindings)
}

/// Resolve plain variables. All missing names are reported together.
pub fn resolve_plain_env(
    env: &dyn EnvProvider,
    names: &[String],
) -> Result<Vec<EnvVarBinding>, MaterializeError> {
    Ok(require_all(env, names)?
        .into_iter()
        .map(|(name, value)| EnvVarBinding {
            name,
            source: EnvSource::Value(value),
        })
        .collect())
}

/// Final environment block of one container.
///
/// Plain variables come first in declared order, then secret bindings.
pub fn container_environment(
    plain: &[EnvVarBinding],
    secrets: &SecretBindings,
) -> Result<Vec<EnvVarPayload>, MaterializeError> {
    let secret_names: BTreeMap<&str, &EnvVarBinding> =
        secrets.env.iter().map(|b| (b.name.as_str(), b)).collect();

    if let Some(collision) = plain
        .iter()
        .find(|b| secret_names.contains_key(b.name.as_str()))
    {
        return Err(MaterializeError::EnvCollision(collision.name.clone()));
    }

    Ok(plain
        .iter()
        .chain(secrets.env.iter())
        .map(EnvVarPayload::from)
        .collect())
}

/// Secret store backed by a fixed set of names.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretStore {
    vault_uri: String,
    names: HashSet<String>,
}

impl StaticSecretStore {
    pub fn new(vault_uri: impl Into<String>) -> Self {
        Self {
            vault_uri: vault_uri.into().trim_end_matches('/').to_string(),
            names: HashSet::new(),
        }
    }

    pub fn with_secret(mut self, name: impl Into<String>) -> Self {
        self.names.insert(name.into());
        self
    }
}

#[async_trait]
impl SecretStore for StaticSecretStore {
    async fn resolve_secret(&self, name: &str) -> Result<String, SecretStoreError> {
        if self.names.contains(name) {
            Ok(format!("{}/secrets/{}", self.vault_uri, name))
        } else {
            Err(SecretStoreError::NotFound(name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aca_env::EnvFile;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn store() -> StaticSecretStore {
        StaticSecretStore::new("https://myvault.vault.azure.net/")
            .with_secret("Database-Url")
            .with_secret("api-key")
    }

    #[tokio::test]
    async fn test_secret_naming() {
        let bindings = resolve_secrets(&store(), &names(&["Database-Url"]), "identity-id")
            .await
            .unwrap();

        assert_eq!(
            bindings.secrets,
            vec![SecretReference {
                name: "database-url".to_string(),
                key_vault_url: "https://myvault.vault.azure.net/secrets/Database-Url".to_string(),
                identity: "identity-id".to_string(),
            }]
        );
        assert_eq!(bindings.env[0].name, "DATABASE_URL");
        assert_eq!(
            bindings.env[0].source,
            EnvSource::SecretRef("database-url".to_string())
        );
    }

    #[tokio::test]
    async fn test_unknown_secret_is_store_error() {
        let err = resolve_secrets(&store(), &names(&["nope"]), "identity-id")
            .await
            .unwrap_err();
        assert!(matches!(err, MaterializeError::SecretStore { .. }));
        assert!(!err.is_config_error());
    }

    #[tokio::test]
    async fn test_duplicate_secret_rejected() {
        let err = resolve_secrets(&store(), &names(&["api-key", "API-KEY"]), "identity-id")
            .await
            .unwrap_err();
        assert!(matches!(err, MaterializeError::DuplicateSecret(name) if name == "API-KEY"));
    }

    #[test]
    fn test_all_missing_env_reported_together() {
        let env = EnvFile::try_from_iter([("PRESENT", "1")]).unwrap();
        let err = resolve_plain_env(&env, &names(&["MISSING_A", "PRESENT", "MISSING_B"]))
            .unwrap_err();

        match err {
            MaterializeError::MissingEnv { names } => {
                assert_eq!(names, vec!["MISSING_A", "MISSING_B"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_container_environment_order_and_collision() {
        let env = EnvFile::try_from_iter([("LOG_LEVEL", "debug"), ("API_KEY", "plain")]).unwrap();
        let secrets = resolve_secrets(&store(), &names(&["api-key"]), "identity-id")
            .await
            .unwrap();

        let plain = resolve_plain_env(&env, &names(&["LOG_LEVEL"])).unwrap();
        let block = container_environment(&plain, &secrets).unwrap();
        assert_eq!(block.len(), 2);
        assert_eq!(block[0].value.as_deref(), Some("debug"));
        assert_eq!(block[1].secret_ref.as_deref(), Some("api-key"));

        let clashing = resolve_plain_env(&env, &names(&["API_KEY"])).unwrap();
        let err = container_environment(&clashing, &secrets).unwrap_err();
        assert!(matches!(err, MaterializeError::EnvCollision(name) if name == "API_KEY"));
    }

    #[test]
    fn test_env_values_redacted_in_debug() {
        let binding = EnvVarBinding {
            name: "TOKEN".to_string(),
            source: EnvSource::Value("s3cr3t".to_string()),
        };
        assert!(!format!("{binding:?}").contains("s3cr3t"));
    }
}
