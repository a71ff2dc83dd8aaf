//! Platform wire types for container apps and revisions.
//!
//! The same structures are sent on create-or-update and read back from the
//! platform. Read-only fields are optional and omitted on serialization when
//! unset. Unknown fields are ignored, and an explicit `null` reads the same as
//! a missing field.

use std::collections::BTreeMap;
use std::fmt;

use aca_reconcile::{HealthState, ProvisioningState, RevisionSnapshot, RunningState};
use serde::{Deserialize, Deserializer, Serialize};

use crate::model::ProbeSpec;
use crate::probes::TemplateContainer;

/// The only supported active revisions mode.
pub const ACTIVE_REVISIONS_MODE_SINGLE: &str = "Single";

/// A container app resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerAppPayload {
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<ManagedIdentity>,
    pub properties: AppProperties,
}

impl ContainerAppPayload {
    /// Containers of the current template.
    pub fn containers(&self) -> &[PayloadContainer] {
        &self.properties.template.containers
    }

    pub fn revision_suffix(&self) -> Option<&str> {
        self.properties.template.revision_suffix.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedIdentity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub user_assigned_identities: BTreeMap<String, serde_json::Value>,
}

impl ManagedIdentity {
    /// A single user-assigned identity.
    pub fn user_assigned(resource_id: &str) -> Self {
        let mut identities = BTreeMap::new();
        identities.insert(resource_id.to_string(), serde_json::json!({}));
        Self {
            kind: "UserAssigned".to_string(),
            user_assigned_identities: identities,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_environment_id: Option<String>,
    pub configuration: AppConfiguration,
    pub template: RevisionTemplate,

    // Read-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_revision_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_ready_revision_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_revision_fqdn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_revisions_mode: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub secrets: Vec<SecretDefinition>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub registries: Vec<RegistryCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressPayload>,
}

/// An app-level secret: either an inline value or a Key Vault reference.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_vault_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

impl SecretDefinition {
    pub fn key_vault(
        name: impl Into<String>,
        key_vault_url: impl Into<String>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: None,
            key_vault_url: Some(key_vault_url.into()),
            identity: Some(identity.into()),
        }
    }

    pub fn inline(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            key_vault_url: None,
            identity: None,
        }
    }
}

impl fmt::Debug for SecretDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretDefinition")
            .field("name", &self.name)
            .field("value", &self.value.as_ref().map(|_| "[REDACTED]"))
            .field("key_vault_url", &self.key_vault_url)
            .field("identity", &self.identity)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCredentials {
    pub server: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressPayload {
    pub external: bool,
    pub target_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,

    // Read-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_suffix: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub containers: Vec<PayloadContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<ScalePayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadContainer {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesPayload>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub env: Vec<EnvVarPayload>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub probes: Vec<ProbeSpec>,
}

impl TemplateContainer for PayloadContainer {
    fn container_name(&self) -> &str {
        &self.name
    }

    fn declared_probes(&self) -> Option<&[ProbeSpec]> {
        Some(&self.probes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcesPayload {
    pub cpu: f64,
    pub memory: String,
}

/// One environment entry: a literal value or a secret reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarPayload {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<u32>,
}

// =============================================================================
// Revisions
// =============================================================================

/// A revision resource as reported by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionResource {
    pub name: String,
    pub properties: RevisionProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionProperties {
    #[serde(default, deserialize_with = "null_as_default")]
    pub active: bool,
    #[serde(default = "unknown_health", deserialize_with = "null_as_unknown")]
    pub health_state: HealthState,
    #[serde(default = "unknown_provisioning", deserialize_with = "null_as_unknown")]
    pub provisioning_state: ProvisioningState,
    #[serde(default = "unknown_running", deserialize_with = "null_as_unknown")]
    pub running_state: RunningState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_weight: Option<u32>,
}

/// Read an explicit `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Read an explicit `null` state as `Unknown`.
fn null_as_unknown<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + From<&'static str>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_else(|| T::from("Unknown")))
}

fn unknown_health() -> HealthState {
    HealthState::from("Unknown")
}

fn unknown_provisioning() -> ProvisioningState {
    ProvisioningState::from("Unknown")
}

fn unknown_running() -> RunningState {
    RunningState::Unknown
}

impl RevisionResource {
    pub fn snapshot(&self) -> RevisionSnapshot {
        RevisionSnapshot {
            active: self.properties.active,
            health_state: self.properties.health_state.clone(),
            provisioning_state: self.properties.provisioning_state.clone(),
            running_state: self.properties.running_state.clone(),
        }
    }

    /// Public URL, when the revision has one.
    pub fn url(&self) -> Option<String> {
        self.properties
            .fqdn
            .as_deref()
            .filter(|fqdn| !fqdn.is_empty())
            .map(|fqdn| format!("https://{fqdn}"))
    }
}
