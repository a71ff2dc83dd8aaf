//! Name → resource ID resolution.
//!
//! ARM addresses everything by resource ID. For UX, the CLI accepts either a
//! full resource ID or a bare name scoped to the current subscription and
//! resource group.

use anyhow::Result;

const MANAGED_ENVIRONMENTS: &str = "Microsoft.App/managedEnvironments";
const CONTAINER_APPS: &str = "Microsoft.App/containerApps";
const USER_ASSIGNED_IDENTITIES: &str = "Microsoft.ManagedIdentity/userAssignedIdentities";

/// Subscription and resource group that bare names resolve into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceScope {
    subscription: String,
    resource_group: String,
}

impl ResourceScope {
    pub fn new(subscription: &str, resource_group: &str) -> Result<Self> {
        let subscription = subscription.trim();
        let resource_group = resource_group.trim();
        if subscription.is_empty() {
            anyhow::bail!("Subscription cannot be empty");
        }
        if resource_group.is_empty() {
            anyhow::bail!("Resource group cannot be empty");
        }
        Ok(Self {
            subscription: subscription.to_string(),
            resource_group: resource_group.to_string(),
        })
    }

    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    /// Managed environment ID from a name or an ID.
    pub fn managed_environment_id(&self, ident: &str) -> Result<String> {
        self.resolve(ident, MANAGED_ENVIRONMENTS)
    }

    /// User-assigned identity ID from a name or an ID.
    pub fn identity_id(&self, ident: &str) -> Result<String> {
        self.resolve(ident, USER_ASSIGNED_IDENTITIES)
    }

    /// Resource path of a container app.
    pub fn container_app_path(&self, app: &str) -> String {
        self.resource_id(CONTAINER_APPS, app)
    }

    fn resolve(&self, ident: &str, resource_type: &str) -> Result<String> {
        let ident = ident.trim();
        if ident.is_empty() {
            anyhow::bail!("{resource_type} name cannot be empty");
        }

        if ident.starts_with("/subscriptions/") {
            let marker = format!("/providers/{resource_type}/");
            if !ident
                .to_ascii_lowercase()
                .contains(&marker.to_ascii_lowercase())
            {
                anyhow::bail!("'{ident}' is not a {resource_type} resource ID");
            }
            return Ok(ident.trim_end_matches('/').to_string());
        }

        if ident.contains('/') {
            anyhow::bail!("'{ident}' is neither a name nor a resource ID");
        }
        Ok(self.resource_id(resource_type, ident))
    }

    fn resource_id(&self, resource_type: &str, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
            self.subscription, self.resource_group, resource_type, name
        )
    }
}
