//! Key Vault secret store.
//!
//! Only checks that a secret exists and returns its versionless URL. The
//! platform reads the value itself through the app's managed identity.

use std::time::Duration;

use aca_revision::{SecretStore, SecretStoreError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use tracing::debug;

/// Key Vault data-plane API version.
pub const API_VERSION: &str = "7.4";

/// Base URL of a vault given its name or URL.
pub fn vault_url(vault: &str) -> String {
    let vault = vault.trim().trim_end_matches('/');
    if vault.starts_with("https://") || vault.starts_with("http://") {
        vault.to_string()
    } else {
        format!("https://{vault}.vault.azure.net")
    }
}

#[derive(Debug, Clone)]
pub struct KeyVaultStore {
    client: reqwest::Client,
    base_url: String,
}

impl KeyVaultStore {
    pub fn new(vault: &str, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).context("Invalid token format")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: vault_url(vault),
        })
    }

    fn secret_url(&self, name: &str) -> String {
        format!("{}/secrets/{name}", self.base_url)
    }
}

#[async_trait]
impl SecretStore for KeyVaultStore {
    async fn resolve_secret(&self, name: &str) -> Result<String, SecretStoreError> {
        let url = self.secret_url(name);
        let response = self
            .client
            .get(format!("{url}?api-version={API_VERSION}"))
            .send()
            .await
            .map_err(|e| SecretStoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        debug!(secret = name, status = %status, "Checked key vault secret");
        match status {
            s if s.is_success() => Ok(url),
            StatusCode::NOT_FOUND => Err(SecretStoreError::NotFound(name.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SecretStoreError::Forbidden {
                name: name.to_string(),
                reason: response
                    .text()
                    .await
                    .ok()
                    .filter(|body| !body.trim().is_empty())
                    .unwrap_or_else(|| status.to_string()),
            }),
            other => Err(SecretStoreError::Unavailable(format!(
                "key vault returned {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_vault_url_from_name_or_url() {
        assert_eq!(vault_url("my-vault"), "https://my-vault.vault.azure.net");
        assert_eq!(
            vault_url("https://my-vault.vault.azure.net/"),
            "https://my-vault.vault.azure.net"
        );
    }

    #[tokio::test]
    async fn test_existing_secret_resolves_to_versionless_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets/db-url"))
            .and(query_param("api-version", API_VERSION))
            .and(header("authorization", "Bearer vault-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": "postgres://never-leaves-the-vault",
                "id": format!("{}/secrets/db-url/0123456789abcdef", server.uri())
            })))
            .mount(&server)
            .await;

        let store = KeyVaultStore::new(&server.uri(), "vault-token").unwrap();
        let location = store.resolve_secret("db-url").await.unwrap();
        assert_eq!(location, format!("{}/secrets/db-url", server.uri()));
    }

    #[tokio::test]
    async fn test_missing_and_forbidden_secrets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets/absent"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secrets/locked"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden by policy"))
            .mount(&server)
            .await;

        let store = KeyVaultStore::new(&server.uri(), "vault-token").unwrap();
        assert_eq!(
            store.resolve_secret("absent").await.unwrap_err(),
            SecretStoreError::NotFound("absent".to_string())
        );
        assert_eq!(
            store.resolve_secret("locked").await.unwrap_err(),
            SecretStoreError::Forbidden {
                name: "locked".to_string(),
                reason: "Forbidden by policy".to_string(),
            }
        );
    }
}
