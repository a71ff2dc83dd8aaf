//! Azure Resource Manager client for container apps.
//!
//! Implements [`Platform`] over the `Microsoft.App` REST API. Writes use PUT
//! (create-or-update). Long-running operations are tracked through the
//! `Azure-AsyncOperation` header, falling back to `Location`.

use std::time::Duration;

use aca_revision::{ContainerAppPayload, RevisionResource};
use aca_rollout::{OperationHandle, OperationStatus, Platform, PlatformError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::resolve::ResourceScope;

/// `Microsoft.App` API version.
pub const API_VERSION: &str = "2024-03-01";

const ASYNC_OPERATION_HEADER: &str = "Azure-AsyncOperation";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// ARM client scoped to one subscription and resource group.
#[derive(Debug, Clone)]
pub struct ArmClient {
    client: reqwest::Client,
    endpoint: String,
    scope: ResourceScope,
}

impl ArmClient {
    pub fn new(endpoint: &str, scope: ResourceScope, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).context("Invalid token format")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            scope,
        })
    }

    fn app_url(&self, app: &str) -> String {
        format!(
            "{}{}?api-version={API_VERSION}",
            self.endpoint,
            self.scope.container_app_path(app)
        )
    }

    fn revision_url(&self, app: &str, revision: &str) -> String {
        format!(
            "{}{}/revisions/{revision}?api-version={API_VERSION}",
            self.endpoint,
            self.scope.container_app_path(app)
        )
    }

    /// GET a resource; 404 is `None`.
    async fn get_optional<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>, PlatformError> {
        let response = self.client.get(url).send().await.map_err(transport)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_from(response).await);
        }
        decode(response).await.map(Some)
    }
}

#[async_trait]
impl Platform for ArmClient {
    #[instrument(skip_all, fields(app = %app))]
    async fn create_or_update_app(
        &self,
        app: &str,
        payload: &ContainerAppPayload,
    ) -> Result<OperationHandle, PlatformError> {
        let response = self
            .client
            .put(self.app_url(app))
            .json(payload)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(error_from(response).await);
        }

        let status_url = [ASYNC_OPERATION_HEADER, LOCATION.as_str()]
            .iter()
            .find_map(|name| response.headers().get(*name))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        debug!(status = %response.status(), async_operation = status_url.is_some(), "Submitted app");
        Ok(match status_url {
            Some(status_url) => OperationHandle::Pending { status_url },
            None => OperationHandle::Completed,
        })
    }

    async fn operation_status(
        &self,
        handle: &OperationHandle,
    ) -> Result<OperationStatus, PlatformError> {
        let status_url = match handle {
            OperationHandle::Completed => return Ok(OperationStatus::Succeeded),
            OperationHandle::Pending { status_url } => status_url,
        };

        let response = self
            .client
            .get(status_url)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(OperationStatus::InProgress);
        }
        if !status.is_success() {
            return Err(error_from(response).await);
        }

        let body = response.text().await.map_err(transport)?;
        operation_status_from(&body)
    }

    async fn get_revision(
        &self,
        app: &str,
        revision: &str,
    ) -> Result<Option<RevisionResource>, PlatformError> {
        self.get_optional(&self.revision_url(app, revision)).await
    }

    async fn get_app(&self, app: &str) -> Result<Option<ContainerAppPayload>, PlatformError> {
        self.get_optional(&self.app_url(app)).await
    }
}

/// Async operation status document.
#[derive(Debug, Deserialize)]
struct OperationDocument {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<ArmErrorBody>,
}

/// ARM error envelope.
#[derive(Debug, Deserialize)]
struct ArmErrorEnvelope {
    error: ArmErrorBody,
}

#[derive(Debug, Deserialize)]
struct ArmErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Interpret a successful status poll. A `Location` poll that returns the
/// final resource has no `status` and means the operation is done.
fn operation_status_from(body: &str) -> Result<OperationStatus, PlatformError> {
    if body.trim().is_empty() {
        return Ok(OperationStatus::Succeeded);
    }

    let document: OperationDocument = serde_json::from_str(body)
        .map_err(|e| PlatformError::InvalidResponse(format!("operation status: {e}")))?;

    Ok(match document.status.as_deref() {
        None | Some("Succeeded") => OperationStatus::Succeeded,
        Some(terminal @ ("Failed" | "Canceled")) => {
            let (code, message) = match document.error {
                Some(ArmErrorBody { code, message }) => (code, message),
                None => (None, None),
            };
            OperationStatus::Failed {
                code,
                message: message.unwrap_or_else(|| format!("operation {}", terminal.to_lowercase())),
            }
        }
        Some(_) => OperationStatus::InProgress,
    })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, PlatformError> {
    let body = response.text().await.map_err(transport)?;
    serde_json::from_str(&body).map_err(|e| PlatformError::InvalidResponse(e.to_string()))
}

async fn error_from(response: reqwest::Response) -> PlatformError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let (code, message) = match serde_json::from_str::<ArmErrorEnvelope>(&body) {
        Ok(ArmErrorEnvelope { error }) => (
            error.code.unwrap_or_else(|| "Unknown".to_string()),
            error.message.unwrap_or_default(),
        ),
        Err(_) => (
            "Unknown".to_string(),
            if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("no response body").to_string()
            } else {
                body.trim().to_string()
            },
        ),
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            PlatformError::Auth(format!("{code}: {message}"))
        }
        _ => PlatformError::Rejected {
            status: status.as_u16(),
            code,
            message,
        },
    }
}

fn transport(err: reqwest::Error) -> PlatformError {
    PlatformError::Transport(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const APP_PATH: &str =
        "/subscriptions/sub-123/resourceGroups/rg-apps/providers/Microsoft.App/containerApps/myapp";

    fn client(server: &MockServer) -> ArmClient {
        let scope = ResourceScope::new("sub-123", "rg-apps").unwrap();
        ArmClient::new(&server.uri(), scope, "test-token").unwrap()
    }

    fn app_json() -> serde_json::Value {
        serde_json::json!({
            "id": APP_PATH,
            "name": "myapp",
            "type": "Microsoft.App/containerApps",
            "location": "eastus",
            "properties": {
                "provisioningState": "Succeeded",
                "latestRevisionName": "myapp--v1",
                "configuration": { "activeRevisionsMode": "Single" },
                "template": {
                    "revisionSuffix": "v1",
                    "containers": [{
                        "name": "web",
                        "image": "registry.azurecr.io/web:v1",
                        "probes": [{
                            "type": "Liveness",
                            "httpGet": { "path": "/health", "port": 8080 }
                        }]
                    }]
                }
            }
        })
    }

    #[tokio::test]
    async fn test_submit_returns_pending_handle_from_async_header() {
        let server = MockServer::start().await;
        let status_url = format!("{}/operations/op-1", server.uri());
        Mock::given(method("PUT"))
            .and(path(APP_PATH))
            .and(query_param("api-version", API_VERSION))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header(ASYNC_OPERATION_HEADER, status_url.as_str())
                    .set_body_json(app_json()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let payload: ContainerAppPayload = serde_json::from_value(app_json()).unwrap();
        let handle = client(&server)
            .create_or_update_app("myapp", &payload)
            .await
            .unwrap();

        assert_eq!(handle, OperationHandle::Pending { status_url });
    }

    #[tokio::test]
    async fn test_submit_without_operation_header_is_complete() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(APP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(app_json()))
            .mount(&server)
            .await;

        let payload: ContainerAppPayload = serde_json::from_value(app_json()).unwrap();
        let handle = client(&server)
            .create_or_update_app("myapp", &payload)
            .await
            .unwrap();

        assert_eq!(handle, OperationHandle::Completed);
    }

    #[tokio::test]
    async fn test_rejection_carries_the_arm_error() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(APP_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {
                    "code": "ContainerAppInvalidResourceTotal",
                    "message": "The total requested CPU and memory is invalid."
                }
            })))
            .mount(&server)
            .await;

        let payload: ContainerAppPayload = serde_json::from_value(app_json()).unwrap();
        let err = client(&server)
            .create_or_update_app("myapp", &payload)
            .await
            .unwrap_err();

        match err {
            PlatformError::Rejected {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, "ContainerAppInvalidResourceTotal");
                assert!(message.contains("CPU and memory"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_expired_token_is_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(APP_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "code": "ExpiredAuthenticationToken", "message": "expired" }
            })))
            .mount(&server)
            .await;

        let err = client(&server).get_app("myapp").await.unwrap_err();
        assert!(matches!(err, PlatformError::Auth(ref m) if m.contains("ExpiredAuthenticationToken")));
    }

    #[tokio::test]
    async fn test_missing_resources_are_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": { "code": "ResourceNotFound", "message": "not found" }
            })))
            .mount(&server)
            .await;

        let arm = client(&server);
        assert!(arm.get_app("myapp").await.unwrap().is_none());
        assert!(arm.get_revision("myapp", "myapp--v2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_app_parses_template_probes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(APP_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(app_json()))
            .mount(&server)
            .await;

        let app = client(&server).get_app("myapp").await.unwrap().unwrap();
        assert_eq!(app.properties.latest_revision_name.as_deref(), Some("myapp--v1"));
        assert_eq!(app.containers()[0].probes.len(), 1);
    }

    #[tokio::test]
    async fn test_get_revision_parses_states() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{APP_PATH}/revisions/myapp--v2")))
            .and(query_param("api-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "myapp--v2",
                "properties": {
                    "active": true,
                    "healthState": "Healthy",
                    "provisioningState": "Provisioned",
                    "runningState": "Running",
                    "fqdn": "myapp--v2.happyhill.eastus.azurecontainerapps.io"
                }
            })))
            .mount(&server)
            .await;

        let revision = client(&server)
            .get_revision("myapp", "myapp--v2")
            .await
            .unwrap()
            .unwrap();
        assert!(revision.snapshot().is_healthy());
        assert_eq!(
            revision.url().as_deref(),
            Some("https://myapp--v2.happyhill.eastus.azurecontainerapps.io")
        );
    }

    #[tokio::test]
    async fn test_operation_polling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/operations/running"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "InProgress" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/failed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "Failed",
                "error": { "code": "ProvisioningFailed", "message": "image pull failed" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/location"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let arm = client(&server);
        let pending = |name: &str| OperationHandle::Pending {
            status_url: format!("{}/operations/{name}", server.uri()),
        };

        assert_eq!(
            arm.operation_status(&pending("running")).await.unwrap(),
            OperationStatus::InProgress
        );
        assert_eq!(
            arm.operation_status(&pending("failed")).await.unwrap(),
            OperationStatus::Failed {
                code: Some("ProvisioningFailed".to_string()),
                message: "image pull failed".to_string(),
            }
        );
        assert_eq!(
            arm.operation_status(&pending("location")).await.unwrap(),
            OperationStatus::InProgress
        );
        assert_eq!(
            arm.operation_status(&OperationHandle::Completed).await.unwrap(),
            OperationStatus::Succeeded
        );
    }

    #[test]
    fn test_operation_document_variants() {
        assert_eq!(operation_status_from("").unwrap(), OperationStatus::Succeeded);
        assert_eq!(
            operation_status_from(r#"{"status":"Canceled"}"#).unwrap(),
            OperationStatus::Failed {
                code: None,
                message: "operation canceled".to_string()
            }
        );
        assert!(operation_status_from("not json").is_err());
    }
}
