//! Post-hoc revision status.

use tracing::debug;

use crate::error::RolloutError;
use crate::platform::{Platform, PlatformError};
use crate::report::RevisionDeploymentResult;

/// Current state of `revision`, classified with the same rule as a rollout.
pub async fn query_revision(
    platform: &dyn Platform,
    app: &str,
    revision: &str,
) -> Result<RevisionDeploymentResult, RolloutError> {
    let resource = platform
        .get_revision(app, revision)
        .await
        .map_err(|source| RolloutError::Platform {
            action: "fetching the revision",
            source,
        })?
        .ok_or_else(|| RolloutError::Platform {
            action: "fetching the revision",
            source: PlatformError::NotFound(format!("revision {revision}")),
        })?;

    let result = RevisionDeploymentResult::from_snapshot(
        resource.name.clone(),
        resource.snapshot(),
        resource.url(),
    );
    debug!(revision = %result.revision_name, healthy = result.is_healthy(), "Queried revision");
    Ok(result)
}

/// State of the app's latest revision.
pub async fn query_latest_revision(
    platform: &dyn Platform,
    app: &str,
) -> Result<RevisionDeploymentResult, RolloutError> {
    let not_found = |what: String| RolloutError::Platform {
        action: "fetching the app",
        source: PlatformError::NotFound(what),
    };

    let current = platform
        .get_app(app)
        .await
        .map_err(|source| RolloutError::Platform {
            action: "fetching the app",
            source,
        })?
        .ok_or_else(|| not_found(format!("app {app}")))?;

    let revision = current
        .properties
        .latest_revision_name
        .ok_or_else(|| not_found(format!("latest revision of {app}")))?;

    query_revision(platform, app, &revision).await
}
