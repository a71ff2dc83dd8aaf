//! Publishing images under a revision tag.
//!
//! A retag either publishes the target tag or leaves the registry untouched.
//! On a failed push the local target tag is removed again, but only when this
//! call created it: a target equal to the source, or one that was already
//! present locally, is left alone.

use std::path::Path;

use tracing::{info, warn};

use crate::error::ImageError;
use crate::reference::ImageRef;
use crate::ImageRuntime;

/// Republish `source` under `target`.
///
/// Steps: check for a local copy, pull if absent, tag, push. Any failure is
/// reported as a single [`ImageError::RetagFailed`].
pub async fn retag_and_publish(
    runtime: &dyn ImageRuntime,
    source: &ImageRef,
    target: &ImageRef,
) -> Result<(), ImageError> {
    let fail = |cause: ImageError| ImageError::RetagFailed {
        source_ref: source.to_string(),
        target_ref: target.to_string(),
        cause: Box::new(cause),
    };

    info!(source = %source, target = %target, "Retagging image");

    let present = runtime.image_exists_locally(source).await.map_err(fail)?;
    if !present {
        runtime.pull(source).await.map_err(fail)?;
    }

    let created_tag =
        target != source && !runtime.image_exists_locally(target).await.map_err(fail)?;
    runtime.tag(source, target).await.map_err(fail)?;

    if let Err(push_err) = runtime.push(target).await {
        if !created_tag {
            warn!(target = %target, "Push failed; keeping pre-existing local tag");
        } else if let Err(cleanup_err) = runtime.remove_local(target).await {
            warn!(
                target = %target,
                error = %cleanup_err,
                "Failed to remove local tag after push failure"
            );
        }
        return Err(fail(push_err));
    }

    info!(target = %target, "Image published");
    Ok(())
}

/// Build `dockerfile` and publish it as `target`.
pub async fn build_and_publish(
    runtime: &dyn ImageRuntime,
    dockerfile: &Path,
    target: &ImageRef,
) -> Result<(), ImageError> {
    runtime.build_and_push(dockerfile, target).await?;
    info!(target = %target, "Image built and published");
    Ok(())
}
