//! Container image handling for deployments.
//!
//! - [`ImageRef`]: canonical `<registry>/<name>:<tag>` references
//! - [`ImageRuntime`]: the local image runtime/registry client seam
//! - [`DockerCli`]: runtime backed by the `docker` binary
//! - [`retag_and_publish`]: republish an existing tag under a new tag
//!
//! A mock runtime that records calls is provided for tests.

mod docker;
mod error;
pub mod mock;
mod reference;
mod retag;

pub use docker::{DockerCli, DEFAULT_BUILD_PLATFORM};
pub use error::ImageError;
pub use reference::ImageRef;
pub use retag::{build_and_publish, retag_and_publish};

use std::path::Path;

use async_trait::async_trait;

/// Local image runtime and registry operations.
#[async_trait]
pub trait ImageRuntime: Send + Sync {
    /// Check whether the image is present locally.
    async fn image_exists_locally(&self, image: &ImageRef) -> Result<bool, ImageError>;

    /// Fetch an image from its registry.
    async fn pull(&self, image: &ImageRef) -> Result<(), ImageError>;

    /// Apply `target` as a local tag of `source`.
    async fn tag(&self, source: &ImageRef, target: &ImageRef) -> Result<(), ImageError>;

    /// Publish a local image to its registry.
    async fn push(&self, image: &ImageRef) -> Result<(), ImageError>;

    /// Build from a Dockerfile and publish the result.
    async fn build_and_push(&self, dockerfile: &Path, image: &ImageRef) -> Result<(), ImageError>;

    /// Remove a local tag.
    async fn remove_local(&self, image: &ImageRef) -> Result<(), ImageError>;
}
