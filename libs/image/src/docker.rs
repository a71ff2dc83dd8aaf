//! Image runtime backed by the `docker` CLI.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::ImageError;
use crate::reference::ImageRef;
use crate::ImageRuntime;

/// Platform images are built for. Container Apps only runs amd64 workloads.
pub const DEFAULT_BUILD_PLATFORM: &str = "linux/amd64";

/// Runs image operations through a local `docker` binary.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    platform: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
            platform: DEFAULT_BUILD_PLATFORM.to_string(),
        }
    }

    /// Use a different binary (e.g. `podman` or an absolute path).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Build for a different target platform.
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output, ImageError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!(command = %command, "Running image command");

        Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|source| ImageError::Spawn { command, source })
    }

    async fn run_checked(&self, args: &[String]) -> Result<(), ImageError> {
        let output = self.run(args).await?;
        if output.status.success() {
            return Ok(());
        }
        Err(ImageError::CommandFailed {
            command: format!("{} {}", self.binary, args.join(" ")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[async_trait]
impl ImageRuntime for DockerCli {
    async fn image_exists_locally(&self, image: &ImageRef) -> Result<bool, ImageError> {
        let args = vec![
            "image".to_string(),
            "inspect".to_string(),
            image.to_string(),
        ];
        // Non-zero exit means the image is absent; only spawn errors propagate.
        let output = self.run(&args).await?;
        Ok(output.status.success())
    }

    async fn pull(&self, image: &ImageRef) -> Result<(), ImageError> {
        info!(image = %image, "Pulling image");
        self.run_checked(&["pull".to_string(), image.to_string()])
            .await
    }

    async fn tag(&self, source: &ImageRef, target: &ImageRef) -> Result<(), ImageError> {
        debug!(source = %source, target = %target, "Tagging image");
        self.run_checked(&["tag".to_string(), source.to_string(), target.to_string()])
            .await
    }

    async fn push(&self, image: &ImageRef) -> Result<(), ImageError> {
        info!(image = %image, "Pushing image");
        self.run_checked(&["push".to_string(), image.to_string()])
            .await
    }

    async fn build_and_push(&self, dockerfile: &Path, image: &ImageRef) -> Result<(), ImageError> {
        let context = dockerfile
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        info!(
            image = %image,
            dockerfile = %dockerfile.display(),
            platform = %self.platform,
            "Building and pushing image"
        );

        let args = vec![
            "buildx".to_string(),
            "build".to_string(),
            "--platform".to_string(),
            self.platform.clone(),
            "-t".to_string(),
            image.to_string(),
            "-f".to_string(),
            dockerfile.display().to_string(),
            context.display().to_string(),
            "--push".to_string(),
        ];
        self.run_checked(&args).await
    }

    async fn remove_local(&self, image: &ImageRef) -> Result<(), ImageError> {
        self.run_checked(&["rmi".to_string(), image.to_string()])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let docker = DockerCli::new().with_binary("/nonexistent/docker-binary");
        let image = ImageRef::new("registry.io", "myapp", "v1").unwrap();

        let err = docker.pull(&image).await.unwrap_err();
        assert!(matches!(err, ImageError::Spawn { .. }));
        assert!(err.to_string().contains("pull registry.io/myapp:v1"));
    }

    #[test]
    fn test_default_platform() {
        let docker = DockerCli::default();
        assert_eq!(docker.platform, "linux/amd64");
        assert_eq!(docker.binary, "docker");
    }
}
