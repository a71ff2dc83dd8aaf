//! In-memory image runtime for tests.
//!
//! Tracks which references exist locally and which are published, and
//! records every call in order.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ImageError;
use crate::reference::ImageRef;
use crate::ImageRuntime;

/// A recorded runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    Exists(String),
    Pull(String),
    Tag(String, String),
    Push(String),
    Build(String, String),
    Remove(String),
}

#[derive(Debug, Default)]
struct MockState {
    local: HashSet<String>,
    remote: HashSet<String>,
    calls: Vec<RuntimeCall>,
}

/// Mock runtime with configurable failures.
#[derive(Debug, Default)]
pub struct MockImageRuntime {
    state: Mutex<MockState>,
    fail_push: bool,
    fail_build: bool,
}

impl MockImageRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an image that is present locally (and in the registry).
    pub fn with_local_image(self, image: &ImageRef) -> Self {
        {
            let mut state = self.lock();
            state.local.insert(image.to_string());
            state.remote.insert(image.to_string());
        }
        self
    }

    /// Seed an image that only exists in the registry.
    pub fn with_remote_image(self, image: &ImageRef) -> Self {
        self.lock().remote.insert(image.to_string());
        self
    }

    /// Make every push fail.
    pub fn failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    /// Make every build fail.
    pub fn failing_build(mut self) -> Self {
        self.fail_build = true;
        self
    }

    /// Calls made so far, in order.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    pub fn is_published(&self, image: &ImageRef) -> bool {
        self.lock().remote.contains(&image.to_string())
    }

    pub fn has_local(&self, image: &ImageRef) -> bool {
        self.lock().local.contains(&image.to_string())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn failure(command: &str, stderr: &str) -> ImageError {
        ImageError::CommandFailed {
            command: command.to_string(),
            stderr: stderr.to_string(),
        }
    }
}

#[async_trait]
impl ImageRuntime for MockImageRuntime {
    async fn image_exists_locally(&self, image: &ImageRef) -> Result<bool, ImageError> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Exists(image.to_string()));
        Ok(state.local.contains(&image.to_string()))
    }

    async fn pull(&self, image: &ImageRef) -> Result<(), ImageError> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Pull(image.to_string()));
        let reference = image.to_string();
        if !state.remote.contains(&reference) {
            return Err(Self::failure(
                &format!("docker pull {reference}"),
                "manifest unknown",
            ));
        }
        state.local.insert(reference);
        Ok(())
    }

    async fn tag(&self, source: &ImageRef, target: &ImageRef) -> Result<(), ImageError> {
        let mut state = self.lock();
        state
            .calls
            .push(RuntimeCall::Tag(source.to_string(), target.to_string()));
        if !state.local.contains(&source.to_string()) {
            return Err(Self::failure(
                &format!("docker tag {source} {target}"),
                "No such image",
            ));
        }
        state.local.insert(target.to_string());
        Ok(())
    }

    async fn push(&self, image: &ImageRef) -> Result<(), ImageError> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Push(image.to_string()));
        if self.fail_push {
            return Err(Self::failure(
                &format!("docker push {image}"),
                "unauthorized: authentication required",
            ));
        }
        if !state.local.contains(&image.to_string()) {
            return Err(Self::failure(
                &format!("docker push {image}"),
                "An image does not exist locally",
            ));
        }
        state.remote.insert(image.to_string());
        Ok(())
    }

    async fn build_and_push(&self, dockerfile: &Path, image: &ImageRef) -> Result<(), ImageError> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Build(
            dockerfile.display().to_string(),
            image.to_string(),
        ));
        if self.fail_build {
            return Err(Self::failure(
                &format!("docker buildx build {}", dockerfile.display()),
                "failed to solve",
            ));
        }
        state.remote.insert(image.to_string());
        Ok(())
    }

    async fn remove_local(&self, image: &ImageRef) -> Result<(), ImageError> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Remove(image.to_string()));
        state.local.remove(&image.to_string());
        Ok(())
    }
}
