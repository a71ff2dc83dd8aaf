//! Canonical image references.

use std::fmt;

use crate::error::ImageError;

/// Maximum tag length accepted by OCI registries.
const MAX_TAG_LENGTH: usize = 128;

/// A fully-qualified image reference: `<registry>/<name>:<tag>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    registry: String,
    name: String,
    tag: String,
}

impl ImageRef {
    /// Build a reference from its parts.
    ///
    /// A trailing `/` on the registry is ignored.
    pub fn new(
        registry: impl Into<String>,
        name: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Self, ImageError> {
        let registry = registry.into().trim().trim_end_matches('/').to_string();
        let name = name.into().trim().trim_matches('/').to_string();
        let tag = tag.into().trim().to_string();

        validate_registry(&registry)?;
        validate_name(&name)?;
        validate_tag(&tag)?;

        Ok(Self {
            registry,
            name,
            tag,
        })
    }

    /// The same repository under a different tag.
    pub fn with_tag(&self, tag: impl Into<String>) -> Result<Self, ImageError> {
        Self::new(self.registry.clone(), self.name.clone(), tag)
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.name, self.tag)
    }
}

fn validate_registry(registry: &str) -> Result<(), ImageError> {
    if registry.is_empty() {
        return Err(ImageError::InvalidReference(
            "registry cannot be empty".to_string(),
        ));
    }
    if registry.contains("://") {
        return Err(ImageError::InvalidReference(format!(
            "registry '{registry}' must be a host name, not a URL"
        )));
    }
    if registry.chars().any(char::is_whitespace) {
        return Err(ImageError::InvalidReference(format!(
            "registry '{registry}' contains whitespace"
        )));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), ImageError> {
    if name.is_empty() {
        return Err(ImageError::InvalidReference(
            "image name cannot be empty".to_string(),
        ));
    }
    let valid = name.chars().all(|c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-' | '/')
    });
    if !valid {
        return Err(ImageError::InvalidReference(format!(
            "image name '{name}' may only contain lowercase letters, digits, '.', '_', '-' and '/'"
        )));
    }
    Ok(())
}

fn validate_tag(tag: &str) -> Result<(), ImageError> {
    let mut chars = tag.chars();
    let Some(first) = chars.next() else {
        return Err(ImageError::InvalidReference(
            "tag cannot be empty".to_string(),
        ));
    };
    if tag.len() > MAX_TAG_LENGTH {
        return Err(ImageError::InvalidReference(format!(
            "tag '{tag}' exceeds {MAX_TAG_LENGTH} characters"
        )));
    }
    if !(first.is_ascii_alphanumeric() || first == '_') {
        return Err(ImageError::InvalidReference(format!(
            "tag '{tag}' must start with a letter, digit or '_'"
        )));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return Err(ImageError::InvalidReference(format!(
            "tag '{tag}' contains invalid characters"
        )));
    }
    Ok(())
}
