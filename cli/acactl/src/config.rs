//! Configuration and context management.
//!
//! Handles:
//! - ARM endpoint configuration
//! - Saved deployment context (subscription, resource group, environment,
//!   registry, identity, key vault)
//! - Poll settings

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use aca_reconcile::{PollPolicy, MAX_ROLLOUT_TIMEOUT};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

/// Public Azure Resource Manager endpoint.
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

/// Get the config directory path.
fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "acactl", "acactl")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// ARM endpoint URL.
    #[serde(default = "default_arm_endpoint")]
    pub arm_endpoint: String,

    /// Saved context.
    #[serde(default)]
    pub context: CliContext,

    #[serde(default)]
    pub polling: PollSettings,
}

fn default_arm_endpoint() -> String {
    std::env::var("ACACTL_ARM_ENDPOINT").unwrap_or_else(|_| DEFAULT_ARM_ENDPOINT.to_string())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arm_endpoint: default_arm_endpoint(),
            context: CliContext::default(),
            polling: PollSettings::default(),
        }
    }
}

impl Config {
    /// Load config from disk, or return default.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_dir()?.join(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<()> {
        let dir = config_dir()?;
        fs::create_dir_all(&dir)?;
        self.save_to(&dir.join(CONFIG_FILE))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;

            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)
                .with_context(|| format!("Failed to write config to {:?}", path))?;
            file.write_all(contents.as_bytes())?;
        }

        #[cfg(not(unix))]
        {
            fs::write(path, contents)
                .with_context(|| format!("Failed to write config to {:?}", path))?;
        }

        Ok(())
    }
}

/// Saved deployment context. Flags override every field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,

    /// Managed environment name or resource ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Registry login server, e.g. `myregistry.azurecr.io`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    /// User-assigned identity name or resource ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    /// Key vault name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_vault: Option<String>,
}

impl CliContext {
    /// Overlay every `Some` field of `other`.
    pub fn merge(&mut self, other: CliContext) {
        fn take(slot: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.subscription, other.subscription);
        take(&mut self.resource_group, other.resource_group);
        take(&mut self.environment, other.environment);
        take(&mut self.location, other.location);
        take(&mut self.registry, other.registry);
        take(&mut self.identity, other.identity);
        take(&mut self.key_vault, other.key_vault);
    }
}

/// Rollout poll settings, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            interval_secs: policy.interval.as_secs(),
            timeout_secs: policy.timeout.as_secs(),
        }
    }
}

impl PollSettings {
    pub fn policy(&self) -> Result<PollPolicy> {
        if self.interval_secs == 0 {
            anyhow::bail!("poll interval must be at least one second");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("rollout timeout must be at least one second");
        }
        if self.timeout_secs > MAX_ROLLOUT_TIMEOUT.as_secs() {
            anyhow::bail!(
                "rollout timeout must not exceed {} seconds",
                MAX_ROLLOUT_TIMEOUT.as_secs()
            );
        }
        if self.interval_secs > self.timeout_secs {
            anyhow::bail!("poll interval must not exceed the rollout timeout");
        }
        Ok(PollPolicy::new(
            Duration::from_secs(self.interval_secs),
            Duration::from_secs(self.timeout_secs),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(!config.arm_endpoint.is_empty());
        assert_eq!(config.polling.interval_secs, 10);
        assert_eq!(config.polling.timeout_secs, 300);
    }

    #[test]
    fn test_config_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut config = Config::default();
        config.context.subscription = Some("sub-123".to_string());
        config.context.registry = Some("myregistry.azurecr.io".to_string());
        config.polling.timeout_secs = 600;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.context, config.context);
        assert_eq!(loaded.polling.timeout_secs, 600);
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded.context, CliContext::default());
    }

    #[test]
    fn test_context_merge_keeps_unset_fields() {
        let mut saved = CliContext {
            subscription: Some("sub-1".to_string()),
            resource_group: Some("rg-1".to_string()),
            ..Default::default()
        };
        saved.merge(CliContext {
            resource_group: Some("rg-2".to_string()),
            ..Default::default()
        });

        assert_eq!(saved.subscription.as_deref(), Some("sub-1"));
        assert_eq!(saved.resource_group.as_deref(), Some("rg-2"));
    }

    #[test]
    fn test_oversized_timeout_is_rejected() {
        let settings = PollSettings {
            interval_secs: 10,
            timeout_secs: u64::MAX,
        };
        let err = settings.policy().unwrap_err();
        assert!(err.to_string().contains("must not exceed 86400 seconds"));

        let settings = PollSettings {
            interval_secs: 10,
            timeout_secs: 86_400,
        };
        assert_eq!(settings.policy().unwrap().timeout, MAX_ROLLOUT_TIMEOUT);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let settings = PollSettings {
            interval_secs: 0,
            timeout_secs: 300,
        };
        assert!(settings.policy().is_err());
    }
}
