//! YAML app configuration loader.
//!
//! ```yaml
//! ingress:
//!   external: true
//!   target_port: 8080
//!   transport: auto
//! scale:
//!   min_replicas: 1
//!   max_replicas: 10
//! secrets:
//!   - database-url
//! containers:
//!   - name: web
//!     image_name: my-image
//!     cpu: 0.5
//!     memory: "1.0Gi"
//!     env_vars: [LOG_LEVEL]
//!     dockerfile: ./Dockerfile
//!     existing_image_tag: v1.0
//!     probes:
//!       - type: Liveness
//!         httpGet:
//!           path: /health
//!           port: 8080
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::model::{
    AppConfig, ApplicationTemplate, ContainerSpec, IngressSpec, MemoryQuantity, ProbeSpec,
    ScalingBounds, Transport, DEFAULT_MAX_REPLICAS, DEFAULT_MIN_REPLICAS,
};

#[derive(Debug, Deserialize)]
struct RawAppConfig {
    #[serde(default)]
    containers: Option<Vec<RawContainer>>,
    #[serde(default)]
    ingress: Option<RawIngress>,
    #[serde(default)]
    scale: Option<RawScale>,
    #[serde(default)]
    secrets: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawContainer {
    name: Option<String>,
    image_name: Option<String>,
    cpu: Option<f64>,
    memory: Option<String>,
    #[serde(default)]
    env_vars: Option<Vec<String>>,
    #[serde(default)]
    probes: Option<Vec<ProbeSpec>>,
    existing_image_tag: Option<String>,
    dockerfile: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawIngress {
    external: Option<bool>,
    target_port: Option<i64>,
    transport: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawScale {
    min_replicas: Option<i64>,
    max_replicas: Option<i64>,
}

/// Load and validate an app configuration file.
pub fn load_app_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "Loading app configuration");
    parse_app_config(&content)
}

/// Parse and validate app configuration from a YAML string.
pub fn parse_app_config(content: &str) -> Result<AppConfig, ConfigError> {
    let has_content = content
        .lines()
        .map(str::trim)
        .any(|line| !line.is_empty() && !line.starts_with('#') && line != "---");
    if !has_content {
        return Err(ConfigError::Empty);
    }

    let value: serde_yaml::Value = serde_yaml::from_str(content)?;
    if value.is_null() {
        return Err(ConfigError::Empty);
    }
    let raw: RawAppConfig = serde_yaml::from_value(value)?;

    let raw_containers = match raw.containers {
        Some(containers) if !containers.is_empty() => containers,
        _ => return Err(ConfigError::MissingContainers),
    };

    let mut containers = Vec::with_capacity(raw_containers.len());
    let mut seen = HashSet::new();
    for raw_container in raw_containers {
        let container = container_from_raw(raw_container)?;
        if !seen.insert(container.name.clone()) {
            return Err(ConfigError::DuplicateContainer(container.name));
        }
        containers.push(container);
    }

    let ingress = raw.ingress.map(ingress_from_raw).transpose()?;
    let scale = scale_from_raw(raw.scale)?;
    let secrets = secrets_from_raw(raw.secrets.unwrap_or_default())?;

    Ok(AppConfig {
        template: ApplicationTemplate { containers },
        ingress,
        scale,
        secrets,
    })
}

fn container_from_raw(raw: RawContainer) -> Result<ContainerSpec, ConfigError> {
    let name = match raw.name {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return Err(ConfigError::MissingContainerName),
    };
    let missing = |field: &'static str| ConfigError::MissingField {
        container: name.clone(),
        field,
    };

    let image_name = raw
        .image_name
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| missing("image_name"))?;
    let cpu = raw.cpu.ok_or_else(|| missing("cpu"))?;
    let memory = raw.memory.ok_or_else(|| missing("memory"))?;

    if !cpu.is_finite() || cpu <= 0.0 {
        return Err(ConfigError::Invalid(format!(
            "Container '{name}' cpu must be greater than zero"
        )));
    }
    let memory = MemoryQuantity::parse(&memory)
        .map_err(|e| ConfigError::Invalid(format!("Container '{name}': {e}")))?;

    let env_vars = raw.env_vars.unwrap_or_default();
    for var in &env_vars {
        aca_env::validate_key(var)
            .map_err(|e| ConfigError::Invalid(format!("Container '{name}': {e}")))?;
    }

    let probes = match raw.probes {
        Some(probes) if !probes.is_empty() => {
            validate_probes(&name, &probes)?;
            Some(probes)
        }
        _ => None,
    };

    if let Some(tag) = &raw.existing_image_tag {
        if tag.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Container '{name}' existing_image_tag cannot be empty"
            )));
        }
    }

    Ok(ContainerSpec {
        name,
        image_name: image_name.trim().to_string(),
        cpu,
        memory,
        env_vars,
        probes,
        existing_image_tag: raw.existing_image_tag.map(|t| t.trim().to_string()),
        dockerfile: raw.dockerfile,
    })
}

fn validate_probes(container: &str, probes: &[ProbeSpec]) -> Result<(), ConfigError> {
    let mut kinds = HashSet::new();
    for probe in probes {
        if !kinds.insert(probe.kind) {
            return Err(ConfigError::DuplicateProbe {
                container: container.to_string(),
                kind: probe.kind.to_string(),
            });
        }
        if probe.check.port() == 0 {
            return Err(ConfigError::Invalid(format!(
                "Container '{container}' {} probe port must be between 1 and 65535",
                probe.kind
            )));
        }
    }
    Ok(())
}

fn ingress_from_raw(raw: RawIngress) -> Result<IngressSpec, ConfigError> {
    let port = raw.target_port.ok_or(ConfigError::MissingTargetPort)?;
    let target_port = u16::try_from(port)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| {
            ConfigError::Invalid(format!(
                "Ingress target_port {port} must be between 1 and 65535"
            ))
        })?;

    let transport = match raw.transport {
        Some(t) => t.parse::<Transport>()?,
        None => Transport::Auto,
    };

    Ok(IngressSpec {
        external: raw.external.unwrap_or(true),
        target_port,
        transport,
    })
}

fn scale_from_raw(raw: Option<RawScale>) -> Result<ScalingBounds, ConfigError> {
    let Some(raw) = raw else {
        return Ok(ScalingBounds::default());
    };

    let replicas = |value: Option<i64>, field: &str, default: u32| match value {
        None => Ok(default),
        Some(v) => u32::try_from(v).map_err(|_| {
            ConfigError::Invalid(format!("{field} must be a non-negative integer, got {v}"))
        }),
    };

    let min = replicas(raw.min_replicas, "min_replicas", DEFAULT_MIN_REPLICAS)?;
    let max = replicas(raw.max_replicas, "max_replicas", DEFAULT_MAX_REPLICAS)?;
    ScalingBounds::new(min, max)
}

fn secrets_from_raw(names: Vec<String>) -> Result<Vec<String>, ConfigError> {
    let mut seen = HashSet::new();
    let mut secrets = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ConfigError::Invalid("secret names cannot be empty".to_string()));
        }
        if !seen.insert(name.clone()) {
            return Err(ConfigError::Invalid(format!("duplicate secret name '{name}'")));
        }
        secrets.push(name);
    }
    Ok(secrets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageSource, ProbeKind};

    const BASIC: &str = r#"
ingress:
  external: true
  target_port: 8080

containers:
  - name: my-app
    image_name: my-image
    cpu: 0.5
    memory: "1.0Gi"
    env_vars:
      - ENV_VAR1
    dockerfile: ./Dockerfile
"#;

    #[test]
    fn test_basic_config() {
        let config = parse_app_config(BASIC).unwrap();

        assert_eq!(config.template.containers.len(), 1);
        let container = &config.template.containers[0];
        assert_eq!(container.name, "my-app");
        assert_eq!(container.image_name, "my-image");
        assert_eq!(container.cpu, 0.5);
        assert_eq!(container.memory.as_str(), "1.0Gi");
        assert_eq!(container.env_vars, vec!["ENV_VAR1"]);
        assert!(matches!(container.image_source(), ImageSource::Build(_)));

        let ingress = config.ingress.unwrap();
        assert_eq!(ingress.target_port, 8080);
        assert!(ingress.external);
        assert_eq!(ingress.transport, Transport::Auto);

        assert_eq!(config.scale, ScalingBounds::default());
        assert!(config.secrets.is_empty());
    }

    #[test]
    fn test_probes_and_scale() {
        let yaml = r#"
scale:
  min_replicas: 2
  max_replicas: 20
secrets: [database-url]
containers:
  - name: main-app
    image_name: main-image
    cpu: 1
    memory: 2.0Gi
    probes:
      - type: Liveness
        httpGet:
          path: /health
          port: 8080
        initialDelaySeconds: 10
        periodSeconds: 30
      - type: Readiness
        tcpSocket:
          port: 8080
  - name: sidecar
    image_name: sidecar-image
    cpu: 0.25
    memory: 512Mi
    existing_image_tag: v1.0.0
    probes: []
"#;
        let config = parse_app_config(yaml).unwrap();

        assert_eq!(config.scale, ScalingBounds::new(2, 20).unwrap());
        assert_eq!(config.secrets, vec!["database-url"]);
        assert!(config.ingress.is_none());

        let main = config.template.container("main-app").unwrap();
        let probes = main.probes.as_ref().unwrap();
        assert_eq!(probes.len(), 2);
        assert_eq!(probes[0].kind, ProbeKind::Liveness);
        assert_eq!(probes[0].timing.initial_delay_seconds, Some(10));
        assert_eq!(probes[1].check.describe(), "TCP :8080");

        let sidecar = config.template.container("sidecar").unwrap();
        assert!(sidecar.probes.is_none());
        assert_eq!(sidecar.image_source(), ImageSource::Retag("v1.0.0"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.yaml");
        std::fs::write(&path, BASIC).unwrap();

        let config = load_app_config(&path).unwrap();
        assert_eq!(config.template.names(), vec!["my-app"]);

        let err = load_app_config(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
