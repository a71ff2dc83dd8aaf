//! Application and revision model.
//!
//! These types are built once per invocation from configuration and are not
//! mutated afterwards. Probe types share their wire shape with the platform
//! (`httpGet`, `tcpSocket`, `initialDelaySeconds`, ...) so configuration
//! files and platform payloads read the same way.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default minimum replica count.
pub const DEFAULT_MIN_REPLICAS: u32 = 1;

/// Default maximum replica count.
pub const DEFAULT_MAX_REPLICAS: u32 = 10;

// =============================================================================
// Containers
// =============================================================================

/// One container in a revision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerSpec {
    /// Container name, unique within the revision.
    pub name: String,

    /// Bare image name (no registry, no tag).
    pub image_name: String,

    /// CPU cores.
    pub cpu: f64,

    pub memory: MemoryQuantity,

    /// Names of environment variables whose values are resolved at deploy time.
    pub env_vars: Vec<String>,

    /// Declared probes. `None` means inherit from the running app.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probes: Option<Vec<ProbeSpec>>,

    /// Existing tag to republish under the new revision tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_image_tag: Option<String>,

    /// Dockerfile to build the image from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<PathBuf>,
}

impl ContainerSpec {
    /// How the container's image gets to the registry.
    pub fn image_source(&self) -> ImageSource<'_> {
        if let Some(tag) = &self.existing_image_tag {
            ImageSource::Retag(tag)
        } else if let Some(dockerfile) = &self.dockerfile {
            ImageSource::Build(dockerfile)
        } else {
            ImageSource::Published
        }
    }
}

/// Where a container image comes from.
///
/// A retag wins over a build when both are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource<'a> {
    /// Republish an existing tag.
    Retag(&'a str),
    /// Build from a Dockerfile and push.
    Build(&'a PathBuf),
    /// The target tag is expected to exist already.
    Published,
}

/// A memory quantity such as `1.0Gi` or `512Mi`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemoryQuantity(String);

impl MemoryQuantity {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let value = value.trim();
        let invalid = || {
            ConfigError::Invalid(format!(
                "memory '{value}' must be a decimal followed by 'Gi' or 'Mi' (e.g. '1.0Gi', '512Mi')"
            ))
        };

        let number = value
            .strip_suffix("Gi")
            .or_else(|| value.strip_suffix("Mi"))
            .ok_or_else(invalid)?;

        let well_formed = !number.is_empty()
            && !number.starts_with('.')
            && !number.ends_with('.')
            && number.chars().all(|c| c.is_ascii_digit() || c == '.')
            && number.matches('.').count() <= 1;
        if !well_formed {
            return Err(invalid());
        }

        let amount: f64 = number.parse().map_err(|_| invalid())?;
        if amount <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "memory '{value}' must be greater than zero"
            )));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The quantity in GiB.
    pub fn gibibytes(&self) -> f64 {
        let (number, scale) = match self.0.strip_suffix("Gi") {
            Some(n) => (n, 1.0),
            None => (self.0.trim_end_matches("Mi"), 1.0 / 1024.0),
        };
        number.parse::<f64>().unwrap_or(0.0) * scale
    }
}

impl fmt::Display for MemoryQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MemoryQuantity {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MemoryQuantity> for String {
    fn from(value: MemoryQuantity) -> Self {
        value.0
    }
}

/// Ordered containers of one revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplicationTemplate {
    pub containers: Vec<ContainerSpec>,
}

impl ApplicationTemplate {
    pub fn container(&self, name: &str) -> Option<&ContainerSpec> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.containers.iter().map(|c| c.name.as_str()).collect()
    }
}

// =============================================================================
// Ingress & scale
// =============================================================================

/// Ingress transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Auto,
    Http,
    Http2,
    Tcp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Auto => "auto",
            Transport::Http => "http",
            Transport::Http2 => "http2",
            Transport::Tcp => "tcp",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Transport::Auto),
            "http" => Ok(Transport::Http),
            "http2" => Ok(Transport::Http2),
            "tcp" => Ok(Transport::Tcp),
            _ => Err(ConfigError::Invalid(format!(
                "transport '{s}' must be one of auto, http, http2, tcp"
            ))),
        }
    }
}

/// Network front door of the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngressSpec {
    pub external: bool,
    pub target_port: u16,
    pub transport: Transport,
}

/// Replica bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScalingBounds {
    pub min_replicas: u32,
    pub max_replicas: u32,
}

impl Default for ScalingBounds {
    fn default() -> Self {
        Self {
            min_replicas: DEFAULT_MIN_REPLICAS,
            max_replicas: DEFAULT_MAX_REPLICAS,
        }
    }
}

impl ScalingBounds {
    pub fn new(min_replicas: u32, max_replicas: u32) -> Result<Self, ConfigError> {
        if min_replicas > max_replicas {
            return Err(ConfigError::Invalid(format!(
                "min_replicas ({min_replicas}) must not exceed max_replicas ({max_replicas})"
            )));
        }
        Ok(Self {
            min_replicas,
            max_replicas,
        })
    }
}

/// Everything loaded from an app configuration file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    pub template: ApplicationTemplate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressSpec>,
    pub scale: ScalingBounds,
    /// Key Vault secret names exposed to every container.
    pub secrets: Vec<String>,
}

impl AppConfig {
    /// Containers that need an image build.
    pub fn needs_build(&self) -> bool {
        self.template
            .containers
            .iter()
            .any(|c| matches!(c.image_source(), ImageSource::Build(_)))
    }
}

// =============================================================================
// Secrets
// =============================================================================

/// A secret exposed to the revision through the secret store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretReference {
    /// Logical secret name.
    pub name: String,
    /// Versionless Key Vault secret URL.
    pub key_vault_url: String,
    /// Resource ID of the identity allowed to read it.
    pub identity: String,
}

// =============================================================================
// Probes
// =============================================================================

/// Platform default initial delay, in seconds.
pub const DEFAULT_PROBE_INITIAL_DELAY: u32 = 1;
/// Platform default period, in seconds.
pub const DEFAULT_PROBE_PERIOD: u32 = 10;
/// Platform default timeout, in seconds.
pub const DEFAULT_PROBE_TIMEOUT: u32 = 1;
/// Platform default failure threshold.
pub const DEFAULT_PROBE_FAILURE_THRESHOLD: u32 = 3;
/// Platform default success threshold.
pub const DEFAULT_PROBE_SUCCESS_THRESHOLD: u32 = 1;

/// Probe kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProbeKind {
    Liveness,
    Readiness,
    Startup,
}

impl ProbeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Liveness => "Liveness",
            ProbeKind::Readiness => "Readiness",
            ProbeKind::Startup => "Startup",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

/// HTTP GET check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpGetCheck {
    pub path: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_headers: Vec<HttpHeader>,
}

/// TCP connect check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpSocketCheck {
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

/// The check a probe performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeCheck {
    Http(HttpGetCheck),
    Tcp(TcpSocketCheck),
}

impl ProbeCheck {
    pub fn port(&self) -> u16 {
        match self {
            ProbeCheck::Http(http) => http.port,
            ProbeCheck::Tcp(tcp) => tcp.port,
        }
    }

    /// Short human form, e.g. `GET :8080/health` or `TCP :5432`.
    pub fn describe(&self) -> String {
        match self {
            ProbeCheck::Http(http) => format!("GET :{}{}", http.port, http.path),
            ProbeCheck::Tcp(tcp) => format!("TCP :{}", tcp.port),
        }
    }
}

/// Probe timing. Absent values take platform defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeTiming {
    pub initial_delay_seconds: Option<u32>,
    pub period_seconds: Option<u32>,
    pub timeout_seconds: Option<u32>,
    pub failure_threshold: Option<u32>,
    pub success_threshold: Option<u32>,
}

/// Timing with every default applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EffectiveTiming {
    pub initial_delay_seconds: u32,
    pub period_seconds: u32,
    pub timeout_seconds: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
}

impl ProbeTiming {
    pub fn effective(&self) -> EffectiveTiming {
        EffectiveTiming {
            initial_delay_seconds: self
                .initial_delay_seconds
                .unwrap_or(DEFAULT_PROBE_INITIAL_DELAY),
            period_seconds: self.period_seconds.unwrap_or(DEFAULT_PROBE_PERIOD),
            timeout_seconds: self.timeout_seconds.unwrap_or(DEFAULT_PROBE_TIMEOUT),
            failure_threshold: self
                .failure_threshold
                .unwrap_or(DEFAULT_PROBE_FAILURE_THRESHOLD),
            success_threshold: self
                .success_threshold
                .unwrap_or(DEFAULT_PROBE_SUCCESS_THRESHOLD),
        }
    }
}

/// A container health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireProbe", into = "WireProbe")]
pub struct ProbeSpec {
    pub kind: ProbeKind,
    pub check: ProbeCheck,
    pub timing: ProbeTiming,
}

impl ProbeSpec {
    pub fn http(kind: ProbeKind, path: impl Into<String>, port: u16) -> Self {
        Self {
            kind,
            check: ProbeCheck::Http(HttpGetCheck {
                path: path.into(),
                port,
                scheme: None,
                host: None,
                http_headers: Vec::new(),
            }),
            timing: ProbeTiming::default(),
        }
    }

    pub fn tcp(kind: ProbeKind, port: u16) -> Self {
        Self {
            kind,
            check: ProbeCheck::Tcp(TcpSocketCheck { port, host: None }),
            timing: ProbeTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: ProbeTiming) -> Self {
        self.timing = timing;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProbe {
    #[serde(rename = "type")]
    kind: ProbeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_get: Option<HttpGetCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tcp_socket: Option<TcpSocketCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    initial_delay_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    period_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    success_threshold: Option<u32>,
}

impl TryFrom<WireProbe> for ProbeSpec {
    type Error = String;

    fn try_from(wire: WireProbe) -> Result<Self, Self::Error> {
        let check = match (wire.http_get, wire.tcp_socket) {
            (Some(http), None) => ProbeCheck::Http(http),
            (None, Some(tcp)) => ProbeCheck::Tcp(tcp),
            (Some(_), Some(_)) => {
                return Err(format!(
                    "{} probe must define only one of 'httpGet' or 'tcpSocket'",
                    wire.kind
                ))
            }
            (None, None) => {
                return Err(format!(
                    "{} probe must define 'httpGet' or 'tcpSocket'",
                    wire.kind
                ))
            }
        };

        Ok(Self {
            kind: wire.kind,
            check,
            timing: ProbeTiming {
                initial_delay_seconds: wire.initial_delay_seconds,
                period_seconds: wire.period_seconds,
                timeout_seconds: wire.timeout_seconds,
                failure_threshold: wire.failure_threshold,
                success_threshold: wire.success_threshold,
            },
        })
    }
}

impl From<ProbeSpec> for WireProbe {
    fn from(probe: ProbeSpec) -> Self {
        let (http_get, tcp_socket) = match probe.check {
            ProbeCheck::Http(http) => (Some(http), None),
            ProbeCheck::Tcp(tcp) => (None, Some(tcp)),
        };
        Self {
            kind: probe.kind,
            http_get,
            tcp_socket,
            initial_delay_seconds: probe.timing.initial_delay_seconds,
            period_seconds: probe.timing.period_seconds,
            timeout_seconds: probe.timing.timeout_seconds,
            failure_threshold: probe.timing.failure_threshold,
            success_threshold: probe.timing.success_threshold,
        }
    }
}
