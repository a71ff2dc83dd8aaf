//! Typed revision states as reported by the platform.
//!
//! The platform reports states as free-form strings. Each state type keeps
//! the values we branch on as named variants and preserves anything else
//! verbatim in `Other`, so an unexpected value is visible in diagnostics but
//! can never satisfy a health check by accident.

/// Define a platform state enum with a catch-all variant.
///
/// Generates `as_str`, `Display`, `From<String>`, `From<&str>`, and serde
/// support through the string form. Matching is exact and case-sensitive.
macro_rules! define_state {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            /// A value this tool does not recognize.
            Other(String),
        }

        impl $name {
            /// Returns the platform's string form.
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $text,)+
                    Self::Other(s) => s.as_str(),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                match s {
                    $($text => Self::$variant,)+
                    other => Self::Other(other.to_string()),
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from(s.as_str())
            }
        }

        impl From<$name> for String {
            fn from(state: $name) -> Self {
                state.as_str().to_string()
            }
        }
    };
}

define_state!(
    /// Composite liveness/readiness verdict for a revision.
    HealthState {
        Healthy => "Healthy",
        Unhealthy => "Unhealthy",
        None => "None",
    }
);

define_state!(
    /// Whether the revision's infrastructure was created.
    ProvisioningState {
        Provisioning => "Provisioning",
        Provisioned => "Provisioned",
        Failed => "Failed",
        Deprovisioning => "Deprovisioning",
        Deprovisioned => "Deprovisioned",
    }
);

define_state!(
    /// Runtime execution status of the revision's replicas.
    RunningState {
        Running => "Running",
        Processing => "Processing",
        Activating => "Activating",
        Stopped => "Stopped",
        Degraded => "Degraded",
        Failed => "Failed",
        Unknown => "Unknown",
    }
);
