//! Revision convergence primitives.
//!
//! This library provides the pieces a rollout needs to decide whether a
//! revision has converged:
//!
//! - **Platform states**: typed health/provisioning/running states, parsed
//!   once at the platform boundary.
//! - **Health classification**: one conjunctive rule shared by every caller.
//! - **Bounded polling**: a poll policy, a wall-clock deadline, and an
//!   injectable clock so loops can be driven by virtual time in tests.
//! - **Spec hashing**: deterministic hashes of desired revision payloads.
//!
//! # Invariants
//!
//! - Classification is a pure function of the four reported fields
//! - Decisions are deterministic given the same inputs
//! - Polling never sleeps past its deadline

mod health;
mod poll;
mod state;

pub use health::{is_healthy, RevisionSnapshot, Verdict};
pub use poll::{
    Clock, Deadline, ManualClock, PollPolicy, TokioClock, DEFAULT_POLL_INTERVAL,
    DEFAULT_ROLLOUT_TIMEOUT, MAX_ROLLOUT_TIMEOUT,
};
pub use state::{HealthState, ProvisioningState, RunningState};

use sha2::{Digest, Sha256};

/// A spec hash for deterministic comparison.
///
/// Used to detect when a desired revision payload has changed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecHash(String);

impl SpecHash {
    /// Compute a spec hash from canonical JSON.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let canonical = canonical_json(json);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        Self(format!("sha256:{}", hex::encode(&result[..16]))) // First 16 bytes (128 bits)
    }

    /// Compute a spec hash from any serializable value.
    pub fn of<T: serde::Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::from_json(&serde_json::to_value(value)?))
    }

    /// Get the hash string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SpecHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Produce canonical JSON (sorted keys, no extra whitespace).
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let inner: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("\"{}\":{}", escape_json_string(k), canonical_json(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        serde_json::Value::Array(arr) => {
            let inner: Vec<String> = arr.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        serde_json::Value::String(s) => format!("\"{}\"", escape_json_string(s)),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => "null".to_string(),
    }
}

fn escape_json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_hash_deterministic() {
        let json1 = serde_json::json!({"b": 2, "a": 1});
        let json2 = serde_json::json!({"a": 1, "b": 2});

        let hash1 = SpecHash::from_json(&json1);
        let hash2 = SpecHash::from_json(&json2);

        assert_eq!(hash1, hash2);
        assert!(hash1.as_str().starts_with("sha256:"));
    }

    #[test]
    fn test_spec_hash_detects_change() {
        let before = serde_json::json!({"template": {"revisionSuffix": "prod-1"}});
        let after = serde_json::json!({"template": {"revisionSuffix": "prod-2"}});

        assert_ne!(SpecHash::from_json(&before), SpecHash::from_json(&after));
    }

    #[test]
    fn test_canonical_json_escapes_control_chars() {
        let json = serde_json::json!({"k": "line\nbreak\u{1}"});
        assert_eq!(canonical_json(&json), "{\"k\":\"line\\nbreak\\u0001\"}");
    }
}
