//! Probe lookup and comparison.
//!
//! Lookups are by exact container name. A container that is not found is an
//! error distinct from a container that has no probes; there is never a
//! fallback to some other container's probes.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::model::{ContainerSpec, EffectiveTiming, ProbeCheck, ProbeKind, ProbeSpec};

/// Anything that names a container and may carry probes.
pub trait TemplateContainer {
    fn container_name(&self) -> &str;
    fn declared_probes(&self) -> Option<&[ProbeSpec]>;
}

impl TemplateContainer for ContainerSpec {
    fn container_name(&self) -> &str {
        &self.name
    }

    fn declared_probes(&self) -> Option<&[ProbeSpec]> {
        self.probes.as_deref()
    }
}

/// Result of a successful lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeLookup<'a> {
    Declared(&'a [ProbeSpec]),
    NoProbes,
}

impl<'a> ProbeLookup<'a> {
    pub fn probes(&self) -> &'a [ProbeSpec] {
        match self {
            ProbeLookup::Declared(probes) => *probes,
            ProbeLookup::NoProbes => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeLookupError {
    #[error("container '{name}' not found (available: {})", available.join(", "))]
    ContainerNotFound {
        name: String,
        available: Vec<String>,
    },
}

/// Find the probes of the container called `name`.
pub fn extract_probes<'a, C: TemplateContainer>(
    containers: &'a [C],
    name: &str,
) -> Result<ProbeLookup<'a>, ProbeLookupError> {
    let container = containers
        .iter()
        .find(|c| c.container_name() == name)
        .ok_or_else(|| ProbeLookupError::ContainerNotFound {
            name: name.to_string(),
            available: containers
                .iter()
                .map(|c| c.container_name().to_string())
                .collect(),
        })?;

    Ok(match container.declared_probes() {
        Some(probes) if !probes.is_empty() => ProbeLookup::Declared(probes),
        _ => ProbeLookup::NoProbes,
    })
}

/// One probe-level change between two probe sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ProbeChange {
    Added {
        kind: ProbeKind,
        check: String,
    },
    Removed {
        kind: ProbeKind,
        check: String,
    },
    Changed {
        kind: ProbeKind,
        from: String,
        to: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timing: Option<(EffectiveTiming, EffectiveTiming)>,
    },
}

impl ProbeChange {
    pub fn kind(&self) -> ProbeKind {
        match self {
            ProbeChange::Added { kind, .. }
            | ProbeChange::Removed { kind, .. }
            | ProbeChange::Changed { kind, .. } => *kind,
        }
    }
}

impl fmt::Display for ProbeChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeChange::Added { kind, check } => write!(f, "+ {kind} {check}"),
            ProbeChange::Removed { kind, check } => write!(f, "- {kind} {check}"),
            ProbeChange::Changed {
                kind,
                from,
                to,
                timing,
            } => {
                write!(f, "~ {kind} {from}")?;
                if from != to {
                    write!(f, " -> {to}")?;
                }
                if let Some((old, new)) = timing {
                    write!(f, " (timing {} -> {})", describe_timing(old), describe_timing(new))?;
                }
                Ok(())
            }
        }
    }
}

fn describe_timing(t: &EffectiveTiming) -> String {
    format!(
        "delay={}s period={}s timeout={}s failure={} success={}",
        t.initial_delay_seconds,
        t.period_seconds,
        t.timeout_seconds,
        t.failure_threshold,
        t.success_threshold
    )
}

/// Compare two probe sets by kind.
///
/// Timing is compared on effective values, so an explicit `periodSeconds: 10`
/// equals an absent one.
pub fn diff_probes(current: &[ProbeSpec], desired: &[ProbeSpec]) -> Vec<ProbeChange> {
    let current: BTreeMap<ProbeKind, &ProbeSpec> = current.iter().map(|p| (p.kind, p)).collect();
    let desired: BTreeMap<ProbeKind, &ProbeSpec> = desired.iter().map(|p| (p.kind, p)).collect();

    let mut changes = Vec::new();

    for (kind, old) in &current {
        match desired.get(kind) {
            None => changes.push(ProbeChange::Removed {
                kind: *kind,
                check: old.check.describe(),
            }),
            Some(new) => {
                let old_timing = old.timing.effective();
                let new_timing = new.timing.effective();
                let check_changed = !same_check(&old.check, &new.check);
                let timing_changed = old_timing != new_timing;
                if check_changed || timing_changed {
                    changes.push(ProbeChange::Changed {
                        kind: *kind,
                        from: old.check.describe(),
                        to: new.check.describe(),
                        timing: timing_changed.then_some((old_timing, new_timing)),
                    });
                }
            }
        }
    }

    for (kind, new) in &desired {
        if !current.contains_key(kind) {
            changes.push(ProbeChange::Added {
                kind: *kind,
                check: new.check.describe(),
            });
        }
    }

    changes.sort_by_key(ProbeChange::kind);
    changes
}

fn same_check(a: &ProbeCheck, b: &ProbeCheck) -> bool {
    match (a, b) {
        (ProbeCheck::Http(a), ProbeCheck::Http(b)) => {
            let scheme = |s: &Option<String>| s.as_deref().unwrap_or("HTTP").to_ascii_uppercase();
            a.path == b.path
                && a.port == b.port
                && scheme(&a.scheme) == scheme(&b.scheme)
                && a.host == b.host
                && a.http_headers == b.http_headers
        }
        (ProbeCheck::Tcp(a), ProbeCheck::Tcp(b)) => a == b,
        _ => false,
    }
}
