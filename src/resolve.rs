//! Reconciles a requested reference name with the names declared by a file.
//!
//! Alignment files and independently loaded genomes routinely disagree on
//! naming (`1` vs `chr1`, or a renamed assembly accession), so lookups go
//! through three increasingly loose rules:
//!
//! 1. exact match
//! 2. match on the core token, ignoring case and a leading `chr`
//! 3. closest declared length to a caller-supplied hint

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::KnownReference;
use crate::{Error, Result};

/// Outcome of resolving a reference name, tagged with the rule that fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Exact(String),
    Normalized(String),
    ClosestLength(String),
    Unresolved,
}

impl Resolved {
    pub fn name(&self) -> Option<&str> {
        match self {
            Resolved::Exact(name) | Resolved::Normalized(name) | Resolved::ClosestLength(name) => {
                Some(name)
            }
            Resolved::Unresolved => None,
        }
    }

    pub fn into_name(self) -> Option<String> {
        match self {
            Resolved::Exact(name) | Resolved::Normalized(name) | Resolved::ClosestLength(name) => {
                Some(name)
            }
            Resolved::Unresolved => None,
        }
    }
}

/// What a query does when its reference cannot be resolved.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum UnresolvedPolicy {
    /// Return `Error::ReferenceNotResolved`.
    Fail,
    /// Return an empty result set.
    #[default]
    Empty,
    /// Substitute the first sequence in the file's dictionary.
    FirstSequence,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceNameResolver {
    policy: UnresolvedPolicy,
}

impl ReferenceNameResolver {
    pub fn new(policy: UnresolvedPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> UnresolvedPolicy {
        self.policy
    }

    pub fn resolve(
        &self,
        requested: &str,
        known: &[KnownReference],
        length_hint: Option<u64>,
    ) -> Resolved {
        resolve(requested, known, length_hint)
    }

    /// Resolve a name and apply the unresolved policy.
    ///
    /// `Ok(None)` means the query should produce no records.
    pub fn select(
        &self,
        requested: &str,
        known: &[KnownReference],
        length_hint: Option<u64>,
    ) -> Result<Option<String>> {
        match resolve(requested, known, length_hint) {
            Resolved::Exact(name) => Ok(Some(name)),
            Resolved::Normalized(name) | Resolved::ClosestLength(name) => {
                debug!(requested, resolved = %name, "reference name substituted");
                Ok(Some(name))
            }
            Resolved::Unresolved => match self.policy {
                UnresolvedPolicy::Fail => Err(Error::ReferenceNotResolved(requested.to_string())),
                UnresolvedPolicy::Empty => {
                    debug!(requested, "unresolved reference, returning no records");
                    Ok(None)
                }
                UnresolvedPolicy::FirstSequence => match known.first() {
                    Some(first) => {
                        warn!(
                            requested,
                            substitute = %first.name,
                            "unresolved reference, using first sequence"
                        );
                        Ok(Some(first.name.clone()))
                    }
                    None => Err(Error::ReferenceNotResolved(requested.to_string())),
                },
            },
        }
    }
}

pub fn resolve(requested: &str, known: &[KnownReference], length_hint: Option<u64>) -> Resolved {
    if let Some(exact) = known.iter().find(|r| r.name == requested) {
        return Resolved::Exact(exact.name.clone());
    }

    let token = core_token(requested);
    if let Some(normalized) = known.iter().find(|r| core_token(&r.name) == token) {
        return Resolved::Normalized(normalized.name.clone());
    }

    if let Some(hint) = length_hint {
        let lengths: Option<Vec<u64>> = known.iter().map(|r| r.length).collect();
        if let Some(lengths) = lengths {
            // min_by_key keeps the first of equal minima
            if let Some((i, _)) = lengths
                .iter()
                .enumerate()
                .min_by_key(|(_, length)| length.abs_diff(hint))
            {
                return Resolved::ClosestLength(known[i].name.clone());
            }
        }
    }

    Resolved::Unresolved
}

/// Lower-cased name with any `chr` prefix removed; mitochondrial spellings fold to `mt`.
fn core_token(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    let core = lower.strip_prefix("chr").unwrap_or(&lower);
    match core {
        "m" => "mt".to_string(),
        other => other.to_string(),
    }
}
