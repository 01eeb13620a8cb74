//! Observation, reference and identity types shared by every stage

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-assigned stable key used to write results back (an OBJECTID)
pub type RowKey = u64;

/// Clustering granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    /// Element Occurrence: species-specific separation distance
    Eo,
    /// Source Feature: one fixed distance for all species
    Sf,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Eo => "EO",
            Tier::Sf => "SF",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity an observation holds at one tier
///
/// `Existing` carries an authoritative ID (or a comma-joined list of them when
/// a cluster straddles several reference records); `New` carries an opaque
/// run-scoped token for a cluster with no authoritative counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Identity {
    Existing(String),
    New(String),
}

impl Identity {
    /// The raw ID or token, as written to the `*_ID` / `*_NEW` field
    pub fn value(&self) -> &str {
        match self {
            Identity::Existing(id) | Identity::New(id) => id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Identity::New(_))
    }

    /// Build from the `*_ID` / `*_NEW` field pair; an existing ID wins
    pub fn from_fields(existing: Option<&str>, new: Option<&str>) -> Option<Self> {
        fn non_empty(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|v| !v.is_empty())
        }
        match (non_empty(existing), non_empty(new)) {
            (Some(id), _) => Some(Identity::Existing(id.to_string())),
            (None, Some(token)) => Some(Identity::New(token.to_string())),
            (None, None) => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Existing(id) => f.write_str(id),
            Identity::New(token) => write!(f, "new:{token}"),
        }
    }
}

/// One field record to be grouped
#[derive(Debug, Clone)]
pub struct Observation<G> {
    pub row_key: RowKey,
    pub species: String,
    pub geometry: G,
    /// EO identity held before the run, if any
    pub eo: Option<Identity>,
    /// SF identity held before the run, if any
    pub sf: Option<Identity>,
}

impl<G> Observation<G> {
    pub fn new(row_key: RowKey, species: impl Into<String>, geometry: G) -> Self {
        Self {
            row_key,
            species: species.into(),
            geometry,
            eo: None,
            sf: None,
        }
    }

    pub fn with_eo(mut self, identity: Identity) -> Self {
        self.eo = Some(identity);
        self
    }

    pub fn with_sf(mut self, identity: Identity) -> Self {
        self.sf = Some(identity);
        self
    }

    pub fn identity(&self, tier: Tier) -> Option<&Identity> {
        match tier {
            Tier::Eo => self.eo.as_ref(),
            Tier::Sf => self.sf.as_ref(),
        }
    }
}

/// An authoritative EO or SF from prior loads
#[derive(Debug, Clone)]
pub struct ReferenceRecord<G> {
    pub id: String,
    pub species: String,
    pub geometry: G,
}

impl<G> ReferenceRecord<G> {
    pub fn new(id: impl Into<String>, species: impl Into<String>, geometry: G) -> Self {
        Self {
            id: id.into(),
            species: species.into(),
            geometry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_from_fields_prefers_existing() {
        assert_eq!(
            Identity::from_fields(Some("4417"), Some("apple")),
            Some(Identity::Existing("4417".to_string()))
        );
        assert_eq!(
            Identity::from_fields(None, Some("apple")),
            Some(Identity::New("apple".to_string()))
        );
        assert_eq!(Identity::from_fields(Some("  "), Some("")), None);
        assert_eq!(
            Identity::from_fields(Some(" 12 "), None),
            Some(Identity::Existing("12".into()))
        );
    }

    #[test]
    fn test_identity_display() {
        assert_eq!(Identity::Existing("12,47".into()).to_string(), "12,47");
        assert_eq!(Identity::New("7".into()).to_string(), "new:7");
        assert_eq!(Identity::New("7".into()).value(), "7");
    }
}
