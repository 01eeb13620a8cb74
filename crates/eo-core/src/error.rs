//! Error types for occurrence assignment

use std::io;
use thiserror::Error;

use crate::model::{RowKey, Tier};

/// Errors that can occur while assigning EO/SF identities
#[derive(Debug, Error)]
pub enum EoError {
    /// Species code has no separation distance in the policy table
    #[error("no separation distance configured for species '{species}'")]
    UnknownSeparationPolicy { species: String },

    /// A cluster touches more than one previously assigned identity
    #[error(
        "{tier} cluster for species '{species}' touches {} different identities: {}",
        .identities.len(),
        .identities.join(", ")
    )]
    InconsistentClusterState {
        tier: Tier,
        species: String,
        identities: Vec<String>,
    },

    /// The geometry engine failed or could not be reached
    #[error("geometry engine unavailable: {0}")]
    GeometryEngineUnavailable(String),

    /// A geometry the engine cannot work with (empty, non-finite)
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Malformed separation policy
    #[error("invalid separation policy: {0}")]
    InvalidPolicy(String),

    /// Two observations share one row key
    #[error("duplicate observation row key {0}")]
    DuplicateRowKey(RowKey),

    /// Token generator has no tokens left
    #[error("token pool exhausted after issuing {issued} token(s)")]
    TokenPoolExhausted { issued: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl EoError {
    /// Whether the error invalidates the whole run rather than one observation
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            EoError::UnknownSeparationPolicy { .. } | EoError::InconsistentClusterState { .. }
        )
    }
}

/// Result type for assignment operations
pub type Result<T> = std::result::Result<T, EoError>;

/// A failure scoped to a single observation
///
/// Collected alongside successful assignments so the rest of the batch still
/// lands; the observation keeps whatever identity it had before the run.
#[derive(Debug)]
pub struct ObservationError {
    pub row_key: RowKey,
    pub species: String,
    pub tier: Tier,
    pub error: EoError,
}

impl std::fmt::Display for ObservationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "row {} ({}, {}): {}",
            self.row_key, self.species, self.tier, self.error
        )
    }
}
