//! eo-core: Element Occurrence and Source Feature assignment engine
//!
//! Groups field observations into Element Occurrences (EO) and, at a finer
//! distance, Source Features (SF):
//! - Species-specific separation distances for EOs, one fixed distance for SFs
//! - Connected components under "same species and within distance"
//! - Reconciliation against authoritative EO/SF records from prior loads
//! - Opaque tokens for new clusters and a dense per-run UNIQUEID
//!
//! Observations that already carry an identity are skipped, so a batch can
//! be re-run after fixing bad records without renumbering anything.

pub mod assign;
pub mod error;
pub mod expand;
pub mod geometry;
pub mod ident;
pub mod index;
pub mod model;
pub mod normalize;
pub mod policy;
pub mod reconcile;
pub mod settings;
pub mod stats;

// Re-exports
pub use assign::{
    AssignedObservation, Assigner, Assignment, AssignmentResult, Origin, RunReport, TierState,
};
pub use error::{EoError, ObservationError, Result};
pub use expand::{Cluster, ClusterExpander};
pub use geometry::{Envelope, Footprint, GeometryEngine, GeometryKind, PlanarEngine, Shape};
pub use ident::{
    SequentialTokens, TokenSource, UniqueIdTable, WordListTokens, DEFAULT_WORD_START,
    DEFAULT_WORD_STRIDE,
};
pub use index::SpatialIndex;
pub use model::{Identity, Observation, ReferenceRecord, RowKey, Tier};
pub use normalize::{Normalizer, DEFAULT_EPSILON};
pub use policy::{PolicyColumns, SeparationPolicy, DEFAULT_SF_DISTANCE, DEFAULT_UNITS_PER_KM};
pub use reconcile::{Reconciler, Reconciliation, ReferenceSet};
pub use settings::EngineSettings;
pub use stats::{summarize, summarize_rows, SpeciesSummary};
