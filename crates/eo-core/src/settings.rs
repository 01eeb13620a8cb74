//! Engine settings

use serde::Deserialize;

use crate::normalize::DEFAULT_EPSILON;
use crate::policy::{DEFAULT_SF_DISTANCE, DEFAULT_UNITS_PER_KM};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// SF separation distance in working units
    pub sf_distance: f64,
    /// Buffer applied to lines and polygons before proximity tests
    pub normalization_epsilon: f64,
    /// Working units per kilometre of the policy table
    pub units_per_km: f64,
    /// Cluster species partitions on the rayon pool
    pub parallel: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sf_distance: DEFAULT_SF_DISTANCE,
            normalization_epsilon: DEFAULT_EPSILON,
            units_per_km: DEFAULT_UNITS_PER_KM,
            parallel: true,
        }
    }
}
