//! Separation distance policy
//!
//! EO grouping uses a species-specific distance from a lookup table kept in
//! kilometres; SF grouping uses one constant for every species. A species
//! missing from the table is an error, never a silent default.

use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;

use crate::error::{EoError, Result};

/// Default kilometre-to-working-unit factor (metres)
pub const DEFAULT_UNITS_PER_KM: f64 = 1000.0;

/// Default SF distance: 8 working units, which with the 1-unit normalisation
/// buffer on both sides reproduces a 10 m source-feature rule.
pub const DEFAULT_SF_DISTANCE: f64 = 8.0;

/// Column names of the tabular policy source
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyColumns {
    pub species: String,
    pub distance_km: String,
}

impl Default for PolicyColumns {
    fn default() -> Self {
        Self {
            species: "SNAME".to_string(),
            distance_km: "sep_dist_km".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeparationPolicy {
    eo: HashMap<String, f64>,
    sf: f64,
}

fn check_distance(label: &str, value: f64) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(EoError::InvalidPolicy(format!(
            "{label}: distance must be a non-negative number, got {value}"
        )))
    }
}

impl SeparationPolicy {
    /// Build from `(species, kilometres)` rows
    ///
    /// Repeated rows for one species are accepted only when they agree.
    pub fn from_km_table<I, S>(rows: I, units_per_km: f64, sf_distance: f64) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let units_per_km = check_distance("units per km", units_per_km)?;
        let sf = check_distance("SF distance", sf_distance)?;
        let mut eo = HashMap::new();
        for (species, km) in rows {
            let species = species.into();
            let distance = check_distance(&species, km)? * units_per_km;
            match eo.get(&species) {
                Some(&prev) if prev != distance => {
                    return Err(EoError::InvalidPolicy(format!(
                        "{species}: conflicting distances {} and {} km",
                        prev / units_per_km,
                        km
                    )));
                }
                _ => {
                    eo.insert(species, distance);
                }
            }
        }
        Ok(Self { eo, sf })
    }

    /// Read a species/kilometre table from CSV with a header row
    pub fn from_csv_reader<R: Read>(
        reader: R,
        columns: &PolicyColumns,
        units_per_km: f64,
        sf_distance: f64,
    ) -> Result<Self> {
        let mut csv = csv::Reader::from_reader(reader);
        let headers = csv.headers()?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| EoError::InvalidPolicy(format!("missing column '{name}'")))
        };
        let species_col = position(&columns.species)?;
        let km_col = position(&columns.distance_km)?;

        let mut rows = Vec::new();
        for (line, record) in csv.records().enumerate() {
            let record = record?;
            let species = record.get(species_col).unwrap_or("").trim();
            if species.is_empty() {
                continue;
            }
            let raw = record.get(km_col).unwrap_or("").trim();
            let km: f64 = raw.parse().map_err(|_| {
                EoError::InvalidPolicy(format!(
                    "row {}: '{raw}' is not a distance for {species}",
                    line + 2
                ))
            })?;
            rows.push((species.to_string(), km));
        }
        tracing::debug!("Loaded separation distances for {} row(s)", rows.len());
        Self::from_km_table(rows, units_per_km, sf_distance)
    }

    /// EO separation distance for `species`, in working units
    pub fn distance_for(&self, species: &str) -> Result<f64> {
        self.eo
            .get(species)
            .copied()
            .ok_or_else(|| EoError::UnknownSeparationPolicy {
                species: species.to_string(),
            })
    }

    /// SF separation distance, identical for every species
    pub fn sf_distance(&self) -> f64 {
        self.sf
    }

    pub fn len(&self) -> usize {
        self.eo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eo.is_empty()
    }
}
