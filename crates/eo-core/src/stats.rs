//! Per-species occurrence counts for rank calculation

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::assign::RunReport;
use crate::model::{Identity, RowKey};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpeciesSummary {
    pub species: String,
    pub observations: usize,
    /// Distinct EO identities
    pub occurrences: usize,
    /// Distinct EO identities that are new tokens
    pub new_occurrences: usize,
    /// Distinct SF identities
    pub source_features: usize,
    /// Observations reported as errors
    pub failed: usize,
}

#[derive(Default)]
struct Tally<'a> {
    observations: usize,
    eo: BTreeSet<&'a Identity>,
    sf: BTreeSet<&'a Identity>,
    failed: BTreeSet<RowKey>,
}

/// Summaries sorted by species
pub fn summarize(report: &RunReport) -> Vec<SpeciesSummary> {
    summarize_rows(
        report
            .observations
            .values()
            .map(|o| (o.species.as_str(), &o.eo, &o.sf)),
        report.errors().map(|e| (e.species.as_str(), e.row_key)),
    )
}

/// Summaries from `(species, eo, sf)` rows plus `(species, row_key)` failures
pub fn summarize_rows<'a, R, F>(rows: R, failures: F) -> Vec<SpeciesSummary>
where
    R: IntoIterator<Item = (&'a str, &'a Identity, &'a Identity)>,
    F: IntoIterator<Item = (&'a str, RowKey)>,
{
    let mut tallies: BTreeMap<&'a str, Tally<'a>> = BTreeMap::new();
    for (species, eo, sf) in rows {
        let tally = tallies.entry(species).or_default();
        tally.observations += 1;
        tally.eo.insert(eo);
        tally.sf.insert(sf);
    }
    // an observation can fail at both tiers; count it once
    for (species, row_key) in failures {
        tallies.entry(species).or_default().failed.insert(row_key);
    }

    tallies
        .into_iter()
        .map(|(species, tally)| SpeciesSummary {
            species: species.to_string(),
            observations: tally.observations,
            occurrences: tally.eo.len(),
            new_occurrences: tally.eo.iter().filter(|i| i.is_new()).count(),
            source_features: tally.sf.len(),
            failed: tally.failed.len(),
        })
        .collect()
}
