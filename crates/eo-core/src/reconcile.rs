//! Reconciliation of clusters against authoritative reference data
//!
//! A cluster that lies within the tier threshold of one or more reference
//! records of its species takes their IDs. Several distinct IDs are kept
//! together, sorted and comma-joined, so a cluster straddling two historical
//! occurrences reaches a reviewer as "12,47" instead of being merged into one
//! of them. A cluster near no reference record is new.

use std::collections::{BTreeSet, HashMap};

use crate::error::Result;
use crate::geometry::GeometryEngine;
use crate::index::SpatialIndex;
use crate::model::{Identity, ReferenceRecord};
use crate::normalize::Normalizer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Distinct reference IDs touched by the cluster, sorted
    Matched(Vec<String>),
    Unmatched,
}

impl Reconciliation {
    /// Identity to assign when matched: the comma-joined ID list
    pub fn identity(&self) -> Option<Identity> {
        match self {
            Reconciliation::Matched(ids) => Some(Identity::Existing(ids.join(","))),
            Reconciliation::Unmatched => None,
        }
    }
}

#[derive(Debug, Clone)]
struct ReferenceGroup<G> {
    ids: Vec<String>,
    geometries: Vec<G>,
}

/// Reference records of one tier, grouped by species
#[derive(Debug, Clone)]
pub struct ReferenceSet<G> {
    groups: HashMap<String, ReferenceGroup<G>>,
    len: usize,
}

impl<G> Default for ReferenceSet<G> {
    fn default() -> Self {
        Self {
            groups: HashMap::new(),
            len: 0,
        }
    }
}

impl<G: Clone> ReferenceSet<G> {
    pub fn new<I>(records: I) -> Self
    where
        I: IntoIterator<Item = ReferenceRecord<G>>,
    {
        let mut set = Self::default();
        for record in records {
            let group = set
                .groups
                .entry(record.species)
                .or_insert_with(|| ReferenceGroup {
                    ids: Vec::new(),
                    geometries: Vec::new(),
                });
            group.ids.push(record.id);
            group.geometries.push(record.geometry);
            set.len += 1;
        }
        set
    }

    /// Group `records` after passing their geometries through `normalizer`
    pub fn normalized<E>(
        engine: &E,
        normalizer: &Normalizer,
        records: &[ReferenceRecord<G>],
    ) -> Result<Self>
    where
        E: GeometryEngine<Geometry = G>,
    {
        let normalized = records
            .iter()
            .map(|r| {
                Ok(ReferenceRecord {
                    id: r.id.clone(),
                    species: r.species.clone(),
                    geometry: normalizer.normalize(engine, &r.geometry)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(normalized))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Build the range-query side for one species
    pub fn reconciler<'a, E>(&'a self, engine: &'a E, species: &str) -> Result<Reconciler<'a, E>>
    where
        E: GeometryEngine<Geometry = G>,
    {
        let group = match self.groups.get(species) {
            Some(group) => group,
            None => return Ok(Reconciler { ids: &[], index: None }),
        };
        Ok(Reconciler {
            ids: &group.ids,
            index: Some(SpatialIndex::build(engine, &group.geometries)?),
        })
    }
}

/// Reference lookup for a single species partition
pub struct Reconciler<'a, E: GeometryEngine> {
    ids: &'a [String],
    index: Option<SpatialIndex<'a, E>>,
}

impl<'a, E: GeometryEngine> Reconciler<'a, E> {
    pub fn reconcile<'g, I>(&self, members: I, threshold: f64) -> Result<Reconciliation>
    where
        I: IntoIterator<Item = &'g E::Geometry>,
        E::Geometry: 'g,
    {
        let index = match &self.index {
            Some(index) => index,
            None => return Ok(Reconciliation::Unmatched),
        };
        let mut ids = BTreeSet::new();
        for geometry in members {
            for slot in index.within(geometry, threshold)? {
                ids.insert(self.ids[slot].as_str());
            }
        }
        if ids.is_empty() {
            Ok(Reconciliation::Unmatched)
        } else {
            Ok(Reconciliation::Matched(
                ids.into_iter().map(str::to_string).collect(),
            ))
        }
    }
}
