//! Fixed-point cluster expansion
//!
//! A cluster is the connected component of a seed in the implicit graph
//! "same species and within threshold distance". The graph is never built:
//! the selection grows by range queries until a pass adds nothing.
//!
//! Only members added in the previous pass are re-queried. Anything older has
//! already contributed all of its neighbours, so the fixed point reached is the
//! same one a full re-scan of the selection would reach.
//!
//! Callers hand the expander one species partition, so every slot it can
//! reach shares the seed's species. Members that already hold an identity are
//! part of the partition too: new observations must be able to attach to them.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::geometry::GeometryEngine;
use crate::index::SpatialIndex;

/// A settled connected component, in slot order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub members: BTreeSet<usize>,
    /// Expansion passes, bounded by the component's hop diameter plus one
    pub passes: usize,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.members.contains(&slot)
    }
}

pub struct ClusterExpander<'i, 'a, E: GeometryEngine> {
    index: &'i SpatialIndex<'a, E>,
    threshold: f64,
}

impl<'i, 'a, E: GeometryEngine> ClusterExpander<'i, 'a, E> {
    pub fn new(index: &'i SpatialIndex<'a, E>, threshold: f64) -> Self {
        Self { index, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn expand(&self, seed: usize) -> Result<Cluster> {
        let mut selection = BTreeSet::from([seed]);
        let mut frontier = vec![seed];
        let mut passes = 0;

        while !frontier.is_empty() {
            passes += 1;
            let mut added = Vec::new();
            for &member in &frontier {
                for candidate in self.index.neighbors_of(member, self.threshold)? {
                    if selection.insert(candidate) {
                        added.push(candidate);
                    }
                }
            }
            frontier = added;
        }

        Ok(Cluster {
            members: selection,
            passes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Footprint, PlanarEngine};

    fn line_of_points(xs: &[f64]) -> Vec<Footprint> {
        xs.iter().map(|&x| Footprint::point(x, 0.0)).collect()
    }

    fn members(cluster: &Cluster) -> Vec<usize> {
        cluster.members.iter().copied().collect()
    }

    #[test]
    fn test_transitive_chain_merges() {
        let engine = PlanarEngine::new();
        let geoms = line_of_points(&[0.0, 50.0, 120.0]);
        let index = SpatialIndex::build(&engine, &geoms).unwrap();
        let cluster = ClusterExpander::new(&index, 100.0).expand(0).unwrap();
        assert_eq!(members(&cluster), vec![0, 1, 2]);
    }

    #[test]
    fn test_threshold_splits_chain() {
        let engine = PlanarEngine::new();
        let geoms = line_of_points(&[0.0, 50.0, 120.0]);
        let index = SpatialIndex::build(&engine, &geoms).unwrap();
        let expander = ClusterExpander::new(&index, 60.0);
        assert_eq!(members(&expander.expand(0).unwrap()), vec![0, 1]);
        assert_eq!(members(&expander.expand(2).unwrap()), vec![2]);
    }

    #[test]
    fn test_component_independent_of_seed() {
        let engine = PlanarEngine::new();
        // slots 0..=4 form one chain spaced 9 apart; slots 5 and 6 are a separate pair
        let geoms = line_of_points(&[36.0, 0.0, 18.0, 9.0, 27.0, 500.0, 505.0]);
        let index = SpatialIndex::build(&engine, &geoms).unwrap();
        let expander = ClusterExpander::new(&index, 10.0);

        let expected = vec![0, 1, 2, 3, 4];
        for seed in 0..5 {
            assert_eq!(members(&expander.expand(seed).unwrap()), expected, "seed {seed}");
        }
        assert_eq!(members(&expander.expand(6).unwrap()), vec![5, 6]);
    }

    #[test]
    fn test_passes_track_diameter() {
        let engine = PlanarEngine::new();
        let geoms = line_of_points(&[0.0, 10.0, 20.0, 30.0]);
        let index = SpatialIndex::build(&engine, &geoms).unwrap();
        let cluster = ClusterExpander::new(&index, 10.0).expand(0).unwrap();
        assert_eq!(cluster.len(), 4);
        // three hops out, plus the pass that finds nothing new
        assert_eq!(cluster.passes, 4);
    }

    #[test]
    fn test_isolated_seed() {
        let engine = PlanarEngine::new();
        let geoms = line_of_points(&[0.0, 1000.0]);
        let index = SpatialIndex::build(&engine, &geoms).unwrap();
        let cluster = ClusterExpander::new(&index, 10.0).expand(1).unwrap();
        assert_eq!(members(&cluster), vec![1]);
        assert_eq!(cluster.passes, 1);
    }
}
