//! R-tree range queries over geometry envelopes
//!
//! The tree only narrows candidates by bounding box; every hit is confirmed
//! with the engine's exact `within_distance` test.

use rstar::{RTree, RTreeObject, AABB};

use crate::error::Result;
use crate::geometry::{Envelope, GeometryEngine};

#[derive(Debug, Clone)]
struct IndexedEnvelope {
    aabb: AABB<[f64; 2]>,
    slot: usize,
}

impl RTreeObject for IndexedEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

fn to_aabb(envelope: &Envelope) -> AABB<[f64; 2]> {
    AABB::from_corners(envelope.min, envelope.max)
}

/// Spatial index over a slice of geometries, addressed by slot (position)
pub struct SpatialIndex<'a, E: GeometryEngine> {
    engine: &'a E,
    geometries: &'a [E::Geometry],
    envelopes: Vec<Envelope>,
    tree: RTree<IndexedEnvelope>,
}

impl<'a, E: GeometryEngine> SpatialIndex<'a, E> {
    pub fn build(engine: &'a E, geometries: &'a [E::Geometry]) -> Result<Self> {
        let envelopes = geometries
            .iter()
            .map(|g| engine.envelope(g))
            .collect::<Result<Vec<_>>>()?;
        let items = envelopes
            .iter()
            .enumerate()
            .map(|(slot, env)| IndexedEnvelope {
                aabb: to_aabb(env),
                slot,
            })
            .collect();
        Ok(Self {
            engine,
            geometries,
            envelopes,
            tree: RTree::bulk_load(items),
        })
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    pub fn geometry(&self, slot: usize) -> &E::Geometry {
        &self.geometries[slot]
    }

    /// Slots within `distance` of the indexed geometry at `slot`, including itself
    pub fn neighbors_of(&self, slot: usize, distance: f64) -> Result<Vec<usize>> {
        self.query(&self.geometries[slot], &self.envelopes[slot], distance)
    }

    /// Slots within `distance` of an arbitrary geometry
    pub fn within(&self, geometry: &E::Geometry, distance: f64) -> Result<Vec<usize>> {
        let envelope = self.engine.envelope(geometry)?;
        self.query(geometry, &envelope, distance)
    }

    fn query(
        &self,
        geometry: &E::Geometry,
        envelope: &Envelope,
        distance: f64,
    ) -> Result<Vec<usize>> {
        let search = to_aabb(&envelope.grow(distance));
        let mut hits = Vec::new();
        for item in self.tree.locate_in_envelope_intersecting(&search) {
            if self
                .engine
                .within_distance(geometry, &self.geometries[item.slot], distance)?
            {
                hits.push(item.slot);
            }
        }
        hits.sort_unstable();
        Ok(hits)
    }
}
