//! Geometry normalisation
//!
//! Lines and polygons are buffered by a small epsilon so point-to-edge
//! proximity behaves like point-to-point proximity; points pass through
//! untouched. Only the SF tier normalises; EO distances are measured on the
//! geometries as given. The source geometries are never modified: callers get a parallel
//! vector in the same order.

use crate::error::Result;
use crate::geometry::{GeometryEngine, GeometryKind};

/// Default normalisation buffer, in working units
pub const DEFAULT_EPSILON: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    epsilon: f64,
}

impl Normalizer {
    pub fn new(epsilon: f64) -> Self {
        Self { epsilon }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn normalize<E: GeometryEngine>(
        &self,
        engine: &E,
        geometry: &E::Geometry,
    ) -> Result<E::Geometry> {
        match engine.kind(geometry) {
            GeometryKind::Point => Ok(geometry.clone()),
            GeometryKind::Line | GeometryKind::Polygon => engine.buffer(geometry, self.epsilon),
        }
    }

    pub fn normalize_all<'a, E, I>(&self, engine: &E, geometries: I) -> Result<Vec<E::Geometry>>
    where
        E: GeometryEngine,
        E::Geometry: 'a,
        I: IntoIterator<Item = &'a E::Geometry>,
    {
        geometries
            .into_iter()
            .map(|g| self.normalize(engine, g))
            .collect()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Footprint, PlanarEngine, Shape};

    #[test]
    fn test_points_pass_through() {
        let engine = PlanarEngine::new();
        let point = Footprint::point(3.0, 4.0);
        let out = Normalizer::default().normalize(&engine, &point).unwrap();
        assert_eq!(out, point);
    }

    #[test]
    fn test_lines_and_polygons_buffered() {
        let engine = PlanarEngine::new();
        let inputs = vec![
            Footprint::new(Shape::line(vec![(0.0, 0.0), (5.0, 0.0)])),
            Footprint::new(Shape::polygon(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)])),
            Footprint::point(0.0, 0.0),
        ];
        let out = Normalizer::new(1.0).normalize_all(&engine, &inputs).unwrap();
        let radii: Vec<f64> = out.iter().map(|g| g.radius).collect();
        assert_eq!(radii, vec![1.0, 1.0, 0.0]);
        // sources untouched
        assert!(inputs.iter().all(|g| g.radius == 0.0));
    }
}
