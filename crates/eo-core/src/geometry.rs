//! Geometry capability consumed by the engine, and a planar implementation
//!
//! The engine never inspects coordinates itself. Everything it needs from a
//! geometry goes through [`GeometryEngine`]: a "within distance" predicate, a
//! buffer, axis-aligned bounds for the spatial index, and the geometry kind for
//! normalisation. [`PlanarEngine`] implements it over `geo` primitives in a
//! projected (metre-based) coordinate system.

use geo::{BoundingRect, EuclideanDistance, LineString, Point, Polygon, Rect};

use crate::error::{EoError, Result};

/// Broad geometry class used to decide normalisation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

/// Axis-aligned bounds in working units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl Envelope {
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        Self { min, max }
    }

    /// Grow the envelope by `by` on every side
    pub fn grow(&self, by: f64) -> Self {
        Self {
            min: [self.min[0] - by, self.min[1] - by],
            max: [self.max[0] + by, self.max[1] + by],
        }
    }
}

/// Capability interface over an external geometry engine
///
/// Every call is fallible so an adapter over a remote or licensed engine can
/// surface [`EoError::GeometryEngineUnavailable`]; the engine aborts the run
/// on the first such error.
pub trait GeometryEngine: Sync {
    type Geometry: Clone + Send + Sync;

    /// True when `a` and `b` are no further apart than `distance`
    fn within_distance(&self, a: &Self::Geometry, b: &Self::Geometry, distance: f64)
        -> Result<bool>;

    /// Expand `geometry` outward by `distance`
    fn buffer(&self, geometry: &Self::Geometry, distance: f64) -> Result<Self::Geometry>;

    /// Bounds of `geometry`, including any buffer already applied
    fn envelope(&self, geometry: &Self::Geometry) -> Result<Envelope>;

    fn kind(&self, geometry: &Self::Geometry) -> GeometryKind;
}

/// Planar shape in projected coordinates
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Point(Point<f64>),
    Line(LineString<f64>),
    Polygon(Polygon<f64>),
}

impl Shape {
    pub fn point(x: f64, y: f64) -> Self {
        Shape::Point(Point::new(x, y))
    }

    pub fn line(coords: Vec<(f64, f64)>) -> Self {
        Shape::Line(LineString::from(coords))
    }

    pub fn polygon(exterior: Vec<(f64, f64)>) -> Self {
        Self::polygon_with_holes(exterior, vec![])
    }

    pub fn polygon_with_holes(exterior: Vec<(f64, f64)>, holes: Vec<Vec<(f64, f64)>>) -> Self {
        let interiors = holes.into_iter().map(LineString::from).collect();
        Shape::Polygon(Polygon::new(LineString::from(exterior), interiors))
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            Shape::Point(_) => GeometryKind::Point,
            Shape::Line(_) => GeometryKind::Line,
            Shape::Polygon(_) => GeometryKind::Polygon,
        }
    }

    fn bounds(&self) -> Option<Rect<f64>> {
        match self {
            Shape::Point(p) => Some(p.bounding_rect()),
            Shape::Line(l) => l.bounding_rect(),
            Shape::Polygon(p) => p.bounding_rect(),
        }
    }

    fn distance(&self, other: &Shape) -> f64 {
        match (self, other) {
            (Shape::Point(p), Shape::Point(q)) => p.euclidean_distance(q),
            (Shape::Point(p), Shape::Line(l)) | (Shape::Line(l), Shape::Point(p)) => {
                p.euclidean_distance(l)
            }
            (Shape::Point(p), Shape::Polygon(g)) | (Shape::Polygon(g), Shape::Point(p)) => {
                p.euclidean_distance(g)
            }
            (Shape::Line(l), Shape::Line(m)) => l.euclidean_distance(m),
            (Shape::Line(l), Shape::Polygon(g)) | (Shape::Polygon(g), Shape::Line(l)) => {
                l.euclidean_distance(g)
            }
            (Shape::Polygon(g), Shape::Polygon(h)) => g.euclidean_distance(h),
        }
    }
}

/// A shape plus a buffer radius
///
/// Buffering is kept symbolic: the footprint covers every point within
/// `radius` of `shape`, which makes distance tests against it exact.
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    pub shape: Shape,
    pub radius: f64,
}

impl Footprint {
    pub fn new(shape: Shape) -> Self {
        Self { shape, radius: 0.0 }
    }

    pub fn point(x: f64, y: f64) -> Self {
        Self::new(Shape::point(x, y))
    }
}

impl From<Shape> for Footprint {
    fn from(shape: Shape) -> Self {
        Self::new(shape)
    }
}

/// In-process Euclidean geometry engine
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarEngine;

impl PlanarEngine {
    pub fn new() -> Self {
        Self
    }
}

impl GeometryEngine for PlanarEngine {
    type Geometry = Footprint;

    fn within_distance(&self, a: &Footprint, b: &Footprint, distance: f64) -> Result<bool> {
        let gap = a.shape.distance(&b.shape) - a.radius - b.radius;
        Ok(gap <= distance)
    }

    fn buffer(&self, geometry: &Footprint, distance: f64) -> Result<Footprint> {
        if !distance.is_finite() || distance < 0.0 {
            return Err(EoError::InvalidGeometry(format!(
                "buffer distance must be a non-negative number, got {distance}"
            )));
        }
        Ok(Footprint {
            shape: geometry.shape.clone(),
            radius: geometry.radius + distance,
        })
    }

    fn envelope(&self, geometry: &Footprint) -> Result<Envelope> {
        let rect = geometry
            .shape
            .bounds()
            .ok_or_else(|| EoError::InvalidGeometry("geometry has no coordinates".to_string()))?;
        let (min, max) = (rect.min(), rect.max());
        if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
            return Err(EoError::InvalidGeometry(
                "geometry has non-finite coordinates".to_string(),
            ));
        }
        Ok(Envelope::new([min.x, min.y], [max.x, max.y]).grow(geometry.radius))
    }

    fn kind(&self, geometry: &Footprint) -> GeometryKind {
        geometry.shape.kind()
    }
}
