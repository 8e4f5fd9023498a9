//! Vector data: clipping boundaries and occurrence points

use crate::crs::CRS;
use geo::{BoundingRect, Contains, Intersects};
use geo_types::{Coord, MultiPolygon, Point, Polygon};

/// A polygonal region used to clip rasters (e.g. a country outline)
#[derive(Debug, Clone)]
pub struct Boundary {
    polygons: MultiPolygon<f64>,
    crs: Option<CRS>,
}

impl Boundary {
    /// Create a boundary from polygons in the given CRS
    pub fn new(polygons: MultiPolygon<f64>, crs: Option<CRS>) -> Self {
        Self { polygons, crs }
    }

    /// Single-polygon boundary
    pub fn from_polygon(polygon: Polygon<f64>, crs: Option<CRS>) -> Self {
        Self::new(MultiPolygon::new(vec![polygon]), crs)
    }

    /// Underlying polygons
    pub fn polygons(&self) -> &MultiPolygon<f64> {
        &self.polygons
    }

    /// Declared CRS, if any
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Bounding box (min_x, min_y, max_x, max_y), `None` for an empty boundary
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        self.polygons
            .bounding_rect()
            .map(|r| (r.min().x, r.min().y, r.max().x, r.max().y))
    }

    /// Whether a point lies inside the boundary or on its edge
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let p = Point::new(x, y);
        self.polygons.contains(&p) || self.polygons.intersects(&p)
    }

    /// Number of polygons
    pub fn len(&self) -> usize {
        self.polygons.0.len()
    }

    /// Whether the boundary has no polygons
    pub fn is_empty(&self) -> bool {
        self.polygons.0.is_empty()
    }
}

/// Confirmed species presence locations.
///
/// Immutable once loaded; coordinates are (x = longitude, y = latitude) in
/// the declared CRS.
#[derive(Debug, Clone)]
pub struct OccurrenceSet {
    points: Vec<Point<f64>>,
    crs: Option<CRS>,
}

impl OccurrenceSet {
    /// Create an occurrence set
    pub fn new(points: Vec<Point<f64>>, crs: Option<CRS>) -> Self {
        Self { points, crs }
    }

    /// Convenience constructor from (lon, lat) pairs
    pub fn from_coords(coords: &[(f64, f64)], crs: Option<CRS>) -> Self {
        let points = coords
            .iter()
            .map(|&(x, y)| Point::from(Coord { x, y }))
            .collect();
        Self::new(points, crs)
    }

    /// Occurrence points
    pub fn points(&self) -> &[Point<f64>] {
        &self.points
    }

    /// Declared CRS, if any
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Number of occurrences
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::LineString;

    fn square(min: f64, max: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![(min, min), (max, min), (max, max), (min, max), (min, min)]),
            vec![],
        )
    }

    #[test]
    fn test_boundary_bounds_and_contains() {
        let b = Boundary::from_polygon(square(0.0, 10.0), Some(CRS::wgs84()));
        assert_eq!(b.bounds(), Some((0.0, 0.0, 10.0, 10.0)));
        assert!(b.contains(5.0, 5.0));
        assert!(b.contains(0.0, 5.0));
        assert!(!b.contains(10.5, 5.0));
    }

    #[test]
    fn test_occurrences_from_coords() {
        let occ = OccurrenceSet::from_coords(&[(-70.5, -33.4), (-71.0, -34.0)], None);
        assert_eq!(occ.len(), 2);
        assert_eq!(occ.points()[0].x(), -70.5);
        assert_eq!(occ.points()[1].y(), -34.0);
    }
}
