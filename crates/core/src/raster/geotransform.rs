//! Affine georeferencing of a cell grid

use serde::{Deserialize, Serialize};

/// Six-coefficient affine map from cell space (col, row) to map space (x, y):
///
/// ```text
/// x = origin_x + col * pixel_width  + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// Predictor grids are normally north-up: both rotations are zero and
/// `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// Map x of the outer corner of cell (0, 0)
    pub origin_x: f64,
    /// Map y of the outer corner of cell (0, 0)
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Negative for north-up grids
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl GeoTransform {
    /// North-up transform without rotation
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.row_rotation,
            self.origin_y + col * self.col_rotation + row * self.pixel_height,
        )
    }

    fn determinant(&self) -> f64 {
        self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation
    }

    /// Map coordinates of the centre of a cell
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Map coordinates of the upper-left corner of a cell
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64, row as f64)
    }

    /// Fractional (col, row) of a map coordinate; NaN for a degenerate transform.
    ///
    /// Cell centres land on `.5`, so `floor` gives the containing cell.
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.determinant();
        if det.abs() < 1e-12 {
            return (f64::NAN, f64::NAN);
        }
        let (dx, dy) = (x - self.origin_x, y - self.origin_y);
        (
            (self.pixel_height * dx - self.row_rotation * dy) / det,
            (self.pixel_width * dy - self.col_rotation * dx) / det,
        )
    }

    /// Transform of a sub-grid starting at cell (col_off, row_off)
    pub fn window(&self, col_off: usize, row_off: usize) -> Self {
        let (origin_x, origin_y) = self.pixel_to_geo_corner(col_off, row_off);
        Self {
            origin_x,
            origin_y,
            ..*self
        }
    }

    /// Cell width in map units
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Area of one cell in squared map units
    pub fn cell_area(&self) -> f64 {
        self.determinant().abs()
    }

    /// True when every coefficient differs by at most `tolerance`
    pub fn approx_eq(&self, other: &GeoTransform, tolerance: f64) -> bool {
        let pairs = [
            (self.origin_x, other.origin_x),
            (self.origin_y, other.origin_y),
            (self.pixel_width, other.pixel_width),
            (self.pixel_height, other.pixel_height),
            (self.row_rotation, other.row_rotation),
            (self.col_rotation, other.col_rotation),
        ];
        pairs.iter().all(|(a, b)| (a - b).abs() <= tolerance)
    }

    /// `(min_x, min_y, max_x, max_y)` covering a `width` x `height` grid
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        [(0, 0), (width, 0), (0, height), (width, height)]
            .iter()
            .map(|&(c, r)| self.pixel_to_geo_corner(c, r))
            .fold(
                (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
                |(x0, y0, x1, y1), (x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cell_centre_maps_back_to_half_index() {
        let gt = GeoTransform::new(-72.0, -33.0, 0.25, -0.25);
        let (x, y) = gt.pixel_to_geo(3, 7);
        assert_relative_eq!(x, -71.125, epsilon = 1e-12);
        assert_relative_eq!(y, -34.875, epsilon = 1e-12);

        let (col, row) = gt.geo_to_pixel(x, y);
        assert_relative_eq!(col, 3.5, epsilon = 1e-10);
        assert_relative_eq!(row, 7.5, epsilon = 1e-10);
    }

    #[test]
    fn test_degenerate_transform() {
        let gt = GeoTransform::new(0.0, 0.0, 0.0, -1.0);
        let (col, row) = gt.geo_to_pixel(1.0, 1.0);
        assert!(col.is_nan() && row.is_nan());
    }

    #[test]
    fn test_window_shifts_origin() {
        let gt = GeoTransform::new(-70.0, -30.0, 0.5, -0.5);
        let w = gt.window(4, 2);
        assert_relative_eq!(w.origin_x, -68.0, epsilon = 1e-12);
        assert_relative_eq!(w.origin_y, -31.0, epsilon = 1e-12);
        assert_relative_eq!(w.pixel_width, 0.5, epsilon = 1e-12);
        assert_relative_eq!(w.cell_area(), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_approx_eq() {
        let a = GeoTransform::new(0.0, 10.0, 1.0, -1.0);
        let mut b = a;
        b.origin_x += 1e-12;
        assert!(a.approx_eq(&b, 1e-9));
        b.pixel_width = 2.0;
        assert!(!a.approx_eq(&b, 1e-9));
    }

    #[test]
    fn test_bounds_of_utm_grid() {
        let gt = GeoTransform::new(300_000.0, 6_300_000.0, 1000.0, -1000.0);
        let (min_x, min_y, max_x, max_y) = gt.bounds(40, 25);
        assert_relative_eq!(min_x, 300_000.0);
        assert_relative_eq!(min_y, 6_275_000.0);
        assert_relative_eq!(max_x, 340_000.0);
        assert_relative_eq!(max_y, 6_300_000.0);
    }
}
