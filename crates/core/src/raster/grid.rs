//! Georeferenced grid of cell values

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::Array2;

/// Tolerance used when comparing geotransforms of two grids
pub const GRID_TOLERANCE: f64 = 1e-9;

/// One predictor band, suitability surface or change map.
///
/// Cells are stored row-major as `(row, col)`; the transform places them on
/// the map and `nodata` marks cells without a value (NaN always counts as
/// no-data for floating-point cells).
///
/// ```ignore
/// use habitat_core::Raster;
///
/// let mut bio1: Raster<f64> = Raster::new(180, 360);
/// bio1.set(10, 20, 14.2)?;
/// assert_eq!(bio1.value_f64(10, 20), Some(14.2));
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    data: Array2<T>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Zero-filled grid on the default transform
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Wrap row-major values; the length must equal `rows * cols`
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create a raster with the same georeferencing but a different cell type.
    ///
    /// The new raster is zero-filled and has no no-data value.
    pub fn with_same_meta<U: RasterElement>(&self, rows: usize, cols: usize) -> Raster<U> {
        Raster {
            data: Array2::zeros((rows, cols)),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    /// Build a raster on this grid from row-major values
    pub fn derive<U: RasterElement>(&self, data: Vec<U>, nodata: Option<U>) -> Result<Raster<U>> {
        let (rows, cols) = self.shape();
        let mut out = Raster::from_vec(data, rows, cols)?;
        out.transform = self.transform;
        out.crs = self.crs.clone();
        out.nodata = nodata;
        Ok(out)
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw cell value, no-data included
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Cell width in map units
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Map extent `(min_x, min_y, max_x, max_y)`
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Map coordinates of a cell centre
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Fractional `(col, row)` of a map coordinate
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        self.transform.geo_to_pixel(x, y)
    }

    /// Cell (row, col) containing a geographic point, if inside the grid
    pub fn cell_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (col, row) = self.geo_to_pixel(x, y);
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col.floor() as usize, row.floor() as usize);
        if row < self.rows() && col < self.cols() {
            Some((row, col))
        } else {
            None
        }
    }

    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    pub fn is_nodata_at(&self, row: usize, col: usize) -> Result<bool> {
        let value = self.get(row, col)?;
        Ok(self.is_nodata(value))
    }

    /// Value at (row, col) as f64, `None` for no-data or out-of-range cells
    pub fn value_f64(&self, row: usize, col: usize) -> Option<f64> {
        let v = self.data.get((row, col)).copied()?;
        if self.is_nodata(v) {
            None
        } else {
            v.to_f64()
        }
    }

    /// (row, col) of every cell holding valid data, in row-major order
    pub fn valid_cells(&self) -> Vec<(usize, usize)> {
        self.data
            .indexed_iter()
            .filter(|(_, &v)| !self.is_nodata(v))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Number of cells holding valid data
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| !self.is_nodata(v)).count()
    }

    /// Check that `other` lies on exactly the same grid.
    ///
    /// Compares dimensions, geotransform and CRS; the error names the first
    /// property that differs.
    pub fn grid_matches<U: RasterElement>(&self, other: &Raster<U>) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::grid_mismatch(format!(
                "dimensions {}x{} vs {}x{}",
                self.rows(),
                self.cols(),
                other.rows(),
                other.cols()
            )));
        }
        if !self.transform.approx_eq(other.transform(), GRID_TOLERANCE) {
            return Err(Error::grid_mismatch(format!(
                "extent or resolution differs: {:?} vs {:?}",
                self.transform,
                other.transform()
            )));
        }
        let crs_differs = match (self.crs(), other.crs()) {
            (Some(a), Some(b)) => !a.is_equivalent(b),
            (None, None) => false,
            _ => true,
        };
        if crs_differs {
            return Err(Error::grid_mismatch(format!(
                "coordinate systems differ: {} vs {}",
                describe_crs(self.crs()),
                describe_crs(other.crs())
            )));
        }
        Ok(())
    }

    /// Range, mean and valid-cell count, ignoring no-data
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut sum: f64 = 0.0;
        let mut count: usize = 0;

        for &value in self.data.iter() {
            if self.is_nodata(value) {
                continue;
            }

            if min.map_or(true, |m| value < m) {
                min = Some(value);
            }
            if max.map_or(true, |m| value > m) {
                max = Some(value);
            }

            if let Some(v) = value.to_f64() {
                sum += v;
                count += 1;
            }
        }

        let mean = if count > 0 {
            Some(sum / count as f64)
        } else {
            None
        };

        RasterStatistics {
            min,
            max,
            mean,
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

fn describe_crs(crs: Option<&CRS>) -> String {
    crs.map(|c| c.identifier()).unwrap_or_else(|| "unknown".to_string())
}

/// Summary printed by `habitat info`
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_grid(origin_x: f64) -> Raster<f64> {
        let mut r: Raster<f64> = Raster::new(4, 5);
        r.set_transform(GeoTransform::new(origin_x, 4.0, 1.0, -1.0));
        r.set_crs(Some(CRS::wgs84()));
        r
    }

    #[test]
    fn test_raster_creation() {
        let raster: Raster<f64> = Raster::new(100, 200);
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.shape(), (100, 200));
    }

    #[test]
    fn test_raster_access() {
        let mut raster: Raster<f64> = Raster::new(10, 10);
        raster.set(5, 5, 42.0).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 42.0);
        assert!(raster.get(10, 0).is_err());
    }

    #[test]
    fn test_cell_at() {
        let r = make_grid(0.0);
        assert_eq!(r.cell_at(0.5, 3.5), Some((0, 0)));
        assert_eq!(r.cell_at(4.9, 0.1), Some((3, 4)));
        assert_eq!(r.cell_at(-0.1, 2.0), None);
        assert_eq!(r.cell_at(5.0, 2.0), None);
    }

    #[test]
    fn test_value_f64_skips_nodata() {
        let mut r = make_grid(0.0);
        r.set_nodata(Some(-9999.0));
        r.set(1, 1, -9999.0).unwrap();
        r.set(1, 2, f64::NAN).unwrap();
        r.set(1, 3, 7.0).unwrap();
        assert_eq!(r.value_f64(1, 1), None);
        assert_eq!(r.value_f64(1, 2), None);
        assert_eq!(r.value_f64(1, 3), Some(7.0));
        assert_eq!(r.valid_count(), 18);
    }

    #[test]
    fn test_grid_matches() {
        let a = make_grid(0.0);
        let b = make_grid(0.0);
        assert!(a.grid_matches(&b).is_ok());

        let shifted = make_grid(1.0);
        assert!(matches!(a.grid_matches(&shifted), Err(Error::GridMismatch { .. })));

        let mut other_crs = make_grid(0.0);
        other_crs.set_crs(Some(CRS::from_epsg(32719)));
        assert!(a.grid_matches(&other_crs).is_err());

        let small: Raster<u8> = Raster::new(2, 2);
        assert!(a.grid_matches(&small).is_err());
    }

    #[test]
    fn test_raster_statistics() {
        let mut raster: Raster<f64> = Raster::new(10, 10);
        for i in 0..10 {
            for j in 0..10 {
                raster.set(i, j, (i * 10 + j) as f64).unwrap();
            }
        }

        let stats = raster.statistics();
        assert_eq!(stats.min, Some(0.0));
        assert_eq!(stats.max, Some(99.0));
        assert_eq!(stats.valid_count, 100);
    }
}
