//! Clip predictor rasters to a study-area boundary
//!
//! The output window is the boundary's bounding box snapped outward to the
//! raster grid. Cells inside the window whose centre falls outside the
//! polygons become no-data (NaN). Coordinate systems are never
//! reprojected: a boundary in a different CRS is an error.

use crate::maybe_rayon::*;
use habitat_core::io::{write_stack_dir, GeoTiffOptions};
use habitat_core::vector::Boundary;
use habitat_core::{Error, Raster, RasterStack, Result};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Cell window of a clip, in source-raster pixel offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipWindow {
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

/// Window of `raster` covered by the boundary's bounding box.
///
/// Fails with `GeometryMismatch` when the boundary is empty or does not
/// overlap the raster.
pub fn clip_window(raster: &Raster<f64>, boundary: &Boundary, name: &str) -> Result<ClipWindow> {
    let (min_x, min_y, max_x, max_y) = boundary.bounds().ok_or_else(|| {
        Error::GeometryMismatch(format!("boundary for '{}' has no polygons", name))
    })?;
    let (rows, cols) = raster.shape();

    // Corner pixels can swap order for south-up or east-left grids
    let (c0, r0) = raster.geo_to_pixel(min_x, max_y);
    let (c1, r1) = raster.geo_to_pixel(max_x, min_y);

    let col_start = c0.min(c1).floor().max(0.0);
    let col_end = c0.max(c1).ceil().min(cols as f64);
    let row_start = r0.min(r1).floor().max(0.0);
    let row_end = r0.max(r1).ceil().min(rows as f64);

    if !(col_start < col_end && row_start < row_end) {
        return Err(Error::GeometryMismatch(format!(
            "boundary ({:.4}, {:.4}, {:.4}, {:.4}) does not overlap raster '{}'",
            min_x, min_y, max_x, max_y, name
        )));
    }

    Ok(ClipWindow {
        row_off: row_start as usize,
        col_off: col_start as usize,
        rows: (row_end - row_start) as usize,
        cols: (col_end - col_start) as usize,
    })
}

fn check_crs(raster: &Raster<f64>, boundary: &Boundary, name: &str) -> Result<()> {
    match (raster.crs(), boundary.crs()) {
        (Some(rc), Some(bc)) if !rc.is_equivalent(bc) => Err(Error::GeometryMismatch(format!(
            "raster '{}' is in {} but the boundary is in {}; reproject one of them first",
            name,
            rc.identifier(),
            bc.identifier()
        ))),
        (None, _) => {
            warn!("Raster '{}' has no CRS; assuming it matches the boundary", name);
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Clip one raster to the boundary.
///
/// `name` identifies the raster in errors and log messages.
pub fn clip_raster(raster: &Raster<f64>, boundary: &Boundary, name: &str) -> Result<Raster<f64>> {
    check_crs(raster, boundary, name)?;
    let window = clip_window(raster, boundary, name)?;
    let ClipWindow {
        row_off,
        col_off,
        rows,
        cols,
    } = window;

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let src_row = row_off + row;
            for (col, out) in row_data.iter_mut().enumerate() {
                let src_col = col_off + col;
                let (x, y) = raster.pixel_to_geo(src_col, src_row);
                if !boundary.contains(x, y) {
                    continue;
                }
                if let Some(v) = raster.value_f64(src_row, src_col) {
                    *out = v;
                }
            }
            row_data
        })
        .collect();

    let mut output = raster.with_same_meta::<f64>(rows, cols);
    output.set_transform(raster.transform().window(col_off, row_off));
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;

    let valid = output.valid_count();
    if valid == 0 {
        warn!("Clipped raster '{}' holds no valid cells", name);
    }
    debug!(
        "Clipped '{}' to {}x{} window at ({}, {}), {} valid cells",
        name, rows, cols, row_off, col_off, valid
    );
    Ok(output)
}

/// Clip every band of a stack; bands are processed in parallel
pub fn clip_stack(stack: &RasterStack, boundary: &Boundary) -> Result<RasterStack> {
    let bands: Vec<(&str, &Raster<f64>)> = stack.iter().collect();
    let clipped = bands
        .par_iter()
        .map(|&(name, band)| clip_raster(band, boundary, name).map(|r| (name.to_string(), r)))
        .collect::<Result<Vec<_>>>()?;
    RasterStack::new(clipped)
}

/// Clip a stack and write one `<name>.tif` per band into `dir`
pub fn clip_to_dir<P: AsRef<Path>>(
    stack: &RasterStack,
    boundary: &Boundary,
    dir: P,
) -> Result<(RasterStack, Vec<PathBuf>)> {
    let clipped = clip_stack(stack, boundary)?;
    let paths = write_stack_dir(&clipped, dir, Some(GeoTiffOptions::default()))?;
    Ok((clipped, paths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, Polygon};
    use habitat_core::{GeoTransform, CRS};

    /// 10x10 grid covering x in [0, 10], y in [0, 10], value = row * 10 + col
    fn make_raster() -> Raster<f64> {
        let mut r: Raster<f64> = Raster::new(10, 10);
        for row in 0..10 {
            for col in 0..10 {
                r.set(row, col, (row * 10 + col) as f64).unwrap();
            }
        }
        r.set_transform(GeoTransform::new(0.0, 10.0, 1.0, -1.0));
        r.set_crs(Some(CRS::wgs84()));
        r
    }

    fn boundary(coords: Vec<(f64, f64)>) -> Boundary {
        Boundary::from_polygon(Polygon::new(LineString::from(coords), vec![]), Some(CRS::wgs84()))
    }

    #[test]
    fn test_rectangle_clip_window_and_values() {
        let r = make_raster();
        let b = boundary(vec![(2.0, 3.0), (6.0, 3.0), (6.0, 8.0), (2.0, 8.0), (2.0, 3.0)]);
        let out = clip_raster(&r, &b, "bio_1").unwrap();

        assert_eq!(out.shape(), (5, 4));
        assert_eq!(out.transform().origin_x, 2.0);
        assert_eq!(out.transform().origin_y, 8.0);
        // top-left of the window is source row 2, col 2
        assert_eq!(out.get(0, 0).unwrap(), 22.0);
        assert_eq!(out.valid_count(), 20);
    }

    #[test]
    fn test_cells_outside_polygon_are_nodata() {
        let r = make_raster();
        // triangle with the right angle at (0, 0)
        let b = boundary(vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (0.0, 0.0)]);
        let out = clip_raster(&r, &b, "tri").unwrap();

        assert_eq!(out.shape(), (10, 10));
        // top-right centre (9.5, 9.5) is outside
        assert!(out.get(0, 9).unwrap().is_nan());
        // bottom-left centre (0.5, 0.5) is inside
        assert_eq!(out.get(9, 0).unwrap(), 90.0);
        assert!(out.valid_count() < 100);
    }

    #[test]
    fn test_window_clamped_to_raster() {
        let r = make_raster();
        let b = boundary(vec![(-5.0, -5.0), (3.0, -5.0), (3.0, 3.0), (-5.0, 3.0), (-5.0, -5.0)]);
        let out = clip_raster(&r, &b, "edge").unwrap();
        assert_eq!(out.shape(), (3, 3));
        assert_eq!(out.transform().origin_x, 0.0);
        assert_eq!(out.transform().origin_y, 3.0);
    }

    #[test]
    fn test_no_overlap_is_geometry_mismatch() {
        let r = make_raster();
        let b = boundary(vec![(20.0, 20.0), (30.0, 20.0), (30.0, 30.0), (20.0, 20.0)]);
        assert!(matches!(clip_raster(&r, &b, "far"), Err(Error::GeometryMismatch(_))));
    }

    #[test]
    fn test_crs_mismatch_is_rejected() {
        let r = make_raster();
        let mut b = boundary(vec![(2.0, 2.0), (6.0, 2.0), (6.0, 6.0), (2.0, 2.0)]);
        b = Boundary::new(b.polygons().clone(), Some(CRS::from_epsg(32719)));
        let err = clip_raster(&r, &b, "bio_1").unwrap_err();
        assert!(err.to_string().contains("bio_1"));
    }

    #[test]
    fn test_clip_stack_keeps_names_and_alignment() {
        let stack = RasterStack::new(vec![
            ("a".into(), make_raster()),
            ("b".into(), make_raster()),
        ])
        .unwrap();
        let b = boundary(vec![(1.0, 1.0), (4.0, 1.0), (4.0, 4.0), (1.0, 4.0), (1.0, 1.0)]);
        let clipped = clip_stack(&stack, &b).unwrap();
        assert_eq!(clipped.names(), &["a", "b"]);
        assert_eq!(clipped.shape(), (3, 3));
    }

    #[test]
    fn test_clip_to_dir_writes_files() {
        let stack = RasterStack::new(vec![("elev".into(), make_raster())]).unwrap();
        let b = boundary(vec![(1.0, 1.0), (4.0, 1.0), (4.0, 4.0), (1.0, 4.0), (1.0, 1.0)]);
        let dir = tempfile::tempdir().unwrap();
        let (_, paths) = clip_to_dir(&stack, &b, dir.path()).unwrap();
        assert_eq!(paths, vec![dir.path().join("elev.tif")]);
        assert!(paths[0].exists());
    }
}
