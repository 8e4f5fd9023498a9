//! Habitat change between two suitability maps
//!
//! Both maps are binarized at one threshold (suitable iff score >
//! threshold) and each cell is assigned a transition class:
//!
//! | current | future | class | code |
//! |---------|--------|-------|------|
//! | unsuitable | unsuitable | stable unsuitable | 1 |
//! | suitable | unsuitable | loss | 2 |
//! | unsuitable | suitable | gain | 3 |
//! | suitable | suitable | stable suitable | 4 |
//!
//! Cells that are no-data in either map get code 0.

use crate::maybe_rayon::*;
use habitat_core::raster::Raster;
use habitat_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// No-data value of binarized maps
pub const BINARY_NODATA: u8 = 255;

/// Transition class of one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChangeClass {
    StableUnsuitable = 1,
    Loss = 2,
    Gain = 3,
    StableSuitable = 4,
}

impl ChangeClass {
    /// Code written for cells without a class
    pub const NODATA: u8 = 0;

    pub const ALL: [ChangeClass; 4] = [
        ChangeClass::StableUnsuitable,
        ChangeClass::Loss,
        ChangeClass::Gain,
        ChangeClass::StableSuitable,
    ];

    /// Transition from the current to the future suitability state
    pub fn classify(current: bool, future: bool) -> Self {
        match (current, future) {
            (false, false) => ChangeClass::StableUnsuitable,
            (true, false) => ChangeClass::Loss,
            (false, true) => ChangeClass::Gain,
            (true, true) => ChangeClass::StableSuitable,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

/// Parameters for change analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeParams {
    /// Cells with score strictly above this are suitable
    pub threshold: f64,
}

impl Default for ChangeParams {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

/// Cell counts and areas of a change map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub stable_unsuitable: usize,
    pub loss: usize,
    pub gain: usize,
    pub stable_suitable: usize,
    pub nodata: usize,
    /// Area of one cell in squared CRS units
    pub cell_area: f64,
    pub current_suitable_area: f64,
    pub future_suitable_area: f64,
    /// Relative change of suitable area in percent; `None` when no cell is
    /// currently suitable
    pub suitable_change_percent: Option<f64>,
}

impl ChangeSummary {
    pub fn count(&self, class: ChangeClass) -> usize {
        match class {
            ChangeClass::StableUnsuitable => self.stable_unsuitable,
            ChangeClass::Loss => self.loss,
            ChangeClass::Gain => self.gain,
            ChangeClass::StableSuitable => self.stable_suitable,
        }
    }
}

/// Change raster (codes 0-4) and its summary
#[derive(Debug, Clone)]
pub struct ChangeMap {
    pub raster: Raster<u8>,
    pub summary: ChangeSummary,
}

fn check_threshold(threshold: f64) -> Result<()> {
    if !threshold.is_finite() {
        return Err(Error::InvalidParameter {
            name: "threshold",
            value: threshold.to_string(),
            reason: "must be finite".into(),
        });
    }
    Ok(())
}

/// Binary suitability map: 1 where score > threshold, 0 elsewhere and
/// [`BINARY_NODATA`] on no-data cells
pub fn binarize(map: &Raster<f64>, threshold: f64) -> Result<Raster<u8>> {
    check_threshold(threshold)?;
    let (rows, cols) = map.shape();

    let output_data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| match map.value_f64(row, col) {
                    Some(v) if v > threshold => 1,
                    Some(_) => 0,
                    None => BINARY_NODATA,
                })
                .collect::<Vec<u8>>()
        })
        .collect();

    map.derive(output_data, Some(BINARY_NODATA))
}

/// Classify every cell by its transition from `current` to `future`.
///
/// The maps must share dimensions, geotransform and CRS, otherwise a
/// `GridMismatch` error says which property differs.
pub fn change_map(
    current: &Raster<f64>,
    future: &Raster<f64>,
    params: &ChangeParams,
) -> Result<ChangeMap> {
    current.grid_matches(future)?;
    check_threshold(params.threshold)?;
    let (rows, cols) = current.shape();
    let t = params.threshold;

    let output_data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = Vec::with_capacity(cols);
            for col in 0..cols {
                let code = match (current.value_f64(row, col), future.value_f64(row, col)) {
                    (Some(c), Some(f)) => ChangeClass::classify(c > t, f > t).code(),
                    _ => ChangeClass::NODATA,
                };
                row_data.push(code);
            }
            row_data
        })
        .collect();

    let mut counts = [0usize; 5];
    for &code in &output_data {
        counts[code as usize] += 1;
    }
    let cell_area = current.transform().cell_area();
    let count = |class: ChangeClass| counts[class.code() as usize];
    let current_suitable = count(ChangeClass::Loss) + count(ChangeClass::StableSuitable);
    let future_suitable = count(ChangeClass::Gain) + count(ChangeClass::StableSuitable);
    let suitable_change_percent = (current_suitable > 0).then(|| {
        (future_suitable as f64 - current_suitable as f64) / current_suitable as f64 * 100.0
    });

    let summary = ChangeSummary {
        stable_unsuitable: counts[1],
        loss: counts[2],
        gain: counts[3],
        stable_suitable: counts[4],
        nodata: counts[0],
        cell_area,
        current_suitable_area: current_suitable as f64 * cell_area,
        future_suitable_area: future_suitable as f64 * cell_area,
        suitable_change_percent,
    };
    info!(
        "Change: {} stable unsuitable, {} loss, {} gain, {} stable suitable, {} no-data",
        summary.stable_unsuitable,
        summary.loss,
        summary.gain,
        summary.stable_suitable,
        summary.nodata
    );

    let raster = current.derive(output_data, Some(ChangeClass::NODATA))?;
    Ok(ChangeMap { raster, summary })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use habitat_core::raster::GeoTransform;
    use habitat_core::CRS;

    fn make_map(values: Vec<f64>) -> Raster<f64> {
        let mut r = Raster::from_vec(values, 2, 3).unwrap();
        r.set_transform(GeoTransform::new(500_000.0, 7_000_000.0, 1000.0, -1000.0));
        r.set_crs(Some(CRS::from_epsg(32719)));
        r.set_nodata(Some(f64::NAN));
        r
    }

    #[test]
    fn test_classify_covers_all_transitions() {
        assert_eq!(ChangeClass::classify(false, false), ChangeClass::StableUnsuitable);
        assert_eq!(ChangeClass::classify(true, false), ChangeClass::Loss);
        assert_eq!(ChangeClass::classify(false, true), ChangeClass::Gain);
        assert_eq!(ChangeClass::classify(true, true), ChangeClass::StableSuitable);
        for class in ChangeClass::ALL {
            assert_eq!(ChangeClass::from_code(class.code()), Some(class));
        }
        assert_eq!(ChangeClass::from_code(ChangeClass::NODATA), None);
    }

    #[test]
    fn test_binarize_threshold_is_strict() {
        let map = make_map(vec![0.2, 0.5, 0.51, f64::NAN, 0.9, 0.0]);
        let bin = binarize(&map, 0.5).unwrap();
        let values: Vec<u8> = bin.data().iter().copied().collect();
        assert_eq!(values, vec![0, 0, 1, BINARY_NODATA, 1, 0]);
        assert_eq!(bin.nodata(), Some(BINARY_NODATA));
        assert_eq!(bin.crs(), map.crs());
    }

    #[test]
    fn test_change_map_counts_and_areas() {
        let current = make_map(vec![0.9, 0.9, 0.1, 0.1, f64::NAN, 0.7]);
        let future = make_map(vec![0.8, 0.2, 0.6, 0.3, 0.9, 0.7]);
        let change = change_map(&current, &future, &ChangeParams::default()).unwrap();

        let codes: Vec<u8> = change.raster.data().iter().copied().collect();
        assert_eq!(codes, vec![4, 2, 3, 1, 0, 4]);

        let s = &change.summary;
        assert_eq!(
            (s.stable_unsuitable, s.loss, s.gain, s.stable_suitable, s.nodata),
            (1, 1, 1, 2, 1)
        );
        assert_eq!(s.count(ChangeClass::StableSuitable), 2);
        assert_relative_eq!(s.cell_area, 1.0e6);
        assert_relative_eq!(s.current_suitable_area, 3.0e6);
        assert_relative_eq!(s.future_suitable_area, 3.0e6);
        assert_relative_eq!(s.suitable_change_percent.unwrap(), 0.0);
    }

    #[test]
    fn test_identical_maps_have_no_loss_or_gain() {
        let map = make_map(vec![0.9, 0.1, f64::NAN, 0.5, 0.51, 0.0]);
        let change = change_map(&map, &map.clone(), &ChangeParams::default()).unwrap();

        let stable = [
            ChangeClass::NODATA,
            ChangeClass::StableUnsuitable.code(),
            ChangeClass::StableSuitable.code(),
        ];
        assert!(change.raster.data().iter().all(|c| stable.contains(c)));

        let s = &change.summary;
        assert_eq!((s.loss, s.gain), (0, 0));
        assert_eq!((s.stable_unsuitable, s.stable_suitable, s.nodata), (3, 2, 1));
        assert_relative_eq!(s.current_suitable_area, s.future_suitable_area);
        assert_relative_eq!(s.suitable_change_percent.unwrap(), 0.0);
    }

    #[test]
    fn test_grid_mismatch() {
        let current = make_map(vec![0.0; 6]);
        let mut shifted = make_map(vec![0.0; 6]);
        shifted.set_transform(GeoTransform::new(500_010.0, 7_000_000.0, 1000.0, -1000.0));
        assert!(matches!(
            change_map(&current, &shifted, &ChangeParams::default()),
            Err(Error::GridMismatch { .. })
        ));

        let mut other_crs = make_map(vec![0.0; 6]);
        other_crs.set_crs(Some(CRS::from_epsg(4326)));
        let err = change_map(&current, &other_crs, &ChangeParams::default()).unwrap_err();
        assert!(err.to_string().contains("coordinate systems"));
    }
}
