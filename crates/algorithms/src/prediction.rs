//! Habitat suitability mapping
//!
//! Applies a trained model to every cell of a predictor stack.

use crate::maybe_rayon::*;
use crate::models::TrainedModel;
use habitat_core::raster::{Raster, RasterStack};
use habitat_core::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Parameters for suitability prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionParams {
    /// Value written to cells missing any required predictor
    pub nodata: f64,
}

impl Default for PredictionParams {
    fn default() -> Self {
        Self { nodata: f64::NAN }
    }
}

/// Score every cell of `stack` with `model`.
///
/// Bands are matched to the model's predictors by name; extra bands are
/// ignored and a missing band is a `PredictorMismatch` naming the model.
/// Cells where any required band is no-data receive `params.nodata`. The
/// output shares the stack's grid and CRS. Rows are scored in parallel and
/// the result does not depend on the thread count.
pub fn predict_suitability(
    model: &TrainedModel,
    stack: &RasterStack,
    params: &PredictionParams,
) -> Result<Raster<f64>> {
    let bands = stack.indices_of(model.predictors(), model.kind().slug())?;
    let (rows, cols) = stack.shape();
    let nodata = params.nodata;

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut values = vec![0.0; bands.len()];
            let mut row_data = Vec::with_capacity(cols);
            for col in 0..cols {
                let complete = bands.iter().zip(values.iter_mut()).all(|(&b, slot)| {
                    match stack.value_at(b, row, col) {
                        Some(v) => {
                            *slot = v;
                            true
                        }
                        None => false,
                    }
                });
                row_data.push(if complete {
                    model.score_ordered(&values)
                } else {
                    nodata
                });
            }
            row_data
        })
        .collect();

    let scored = output_data.iter().filter(|v| !v.is_nan() && **v != nodata).count();
    info!(
        "{}: scored {} of {} cells",
        model.kind().slug(),
        scored,
        rows * cols
    );

    stack.template().derive(output_data, Some(nodata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{train_model, BoostingParams, ModelSpec, TrainingParams};
    use crate::sampling::{FeatureTable, Label, SampleRecord};
    use habitat_core::raster::GeoTransform;
    use habitat_core::Error;

    fn band(f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
        let data: Vec<f64> = (0..16).map(|i| f(i / 4, i % 4)).collect();
        let mut r = Raster::from_vec(data, 4, 4).unwrap();
        r.set_transform(GeoTransform::new(0.0, 4.0, 1.0, -1.0));
        r.set_nodata(Some(f64::NAN));
        r
    }

    fn training_table() -> FeatureTable {
        let records = (0..20)
            .map(|i| SampleRecord {
                label: if i >= 10 { Label::Presence } else { Label::Absence },
                x: 0.0,
                y: 0.0,
                values: vec![i as f64, (i % 3) as f64],
            })
            .collect();
        FeatureTable::new(vec!["temp".into(), "rain".into()], records).unwrap()
    }

    fn trained() -> TrainedModel {
        let spec = ModelSpec::GradientBoostedTrees(BoostingParams {
            rounds: 10,
            min_child_weight: 0.0,
            ..BoostingParams::default()
        });
        train_model(&spec, &training_table(), &TrainingParams::default()).unwrap()
    }

    fn climate_stack() -> RasterStack {
        let temp = band(|r, c| if (r, c) == (2, 0) { f64::NAN } else { (r * 4 + c) as f64 * 1.25 });
        let rain = band(|r, c| ((r + 2 * c) % 3) as f64);
        RasterStack::new(vec![("temp".into(), temp), ("rain".into(), rain)]).unwrap()
    }

    fn bits(map: &Raster<f64>) -> Vec<u64> {
        map.data().iter().map(|v| v.to_bits()).collect()
    }

    #[test]
    fn test_prediction_masks_incomplete_cells() {
        let model = trained();
        let temp = band(|r, c| {
            if (r, c) == (1, 1) {
                f64::NAN
            } else {
                (r * 4 + c) as f64 * 1.25
            }
        });
        let rain = band(|_, c| c as f64);
        let extra = band(|_, _| 7.0);
        // bands in a different order than the model, plus an unused one
        let stack = RasterStack::new(vec![
            ("extra".into(), extra),
            ("rain".into(), rain),
            ("temp".into(), temp),
        ])
        .unwrap();

        let map = predict_suitability(&model, &stack, &PredictionParams::default()).unwrap();
        assert_eq!(map.shape(), (4, 4));
        assert_eq!(map.transform(), stack.transform());
        assert!(map.get(1, 1).unwrap().is_nan());
        for (row, col) in [(0, 0), (3, 3), (2, 1)] {
            let s = map.get(row, col).unwrap();
            let expected = model.score_ordered(&[(row * 4 + col) as f64 * 1.25, col as f64]);
            assert_eq!(s, expected);
            assert!((0.0..=1.0).contains(&s));
        }
        assert!(map.get(3, 3).unwrap() > map.get(0, 0).unwrap());
    }

    #[test]
    fn test_map_equals_cell_by_cell_scoring() {
        let model = trained();
        let stack = climate_stack();
        let map = predict_suitability(&model, &stack, &PredictionParams::default()).unwrap();

        let mut expected = Vec::new();
        for row in 0..4 {
            for col in 0..4 {
                let values = stack.values_at(row, col);
                expected.push(match (values[0], values[1]) {
                    (Some(temp), Some(rain)) => model.score_ordered(&[temp, rain]),
                    _ => f64::NAN,
                });
            }
        }
        let expected = Raster::from_vec(expected, 4, 4).unwrap();
        assert_eq!(bits(&map), bits(&expected));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_thread_count_does_not_change_map() {
        use crate::models::ForestParams;

        let run = || {
            let spec = ModelSpec::RandomForest(ForestParams {
                trees: 30,
                tune: false,
                mtry: 1,
                seed: 11,
                ..ForestParams::default()
            });
            let model = train_model(&spec, &training_table(), &TrainingParams::default()).unwrap();
            predict_suitability(&model, &climate_stack(), &PredictionParams::default()).unwrap()
        };
        let pool = |threads| {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .unwrap()
        };

        let single = pool(1).install(run);
        let many = pool(4).install(run);
        assert_eq!(bits(&single), bits(&many));
        assert!(single.get(2, 0).unwrap().is_nan());
    }

    #[test]
    fn test_missing_band_is_predictor_mismatch() {
        let model = trained();
        let stack = RasterStack::new(vec![("temp".into(), band(|_, _| 1.0))]).unwrap();
        match predict_suitability(&model, &stack, &PredictionParams::default()) {
            Err(Error::PredictorMismatch { model, missing }) => {
                assert_eq!(model, "gbt");
                assert_eq!(missing, vec!["rain".to_string()]);
            }
            other => panic!("expected mismatch, got {:?}", other.map(|r| r.shape())),
        }
    }
}
