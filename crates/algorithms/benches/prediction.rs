//! Benchmarks for suitability prediction

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use habitat_algorithms::models::{
    train_model, BoostingParams, ForestParams, ModelSpec, TrainingParams,
};
use habitat_algorithms::prediction::{predict_suitability, PredictionParams};
use habitat_algorithms::sampling::{FeatureTable, Label, SampleRecord};
use habitat_core::{GeoTransform, Raster, RasterStack};

fn create_band(size: usize, f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
    let mut r = Raster::new(size, size);
    r.set_transform(GeoTransform::new(0.0, size as f64, 1.0, -1.0));
    for row in 0..size {
        for col in 0..size {
            r.set(row, col, f(row, col)).unwrap();
        }
    }
    r
}

fn create_stack(size: usize) -> RasterStack {
    RasterStack::new(vec![
        ("temp".into(), create_band(size, |_, c| c as f64 / size as f64 * 30.0)),
        ("rain".into(), create_band(size, |r, c| ((r * 7 + c * 13) % 200) as f64)),
        ("slope".into(), create_band(size, |r, _| r as f64 / size as f64 * 45.0)),
    ])
    .unwrap()
}

fn training_table() -> FeatureTable {
    let records = (0..300)
        .map(|i| {
            let temp = (i % 30) as f64;
            SampleRecord {
                label: if temp > 20.0 && i % 4 != 0 { Label::Presence } else { Label::Absence },
                x: 0.0,
                y: 0.0,
                values: vec![temp, ((i * 37) % 200) as f64, ((i * 11) % 45) as f64],
            }
        })
        .collect();
    FeatureTable::new(vec!["temp".into(), "rain".into(), "slope".into()], records).unwrap()
}

fn bench_predict(c: &mut Criterion) {
    let table = training_table();
    let specs = [
        (
            "gbt",
            ModelSpec::GradientBoostedTrees(BoostingParams {
                rounds: 50,
                ..BoostingParams::default()
            }),
        ),
        (
            "rf",
            ModelSpec::RandomForest(ForestParams {
                trees: 100,
                tune: false,
                ..ForestParams::default()
            }),
        ),
    ];

    for (slug, spec) in specs {
        let model = train_model(&spec, &table, &TrainingParams::default()).unwrap();
        let mut group = c.benchmark_group(format!("prediction/{}", slug));
        for size in [128, 256, 512] {
            let stack = create_stack(size);
            group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
                b.iter(|| {
                    predict_suitability(
                        black_box(&model),
                        black_box(&stack),
                        &PredictionParams::default(),
                    )
                    .unwrap()
                })
            });
        }
        group.finish();
    }
}

criterion_group!(benches, bench_predict);
criterion_main!(benches);
