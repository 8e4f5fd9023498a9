//! End-to-end suitability run driven by a [`PipelineConfig`]

use crate::config::{PipelineConfig, StackSource};
use anyhow::{Context, Result};
use habitat_algorithms::change::{change_map, ChangeSummary};
use habitat_algorithms::clip::clip_to_dir;
use habitat_algorithms::evaluation::{evaluate, EvaluationResult};
use habitat_algorithms::models::{train_model, ModelSummary};
use habitat_algorithms::prediction::{predict_suitability, PredictionParams};
use habitat_algorithms::sampling::{
    build_feature_table, train_test_split, write_feature_table, SamplingSummary,
};
use habitat_algorithms::selection::filter_collinear;
use habitat_core::io::{
    read_boundary, read_occurrences, read_stack_dir, read_stack_file, write_geotiff,
    GeoTiffOptions, SamplePrecision,
};
use habitat_core::{Boundary, RasterStack, CRS};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

/// Outputs of one model for one scenario
#[derive(Debug, Serialize)]
pub struct ScenarioOutput {
    pub scenario: String,
    pub suitability: PathBuf,
    /// Change map against the current period (absent for `current`)
    pub change: Option<PathBuf>,
    pub change_summary: Option<ChangeSummary>,
}

#[derive(Debug, Serialize)]
pub struct ModelReport {
    #[serde(flatten)]
    pub summary: ModelSummary,
    pub evaluation: EvaluationResult,
    pub outputs: Vec<ScenarioOutput>,
}

/// Everything written to `report.json`
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub seed: u64,
    pub occurrences_skipped: usize,
    pub sampling: SamplingSummary,
    pub predictors: Vec<String>,
    pub retained_predictors: Vec<String>,
    pub removed_predictors: Vec<String>,
    pub vif: Vec<(String, f64)>,
    pub train_rows: usize,
    pub test_rows: usize,
    pub models: Vec<ModelReport>,
}

/// Load a stack from a directory of single-band files or a multi-band file
pub fn load_stack(source: &StackSource) -> Result<RasterStack> {
    let stack = if source.path.is_dir() {
        read_stack_dir(&source.path)
    } else {
        read_stack_file(&source.path, source.bands.as_deref())
    }
    .with_context(|| format!("Failed to read predictor stack {}", source.path.display()))?;
    info!("Stack {}: {} bands {:?}", source.path.display(), stack.len(), stack.names());
    Ok(stack)
}

fn prepare_stack(
    source: &StackSource,
    boundary: Option<&Boundary>,
    clip_dir: &Path,
) -> Result<RasterStack> {
    let stack = load_stack(source)?;
    match boundary {
        Some(b) => {
            let (clipped, _) = clip_to_dir(&stack, b, clip_dir)
                .with_context(|| format!("Failed to clip {}", source.path.display()))?;
            Ok(clipped)
        }
        None => Ok(stack),
    }
}

/// Run every stage and write the outputs into `config.output_dir`
pub fn run(config: &PipelineConfig) -> Result<RunReport> {
    let out = &config.output_dir;
    std::fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;

    let boundary = match &config.boundary {
        Some(path) => Some(
            read_boundary(path)
                .with_context(|| format!("Failed to read boundary {}", path.display()))?,
        ),
        None => None,
    };
    let clipped = out.join("clipped");
    let current = prepare_stack(&config.current, boundary.as_ref(), &clipped.join("current"))
        .context("scenario 'current'")?;

    let mut scenarios = Vec::with_capacity(config.scenarios.len());
    for s in &config.scenarios {
        let stack = prepare_stack(&s.source(), boundary.as_ref(), &clipped.join(&s.name))
            .with_context(|| format!("scenario '{}'", s.name))?;
        scenarios.push((s.name.clone(), stack));
    }

    let occurrence_crs = match &config.occurrence_crs {
        Some(text) => Some(
            CRS::parse(text)
                .with_context(|| format!("Unrecognized occurrence CRS '{}'", text))?,
        ),
        None => current.crs().cloned(),
    };
    let load = read_occurrences(&config.occurrences, occurrence_crs)
        .with_context(|| format!("Failed to read occurrences {}", config.occurrences.display()))?;

    let (table, sampling) = build_feature_table(&current, &load.occurrences, &config.sampling)
        .context("Failed to build feature table")?;
    write_feature_table(&table, out.join("feature_table.csv"), config.table_precision)?;

    let filtered = filter_collinear(&table, &config.collinearity)
        .context("Collinearity filtering failed")?;
    write_feature_table(
        &filtered.table,
        out.join("feature_table_filtered.csv"),
        config.table_precision,
    )?;

    let split = train_test_split(&filtered.table, &config.split)?;
    let (train, test) = split.apply(&filtered.table)?;
    info!("Split: {} training rows, {} test rows", train.len(), test.len());

    let tiff_options = Some(GeoTiffOptions::default());
    let categorical = GeoTiffOptions {
        precision: SamplePrecision::UInt8,
    };
    let prediction = PredictionParams::default();
    let mut models = Vec::with_capacity(config.models.len());

    for spec in &config.models {
        let slug = spec.kind().slug();
        let model = train_model(spec, &train, &config.training)
            .with_context(|| format!("model '{}'", slug))?;
        let evaluation = evaluate(&model, &test, config.evaluation_threshold)
            .with_context(|| format!("model '{}'", slug))?;
        info!(
            "{}: AUC {:.4}, Kappa {:.4}, TSS {:.4}",
            slug, evaluation.auc, evaluation.kappa, evaluation.tss
        );

        let now = predict_suitability(&model, &current, &prediction)
            .with_context(|| format!("model '{}', scenario 'current'", slug))?;
        let now_path = out.join(format!("suitability_{}_current.tif", slug));
        write_geotiff(&now, &now_path, tiff_options.clone())?;
        let mut outputs = vec![ScenarioOutput {
            scenario: "current".into(),
            suitability: now_path,
            change: None,
            change_summary: None,
        }];

        for (name, stack) in &scenarios {
            let context = || format!("model '{}', scenario '{}'", slug, name);
            let future = predict_suitability(&model, stack, &prediction).with_context(context)?;
            let suitability = out.join(format!("suitability_{}_{}.tif", slug, name));
            write_geotiff(&future, &suitability, tiff_options.clone())?;

            let change = change_map(&now, &future, &config.change).with_context(context)?;
            let change_path = out.join(format!("change_{}_{}.tif", slug, name));
            write_geotiff(&change.raster, &change_path, Some(categorical.clone()))?;
            outputs.push(ScenarioOutput {
                scenario: name.clone(),
                suitability,
                change: Some(change_path),
                change_summary: Some(change.summary),
            });
        }

        models.push(ModelReport {
            summary: model.summary(),
            evaluation,
            outputs,
        });
    }

    let report = RunReport {
        seed: config.seed,
        occurrences_skipped: load.skipped,
        sampling,
        predictors: table.predictors().to_vec(),
        retained_predictors: filtered.retained,
        removed_predictors: filtered.removed,
        vif: filtered.vif,
        train_rows: train.len(),
        test_rows: test.len(),
        models,
    };

    let report_path = out.join("report.json");
    let file = File::create(&report_path)
        .with_context(|| format!("Failed to create {}", report_path.display()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &report).context("Failed to write report")?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScenarioConfig;
    use habitat_algorithms::models::{BoostingParams, MaxEntParams, ModelSpec, TrainingParams};
    use habitat_algorithms::sampling::{SamplingParams, SplitParams};
    use habitat_algorithms::selection::CollinearityParams;
    use habitat_algorithms::change::ChangeParams;
    use habitat_core::io::write_stack_dir;
    use habitat_core::{GeoTransform, Raster};

    fn band(f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
        let mut r = Raster::new(20, 20);
        for row in 0..20 {
            for col in 0..20 {
                r.set(row, col, f(row, col)).unwrap();
            }
        }
        r.set_transform(GeoTransform::new(0.0, 20.0, 1.0, -1.0));
        r.set_crs(Some(CRS::from_epsg(32719)));
        r.set_nodata(Some(f64::NAN));
        r
    }

    fn write_stack(dir: &Path, shift: f64) {
        let stack = RasterStack::new(vec![
            ("bio1".into(), band(|_, c| c as f64 + shift)),
            ("bio12".into(), band(|r, c| ((r * 3 + c * 5) % 13) as f64)),
        ])
        .unwrap();
        write_stack_dir(&stack, dir, None).unwrap();
    }

    #[test]
    fn test_run_writes_all_outputs() {
        let dir = tempfile::tempdir().unwrap();
        write_stack(&dir.path().join("current"), 0.0);
        write_stack(&dir.path().join("warm"), 4.0);

        let mut csv = String::from("species,longitude,latitude\n");
        for row in (0..20).step_by(2) {
            for col in 14..19 {
                csv.push_str(&format!("sp,{},{}\n", col as f64 + 0.5, 19.5 - row as f64));
            }
        }
        csv.push_str("sp,,3.0\n");
        let occ = dir.path().join("occ.csv");
        std::fs::write(&occ, csv).unwrap();

        let config = PipelineConfig {
            seed: 1,
            output_dir: dir.path().join("out"),
            threads: None,
            occurrences: occ,
            occurrence_crs: None,
            boundary: None,
            current: StackSource {
                path: dir.path().join("current"),
                bands: None,
            },
            scenarios: vec![ScenarioConfig {
                name: "warm".into(),
                path: dir.path().join("warm"),
                bands: None,
            }],
            models: vec![
                ModelSpec::GradientBoostedTrees(BoostingParams {
                    rounds: 10,
                    ..BoostingParams::default()
                }),
                ModelSpec::MaximumEntropy(MaxEntParams::default()),
            ],
            sampling: SamplingParams::default(),
            split: SplitParams::default(),
            collinearity: CollinearityParams::default(),
            training: TrainingParams::default(),
            change: ChangeParams::default(),
            evaluation_threshold: 0.5,
            table_precision: None,
        };

        let report = run(&config).unwrap();
        assert_eq!(report.occurrences_skipped, 1);
        assert_eq!(report.sampling.presences, 50);
        assert_eq!(report.models.len(), 2);

        let out = dir.path().join("out");
        for name in [
            "feature_table.csv",
            "feature_table_filtered.csv",
            "suitability_gbt_current.tif",
            "suitability_gbt_warm.tif",
            "change_gbt_warm.tif",
            "suitability_maxent_warm.tif",
            "change_maxent_warm.tif",
            "report.json",
        ] {
            assert!(out.join(name).exists(), "missing {}", name);
        }

        let text = std::fs::read_to_string(out.join("report.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["models"][0]["model"], "gbt");
        assert!(json["models"][1]["evaluation"]["auc"].as_f64().unwrap() > 0.5);
    }
}
