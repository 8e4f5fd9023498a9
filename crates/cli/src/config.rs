//! Pipeline configuration file

use anyhow::{bail, Context, Result};
use habitat_algorithms::change::ChangeParams;
use habitat_algorithms::models::{ModelKind, ModelSpec, TrainingParams};
use habitat_algorithms::sampling::{SamplingParams, SplitParams};
use habitat_algorithms::selection::CollinearityParams;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Predictor stack on disk: a directory of single-band GeoTIFFs or one
/// multi-band GeoTIFF
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSource {
    pub path: PathBuf,
    /// Band names for a multi-band file; defaults to `<stem>_<i>`
    #[serde(default)]
    pub bands: Option<Vec<String>>,
}

/// A future (or alternative) climate scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Used in output file names
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub bands: Option<Vec<String>>,
}

impl ScenarioConfig {
    pub fn source(&self) -> StackSource {
        StackSource {
            path: self.path.clone(),
            bands: self.bands.clone(),
        }
    }
}

/// Full pipeline configuration, read from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Worker threads; 1 runs every stage sequentially
    #[serde(default)]
    pub threads: Option<usize>,
    /// Occurrence CSV/TSV with longitude and latitude columns
    pub occurrences: PathBuf,
    /// CRS of the occurrence coordinates, e.g. `EPSG:4326`; unset means
    /// the coordinates are in the stack's CRS
    #[serde(default)]
    pub occurrence_crs: Option<String>,
    /// Study-area polygon (GeoJSON) used to clip every stack
    #[serde(default)]
    pub boundary: Option<PathBuf>,
    pub current: StackSource,
    #[serde(default)]
    pub scenarios: Vec<ScenarioConfig>,
    #[serde(default = "default_models")]
    pub models: Vec<ModelSpec>,
    #[serde(default)]
    pub sampling: SamplingParams,
    #[serde(default)]
    pub split: SplitParams,
    #[serde(default)]
    pub collinearity: CollinearityParams,
    #[serde(default)]
    pub training: TrainingParams,
    #[serde(default)]
    pub change: ChangeParams,
    /// Score above which a test row counts as a predicted presence in the
    /// confusion matrix; independent of the change-map threshold
    #[serde(default = "default_evaluation_threshold")]
    pub evaluation_threshold: f64,
    /// Decimals written in feature tables; full precision when unset
    #[serde(default)]
    pub table_precision: Option<usize>,
}

fn default_seed() -> u64 {
    1
}

fn default_evaluation_threshold() -> f64 {
    0.5
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_models() -> Vec<ModelSpec> {
    ModelKind::ALL.into_iter().map(ModelSpec::default_for).collect()
}

impl PipelineConfig {
    /// Read a TOML file; relative paths are taken from the file's directory
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Self =
            toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.apply_seed(config.seed);
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.output_dir);
        resolve(&mut self.occurrences);
        resolve(&mut self.current.path);
        if let Some(b) = self.boundary.as_mut() {
            resolve(b);
        }
        for s in &mut self.scenarios {
            resolve(&mut s.path);
        }
    }

    /// Set one seed for every random stage
    pub fn apply_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.sampling.seed = seed;
        self.split.seed = seed;
        self.training.seed = seed;
        for spec in &mut self.models {
            match spec {
                ModelSpec::RandomForest(p) => p.seed = seed,
                ModelSpec::SupportVectorMachine(p) => p.seed = seed,
                _ => {}
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            bail!("config lists no models");
        }
        if !(0.0..=1.0).contains(&self.evaluation_threshold) {
            bail!(
                "evaluation_threshold {} must lie in [0, 1]",
                self.evaluation_threshold
            );
        }
        let mut names = HashSet::new();
        for s in &self.scenarios {
            let valid = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
            if s.name.is_empty() || !s.name.chars().all(valid) {
                bail!(
                    "scenario name '{}' must be non-empty and use only letters, digits, '_' or '-'",
                    s.name
                );
            }
            if s.name == "current" {
                bail!("scenario name 'current' is reserved");
            }
            if !names.insert(&s.name) {
                bail!("duplicate scenario '{}'", s.name);
            }
        }
        let mut kinds = HashSet::new();
        for spec in &self.models {
            if !kinds.insert(spec.kind()) {
                bail!("model '{}' is listed twice", spec.kind().slug());
            }
        }
        Ok(())
    }
}
