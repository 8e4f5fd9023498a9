//! Presence/absence classifiers
//!
//! Four model families share one training entry point, [`train_model`],
//! and one fitted type, [`TrainedModel`], which binds the exact ordered
//! predictor list it was trained on. Scoring resolves predictors by name,
//! so tables and stacks may carry extra columns in any order.
//!
//! | Kind | Slug | Tuned by CV | Importance |
//! |------|------|-------------|------------|
//! | Random forest | `rf` | `mtry` | mean decrease in Gini |
//! | Support vector machine | `svm` | cost (and gamma) | permutation AUC drop |
//! | Gradient boosted trees | `gbt` | no | total split gain |
//! | Maximum entropy | `maxent` | no | permutation AUC drop |

mod boosting;
pub mod cross_validation;
mod forest;
mod importance;
mod maxent;
mod svm;
mod tree;

pub use boosting::{BoostedTrees, BoostingParams};
pub use cross_validation::{stratified_folds, tune, CandidateScore, TuningReport};
pub use forest::{ForestParams, RandomForest};
pub use maxent::{FeatureClasses, MaxEntModel, MaxEntOutput, MaxEntParams};
pub use svm::{PlattScaling, SvmModel, SvmParams};

use crate::sampling::FeatureTable;
use habitat_core::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{info, warn};

/// Classifier family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "rf")]
    RandomForest,
    #[serde(rename = "svm")]
    SupportVectorMachine,
    #[serde(rename = "gbt")]
    GradientBoostedTrees,
    #[serde(rename = "maxent")]
    MaximumEntropy,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::RandomForest,
        ModelKind::SupportVectorMachine,
        ModelKind::GradientBoostedTrees,
        ModelKind::MaximumEntropy,
    ];

    /// Short stable identifier used in file names and reports
    pub fn slug(self) -> &'static str {
        match self {
            ModelKind::RandomForest => "rf",
            ModelKind::SupportVectorMachine => "svm",
            ModelKind::GradientBoostedTrees => "gbt",
            ModelKind::MaximumEntropy => "maxent",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::RandomForest => "Random forest",
            ModelKind::SupportVectorMachine => "Support vector machine",
            ModelKind::GradientBoostedTrees => "Gradient boosted trees",
            ModelKind::MaximumEntropy => "Maximum entropy",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.slug() == slug)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classifier family together with its hyperparameters.
///
/// Serialized with a `model` tag holding the slug, e.g.
/// `{ model = "rf", trees = 200 }` in TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "model")]
pub enum ModelSpec {
    #[serde(rename = "rf")]
    RandomForest(ForestParams),
    #[serde(rename = "svm")]
    SupportVectorMachine(SvmParams),
    #[serde(rename = "gbt")]
    GradientBoostedTrees(BoostingParams),
    #[serde(rename = "maxent")]
    MaximumEntropy(MaxEntParams),
}

impl ModelSpec {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelSpec::RandomForest(_) => ModelKind::RandomForest,
            ModelSpec::SupportVectorMachine(_) => ModelKind::SupportVectorMachine,
            ModelSpec::GradientBoostedTrees(_) => ModelKind::GradientBoostedTrees,
            ModelSpec::MaximumEntropy(_) => ModelKind::MaximumEntropy,
        }
    }

    /// Reference hyperparameters for a family
    pub fn default_for(kind: ModelKind) -> Self {
        match kind {
            ModelKind::RandomForest => ModelSpec::RandomForest(ForestParams::default()),
            ModelKind::SupportVectorMachine => {
                ModelSpec::SupportVectorMachine(SvmParams::default())
            }
            ModelKind::GradientBoostedTrees => {
                ModelSpec::GradientBoostedTrees(BoostingParams::default())
            }
            ModelKind::MaximumEntropy => ModelSpec::MaximumEntropy(MaxEntParams::default()),
        }
    }

    fn tunes(&self) -> bool {
        match self {
            ModelSpec::RandomForest(p) => p.tune,
            ModelSpec::SupportVectorMachine(p) => p.tune,
            _ => false,
        }
    }
}

/// Settings shared by every family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// Folds for hyperparameter selection
    pub cv_folds: usize,
    /// Seed for fold assignment and permutation importance
    pub seed: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self { cv_folds: 10, seed: 1 }
    }
}

#[derive(Debug, Clone)]
enum FittedModel {
    Forest(RandomForest),
    Svm(SvmModel),
    Boosting(BoostedTrees),
    MaxEnt(MaxEntModel),
}

impl FittedModel {
    fn score_row(&self, row: &[f64]) -> f64 {
        match self {
            FittedModel::Forest(m) => m.score_row(row),
            FittedModel::Svm(m) => m.score_row(row),
            FittedModel::Boosting(m) => m.score_row(row),
            FittedModel::MaxEnt(m) => m.score_row(row),
        }
    }

    fn diagnostics(&self) -> BTreeMap<String, f64> {
        let mut d = BTreeMap::new();
        match self {
            FittedModel::Forest(m) => {
                d.insert("trees".into(), m.n_trees() as f64);
                d.insert("mtry".into(), m.mtry() as f64);
                if let Some(oob) = m.oob_error() {
                    d.insert("oob_error".into(), oob);
                }
            }
            FittedModel::Svm(m) => {
                d.insert("cost".into(), m.cost());
                d.insert("gamma".into(), m.gamma());
                d.insert("support_vectors".into(), m.n_support() as f64);
                d.insert("platt_a".into(), m.platt().a);
                d.insert("platt_b".into(), m.platt().b);
            }
            FittedModel::Boosting(m) => {
                d.insert("trees".into(), m.n_trees() as f64);
            }
            FittedModel::MaxEnt(m) => {
                d.insert("features".into(), m.n_features() as f64);
                d.insert("active_features".into(), m.n_active() as f64);
                d.insert("entropy".into(), m.entropy());
                d.insert("iterations".into(), m.iterations() as f64);
            }
        }
        d
    }
}

/// Serializable description of a trained model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model: ModelKind,
    pub predictors: Vec<String>,
    /// (predictor, importance), most important first
    pub importance: Vec<(String, f64)>,
    pub tuning: Option<TuningReport>,
    pub diagnostics: BTreeMap<String, f64>,
}

/// A fitted classifier bound to its ordered predictor names
#[derive(Debug, Clone)]
pub struct TrainedModel {
    kind: ModelKind,
    predictors: Vec<String>,
    fitted: FittedModel,
    tuning: Option<TuningReport>,
    importance: Vec<(String, f64)>,
}

impl TrainedModel {
    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn predictors(&self) -> &[String] {
        &self.predictors
    }

    pub fn tuning(&self) -> Option<&TuningReport> {
        self.tuning.as_ref()
    }

    /// Predictor importance, most important first
    pub fn importance(&self) -> &[(String, f64)] {
        &self.importance
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            model: self.kind,
            predictors: self.predictors.clone(),
            importance: self.importance.clone(),
            tuning: self.tuning.clone(),
            diagnostics: self.fitted.diagnostics(),
        }
    }

    /// Score values already in predictor order
    pub fn score_ordered(&self, values: &[f64]) -> f64 {
        self.fitted.score_row(values)
    }

    /// Score one sample given as name → value
    pub fn score_row(&self, values: &HashMap<String, f64>) -> Result<f64> {
        let mut row = Vec::with_capacity(self.predictors.len());
        let mut missing = Vec::new();
        for name in &self.predictors {
            match values.get(name) {
                Some(&v) => row.push(v),
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(Error::PredictorMismatch {
                model: self.kind.slug().to_string(),
                missing,
            });
        }
        Ok(self.fitted.score_row(&row))
    }

    /// Score every row of a table, looking predictors up by name
    pub fn score_table(&self, table: &FeatureTable) -> Result<Vec<f64>> {
        let x = table.matrix_for(&self.predictors, self.kind.slug())?;
        self.score_matrix(&x)
    }

    /// Score a design matrix whose columns follow [`Self::predictors`]
    pub fn score_matrix(&self, x: &Array2<f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.predictors.len() {
            return Err(Error::SizeMismatch {
                er: x.nrows(),
                ec: self.predictors.len(),
                ar: x.nrows(),
                ac: x.ncols(),
            });
        }
        Ok(x.rows()
            .into_iter()
            .map(|r| self.fitted.score_row(&r.to_vec()))
            .collect())
    }
}

fn validate(kind: ModelKind, table: &FeatureTable) -> Result<()> {
    let slug = kind.slug();
    if table.is_empty() {
        return Err(Error::training(slug, "training table is empty"));
    }
    if table.predictors().is_empty() {
        return Err(Error::training(slug, "training table has no predictors"));
    }
    let (presences, absences) = table.class_counts();
    if presences == 0 || absences == 0 {
        return Err(Error::training(
            slug,
            format!(
                "training needs both classes ({} presences, {} absences)",
                presences, absences
            ),
        ));
    }
    for name in table.predictors() {
        let column = table.column(name).unwrap_or_default();
        if column.windows(2).all(|w| w[0] == w[1]) {
            return Err(Error::training(slug, format!("predictor '{}' is constant", name)));
        }
    }
    Ok(())
}

/// Folds for tuning, shrunk when the minority class is smaller than `k`
fn tuning_folds(
    labels: &[bool],
    params: &TrainingParams,
    kind: ModelKind,
) -> Result<Option<Vec<Vec<usize>>>> {
    let presences = labels.iter().filter(|&&l| l).count();
    let minority = presences.min(labels.len() - presences);
    let k = params.cv_folds.min(minority);
    if k < 2 {
        warn!(
            "{}: too few rows per class for cross-validation, using fixed hyperparameters",
            kind.slug()
        );
        return Ok(None);
    }
    if k < params.cv_folds {
        warn!(
            "{}: reducing cross-validation from {} to {} folds ({} rows in the minority class)",
            kind.slug(),
            params.cv_folds,
            k,
            minority
        );
    }
    Ok(Some(stratified_folds(labels, k, params.seed)?))
}

/// Validate the table, tune where enabled, fit and rank predictors.
///
/// Fails with `Training` (naming the model, and the predictor where one is
/// at fault) on an empty table, a single class or a constant predictor.
pub fn train_model(
    spec: &ModelSpec,
    train: &FeatureTable,
    params: &TrainingParams,
) -> Result<TrainedModel> {
    let kind = spec.kind();
    validate(kind, train)?;

    let predictors = train.predictors().to_vec();
    let x = train.matrix();
    let y = train.presence_mask();

    let folds = if spec.tunes() {
        tuning_folds(&y, params, kind)?
    } else {
        None
    };
    let folds = folds.as_deref();

    let (fitted, tuning, raw_importance) = match spec {
        ModelSpec::RandomForest(p) => {
            let (model, report) = forest::fit_tuned(&x, &y, p, folds)?;
            let imp = model.gini_importance().to_vec();
            (FittedModel::Forest(model), report, imp)
        }
        ModelSpec::SupportVectorMachine(p) => {
            let (model, report) = svm::fit_tuned(&x, &y, p, folds)?;
            let imp =
                importance::permutation_importance(&x, &y, params.seed, |r| model.score_row(r))?;
            (FittedModel::Svm(model), report, imp)
        }
        ModelSpec::GradientBoostedTrees(p) => {
            let model = BoostedTrees::fit(&x, &y, p)?;
            let imp = model.gain_importance().to_vec();
            (FittedModel::Boosting(model), None, imp)
        }
        ModelSpec::MaximumEntropy(p) => {
            let model = MaxEntModel::fit(&x, &y, p)?;
            let imp =
                importance::permutation_importance(&x, &y, params.seed, |r| model.score_row(r))?;
            (FittedModel::MaxEnt(model), None, imp)
        }
    };

    if let Some(report) = &tuning {
        let best = report.best();
        info!(
            "{}: selected {} (CV AUC {:.4}, {} folds)",
            kind.slug(),
            best.candidate,
            best.mean_auc,
            report.folds
        );
    }

    let mut importance: Vec<(String, f64)> =
        predictors.iter().cloned().zip(raw_importance).collect();
    importance.sort_by(|a, b| b.1.total_cmp(&a.1));
    let ranking: Vec<String> = importance
        .iter()
        .map(|(name, v)| format!("{}={:.4}", name, v))
        .collect();
    info!("{}: importance {}", kind.slug(), ranking.join(", "));

    Ok(TrainedModel {
        kind,
        predictors,
        fitted,
        tuning,
        importance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::{Label, SampleRecord};

    /// 40 rows: `temp` separates the classes, `rain` is noise
    fn make_table() -> FeatureTable {
        let records = (0..40)
            .map(|i| SampleRecord {
                label: if i >= 25 { Label::Presence } else { Label::Absence },
                x: i as f64,
                y: 0.0,
                values: vec![i as f64, ((i * 7) % 9) as f64],
            })
            .collect();
        FeatureTable::new(vec!["temp".into(), "rain".into()], records).unwrap()
    }

    fn quick(kind: ModelKind) -> ModelSpec {
        match kind {
            ModelKind::RandomForest => ModelSpec::RandomForest(ForestParams {
                trees: 20,
                mtry_grid: vec![1, 2],
                ..ForestParams::default()
            }),
            ModelKind::SupportVectorMachine => ModelSpec::SupportVectorMachine(SvmParams {
                cost_grid: vec![1.0, 4.0],
                ..SvmParams::default()
            }),
            ModelKind::GradientBoostedTrees => ModelSpec::GradientBoostedTrees(BoostingParams {
                rounds: 20,
                ..BoostingParams::default()
            }),
            ModelKind::MaximumEntropy => ModelSpec::default_for(kind),
        }
    }

    #[test]
    fn test_slugs_round_trip() {
        for kind in ModelKind::ALL {
            assert_eq!(ModelKind::from_slug(kind.slug()), Some(kind));
            assert_eq!(ModelSpec::default_for(kind).kind(), kind);
        }
        assert_eq!(ModelKind::from_slug("glm"), None);
    }

    #[test]
    fn test_every_family_ranks_informative_predictor_first() {
        let table = make_table();
        let params = TrainingParams {
            cv_folds: 3,
            ..TrainingParams::default()
        };
        for kind in ModelKind::ALL {
            let model = train_model(&quick(kind), &table, &params).unwrap();
            assert_eq!(model.kind(), kind);
            assert_eq!(model.importance()[0].0, "temp", "{}", kind.slug());

            let scores = model.score_table(&table).unwrap();
            assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
            let high = model.score_ordered(&[38.0, 4.0]);
            let low = model.score_ordered(&[2.0, 4.0]);
            assert!(high > low, "{}: {} <= {}", kind.slug(), high, low);
        }
    }

    #[test]
    fn test_tuned_families_report_cv() {
        let table = make_table();
        let params = TrainingParams {
            cv_folds: 3,
            ..TrainingParams::default()
        };
        let rf = train_model(&quick(ModelKind::RandomForest), &table, &params).unwrap();
        assert_eq!(rf.tuning().unwrap().folds, 3);
        let gbt = train_model(&quick(ModelKind::GradientBoostedTrees), &table, &params).unwrap();
        assert!(gbt.tuning().is_none());
    }

    #[test]
    fn test_single_class_is_training_error() {
        let table = make_table();
        let presences: Vec<usize> = (25..40).collect();
        let only = table.subset(&presences).unwrap();
        let spec = quick(ModelKind::GradientBoostedTrees);
        let err = train_model(&spec, &only, &TrainingParams::default()).unwrap_err();
        assert!(matches!(err, Error::Training { ref model, .. } if model == "gbt"));
    }

    #[test]
    fn test_constant_predictor_is_named() {
        let records = (0..10)
            .map(|i| SampleRecord {
                label: if i < 5 { Label::Presence } else { Label::Absence },
                x: 0.0,
                y: 0.0,
                values: vec![i as f64, 3.0],
            })
            .collect();
        let table = FeatureTable::new(vec!["temp".into(), "flat".into()], records).unwrap();
        let spec = quick(ModelKind::MaximumEntropy);
        let err = train_model(&spec, &table, &TrainingParams::default()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("maxent") && msg.contains("flat"), "{}", msg);
    }

    #[test]
    fn test_scoring_by_name() {
        let table = make_table();
        let spec = quick(ModelKind::GradientBoostedTrees);
        let model = train_model(&spec, &table, &TrainingParams::default()).unwrap();

        let mut values = HashMap::new();
        values.insert("rain".to_string(), 4.0);
        values.insert("temp".to_string(), 38.0);
        values.insert("extra".to_string(), 0.0);
        assert_eq!(model.score_row(&values).unwrap(), model.score_ordered(&[38.0, 4.0]));

        values.remove("rain");
        match model.score_row(&values) {
            Err(Error::PredictorMismatch { missing, .. }) => {
                assert_eq!(missing, vec!["rain".to_string()])
            }
            other => panic!("expected mismatch, got {:?}", other),
        }

        // reordered table columns still score identically
        let reordered = table.select(&["rain".to_string(), "temp".to_string()]).unwrap();
        assert_eq!(model.score_table(&reordered).unwrap(), model.score_table(&table).unwrap());
    }
}
