//! # Habitat Algorithms
//!
//! Species distribution modeling on top of `habitat-core`.
//!
//! ## Pipeline stages
//!
//! - **clip**: crop and mask predictor rasters to a study-area boundary
//! - **sampling**: presence/pseudo-absence feature tables and train/test splits
//! - **selection**: correlation and VIF based predictor filtering
//! - **models**: random forest, SVM, gradient boosting and MaxEnt classifiers
//! - **evaluation**: ROC/AUC, confusion matrix, Kappa and TSS
//! - **prediction**: suitability maps from a trained model
//! - **change**: gain/loss maps between two suitability maps

pub mod change;
pub mod clip;
pub mod evaluation;
pub(crate) mod linalg;
pub(crate) mod maybe_rayon;
pub mod models;
pub mod prediction;
pub mod sampling;
pub mod selection;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::change::{
        binarize, change_map, ChangeClass, ChangeMap, ChangeParams, ChangeSummary,
    };
    pub use crate::clip::{clip_raster, clip_stack, clip_to_dir};
    pub use crate::evaluation::{
        auc, evaluate, roc_curve, ConfusionMatrix, EvaluationResult, RocPoint,
    };
    pub use crate::models::{
        train_model, BoostingParams, ForestParams, MaxEntParams, ModelKind, ModelSpec, SvmParams,
        TrainedModel, TrainingParams,
    };
    pub use crate::prediction::{predict_suitability, PredictionParams};
    pub use crate::sampling::{
        build_feature_table, read_feature_table, train_test_split, write_feature_table,
        FeatureTable, Label, SamplingParams, SplitParams,
    };
    pub use crate::selection::{filter_collinear, CollinearityParams, CorrelationPolicy, VifPolicy};
    pub use habitat_core::prelude::*;
}
