//! Error types for habitat

use thiserror::Error;

/// Main error type for habitat operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    /// Raster and boundary (or two bands of one stack) are not spatially compatible
    #[error("Geometry mismatch: {0}")]
    GeometryMismatch(String),

    /// Two grids cannot be compared cell by cell
    #[error("Grid mismatch: {reason}")]
    GridMismatch { reason: String },

    /// Degenerate training data for a classifier
    #[error("Training error [{model}]: {reason}")]
    Training { model: String, reason: String },

    /// Degenerate held-out data for a classifier
    #[error("Evaluation error [{model}]: {reason}")]
    Evaluation { model: String, reason: String },

    /// Scoring input lacks predictors a model was trained on
    #[error("Predictor mismatch [{model}]: missing {}", missing.join(", "))]
    PredictorMismatch { model: String, missing: Vec<String> },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::Training`] tagged with a model name
    pub fn training(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Training {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`Error::Evaluation`] tagged with a model name
    pub fn evaluation(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Evaluation {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`Error::GridMismatch`]
    pub fn grid_mismatch(reason: impl Into<String>) -> Self {
        Error::GridMismatch {
            reason: reason.into(),
        }
    }
}

/// Result type alias for habitat operations
pub type Result<T> = std::result::Result<T, Error>;
