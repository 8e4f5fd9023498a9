//! Labeled feature table

use habitat_core::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Binary class of a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    /// Pseudo-absence (0)
    Absence,
    /// Confirmed presence (1)
    Presence,
}

impl Label {
    /// Numeric code used in files (`1` presence, `0` absence)
    pub fn code(self) -> u8 {
        match self {
            Label::Absence => 0,
            Label::Presence => 1,
        }
    }

    /// Parse a numeric code
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Label::Absence),
            1 => Some(Label::Presence),
            _ => None,
        }
    }

    pub fn is_presence(self) -> bool {
        self == Label::Presence
    }
}

/// One sampled location: its label, coordinates and predictor values.
///
/// `values` follow the predictor order of the owning [`FeatureTable`].
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    pub label: Label,
    pub x: f64,
    pub y: f64,
    pub values: Vec<f64>,
}

/// Ordered sample records sharing one named predictor set.
///
/// Every value is finite: incomplete rows are rejected at construction.
/// Columns are addressed by predictor name.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    predictors: Vec<String>,
    records: Vec<SampleRecord>,
}

impl FeatureTable {
    /// Build a table, checking record width, finiteness and unique names
    pub fn new(predictors: Vec<String>, records: Vec<SampleRecord>) -> Result<Self> {
        for (i, name) in predictors.iter().enumerate() {
            if predictors[..i].contains(name) {
                return Err(Error::InvalidParameter {
                    name: "predictor",
                    value: name.clone(),
                    reason: "duplicate predictor name".into(),
                });
            }
        }
        for (i, rec) in records.iter().enumerate() {
            if rec.values.len() != predictors.len() {
                return Err(Error::InvalidParameter {
                    name: "record",
                    value: i.to_string(),
                    reason: format!(
                        "has {} values for {} predictors",
                        rec.values.len(),
                        predictors.len()
                    ),
                });
            }
            if let Some(j) = rec.values.iter().position(|v| !v.is_finite()) {
                return Err(Error::InvalidParameter {
                    name: "record",
                    value: i.to_string(),
                    reason: format!("missing value for predictor '{}'", predictors[j]),
                });
            }
        }
        Ok(Self { predictors, records })
    }

    pub fn predictors(&self) -> &[String] {
        &self.predictors
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Position of a predictor column
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.predictors.iter().position(|p| p == name)
    }

    /// All values of a predictor column
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let j = self.column_index(name)?;
        Some(self.records.iter().map(|r| r.values[j]).collect())
    }

    /// Value of a predictor in one row
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        let j = self.column_index(name)?;
        self.records.get(row).map(|r| r.values[j])
    }

    /// Labels in row order
    pub fn labels(&self) -> Vec<Label> {
        self.records.iter().map(|r| r.label).collect()
    }

    /// `true` for presence rows
    pub fn presence_mask(&self) -> Vec<bool> {
        self.records.iter().map(|r| r.label.is_presence()).collect()
    }

    /// (presences, absences)
    pub fn class_counts(&self) -> (usize, usize) {
        let presences = self.records.iter().filter(|r| r.label.is_presence()).count();
        (presences, self.records.len() - presences)
    }

    /// Design matrix with columns in the order of `names`.
    ///
    /// `owner` identifies the consumer in a `PredictorMismatch` error.
    pub fn matrix_for(&self, names: &[String], owner: &str) -> Result<Array2<f64>> {
        let indices = self.indices_of(names, owner)?;
        Ok(Array2::from_shape_fn((self.records.len(), indices.len()), |(i, j)| {
            self.records[i].values[indices[j]]
        }))
    }

    /// Design matrix over all predictors in table order
    pub fn matrix(&self) -> Array2<f64> {
        let p = self.predictors.len();
        Array2::from_shape_fn((self.records.len(), p), |(i, j)| self.records[i].values[j])
    }

    /// Resolve predictor names to column indices
    pub fn indices_of(&self, names: &[String], owner: &str) -> Result<Vec<usize>> {
        let mut indices = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        for name in names {
            match self.column_index(name) {
                Some(j) => indices.push(j),
                None => missing.push(name.clone()),
            }
        }
        if missing.is_empty() {
            Ok(indices)
        } else {
            Err(Error::PredictorMismatch {
                model: owner.to_string(),
                missing,
            })
        }
    }

    /// Rows at `indices`, in that order
    pub fn subset(&self, indices: &[usize]) -> Result<Self> {
        let records = indices
            .iter()
            .map(|&i| {
                self.records.get(i).cloned().ok_or(Error::IndexOutOfBounds {
                    row: i,
                    col: 0,
                    rows: self.records.len(),
                    cols: self.predictors.len(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            predictors: self.predictors.clone(),
            records,
        })
    }

    /// Table restricted to the named predictors, in that order
    pub fn select(&self, names: &[String]) -> Result<Self> {
        let indices = self.indices_of(names, "feature table")?;
        let records = self
            .records
            .iter()
            .map(|r| SampleRecord {
                label: r.label,
                x: r.x,
                y: r.y,
                values: indices.iter().map(|&j| r.values[j]).collect(),
            })
            .collect();
        Ok(Self {
            predictors: names.to_vec(),
            records,
        })
    }
}
