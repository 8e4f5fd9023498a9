//! Collinearity filtering of predictors
//!
//! Pairwise Pearson correlation drives removal; the variance inflation
//! factor (VIF) is reported for the retained predictors and can optionally
//! drive a stepwise removal as well.

use crate::linalg;
use crate::sampling::FeatureTable;
use habitat_core::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which member of a correlated pair is removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationPolicy {
    /// Visit pairs in canonical (i < j) order and drop the later column
    #[default]
    LaterIndexed,
    /// Take the strongest pair first and drop the member with the higher
    /// mean absolute correlation to the other retained predictors
    HighestMeanCorrelation,
}

/// Role of the variance inflation factor
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum VifPolicy {
    /// Compute and report only
    #[default]
    Report,
    /// Also drop the highest-VIF predictor while any VIF exceeds `threshold`
    Stepwise { threshold: f64 },
}

/// Collinearity filter parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollinearityParams {
    /// Absolute correlation above which a pair is considered redundant
    pub threshold: f64,
    pub policy: CorrelationPolicy,
    pub vif: VifPolicy,
}

impl Default for CollinearityParams {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            policy: CorrelationPolicy::LaterIndexed,
            vif: VifPolicy::Report,
        }
    }
}

/// Outcome of collinearity filtering
#[derive(Debug, Clone)]
pub struct CollinearityResult {
    /// Input table restricted to the retained predictors
    pub table: FeatureTable,
    /// Retained predictors in original column order
    pub retained: Vec<String>,
    /// Removed predictors in removal order
    pub removed: Vec<String>,
    /// Correlation matrix of all input predictors (input column order)
    pub correlation: Array2<f64>,
    /// VIF of each retained predictor
    pub vif: Vec<(String, f64)>,
}

/// Pearson correlation between every pair of predictor columns.
///
/// A zero-variance column (or any column of a table with fewer than two
/// rows) has no defined correlation, its diagonal entry included: its whole
/// row and column are NaN.
pub fn correlation_matrix(table: &FeatureTable) -> Array2<f64> {
    let data = table.matrix();
    let (n, p) = data.dim();

    let mut centered = data.clone();
    let mut norms = vec![0.0; p];
    for j in 0..p {
        let mut col = centered.column_mut(j);
        let mean = if n > 0 { col.sum() / n as f64 } else { 0.0 };
        col.mapv_inplace(|v| v - mean);
        norms[j] = col.dot(&col).sqrt();
    }

    Array2::from_shape_fn((p, p), |(i, j)| {
        let denom = norms[i] * norms[j];
        if n < 2 || denom == 0.0 {
            return f64::NAN;
        }
        if i == j {
            return 1.0;
        }
        (centered.column(i).dot(&centered.column(j)) / denom).clamp(-1.0, 1.0)
    })
}

/// VIF of each selected column: the diagonal of the inverse of their
/// correlation submatrix.
///
/// Columns without a defined correlation get NaN and are left out of the
/// submatrix, so they do not poison the others. A singular submatrix gives
/// infinity for every remaining column.
pub fn variance_inflation(correlation: &Array2<f64>, columns: &[usize]) -> Vec<f64> {
    let defined: Vec<usize> = (0..columns.len())
        .filter(|&a| !correlation[[columns[a], columns[a]]].is_nan())
        .collect();
    let k = defined.len();
    let sub = Array2::from_shape_fn((k, k), |(a, b)| {
        correlation[[columns[defined[a]], columns[defined[b]]]]
    });

    let mut vif = vec![f64::NAN; columns.len()];
    match linalg::invert(&sub) {
        Ok(inv) => {
            for (i, &a) in defined.iter().enumerate() {
                vif[a] = inv[[i, i]];
            }
        }
        Err(_) => {
            for &a in &defined {
                vif[a] = f64::INFINITY;
            }
        }
    }
    vif
}

/// Remove redundant predictors.
///
/// After filtering, every retained pair satisfies |r| <= threshold
/// (pairs with an undefined correlation never trigger removal).
pub fn filter_collinear(
    table: &FeatureTable,
    params: &CollinearityParams,
) -> Result<CollinearityResult> {
    let tau = params.threshold;
    if !(tau > 0.0 && tau <= 1.0) {
        return Err(Error::InvalidParameter {
            name: "threshold",
            value: tau.to_string(),
            reason: "correlation threshold must lie in (0, 1]".into(),
        });
    }
    if let VifPolicy::Stepwise { threshold } = params.vif {
        if !(threshold >= 1.0) {
            return Err(Error::InvalidParameter {
                name: "vif threshold",
                value: threshold.to_string(),
                reason: "VIF is at least 1, so the threshold must be >= 1".into(),
            });
        }
    }

    let names = table.predictors();
    let corr = correlation_matrix(table);
    let p = names.len();
    let mut keep = vec![true; p];
    let mut removed_idx = Vec::new();

    match params.policy {
        CorrelationPolicy::LaterIndexed => {
            for i in 0..p {
                for j in (i + 1)..p {
                    if keep[i] && keep[j] && corr[[i, j]].abs() > tau {
                        debug!(
                            "|r({}, {})| = {:.3} > {}; removing {}",
                            names[i], names[j], corr[[i, j]].abs(), tau, names[j]
                        );
                        keep[j] = false;
                        removed_idx.push(j);
                    }
                }
            }
        }
        CorrelationPolicy::HighestMeanCorrelation => loop {
            let mut worst: Option<(usize, usize, f64)> = None;
            for i in (0..p).filter(|&i| keep[i]) {
                for j in ((i + 1)..p).filter(|&j| keep[j]) {
                    let r = corr[[i, j]].abs();
                    if r > tau && worst.map_or(true, |(_, _, w)| r > w) {
                        worst = Some((i, j, r));
                    }
                }
            }
            let Some((i, j, r)) = worst else { break };

            let mean_abs = |k: usize| {
                let others: Vec<f64> = (0..p)
                    .filter(|&o| o != k && keep[o])
                    .map(|o| corr[[k, o]].abs())
                    .filter(|v| v.is_finite())
                    .collect();
                if others.is_empty() {
                    0.0
                } else {
                    others.iter().sum::<f64>() / others.len() as f64
                }
            };
            let drop = if mean_abs(i) > mean_abs(j) { i } else { j };
            debug!(
                "|r({}, {})| = {:.3} > {}; removing {}",
                names[i], names[j], r, tau, names[drop]
            );
            keep[drop] = false;
            removed_idx.push(drop);
        },
    }

    let mut retained_idx: Vec<usize> = (0..p).filter(|&k| keep[k]).collect();
    let mut vif = variance_inflation(&corr, &retained_idx);

    if let VifPolicy::Stepwise { threshold } = params.vif {
        while retained_idx.len() > 1 {
            let mut worst = 0;
            for (k, &v) in vif.iter().enumerate() {
                if v >= vif[worst] || v.is_nan() {
                    worst = k;
                }
            }
            if !(vif[worst] > threshold || vif[worst].is_nan()) {
                break;
            }
            debug!(
                "VIF({}) = {:.2} > {}; removing",
                names[retained_idx[worst]], vif[worst], threshold
            );
            removed_idx.push(retained_idx.remove(worst));
            vif = variance_inflation(&corr, &retained_idx);
        }
    }

    let retained: Vec<String> = retained_idx.iter().map(|&k| names[k].clone()).collect();
    let removed: Vec<String> = removed_idx.iter().map(|&k| names[k].clone()).collect();
    info!(
        "Collinearity filter kept {} of {} predictors (removed: {})",
        retained.len(),
        p,
        if removed.is_empty() { "none".to_string() } else { removed.join(", ") }
    );

    Ok(CollinearityResult {
        table: table.select(&retained)?,
        vif: retained.iter().cloned().zip(vif).collect(),
        retained,
        removed,
        correlation: corr,
    })
}
