//! Support vector machine with an RBF kernel
//!
//! C-SVC on standardized predictors, trained with SMO using the
//! maximal-violating-pair working set and the LIBSVM pair update. Decision
//! values are mapped to probabilities by Platt scaling, fitted on decision
//! values from an internal cross-validation so the calibration is not
//! trained on in-sample margins.

use super::cross_validation::{holdout_auc, stratified_folds, subset, tune, TuningReport};
use habitat_core::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const TAU: f64 = 1e-12;

/// SVM parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmParams {
    /// Box constraint C
    pub cost: f64,
    /// RBF width; `None` means 1 / number of predictors
    pub gamma: Option<f64>,
    pub cost_grid: Vec<f64>,
    /// Empty grid tunes cost only, at the default gamma
    pub gamma_grid: Vec<f64>,
    pub tune: bool,
    /// KKT violation tolerance of the solver
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Folds used to produce out-of-sample decision values for calibration
    pub calibration_folds: usize,
    pub seed: u64,
}

impl Default for SvmParams {
    fn default() -> Self {
        Self {
            cost: 1.0,
            gamma: None,
            cost_grid: vec![0.25, 0.5, 1.0, 2.0, 4.0],
            gamma_grid: Vec::new(),
            tune: true,
            tolerance: 1e-3,
            max_iterations: 100_000,
            calibration_folds: 5,
            seed: 1,
        }
    }
}

/// Per-column z-score transform learned from training data
#[derive(Debug, Clone)]
struct Standardizer {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl Standardizer {
    fn fit(x: &Array2<f64>) -> Self {
        let n = x.nrows() as f64;
        let (mut mean, mut scale) = (Vec::new(), Vec::new());
        for col in x.columns() {
            let m = col.sum() / n;
            let var = col.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
            mean.push(m);
            scale.push(if var > 0.0 { var.sqrt() } else { 1.0 });
        }
        Self { mean, scale }
    }

    fn transform_row(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }
}

/// Sigmoid fitted to decision values: P(presence | f) = 1 / (1 + exp(a f + b))
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattScaling {
    pub a: f64,
    pub b: f64,
}

impl PlattScaling {
    /// Newton fit with backtracking (Lin, Lin and Weng's variant of Platt's method)
    pub fn fit(decision: &[f64], labels: &[bool]) -> Self {
        let prior1 = labels.iter().filter(|&&l| l).count() as f64;
        let prior0 = labels.len() as f64 - prior1;
        let hi = (prior1 + 1.0) / (prior1 + 2.0);
        let lo = 1.0 / (prior0 + 2.0);
        let targets: Vec<f64> = labels.iter().map(|&l| if l { hi } else { lo }).collect();

        let objective = |a: f64, b: f64| -> f64 {
            decision
                .iter()
                .zip(&targets)
                .map(|(&f, &t)| {
                    let z = f * a + b;
                    if z >= 0.0 {
                        t * z + (-z).exp().ln_1p()
                    } else {
                        (t - 1.0) * z + z.exp().ln_1p()
                    }
                })
                .sum()
        };

        let (mut a, mut b) = (0.0, ((prior0 + 1.0) / (prior1 + 1.0)).ln());
        let mut fval = objective(a, b);

        for _ in 0..100 {
            let (mut h11, mut h22, mut h21, mut g1, mut g2) = (1e-12, 1e-12, 0.0, 0.0, 0.0);
            for (&f, &t) in decision.iter().zip(&targets) {
                let z = f * a + b;
                let (p, q) = if z >= 0.0 {
                    let e = (-z).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = z.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += f * f * d2;
                h22 += d2;
                h21 += f * d2;
                let d1 = t - p;
                g1 += f * d1;
                g2 += d1;
            }
            if g1.abs() < 1e-5 && g2.abs() < 1e-5 {
                break;
            }

            let det = h11 * h22 - h21 * h21;
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;

            let mut step = 1.0;
            while step >= 1e-10 {
                let (na, nb) = (a + step * da, b + step * db);
                let nf = objective(na, nb);
                if nf < fval + 1e-4 * step * gd {
                    a = na;
                    b = nb;
                    fval = nf;
                    break;
                }
                step /= 2.0;
            }
            if step < 1e-10 {
                break;
            }
        }
        Self { a, b }
    }

    pub fn probability(&self, decision: f64) -> f64 {
        let z = decision * self.a + self.b;
        if z >= 0.0 {
            let e = (-z).exp();
            e / (1.0 + e)
        } else {
            1.0 / (1.0 + z.exp())
        }
    }
}

fn rbf(a: &[f64], b: &[f64], gamma: f64) -> f64 {
    let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (-gamma * d2).exp()
}

struct SmoSolution {
    alpha: Vec<f64>,
    rho: f64,
    iterations: usize,
}

/// Solve the C-SVC dual for labels `y` in {-1, +1} and a precomputed
/// row-major kernel matrix
fn smo(kernel: &[f64], y: &[f64], cost: f64, tolerance: f64, max_iterations: usize) -> SmoSolution {
    let n = y.len();
    let k = |i: usize, j: usize| kernel[i * n + j];
    let mut alpha = vec![0.0; n];
    let mut grad = vec![-1.0; n];

    let mut iterations = 0;
    while iterations < max_iterations {
        let up = |t: usize, a: &[f64]| if y[t] > 0.0 { a[t] < cost } else { a[t] > 0.0 };
        let low = |t: usize, a: &[f64]| if y[t] > 0.0 { a[t] > 0.0 } else { a[t] < cost };

        let (mut gmax, mut gmin) = (f64::NEG_INFINITY, f64::INFINITY);
        let (mut i, mut j) = (usize::MAX, usize::MAX);
        for t in 0..n {
            let v = -y[t] * grad[t];
            if up(t, &alpha) && v >= gmax {
                gmax = v;
                i = t;
            }
            if low(t, &alpha) && v <= gmin {
                gmin = v;
                j = t;
            }
        }
        if i == usize::MAX || j == usize::MAX || gmax - gmin < tolerance {
            break;
        }
        iterations += 1;

        let (old_i, old_j) = (alpha[i], alpha[j]);
        let mut quad = k(i, i) + k(j, j) - 2.0 * k(i, j);
        if quad <= 0.0 {
            quad = TAU;
        }

        if y[i] != y[j] {
            let delta = (-grad[i] - grad[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;
            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > 0.0 {
                if alpha[i] > cost {
                    alpha[i] = cost;
                    alpha[j] = cost - diff;
                }
            } else if alpha[j] > cost {
                alpha[j] = cost;
                alpha[i] = cost + diff;
            }
        } else {
            let delta = (grad[i] - grad[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;
            if sum > cost {
                if alpha[i] > cost {
                    alpha[i] = cost;
                    alpha[j] = sum - cost;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > cost {
                if alpha[j] > cost {
                    alpha[j] = cost;
                    alpha[i] = sum - cost;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }

        let (di, dj) = (alpha[i] - old_i, alpha[j] - old_j);
        for t in 0..n {
            grad[t] += y[t] * (y[i] * k(t, i) * di + y[j] * k(t, j) * dj);
        }
    }

    if iterations >= max_iterations {
        warn!("SMO stopped at the iteration limit ({}) before convergence", max_iterations);
    }

    // Offset: mean of y*G over free vectors, else midpoint of the feasible range
    let (mut ub, mut lb) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut free, mut sum_free) = (0usize, 0.0);
    for t in 0..n {
        let yg = y[t] * grad[t];
        if alpha[t] >= cost {
            if y[t] < 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else if alpha[t] <= 0.0 {
            if y[t] > 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else {
            free += 1;
            sum_free += yg;
        }
    }
    let rho = if free > 0 {
        sum_free / free as f64
    } else {
        (ub + lb) / 2.0
    };

    SmoSolution {
        alpha,
        rho,
        iterations,
    }
}

/// Fitted RBF support vector classifier
#[derive(Debug, Clone)]
pub struct SvmModel {
    scaler: Standardizer,
    support: Vec<Vec<f64>>,
    /// alpha_i * y_i for each support vector
    coef: Vec<f64>,
    rho: f64,
    gamma: f64,
    cost: f64,
    platt: PlattScaling,
    iterations: usize,
}

impl SvmModel {
    /// Train without calibration (identity-like sigmoid on the margin)
    fn fit_uncalibrated(
        x: &Array2<f64>,
        y: &[bool],
        cost: f64,
        gamma: f64,
        params: &SvmParams,
    ) -> Result<Self> {
        let n = x.nrows();
        if n == 0 || y.len() != n {
            return Err(Error::training("svm", "empty training matrix"));
        }
        if !(cost > 0.0) || !(gamma > 0.0) {
            return Err(Error::InvalidParameter {
                name: "svm",
                value: format!("cost={}, gamma={}", cost, gamma),
                reason: "cost and gamma must be positive".into(),
            });
        }

        let scaler = Standardizer::fit(x);
        let rows: Vec<Vec<f64>> = x
            .rows()
            .into_iter()
            .map(|r| scaler.transform_row(&r.to_vec()))
            .collect();
        let labels: Vec<f64> = y.iter().map(|&l| if l { 1.0 } else { -1.0 }).collect();

        let mut kernel = vec![0.0; n * n];
        for i in 0..n {
            for j in i..n {
                let v = rbf(&rows[i], &rows[j], gamma);
                kernel[i * n + j] = v;
                kernel[j * n + i] = v;
            }
        }

        let sol = smo(&kernel, &labels, cost, params.tolerance, params.max_iterations);
        let (mut support, mut coef) = (Vec::new(), Vec::new());
        for (i, row) in rows.into_iter().enumerate() {
            if sol.alpha[i] > 0.0 {
                support.push(row);
                coef.push(sol.alpha[i] * labels[i]);
            }
        }
        debug!(
            "SVM C={} gamma={:.4}: {} support vectors after {} iterations",
            cost,
            gamma,
            support.len(),
            sol.iterations
        );

        Ok(Self {
            scaler,
            support,
            coef,
            rho: sol.rho,
            gamma,
            cost,
            platt: PlattScaling { a: -1.0, b: 0.0 },
            iterations: sol.iterations,
        })
    }

    /// Train and calibrate.
    ///
    /// Calibration decision values come from `params.calibration_folds`-fold
    /// cross-validation on the training rows; with fewer than two folds (or
    /// too few rows per class) the in-sample decision values are used.
    pub fn fit(
        x: &Array2<f64>,
        y: &[bool],
        cost: f64,
        gamma: f64,
        params: &SvmParams,
    ) -> Result<Self> {
        let mut model = Self::fit_uncalibrated(x, y, cost, gamma, params)?;

        let k = params.calibration_folds;
        let minority = y.iter().filter(|&&l| l).count().min(y.iter().filter(|&&l| !l).count());
        let decision: Vec<f64> = if k >= 2 && minority >= k {
            let folds = stratified_folds(y, k, params.seed)?;
            let mut decision = vec![0.0; y.len()];
            for (f, test) in folds.iter().enumerate() {
                let train: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|&(g, _)| g != f)
                    .flat_map(|(_, fold)| fold.iter().copied())
                    .collect();
                let (xt, yt) = subset(x, y, &train);
                let inner = Self::fit_uncalibrated(&xt, &yt, cost, gamma, params)?;
                for &i in test {
                    decision[i] = inner.decision(&x.row(i).to_vec());
                }
            }
            decision
        } else {
            x.rows().into_iter().map(|r| model.decision(&r.to_vec())).collect()
        };

        model.platt = PlattScaling::fit(&decision, y);
        Ok(model)
    }

    /// Signed distance-like margin; positive values favour presence
    pub fn decision(&self, row: &[f64]) -> f64 {
        let z = self.scaler.transform_row(row);
        self.support
            .iter()
            .zip(&self.coef)
            .map(|(sv, c)| c * rbf(sv, &z, self.gamma))
            .sum::<f64>()
            - self.rho
    }

    /// Calibrated presence probability
    pub fn score_row(&self, row: &[f64]) -> f64 {
        self.platt.probability(self.decision(row))
    }

    pub fn n_support(&self) -> usize {
        self.support.len()
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn platt(&self) -> PlattScaling {
        self.platt
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

/// Fit an SVM, choosing (cost, gamma) by cross-validated AUC when tuning is on
pub(crate) fn fit_tuned(
    x: &Array2<f64>,
    y: &[bool],
    params: &SvmParams,
    folds: Option<&[Vec<usize>]>,
) -> Result<(SvmModel, Option<TuningReport>)> {
    let default_gamma = params.gamma.unwrap_or(1.0 / x.ncols().max(1) as f64);
    let gammas = if params.gamma_grid.is_empty() {
        vec![default_gamma]
    } else {
        params.gamma_grid.clone()
    };
    let grid: Vec<(f64, f64)> = params
        .cost_grid
        .iter()
        .flat_map(|&c| gammas.iter().map(move |&g| (c, g)))
        .collect();

    let ((cost, gamma), report) = match folds {
        Some(folds) if params.tune && grid.len() > 1 => {
            let report = tune(
                &grid,
                |(c, g)| format!("cost={}, gamma={:.4}", c, g),
                folds,
                |&(c, g), train, test| {
                    holdout_auc(
                        x,
                        y,
                        train,
                        test,
                        |xt, yt| SvmModel::fit_uncalibrated(xt, yt, c, g, params),
                        |model, row| model.decision(row),
                    )
                },
            )?;
            (grid[report.selected], Some(report))
        }
        _ => ((params.cost, default_gamma), None),
    };

    Ok((SvmModel::fit(x, y, cost, gamma, params)?, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Presence inside a disc of radius 1 around the origin
    fn make_data() -> (Array2<f64>, Vec<bool>) {
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..12 {
            for j in 0..12 {
                let (a, b) = (-2.0 + i as f64 * 4.0 / 11.0, -2.0 + j as f64 * 4.0 / 11.0);
                rows.extend_from_slice(&[a, b]);
                y.push(a * a + b * b < 1.0);
            }
        }
        (Array2::from_shape_vec((144, 2), rows).unwrap(), y)
    }

    #[test]
    fn test_rbf_separates_disc() {
        let (x, y) = make_data();
        let params = SvmParams {
            calibration_folds: 0,
            ..SvmParams::default()
        };
        let model = SvmModel::fit(&x, &y, 4.0, 1.0, &params).unwrap();
        assert!(model.n_support() > 0);
        assert!(model.decision(&[0.0, 0.0]) > 0.0);
        assert!(model.decision(&[2.0, 2.0]) < 0.0);

        let p_in = model.score_row(&[0.0, 0.0]);
        let p_out = model.score_row(&[2.0, 2.0]);
        assert!((0.0..=1.0).contains(&p_in) && (0.0..=1.0).contains(&p_out));
        assert!(p_in > 0.5 && p_out < 0.5);
    }

    #[test]
    fn test_platt_is_monotone_and_bounded() {
        let decision = [-2.0, -1.5, -1.0, -0.2, 0.1, 0.4, 1.2, 2.5];
        let labels = [false, false, false, true, false, true, true, true];
        let platt = PlattScaling::fit(&decision, &labels);
        assert!(platt.a < 0.0);
        let mut prev = 0.0;
        for f in [-3.0, -1.0, 0.0, 1.0, 3.0] {
            let p = platt.probability(f);
            assert!(p > prev && p < 1.0);
            prev = p;
        }
    }

    #[test]
    fn test_calibrated_fit_and_tuning() {
        let (x, y) = make_data();
        let folds = stratified_folds(&y, 3, 1).unwrap();
        let params = SvmParams {
            cost_grid: vec![0.5, 4.0],
            ..SvmParams::default()
        };
        let (model, report) = fit_tuned(&x, &y, &params, Some(&folds)).unwrap();
        let report = report.unwrap();
        assert_eq!(report.candidates.len(), 2);
        assert_eq!(model.cost(), [0.5, 4.0][report.selected]);
        assert_eq!(model.gamma(), 0.5);
        assert!(model.score_row(&[0.0, 0.0]) > model.score_row(&[2.0, -2.0]));
    }

    #[test]
    fn test_invalid_cost() {
        let (x, y) = make_data();
        assert!(SvmModel::fit(&x, &y, 0.0, 1.0, &SvmParams::default()).is_err());
    }
}
