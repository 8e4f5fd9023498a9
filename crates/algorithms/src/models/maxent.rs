//! Maximum entropy model in its presence/background logistic form
//!
//! Predictors are min-max scaled to [0, 1] over the training rows and
//! expanded into linear, quadratic, product and hinge features. The
//! coefficients minimise the weighted logistic loss of presences against a
//! background (every training row, presences included, weighted
//! `background_weight`) plus a per-feature L1 penalty, solved with FISTA.
//! The raw exponential output `exp(link + alpha)` is normalised over the
//! background and reported through the cloglog or logistic transform.

use habitat_core::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Enabled feature classes; written `l`, `q`, `p`, `h` in short form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureClasses {
    pub linear: bool,
    pub quadratic: bool,
    pub product: bool,
    pub hinge: bool,
}

impl Default for FeatureClasses {
    fn default() -> Self {
        Self {
            linear: true,
            quadratic: true,
            product: true,
            hinge: true,
        }
    }
}

impl FeatureClasses {
    /// Parse the short form, e.g. `"lqh"`
    pub fn from_code(code: &str) -> Result<Self> {
        let mut classes = Self {
            linear: false,
            quadratic: false,
            product: false,
            hinge: false,
        };
        for c in code.chars() {
            match c.to_ascii_lowercase() {
                'l' => classes.linear = true,
                'q' => classes.quadratic = true,
                'p' => classes.product = true,
                'h' => classes.hinge = true,
                _ => {
                    return Err(Error::InvalidParameter {
                        name: "features",
                        value: code.to_string(),
                        reason: format!("unknown feature class '{}'", c),
                    })
                }
            }
        }
        if classes.code().is_empty() {
            return Err(Error::InvalidParameter {
                name: "features",
                value: code.to_string(),
                reason: "no feature class enabled".into(),
            });
        }
        Ok(classes)
    }

    pub fn code(&self) -> String {
        [
            (self.linear, 'l'),
            (self.quadratic, 'q'),
            (self.product, 'p'),
            (self.hinge, 'h'),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, c)| *c)
        .collect()
    }
}

/// Output transform of the raw exponential model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxEntOutput {
    #[default]
    Cloglog,
    Logistic,
}

/// MaxEnt parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaxEntParams {
    pub features: FeatureClasses,
    /// Knots per predictor for hinge features
    pub hinge_knots: usize,
    /// Regularization multiplier
    pub regularization: f64,
    pub background_weight: f64,
    pub max_iterations: usize,
    /// Convergence threshold on the largest coefficient change
    pub tolerance: f64,
    pub output: MaxEntOutput,
}

impl Default for MaxEntParams {
    fn default() -> Self {
        Self {
            features: FeatureClasses::default(),
            hinge_knots: 10,
            regularization: 1.0,
            background_weight: 100.0,
            max_iterations: 2000,
            tolerance: 1e-6,
            output: MaxEntOutput::Cloglog,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FeatureKind {
    Linear(usize),
    Quadratic(usize),
    Product(usize, usize),
    /// clamp((x - knot) / (1 - knot), 0, 1)
    ForwardHinge(usize, f64),
    /// clamp(x / knot, 0, 1)
    ReverseHinge(usize, f64),
}

impl FeatureKind {
    /// Penalty multiplier of the feature class
    fn class_weight(&self) -> f64 {
        match self {
            FeatureKind::ForwardHinge(..) | FeatureKind::ReverseHinge(..) => 0.5,
            _ => 0.05,
        }
    }

    fn eval(&self, z: &[f64]) -> f64 {
        match *self {
            FeatureKind::Linear(j) => z[j],
            FeatureKind::Quadratic(j) => z[j] * z[j],
            FeatureKind::Product(j, k) => z[j] * z[k],
            FeatureKind::ForwardHinge(j, knot) => ((z[j] - knot) / (1.0 - knot)).clamp(0.0, 1.0),
            FeatureKind::ReverseHinge(j, knot) => (z[j] / knot).clamp(0.0, 1.0),
        }
    }
}

/// Scaling and feature expansion fixed at training time
#[derive(Debug, Clone)]
struct FeatureSpace {
    min: Vec<f64>,
    range: Vec<f64>,
    features: Vec<FeatureKind>,
}

impl FeatureSpace {
    fn new(x: &Array2<f64>, classes: FeatureClasses, knots: usize) -> Self {
        let p = x.ncols();
        let mut min = Vec::with_capacity(p);
        let mut range = Vec::with_capacity(p);
        for col in x.columns() {
            let lo = col.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            min.push(lo);
            range.push(if hi > lo { hi - lo } else { 1.0 });
        }

        let mut features = Vec::new();
        if classes.linear {
            features.extend((0..p).map(FeatureKind::Linear));
        }
        if classes.quadratic {
            features.extend((0..p).map(FeatureKind::Quadratic));
        }
        if classes.product {
            for j in 0..p {
                features.extend((j + 1..p).map(|k| FeatureKind::Product(j, k)));
            }
        }
        if classes.hinge && knots >= 2 {
            let step = 1.0 / (knots - 1) as f64;
            for j in 0..p {
                features.extend(
                    (0..knots - 1).map(|i| FeatureKind::ForwardHinge(j, i as f64 * step)),
                );
                features.extend((1..knots).map(|i| FeatureKind::ReverseHinge(j, i as f64 * step)));
            }
        }
        Self { min, range, features }
    }

    /// Expanded feature vector; scaled inputs are clamped to the training range
    fn expand(&self, row: &[f64]) -> Vec<f64> {
        let z: Vec<f64> = row
            .iter()
            .zip(self.min.iter().zip(&self.range))
            .map(|(v, (lo, r))| ((v - lo) / r).clamp(0.0, 1.0))
            .collect();
        self.features.iter().map(|f| f.eval(&z)).collect()
    }
}

/// Weighted, L1-penalised logistic problem on the expanded features
struct Problem {
    features: Vec<Vec<f64>>,
    target: Vec<f64>,
    weight: Vec<f64>,
    total_weight: f64,
    penalty: Vec<f64>,
}

impl Problem {
    fn dot(&self, i: usize, theta: &[f64]) -> f64 {
        theta[0] + self.features[i].iter().zip(&theta[1..]).map(|(f, b)| f * b).sum::<f64>()
    }

    /// Smooth part of the objective (mean weighted deviance / 2) and its gradient
    fn loss_and_grad(&self, theta: &[f64]) -> (f64, Vec<f64>) {
        let mut loss = 0.0;
        let mut grad = vec![0.0; theta.len()];
        for i in 0..self.features.len() {
            let eta = self.dot(i, theta);
            // log(1 + e^eta) without overflow
            let softplus = if eta > 0.0 {
                eta + (-eta).exp().ln_1p()
            } else {
                eta.exp().ln_1p()
            };
            loss += self.weight[i] * (softplus - self.target[i] * eta);
            let r = self.weight[i] * (sigmoid(eta) - self.target[i]);
            grad[0] += r;
            for (g, f) in grad[1..].iter_mut().zip(&self.features[i]) {
                *g += r * f;
            }
        }
        let w = self.total_weight;
        grad.iter_mut().for_each(|g| *g /= w);
        (loss / w, grad)
    }

    fn loss(&self, theta: &[f64]) -> f64 {
        self.loss_and_grad(theta).0
    }

    fn penalty(&self, theta: &[f64]) -> f64 {
        theta[1..].iter().zip(&self.penalty).map(|(b, l)| l * b.abs()).sum()
    }

    /// Soft-thresholding step; the intercept is unpenalised
    fn prox(&self, point: &[f64], step: f64) -> Vec<f64> {
        let mut out = point.to_vec();
        for (b, l) in out[1..].iter_mut().zip(&self.penalty) {
            let t = l * step;
            *b = b.signum() * (b.abs() - t).max(0.0);
        }
        out
    }

    /// Accelerated proximal gradient with backtracking and adaptive restart
    fn solve(&self, start: Vec<f64>, max_iterations: usize, tolerance: f64) -> (Vec<f64>, usize) {
        let mut theta = start;
        let mut z = theta.clone();
        let mut t = 1.0_f64;
        let mut lipschitz = 0.25;
        let mut objective = self.loss(&theta) + self.penalty(&theta);

        for iter in 0..max_iterations {
            let (fz, gz) = self.loss_and_grad(&z);
            let next = loop {
                let step: Vec<f64> = z.iter().zip(&gz).map(|(v, g)| v - g / lipschitz).collect();
                let candidate = self.prox(&step, 1.0 / lipschitz);
                let diff: Vec<f64> = candidate.iter().zip(&z).map(|(a, b)| a - b).collect();
                let lin: f64 = diff.iter().zip(&gz).map(|(d, g)| d * g).sum();
                let quad: f64 = diff.iter().map(|d| d * d).sum::<f64>() * lipschitz / 2.0;
                if self.loss(&candidate) <= fz + lin + quad + 1e-12 || lipschitz > 1e12 {
                    break candidate;
                }
                lipschitz *= 2.0;
            };

            let next_objective = self.loss(&next) + self.penalty(&next);
            let change = next
                .iter()
                .zip(&theta)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);

            if next_objective > objective {
                // momentum overshoot: restart from the last iterate
                t = 1.0;
                z = theta.clone();
                continue;
            }

            let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
            z = next
                .iter()
                .zip(&theta)
                .map(|(a, b)| a + (t - 1.0) / t_next * (a - b))
                .collect();
            theta = next;
            t = t_next;
            objective = next_objective;

            if change < tolerance {
                return (theta, iter + 1);
            }
        }
        warn!("MaxEnt solver stopped at the iteration limit ({})", max_iterations);
        (theta, max_iterations)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Fitted maximum entropy model
#[derive(Debug, Clone)]
pub struct MaxEntModel {
    space: FeatureSpace,
    /// Coefficients without the intercept, which only shifts the link
    beta: Vec<f64>,
    alpha: f64,
    entropy: f64,
    output: MaxEntOutput,
    iterations: usize,
}

impl MaxEntModel {
    pub fn fit(x: &Array2<f64>, y: &[bool], params: &MaxEntParams) -> Result<Self> {
        let (n, p) = x.dim();
        if n == 0 || p == 0 || y.len() != n {
            return Err(Error::training("maxent", format!("invalid training matrix {}x{}", n, p)));
        }
        if !(params.regularization >= 0.0) || !(params.background_weight > 0.0) {
            return Err(Error::InvalidParameter {
                name: "maxent",
                value: format!(
                    "regularization={}, background_weight={}",
                    params.regularization, params.background_weight
                ),
                reason: "regularization must be >= 0 and background weight > 0".into(),
            });
        }
        let presences = y.iter().filter(|&&l| l).count();
        if presences == 0 {
            return Err(Error::training("maxent", "no presence rows"));
        }

        let space = FeatureSpace::new(x, params.features, params.hinge_knots);
        let expanded: Vec<Vec<f64>> = x
            .rows()
            .into_iter()
            .map(|r| space.expand(&r.to_vec()))
            .collect();
        let d = space.features.len();

        // presences with weight 1, then every row as background
        let mut features = Vec::with_capacity(presences + n);
        let mut target = Vec::with_capacity(presences + n);
        let mut weight = Vec::with_capacity(presences + n);
        for f in expanded.iter().zip(y).filter(|(_, &l)| l).map(|(f, _)| f) {
            features.push(f.clone());
            target.push(1.0);
            weight.push(1.0);
        }
        for f in &expanded {
            features.push(f.clone());
            target.push(0.0);
            weight.push(params.background_weight);
        }
        let total_weight: f64 = weight.iter().sum();

        let m = presences as f64;
        let penalty: Vec<f64> = (0..d)
            .map(|j| {
                let vals: Vec<f64> = (0..n).filter(|&i| y[i]).map(|i| expanded[i][j]).collect();
                let mean = vals.iter().sum::<f64>() / m;
                let var = vals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (m - 1.0).max(1.0);
                let sd = var.sqrt().max(0.001);
                params.regularization * space.features[j].class_weight() * sd * m.sqrt()
                    / total_weight
            })
            .collect();

        let problem = Problem {
            features,
            target,
            weight,
            total_weight,
            penalty,
        };

        let mut start = vec![0.0; d + 1];
        let rate = m / total_weight;
        start[0] = (rate / (1.0 - rate)).ln();
        let (theta, iterations) = problem.solve(start, params.max_iterations, params.tolerance);
        let beta = theta[1..].to_vec();

        // normalise the exponential model over the background
        let links: Vec<f64> = expanded
            .iter()
            .map(|f| f.iter().zip(&beta).map(|(a, b)| a * b).sum())
            .collect();
        let max_link = links.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let log_sum = max_link + links.iter().map(|l| (l - max_link).exp()).sum::<f64>().ln();
        let alpha = -log_sum;
        let entropy = -links
            .iter()
            .map(|l| {
                let raw = (l + alpha).exp();
                raw * (l + alpha)
            })
            .sum::<f64>();

        let active = beta.iter().filter(|b| **b != 0.0).count();
        debug!(
            "MaxEnt ({}): {} of {} features active after {} iterations, entropy {:.4}",
            params.features.code(),
            active,
            d,
            iterations,
            entropy
        );

        Ok(Self {
            space,
            beta,
            alpha,
            entropy,
            output: params.output,
            iterations,
        })
    }

    /// Linear predictor without the intercept
    pub fn link(&self, row: &[f64]) -> f64 {
        self.space
            .expand(row)
            .iter()
            .zip(&self.beta)
            .map(|(f, b)| f * b)
            .sum()
    }

    /// Raw output: relative occurrence rate summing to one over the background
    pub fn raw(&self, row: &[f64]) -> f64 {
        (self.link(row) + self.alpha).exp()
    }

    pub fn score_row(&self, row: &[f64]) -> f64 {
        let eta = self.link(row) + self.alpha;
        match self.output {
            MaxEntOutput::Cloglog => 1.0 - (-(self.entropy + eta).exp()).exp(),
            MaxEntOutput::Logistic => 1.0 / (1.0 + (-self.entropy - eta).exp()),
        }
    }

    pub fn entropy(&self) -> f64 {
        self.entropy
    }

    pub fn n_features(&self) -> usize {
        self.beta.len()
    }

    /// Features with a non-zero coefficient
    pub fn n_active(&self) -> usize {
        self.beta.iter().filter(|b| **b != 0.0).count()
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Presences cluster at high x0; x1 is noise
    fn make_data() -> (Array2<f64>, Vec<bool>) {
        let n = 60;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                ((i * 7) % 5) as f64
            }
        });
        let y = (0..n).map(|i| i >= 45).collect();
        (x, y)
    }

    #[test]
    fn test_feature_code_parsing() {
        let c = FeatureClasses::from_code("LQh").unwrap();
        assert!(c.linear && c.quadratic && c.hinge && !c.product);
        assert_eq!(c.code(), "lqh");
        assert!(FeatureClasses::from_code("lx").is_err());
        assert!(FeatureClasses::from_code("").is_err());
    }

    #[test]
    fn test_feature_expansion_counts() {
        let (x, _) = make_data();
        let space = FeatureSpace::new(&x, FeatureClasses::default(), 10);
        // 2 linear + 2 quadratic + 1 product + 2 * 18 hinges
        assert_eq!(space.features.len(), 41);
        let f = space.expand(&[1e6, -1e6]);
        assert!(f.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_scores_follow_presence_cluster() {
        let (x, y) = make_data();
        let model = MaxEntModel::fit(&x, &y, &MaxEntParams::default()).unwrap();
        let high = model.score_row(&[55.0, 2.0]);
        let low = model.score_row(&[5.0, 2.0]);
        assert!(high > low, "high {} low {}", high, low);
        assert!((0.0..=1.0).contains(&high) && (0.0..=1.0).contains(&low));
        assert!(model.n_active() > 0);
    }

    #[test]
    fn test_raw_output_sums_to_one_over_background() {
        let (x, y) = make_data();
        let model = MaxEntModel::fit(&x, &y, &MaxEntParams::default()).unwrap();
        let total: f64 = x.rows().into_iter().map(|r| model.raw(&r.to_vec())).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_heavy_regularization_gives_flat_model() {
        let (x, y) = make_data();
        let params = MaxEntParams {
            regularization: 1e6,
            ..MaxEntParams::default()
        };
        let model = MaxEntModel::fit(&x, &y, &params).unwrap();
        assert_eq!(model.n_active(), 0);
        // uniform raw output: entropy = ln(n), cloglog = 1 - e^-1
        assert_relative_eq!(model.entropy(), (60.0f64).ln(), epsilon = 1e-9);
        assert_relative_eq!(model.score_row(&[0.0, 0.0]), 1.0 - (-1.0f64).exp(), epsilon = 1e-9);

        let logistic = MaxEntModel::fit(
            &x,
            &y,
            &MaxEntParams {
                output: MaxEntOutput::Logistic,
                ..params
            },
        )
        .unwrap();
        assert_relative_eq!(logistic.score_row(&[30.0, 1.0]), 0.5, epsilon = 1e-9);
    }
}
