//! Gradient boosted trees for binary classification
//!
//! Second-order (Newton) boosting under logistic loss in the XGBoost
//! formulation: each round fits a regression tree to the gradients and
//! hessians of the current margin, with L2-regularized leaf weights
//! `-G / (H + lambda)` and split gain
//! `0.5 * (GL²/(HL+λ) + GR²/(HR+λ) - G²/(H+λ)) - gamma`.

use super::tree::{midpoint, sorted_by_feature, DecisionTree, SplitCandidate, TreeNode};
use habitat_core::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Boosting parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    /// Number of boosting rounds
    pub rounds: usize,
    /// Shrinkage applied to each tree (eta)
    pub learning_rate: f64,
    pub max_depth: usize,
    /// L2 penalty on leaf weights
    pub lambda: f64,
    /// Minimum gain to keep a split
    pub gamma: f64,
    /// Minimum hessian sum in each child
    pub min_child_weight: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            rounds: 100,
            learning_rate: 0.3,
            max_depth: 6,
            lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
        }
    }
}

impl BoostingParams {
    fn validate(&self) -> Result<()> {
        let invalid = |name: &'static str, value: f64, reason: &str| Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        };
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(invalid("learning_rate", self.learning_rate, "must lie in (0, 1]"));
        }
        if !(self.lambda >= 0.0) {
            return Err(invalid("lambda", self.lambda, "must be >= 0"));
        }
        if !(self.gamma >= 0.0) {
            return Err(invalid("gamma", self.gamma, "must be >= 0"));
        }
        if !(self.min_child_weight >= 0.0) {
            return Err(invalid("min_child_weight", self.min_child_weight, "must be >= 0"));
        }
        Ok(())
    }
}

/// Fitted boosted ensemble
#[derive(Debug, Clone)]
pub struct BoostedTrees {
    trees: Vec<DecisionTree>,
    gain_importance: Vec<f64>,
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

struct RoundGrower<'a> {
    x: &'a Array2<f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a BoostingParams,
    nodes: Vec<TreeNode>,
    importance: &'a mut [f64],
}

impl RoundGrower<'_> {
    fn leaf_weight(&self, g: f64, h: f64) -> f64 {
        -g / (h + self.params.lambda) * self.params.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        g * g / (h + self.params.lambda)
    }

    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let g: f64 = indices.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = indices.iter().map(|&i| self.hess[i]).sum();

        let node = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            value: self.leaf_weight(g, h),
        });

        if depth >= self.params.max_depth || indices.len() < 2 {
            return node;
        }
        let Some(best) = self.best_split(&indices, g, h) else {
            return node;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[[i, best.feature]] <= best.threshold);

        self.importance[best.feature] += best.gain;
        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);
        self.nodes[node] = TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        node
    }

    /// Exact greedy search over every feature and threshold
    fn best_split(&self, indices: &[usize], g: f64, h: f64) -> Option<SplitCandidate> {
        let parent = self.score(g, h);
        let mut best: Option<SplitCandidate> = None;

        for feature in 0..self.x.ncols() {
            let (order, values) = sorted_by_feature(indices, feature, |i, f| self.x[[i, f]]);
            let (mut gl, mut hl) = (0.0, 0.0);
            for k in 0..order.len() - 1 {
                gl += self.grad[order[k]];
                hl += self.hess[order[k]];
                if values[k] == values[k + 1] {
                    continue;
                }
                let (gr, hr) = (g - gl, h - hl);
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }
                let gain =
                    0.5 * (self.score(gl, hl) + self.score(gr, hr) - parent) - self.params.gamma;
                if gain > 1e-12 && best.map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: midpoint(values[k], values[k + 1]),
                        gain,
                    });
                }
            }
        }
        best
    }
}

impl BoostedTrees {
    /// Boost from a zero base margin for `params.rounds` rounds
    pub fn fit(x: &Array2<f64>, y: &[bool], params: &BoostingParams) -> Result<Self> {
        params.validate()?;
        let (n, p) = x.dim();
        if n == 0 || p == 0 || y.len() != n {
            return Err(Error::training("gbt", format!("invalid training matrix {}x{}", n, p)));
        }

        let targets: Vec<f64> = y.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();
        let mut margin = vec![0.0; n];
        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];
        let mut gain_importance = vec![0.0; p];
        let mut trees = Vec::with_capacity(params.rounds);

        for _ in 0..params.rounds {
            for i in 0..n {
                let prob = sigmoid(margin[i]);
                grad[i] = prob - targets[i];
                hess[i] = (prob * (1.0 - prob)).max(1e-16);
            }

            let mut grower = RoundGrower {
                x,
                grad: &grad,
                hess: &hess,
                params,
                nodes: Vec::new(),
                importance: &mut gain_importance,
            };
            grower.grow((0..n).collect(), 0);
            let tree = DecisionTree::new(grower.nodes);

            for (i, m) in margin.iter_mut().enumerate() {
                *m += tree.predict(&x.row(i).to_vec());
            }
            trees.push(tree);
        }

        Ok(Self {
            trees,
            gain_importance,
        })
    }

    /// Summed margin of all trees
    pub fn margin(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict(row)).sum()
    }

    /// Presence probability: sigmoid of the margin
    pub fn score_row(&self, row: &[f64]) -> f64 {
        sigmoid(self.margin(row))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Total split gain per predictor
    pub fn gain_importance(&self) -> &[f64] {
        &self.gain_importance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_data() -> (Array2<f64>, Vec<bool>) {
        let n = 80;
        let x = Array2::from_shape_fn((n, 3), |(i, j)| match j {
            0 => (i % 20) as f64,
            1 => (i / 20) as f64,
            _ => ((i * 13) % 7) as f64,
        });
        // presence in the upper-right block of (x0, x1)
        let y = (0..n).map(|i| i % 20 >= 10 && i / 20 >= 2).collect();
        (x, y)
    }

    #[test]
    fn test_boosting_fits_interaction() {
        let (x, y) = make_data();
        let model = BoostedTrees::fit(&x, &y, &BoostingParams::default()).unwrap();
        assert_eq!(model.n_trees(), 100);
        for i in 0..x.nrows() {
            let s = model.score_row(&x.row(i).to_vec());
            assert_eq!(s > 0.5, y[i], "row {} score {}", i, s);
        }
        let imp = model.gain_importance();
        assert!(imp[0] > imp[2] && imp[1] > imp[2]);
    }

    #[test]
    fn test_single_round_leaf_weights() {
        // one feature, perfectly separable: margins after one round are
        // -eta * G / (H + lambda) with g = p - y = ±0.5, h = 0.25
        let x = Array2::from_shape_vec((4, 1), vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let y = [false, false, true, true];
        let params = BoostingParams {
            rounds: 1,
            min_child_weight: 0.0,
            ..BoostingParams::default()
        };
        let model = BoostedTrees::fit(&x, &y, &params).unwrap();
        let expected = 0.3 * 1.0 / (0.5 + 1.0);
        assert_relative_eq!(model.margin(&[3.0]), expected, epsilon = 1e-12);
        assert_relative_eq!(model.margin(&[0.0]), -expected, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_learning_rate() {
        let (x, y) = make_data();
        let params = BoostingParams {
            learning_rate: 0.0,
            ..BoostingParams::default()
        };
        assert!(BoostedTrees::fit(&x, &y, &params).is_err());
    }
}
