//! Random forest classifier
//!
//! Breiman's algorithm: each tree is a CART grown on a bootstrap sample,
//! choosing the best Gini split among `mtry` randomly drawn predictors at
//! every node. Trees are grown to purity by default. Every tree has its
//! own seed (`seed + tree index`) so parallel and sequential growth give
//! identical forests.

use super::cross_validation::{holdout_auc, tune, TuningReport};
use super::tree::{midpoint, sorted_by_feature, DecisionTree, SplitCandidate, TreeNode};
use crate::maybe_rayon::*;
use habitat_core::{Error, Result};
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Random forest parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    /// Number of trees
    pub trees: usize,
    /// Predictors tried at each split
    pub mtry: usize,
    /// Values of `mtry` compared by cross-validation when tuning
    pub mtry_grid: Vec<usize>,
    pub tune: bool,
    /// Nodes with at most this many samples become leaves
    pub min_node_size: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            trees: 500,
            mtry: 4,
            mtry_grid: vec![2, 4, 6],
            tune: true,
            min_node_size: 1,
            max_depth: None,
            seed: 1,
        }
    }
}

/// Fitted random forest
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    mtry: usize,
    gini_importance: Vec<f64>,
    oob_error: Option<f64>,
}

struct GrownTree {
    tree: DecisionTree,
    in_bag: Vec<bool>,
    importance: Vec<f64>,
}

struct TreeGrower<'a> {
    x: &'a Array2<f64>,
    y: &'a [bool],
    mtry: usize,
    min_node_size: usize,
    max_depth: usize,
    rng: ChaCha8Rng,
    nodes: Vec<TreeNode>,
    importance: Vec<f64>,
}

fn gini(positives: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = positives as f64 / n as f64;
    2.0 * p * (1.0 - p)
}

impl TreeGrower<'_> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let n = indices.len();
        let positives = indices.iter().filter(|&&i| self.y[i]).count();

        let node = self.nodes.len();
        self.nodes.push(TreeNode::Leaf {
            value: positives as f64 / n as f64,
        });

        if positives == 0 || positives == n || n <= self.min_node_size || depth >= self.max_depth {
            return node;
        }

        let Some(best) = self.best_split(&indices, positives) else {
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

    /// Largest decrease of size-weighted Gini impurity over `mtry` random features
    fn best_split(&mut self, indices: &[usize], positives: usize) -> Option<SplitCandidate> {
        let n = indices.len();
        let parent = n as f64 * gini(positives, n);
        let features = rand::seq::index::sample(&mut self.rng, self.x.ncols(), self.mtry);

        let mut best: Option<SplitCandidate> = None;
        for feature in features.iter() {
            let (order, values) = sorted_by_feature(indices, feature, |i, f| self.x[[i, f]]);
            let mut left_pos = 0;
            for k in 0..n - 1 {
                if self.y[order[k]] {
                    left_pos += 1;
                }
                if values[k] == values[k + 1] {
                    continue;
                }
                let n_left = k + 1;
                let n_right = n - n_left;
                let child = n_left as f64 * gini(left_pos, n_left)
                    + n_right as f64 * gini(positives - left_pos, n_right);
                let gain = parent - child;
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

fn grow_tree(
    x: &Array2<f64>,
    y: &[bool],
    params: &ForestParams,
    mtry: usize,
    seed: u64,
) -> GrownTree {
    let n = x.nrows();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut in_bag = vec![false; n];
    let sample: Vec<usize> = (0..n)
        .map(|_| {
            let i = rng.gen_range(0..n);
            in_bag[i] = true;
            i
        })
        .collect();

    let mut grower = TreeGrower {
        x,
        y,
        mtry,
        min_node_size: params.min_node_size.max(1),
        max_depth: params.max_depth.unwrap_or(usize::MAX),
        rng,
        nodes: Vec::new(),
        importance: vec![0.0; x.ncols()],
    };
    grower.grow(sample, 0);

    GrownTree {
        tree: DecisionTree::new(grower.nodes),
        in_bag,
        importance: grower.importance,
    }
}

impl RandomForest {
    /// Grow a forest with a fixed `mtry` (clamped to the predictor count)
    pub fn fit(x: &Array2<f64>, y: &[bool], params: &ForestParams, mtry: usize) -> Result<Self> {
        let (n, p) = x.dim();
        if n == 0 || p == 0 || y.len() != n {
            return Err(Error::training("rf", format!("invalid training matrix {}x{}", n, p)));
        }
        if params.trees == 0 {
            return Err(Error::InvalidParameter {
                name: "trees",
                value: "0".into(),
                reason: "a forest needs at least one tree".into(),
            });
        }
        let mtry = mtry.clamp(1, p);

        let grown: Vec<GrownTree> = (0..params.trees)
            .into_par_iter()
            .map(|t| grow_tree(x, y, params, mtry, params.seed.wrapping_add(t as u64)))
            .collect();

        let mut gini_importance = vec![0.0; p];
        let mut oob_sum = vec![0.0; n];
        let mut oob_count = vec![0usize; n];
        for g in &grown {
            for (acc, v) in gini_importance.iter_mut().zip(&g.importance) {
                *acc += v / params.trees as f64;
            }
            for i in (0..n).filter(|&i| !g.in_bag[i]) {
                oob_sum[i] += g.tree.predict(&x.row(i).to_vec());
                oob_count[i] += 1;
            }
        }

        let (mut errors, mut counted) = (0usize, 0usize);
        for i in (0..n).filter(|&i| oob_count[i] > 0) {
            counted += 1;
            if (oob_sum[i] / oob_count[i] as f64 > 0.5) != y[i] {
                errors += 1;
            }
        }
        let oob_error = (counted > 0).then(|| errors as f64 / counted as f64);

        Ok(Self {
            trees: grown.into_iter().map(|g| g.tree).collect(),
            mtry,
            gini_importance,
            oob_error,
        })
    }

    /// Mean presence fraction of the leaves reached in each tree
    pub fn score_row(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn mtry(&self) -> usize {
        self.mtry
    }

    /// Mean decrease in Gini impurity per predictor, averaged over trees
    pub fn gini_importance(&self) -> &[f64] {
        &self.gini_importance
    }

    /// Out-of-bag misclassification rate at 0.5
    pub fn oob_error(&self) -> Option<f64> {
        self.oob_error
    }
}

/// Fit a forest, choosing `mtry` by cross-validation when tuning is on
pub(crate) fn fit_tuned(
    x: &Array2<f64>,
    y: &[bool],
    params: &ForestParams,
    folds: Option<&[Vec<usize>]>,
) -> Result<(RandomForest, Option<TuningReport>)> {
    let p = x.ncols();
    // candidates are tried in ascending order, each once
    let mut grid: Vec<usize> = params.mtry_grid.iter().map(|&m| m.clamp(1, p)).collect();
    grid.sort_unstable();
    grid.dedup();

    let (mtry, report) = match folds {
        Some(folds) if params.tune && grid.len() > 1 => {
            let report = tune(
                &grid,
                |m| format!("mtry={}", m),
                folds,
                |&m, train, test| {
                    holdout_auc(
                        x,
                        y,
                        train,
                        test,
                        |xt, yt| RandomForest::fit(xt, yt, params, m),
                        |model, row| model.score_row(row),
                    )
                },
            )?;
            (grid[report.selected], Some(report))
        }
        _ => (params.mtry, None),
    };

    Ok((RandomForest::fit(x, y, params, mtry)?, report))
}
