//! Binary decision tree shared by the forest and boosting models

/// Tree node stored in a flat arena
#[derive(Debug, Clone)]
pub(crate) enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Decision tree; samples with `x[feature] <= threshold` go left
#[derive(Debug, Clone)]
pub(crate) struct DecisionTree {
    nodes: Vec<TreeNode>,
}

impl DecisionTree {
    pub(crate) fn new(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    pub(crate) fn predict(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// Best threshold on one feature found by a sorted sweep
#[derive(Debug, Clone, Copy)]
pub(crate) struct SplitCandidate {
    pub feature: usize,
    pub threshold: f64,
    pub gain: f64,
}

/// Sort `indices` by the value of `feature` and return the sorted values.
///
/// Candidate thresholds are midpoints between consecutive distinct values.
pub(crate) fn sorted_by_feature(
    indices: &[usize],
    feature: usize,
    value: impl Fn(usize, usize) -> f64,
) -> (Vec<usize>, Vec<f64>) {
    let mut order = indices.to_vec();
    order.sort_by(|&a, &b| value(a, feature).total_cmp(&value(b, feature)));
    let values = order.iter().map(|&i| value(i, feature)).collect();
    (order, values)
}

/// Midpoint threshold between two consecutive sorted values
pub(crate) fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    // guard against rounding up to `hi` for adjacent floats
    if mid >= hi {
        lo
    } else {
        mid
    }
}
