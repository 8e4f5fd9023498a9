//! Model evaluation on held-out data
//!
//! Full-resolution ROC curves, exact AUC, and a confusion matrix at a
//! fixed decision threshold with the usual derived statistics.

use crate::models::{ModelKind, TrainedModel};
use crate::sampling::FeatureTable;
use habitat_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// One point of a ROC curve.
///
/// `threshold` is the lowest score still predicted as presence
/// (`score >= threshold`) at this point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RocPoint {
    pub threshold: f64,
    pub fpr: f64,
    pub tpr: f64,
}

fn check_inputs(scores: &[f64], labels: &[bool], context: &str) -> Result<(usize, usize)> {
    if scores.len() != labels.len() {
        return Err(Error::evaluation(
            context,
            format!("{} scores for {} labels", scores.len(), labels.len()),
        ));
    }
    if scores.is_empty() {
        return Err(Error::evaluation(context, "test set is empty"));
    }
    if let Some(i) = scores.iter().position(|s| s.is_nan()) {
        return Err(Error::evaluation(context, format!("score of row {} is NaN", i)));
    }
    let positives = labels.iter().filter(|&&l| l).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(Error::evaluation(
            context,
            format!(
                "test set has a single class ({} presences, {} absences)",
                positives, negatives
            ),
        ));
    }
    Ok((positives, negatives))
}

/// ROC curve with one point per distinct score, from (0, 0) to (1, 1)
pub fn roc_curve(scores: &[f64], labels: &[bool]) -> Result<Vec<RocPoint>> {
    let (positives, negatives) = check_inputs(scores, labels, "roc")?;

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut points = Vec::with_capacity(scores.len() + 1);
    points.push(RocPoint {
        threshold: f64::INFINITY,
        fpr: 0.0,
        tpr: 0.0,
    });

    let (mut tp, mut fp) = (0usize, 0usize);
    let mut k = 0;
    while k < order.len() {
        let s = scores[order[k]];
        // consume every sample tied at this score
        while k < order.len() && scores[order[k]] == s {
            if labels[order[k]] {
                tp += 1;
            } else {
                fp += 1;
            }
            k += 1;
        }
        points.push(RocPoint {
            threshold: s,
            fpr: fp as f64 / negatives as f64,
            tpr: tp as f64 / positives as f64,
        });
    }
    Ok(points)
}

/// Exact area under the ROC curve by trapezoidal integration.
///
/// Equals the Mann-Whitney statistic with ties counted as one half.
pub fn auc(scores: &[f64], labels: &[bool]) -> Result<f64> {
    let roc = roc_curve(scores, labels)?;
    Ok(auc_from_roc(&roc))
}

fn auc_from_roc(roc: &[RocPoint]) -> f64 {
    roc.windows(2)
        .map(|w| (w[1].fpr - w[0].fpr) * (w[1].tpr + w[0].tpr) / 2.0)
        .sum()
}

/// Binary confusion matrix at a decision threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Presence predicted iff `score > threshold`
    pub threshold: f64,
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionMatrix {
    pub fn at_threshold(scores: &[f64], labels: &[bool], threshold: f64) -> Self {
        let mut cm = Self {
            threshold,
            true_positive: 0,
            false_positive: 0,
            true_negative: 0,
            false_negative: 0,
        };
        for (&s, &l) in scores.iter().zip(labels) {
            match (s > threshold, l) {
                (true, true) => cm.true_positive += 1,
                (true, false) => cm.false_positive += 1,
                (false, false) => cm.true_negative += 1,
                (false, true) => cm.false_negative += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    pub fn accuracy(&self) -> f64 {
        (self.true_positive + self.true_negative) as f64 / self.total() as f64
    }

    /// True positive rate
    pub fn sensitivity(&self) -> f64 {
        self.true_positive as f64 / (self.true_positive + self.false_negative) as f64
    }

    /// True negative rate
    pub fn specificity(&self) -> f64 {
        self.true_negative as f64 / (self.true_negative + self.false_positive) as f64
    }

    /// True skill statistic: sensitivity + specificity - 1
    pub fn tss(&self) -> f64 {
        self.sensitivity() + self.specificity() - 1.0
    }

    /// Cohen's kappa
    pub fn kappa(&self) -> f64 {
        let n = self.total() as f64;
        let (tp, fp, tn, fnn) = (
            self.true_positive as f64,
            self.false_positive as f64,
            self.true_negative as f64,
            self.false_negative as f64,
        );
        let observed = (tp + tn) / n;
        let expected = ((tp + fp) * (tp + fnn) + (fnn + tn) * (fp + tn)) / (n * n);
        if (1.0 - expected).abs() < f64::EPSILON {
            return 0.0;
        }
        (observed - expected) / (1.0 - expected)
    }
}

/// Evaluation of one model on a held-out table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub model: ModelKind,
    pub auc: f64,
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub sensitivity: f64,
    pub specificity: f64,
    pub kappa: f64,
    pub tss: f64,
    /// Score threshold maximizing TSS along the ROC curve
    pub optimal_threshold: f64,
    pub roc: Vec<RocPoint>,
    pub test_rows: usize,
}

/// Score the test table and compute discrimination statistics.
///
/// Fails with `Evaluation` when the table is empty or holds a single class,
/// and with `PredictorMismatch` when it lacks a model predictor.
pub fn evaluate(
    model: &TrainedModel,
    test: &FeatureTable,
    threshold: f64,
) -> Result<EvaluationResult> {
    let name = model.kind().slug();
    let labels = test.presence_mask();
    if test.is_empty() {
        return Err(Error::evaluation(name, "test set is empty"));
    }
    let scores = model.score_table(test)?;
    check_inputs(&scores, &labels, name)?;

    let roc = roc_curve(&scores, &labels)?;
    let auc = auc_from_roc(&roc);
    let confusion = ConfusionMatrix::at_threshold(&scores, &labels, threshold);

    let mut optimal_threshold = threshold;
    let mut best = f64::NEG_INFINITY;
    for p in roc.iter().filter(|p| p.threshold.is_finite()) {
        let tss = p.tpr - p.fpr;
        if tss > best {
            best = tss;
            optimal_threshold = p.threshold;
        }
    }

    Ok(EvaluationResult {
        model: model.kind(),
        auc,
        accuracy: confusion.accuracy(),
        sensitivity: confusion.sensitivity(),
        specificity: confusion.specificity(),
        kappa: confusion.kappa(),
        tss: confusion.tss(),
        confusion,
        optimal_threshold,
        roc,
        test_rows: test.len(),
    })
}
