//! Stratified k-fold cross-validation for hyperparameter selection

use crate::evaluation;
use crate::maybe_rayon::*;
use habitat_core::{Error, Result};
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Split row indices into `k` folds keeping the class ratio in each fold.
///
/// Each class is shuffled and dealt round-robin, continuing the rotation
/// across classes so fold sizes differ by at most one. Folds are sorted.
pub fn stratified_folds(labels: &[bool], k: usize, seed: u64) -> Result<Vec<Vec<usize>>> {
    if k < 2 || k > labels.len() {
        return Err(Error::InvalidParameter {
            name: "folds",
            value: k.to_string(),
            reason: format!("need 2 <= k <= {} rows", labels.len()),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut folds = vec![Vec::new(); k];
    let mut next = 0;
    for class in [true, false] {
        let mut idx: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        idx.shuffle(&mut rng);
        for i in idx {
            folds[next % k].push(i);
            next += 1;
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    Ok(folds)
}

/// Cross-validated score of one candidate setting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    /// Human-readable setting, e.g. `mtry=4`
    pub candidate: String,
    /// Mean AUC over folds with both classes in the held-out part
    pub mean_auc: f64,
    pub fold_aucs: Vec<f64>,
}

/// Result of a tuning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningReport {
    pub folds: usize,
    pub candidates: Vec<CandidateScore>,
    /// Index of the chosen candidate
    pub selected: usize,
}

impl TuningReport {
    pub fn best(&self) -> &CandidateScore {
        &self.candidates[self.selected]
    }
}

/// Pick the candidate with the highest mean fold AUC (ties go to the
/// earlier candidate).
///
/// `fit_and_score` trains on the first index set and returns the AUC on
/// the second. Folds are scored in parallel; folds whose held-out part
/// holds a single class are skipped.
pub fn tune<C, L, F>(
    candidates: &[C],
    describe: L,
    folds: &[Vec<usize>],
    fit_and_score: F,
) -> Result<TuningReport>
where
    C: Sync,
    L: Fn(&C) -> String,
    F: Fn(&C, &[usize], &[usize]) -> Result<f64> + Sync,
{
    if candidates.is_empty() {
        return Err(Error::InvalidParameter {
            name: "candidates",
            value: "0".into(),
            reason: "tuning needs at least one candidate".into(),
        });
    }

    let mut scores = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let outcomes: Vec<Result<f64>> = (0..folds.len())
            .into_par_iter()
            .map(|f| {
                let mut train: Vec<usize> = folds
                    .iter()
                    .enumerate()
                    .filter(|&(g, _)| g != f)
                    .flat_map(|(_, fold)| fold.iter().copied())
                    .collect();
                train.sort_unstable();
                fit_and_score(candidate, &train, &folds[f])
            })
            .collect();

        let mut fold_aucs = Vec::with_capacity(folds.len());
        for outcome in outcomes {
            match outcome {
                Ok(auc) => fold_aucs.push(auc),
                Err(Error::Evaluation { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        let mean_auc = if fold_aucs.is_empty() {
            f64::NAN
        } else {
            fold_aucs.iter().sum::<f64>() / fold_aucs.len() as f64
        };
        let name = describe(candidate);
        debug!("CV {}: mean AUC {:.4} over {} folds", name, mean_auc, fold_aucs.len());
        scores.push(CandidateScore {
            candidate: name,
            mean_auc,
            fold_aucs,
        });
    }

    let mut selected = 0;
    for (i, s) in scores.iter().enumerate() {
        let current = scores[selected].mean_auc;
        if s.mean_auc > current || (current.is_nan() && !s.mean_auc.is_nan()) {
            selected = i;
        }
    }

    Ok(TuningReport {
        folds: folds.len(),
        candidates: scores,
        selected,
    })
}

/// Rows of `x` and `y` at `indices`
pub(crate) fn subset(x: &Array2<f64>, y: &[bool], indices: &[usize]) -> (Array2<f64>, Vec<bool>) {
    (x.select(Axis(0), indices), indices.iter().map(|&i| y[i]).collect())
}

/// Fit on `train`, score `test` rows and return the held-out AUC
pub(crate) fn holdout_auc<M, Fit, Score>(
    x: &Array2<f64>,
    y: &[bool],
    train: &[usize],
    test: &[usize],
    fit: Fit,
    score: Score,
) -> Result<f64>
where
    Fit: FnOnce(&Array2<f64>, &[bool]) -> Result<M>,
    Score: Fn(&M, &[f64]) -> f64,
{
    let (x_train, y_train) = subset(x, y, train);
    let model = fit(&x_train, &y_train)?;
    let (x_test, y_test) = subset(x, y, test);
    let scores: Vec<f64> = x_test
        .rows()
        .into_iter()
        .map(|row| score(&model, &row.to_vec()))
        .collect();
    evaluation::auc(&scores, &y_test)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folds_are_stratified_partition() {
        let labels: Vec<bool> = (0..30).map(|i| i < 10).collect();
        let folds = stratified_folds(&labels, 5, 1).unwrap();
        assert_eq!(folds.len(), 5);

        let mut all: Vec<usize> = folds.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..30).collect::<Vec<_>>());

        for fold in &folds {
            assert_eq!(fold.len(), 6);
            let presences = fold.iter().filter(|&&i| labels[i]).count();
            assert_eq!(presences, 2);
        }
        assert_eq!(folds, stratified_folds(&labels, 5, 1).unwrap());
    }

    #[test]
    fn test_invalid_fold_count() {
        let labels = [true, false, true];
        assert!(stratified_folds(&labels, 1, 1).is_err());
        assert!(stratified_folds(&labels, 4, 1).is_err());
    }

    #[test]
    fn test_tune_selects_best_and_breaks_ties_early() {
        let folds = vec![vec![0, 1], vec![2, 3]];
        let candidates = [1.0, 3.0, 3.0, 2.0];
        let report = tune(
            &candidates,
            |c| format!("c={}", c),
            &folds,
            |&c, train, test| {
                assert_eq!(train.len() + test.len(), 4);
                Ok(c / 4.0)
            },
        )
        .unwrap();
        assert_eq!(report.selected, 1);
        assert_eq!(report.best().candidate, "c=3");
        assert_eq!(report.candidates[0].fold_aucs.len(), 2);
    }

    #[test]
    fn test_tune_skips_single_class_folds() {
        let folds = vec![vec![0], vec![1], vec![2]];
        let report = tune(
            &[0u8],
            |_| "only".into(),
            &folds,
            |_, _, test| {
                if test[0] == 1 {
                    Err(Error::evaluation("cv", "single class"))
                } else {
                    Ok(0.8)
                }
            },
        )
        .unwrap();
        assert_eq!(report.candidates[0].fold_aucs, vec![0.8, 0.8]);
    }
}
