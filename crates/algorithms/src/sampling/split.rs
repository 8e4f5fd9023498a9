//! Stratified train/test partitioning

use super::table::{FeatureTable, Label};
use habitat_core::{Error, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Parameters for the train/test split
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    /// Fraction of each class assigned to training
    pub train_fraction: f64,
    /// Random seed for the per-class shuffle
    pub seed: u64,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            train_fraction: 0.7,
            seed: 1,
        }
    }
}

/// Disjoint row index sets covering the whole table, both sorted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl TrainTestSplit {
    /// Materialize the (train, test) tables
    pub fn apply(&self, table: &FeatureTable) -> Result<(FeatureTable, FeatureTable)> {
        Ok((table.subset(&self.train)?, table.subset(&self.test)?))
    }
}

/// Split a table by label so both partitions keep the class ratio.
///
/// Within each class the row indices are shuffled and the first
/// `round(n * train_fraction)` go to training.
pub fn train_test_split(table: &FeatureTable, params: &SplitParams) -> Result<TrainTestSplit> {
    if !(params.train_fraction > 0.0 && params.train_fraction < 1.0) {
        return Err(Error::InvalidParameter {
            name: "train_fraction",
            value: params.train_fraction.to_string(),
            reason: "must lie strictly between 0 and 1".into(),
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut train = Vec::with_capacity(table.len());
    let mut test = Vec::with_capacity(table.len());

    for class in [Label::Presence, Label::Absence] {
        let mut idx: Vec<usize> = table
            .records()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.label == class)
            .map(|(i, _)| i)
            .collect();
        idx.shuffle(&mut rng);
        let n_train = (idx.len() as f64 * params.train_fraction).round() as usize;
        train.extend_from_slice(&idx[..n_train]);
        test.extend_from_slice(&idx[n_train..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Ok(TrainTestSplit { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::SampleRecord;

    fn table(presences: usize, absences: usize) -> FeatureTable {
        let records = (0..presences + absences)
            .map(|i| SampleRecord {
                label: if i < presences { Label::Presence } else { Label::Absence },
                x: i as f64,
                y: 0.0,
                values: vec![i as f64],
            })
            .collect();
        FeatureTable::new(vec!["v".into()], records).unwrap()
    }

    #[test]
    fn test_stratified_proportions() {
        let t = table(188, 376);
        let split = train_test_split(&t, &SplitParams::default()).unwrap();

        // round(188 * 0.7) = 132, round(376 * 0.7) = 263
        assert_eq!(split.train.len(), 132 + 263);
        assert_eq!(split.test.len(), 564 - 395);

        let (train, test) = split.apply(&t).unwrap();
        assert_eq!(train.class_counts(), (132, 263));
        assert_eq!(test.class_counts(), (56, 113));
    }

    #[test]
    fn test_partitions_are_disjoint_and_cover() {
        let t = table(10, 25);
        let split = train_test_split(&t, &SplitParams::default()).unwrap();
        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..35).collect::<Vec<_>>());
        assert!(split.train.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_seeded_and_validated() {
        let t = table(20, 40);
        let a = train_test_split(&t, &SplitParams::default()).unwrap();
        let b = train_test_split(&t, &SplitParams::default()).unwrap();
        assert_eq!(a, b);

        let bad = SplitParams {
            train_fraction: 1.0,
            seed: 1,
        };
        assert!(train_test_split(&t, &bad).is_err());
    }
}
