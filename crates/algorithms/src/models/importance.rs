//! Permutation importance

use crate::evaluation;
use crate::maybe_rayon::*;
use habitat_core::Result;
use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Drop in AUC when each column is shuffled in turn.
///
/// Column `j` is permuted once with a generator seeded `seed + j`;
/// columns are processed in parallel. Negative drops are kept as-is.
pub(crate) fn permutation_importance<F>(
    x: &Array2<f64>,
    y: &[bool],
    seed: u64,
    score: F,
) -> Result<Vec<f64>>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let rows: Vec<Vec<f64>> = x.rows().into_iter().map(|r| r.to_vec()).collect();
    let baseline: Vec<f64> = rows.iter().map(|r| score(r)).collect();
    let base_auc = evaluation::auc(&baseline, y)?;

    (0..x.ncols())
        .into_par_iter()
        .map(|j| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(j as u64));
            let mut column: Vec<f64> = rows.iter().map(|r| r[j]).collect();
            column.shuffle(&mut rng);

            let scores: Vec<f64> = rows
                .iter()
                .zip(&column)
                .map(|(r, &v)| {
                    let mut row = r.clone();
                    row[j] = v;
                    score(&row)
                })
                .collect();
            Ok(base_auc - evaluation::auc(&scores, y)?)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_informative_column_matters() {
        let n = 40;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                (i % 3) as f64
            }
        });
        let y: Vec<bool> = (0..n).map(|i| i >= 20).collect();
        // score depends on column 0 only
        let imp = permutation_importance(&x, &y, 1, |row| row[0] / n as f64).unwrap();
        assert!(imp[0] > 0.2);
        assert_eq!(imp[1], 0.0);

        let again = permutation_importance(&x, &y, 1, |row| row[0] / n as f64).unwrap();
        assert_eq!(imp, again);
    }
}
