//! Small dense linear algebra helpers

use habitat_core::{Error, Result};
use ndarray::Array2;

const PIVOT_EPSILON: f64 = 1e-12;

/// Invert a square matrix by Gauss-Jordan elimination with partial pivoting.
///
/// Returns `Error::Algorithm` when the matrix is singular (a pivot smaller
/// than 1e-12 in absolute value).
pub fn invert(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    let (n, m) = matrix.dim();
    if n != m {
        return Err(Error::SizeMismatch {
            er: n,
            ec: n,
            ar: n,
            ac: m,
        });
    }

    let mut a = matrix.clone();
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        // Find pivot (max absolute value in column)
        let mut max_val = a[[col, col]].abs();
        let mut max_row = col;
        for row in (col + 1)..n {
            let val = a[[row, col]].abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if !(max_val >= PIVOT_EPSILON) {
            return Err(Error::Algorithm("singular matrix".into()));
        }

        if max_row != col {
            for j in 0..n {
                a.swap([col, j], [max_row, j]);
                inv.swap([col, j], [max_row, j]);
            }
        }

        let pivot = a[[col, col]];
        for j in 0..n {
            a[[col, j]] /= pivot;
            inv[[col, j]] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for j in 0..n {
                a[[row, j]] -= factor * a[[col, j]];
                inv[[row, j]] -= factor * inv[[col, j]];
            }
        }
    }

    Ok(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_invert_needs_pivoting() {
        let m = array![[0.0, 2.0, 1.0], [1.0, 1.0, 0.0], [2.0, 0.0, 3.0]];
        let inv = invert(&m).unwrap();
        let prod = m.dot(&inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(prod[[i, j]], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_non_square_reports_shapes() {
        let m = Array2::<f64>::zeros((2, 3));
        match invert(&m) {
            Err(Error::SizeMismatch { er, ec, ar, ac }) => {
                assert_eq!((er, ec), (2, 2));
                assert_eq!((ar, ac), (2, 3));
            }
            other => panic!("expected size mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_singular_matrix() {
        let m = array![[1.0, 1.0], [1.0, 1.0]];
        assert!(invert(&m).is_err());
    }
}
