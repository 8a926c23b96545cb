//! Real LU factorization with partial pivoting, used for the damped
//! normal-equation solves and covariance inversion in the fitting layer.

use crate::numerics::DenseMatrix;

const SINGULAR_PIVOT_EPSILON: f64 = 1.0e-15;
const ILL_CONDITIONED_RELATIVE_PIVOT_EPSILON: f64 = 1.0e-12;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinalgError {
    #[error("LU factorization requires a square matrix, got {rows}x{cols}")]
    NonSquareMatrix { rows: usize, cols: usize },
    #[error("LU factorization requires a non-empty matrix")]
    EmptyMatrix,
    #[error("matrix is singular at pivot index {pivot_index}")]
    SingularMatrix { pivot_index: usize },
    #[error("matrix is ill-conditioned at pivot index {pivot_index}")]
    IllConditionedMatrix { pivot_index: usize },
    #[error("right-hand side length mismatch: expected {expected}, got {actual}")]
    RhsLengthMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone)]
pub struct LuDecomposition {
    lu: DenseMatrix,
    pivots: Vec<usize>,
    input_norm_infty: f64,
}

impl LuDecomposition {
    pub fn dimension(&self) -> usize {
        self.lu.nrows()
    }

    pub fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>, LinalgError> {
        let dimension = self.dimension();
        if rhs.len() != dimension {
            return Err(LinalgError::RhsLengthMismatch {
                expected: dimension,
                actual: rhs.len(),
            });
        }

        let mut forward = vec![0.0; dimension];
        for row in 0..dimension {
            let mut value = rhs[self.pivots[row]];
            for col in 0..row {
                value -= self.lu[(row, col)] * forward[col];
            }
            forward[row] = value;
        }

        let mut solution = vec![0.0; dimension];
        for row in (0..dimension).rev() {
            let mut value = forward[row];
            for col in (row + 1)..dimension {
                value -= self.lu[(row, col)] * solution[col];
            }

            let diagonal = self.lu[(row, row)];
            if diagonal.abs() <= SINGULAR_PIVOT_EPSILON {
                return Err(LinalgError::SingularMatrix { pivot_index: row });
            }
            solution[row] = value / diagonal;
        }

        Ok(solution)
    }

    pub fn invert(&self) -> Result<DenseMatrix, LinalgError> {
        let dimension = self.dimension();
        for pivot_index in 0..dimension {
            let diagonal = self.lu[(pivot_index, pivot_index)];
            if diagonal.abs()
                <= ILL_CONDITIONED_RELATIVE_PIVOT_EPSILON * self.input_norm_infty.max(1.0)
            {
                return Err(LinalgError::IllConditionedMatrix { pivot_index });
            }
        }

        let mut inverse = DenseMatrix::zeros(dimension, dimension);
        let mut basis = vec![0.0; dimension];
        for col in 0..dimension {
            basis.fill(0.0);
            basis[col] = 1.0;

            let solution = self.solve(&basis)?;
            for row in 0..dimension {
                inverse[(row, col)] = solution[row];
            }
        }

        Ok(inverse)
    }
}

pub fn lu_factorize(matrix: &DenseMatrix) -> Result<LuDecomposition, LinalgError> {
    let dimension = validate_square_shape(matrix)?;
    let input_norm_infty = matrix_infinity_norm(matrix);
    let mut lu = matrix.clone();
    let mut pivots: Vec<usize> = (0..dimension).collect();

    for pivot_col in 0..dimension {
        let mut pivot_row = pivot_col;
        let mut pivot_magnitude = lu[(pivot_col, pivot_col)].abs();
        for row in (pivot_col + 1)..dimension {
            let magnitude = lu[(row, pivot_col)].abs();
            if magnitude > pivot_magnitude {
                pivot_row = row;
                pivot_magnitude = magnitude;
            }
        }

        if pivot_magnitude <= SINGULAR_PIVOT_EPSILON {
            return Err(LinalgError::SingularMatrix {
                pivot_index: pivot_col,
            });
        }

        if pivot_row != pivot_col {
            for col in 0..dimension {
                let swapped = lu[(pivot_col, col)];
                lu[(pivot_col, col)] = lu[(pivot_row, col)];
                lu[(pivot_row, col)] = swapped;
            }
            pivots.swap(pivot_col, pivot_row);
        }

        let pivot_value = lu[(pivot_col, pivot_col)];
        for row in (pivot_col + 1)..dimension {
            let factor = lu[(row, pivot_col)] / pivot_value;
            lu[(row, pivot_col)] = factor;
            for col in (pivot_col + 1)..dimension {
                let update = factor * lu[(pivot_col, col)];
                lu[(row, col)] -= update;
            }
        }
    }

    Ok(LuDecomposition {
        lu,
        pivots,
        input_norm_infty,
    })
}

fn validate_square_shape(matrix: &DenseMatrix) -> Result<usize, LinalgError> {
    if matrix.nrows() != matrix.ncols() {
        return Err(LinalgError::NonSquareMatrix {
            rows: matrix.nrows(),
            cols: matrix.ncols(),
        });
    }
    if matrix.nrows() == 0 {
        return Err(LinalgError::EmptyMatrix);
    }
    Ok(matrix.nrows())
}

fn matrix_infinity_norm(matrix: &DenseMatrix) -> f64 {
    let mut norm = 0.0_f64;
    for row in 0..matrix.nrows() {
        let mut row_sum = 0.0;
        for col in 0..matrix.ncols() {
            row_sum += matrix[(row, col)].abs();
        }
        norm = norm.max(row_sum);
    }
    norm
}

#[cfg(test)]
mod tests {
    use super::{LinalgError, lu_factorize};
    use crate::numerics::DenseMatrix;

    fn matrix_from_rows(rows: &[&[f64]]) -> DenseMatrix {
        let mut matrix = DenseMatrix::zeros(rows.len(), rows[0].len());
        for (row, values) in rows.iter().enumerate() {
            for (col, &value) in values.iter().enumerate() {
                matrix[(row, col)] = value;
            }
        }
        matrix
    }

    #[test]
    fn lu_solves_a_well_conditioned_system() {
        let matrix = matrix_from_rows(&[
            &[4.0, 1.0, 0.0],
            &[1.0, 3.0, 1.0],
            &[0.0, 1.0, 2.0],
        ]);
        let decomposition = lu_factorize(&matrix).expect("factorization");
        let solution = decomposition.solve(&[1.0, 2.0, 3.0]).expect("solve");

        // Verify A x = b.
        let residuals = [
            4.0 * solution[0] + solution[1] - 1.0,
            solution[0] + 3.0 * solution[1] + solution[2] - 2.0,
            solution[1] + 2.0 * solution[2] - 3.0,
        ];
        for residual in residuals {
            assert!(residual.abs() <= 1.0e-12);
        }
    }

    #[test]
    fn lu_inverse_multiplies_back_to_identity() {
        let matrix = matrix_from_rows(&[&[2.0, 1.0], &[1.0, 3.0]]);
        let inverse = lu_factorize(&matrix)
            .expect("factorization")
            .invert()
            .expect("inverse");

        for row in 0..2 {
            for col in 0..2 {
                let mut product = 0.0;
                for inner in 0..2 {
                    product += matrix[(row, inner)] * inverse[(inner, col)];
                }
                let expected = if row == col { 1.0 } else { 0.0 };
                assert!((product - expected).abs() <= 1.0e-12);
            }
        }
    }

    #[test]
    fn lu_rejects_singular_and_non_square_inputs() {
        let singular = matrix_from_rows(&[&[1.0, 2.0], &[2.0, 4.0]]);
        let error = lu_factorize(&singular).expect_err("singular should fail");
        assert!(matches!(error, LinalgError::SingularMatrix { .. }));

        let rectangular = DenseMatrix::zeros(2, 3);
        let error = lu_factorize(&rectangular).expect_err("non-square should fail");
        assert_eq!(error, LinalgError::NonSquareMatrix { rows: 2, cols: 3 });
    }
}
