use faer::{prelude::*, solvers::PartialPivLu, Mat};
use thiserror::Error;

/// Failure of a dense linear solve; Newton loops treat every variant as non-convergence.
#[derive(Debug, Error, PartialEq)]
pub enum LinearSolveError {
    #[error("rhs length ({rhs}) does not match matrix dimension {dim}")]
    DimensionMismatch { rhs: usize, dim: usize },
    #[error("matrix must be square")]
    NotSquare,
    #[error("singular matrix (pivot {pivot})")]
    Singular { pivot: usize },
}

/// Solves the dense Jacobian systems of the Newton iterations (J·dx = f).
pub trait LinearSystemBackend: Send + Sync {
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> Result<Vec<f64>, LinearSolveError>;
}

fn check_shape(matrix: &[Vec<f64>], rhs: &[f64]) -> Result<(), LinearSolveError> {
    let dim = matrix.len();
    if rhs.len() != dim {
        return Err(LinearSolveError::DimensionMismatch {
            rhs: rhs.len(),
            dim,
        });
    }
    if matrix.iter().any(|row| row.len() != dim) {
        return Err(LinearSolveError::NotSquare);
    }
    Ok(())
}

/// Gauss-Jordan elimination with partial pivoting; fine for the small
/// subnetworks of a building or vessel grid.
#[derive(Debug, Clone, Default)]
pub struct GaussSolver;

impl LinearSystemBackend for GaussSolver {
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> Result<Vec<f64>, LinearSolveError> {
        check_shape(matrix, rhs)?;
        let n = matrix.len();
        let mut a = matrix.to_vec();
        let mut b = rhs.to_vec();

        for i in 0..n {
            let pivot = (i..n)
                .max_by(|&x, &y| a[x][i].abs().total_cmp(&a[y][i].abs()))
                .unwrap_or(i);
            if pivot != i {
                a.swap(i, pivot);
                b.swap(i, pivot);
            }

            let diag = a[i][i];
            if diag.abs() < 1e-12 {
                return Err(LinearSolveError::Singular { pivot: i });
            }

            for value in a[i][i..].iter_mut() {
                *value /= diag;
            }
            b[i] /= diag;

            let pivot_segment = a[i][i..].to_vec();
            for row in 0..n {
                if row == i {
                    continue;
                }
                let factor = a[row][i];
                if factor == 0.0 {
                    continue;
                }
                for (target, &p) in a[row][i..].iter_mut().zip(pivot_segment.iter()) {
                    *target -= factor * p;
                }
                b[row] -= factor * b[i];
            }
        }

        Ok(b)
    }
}

/// LU with partial pivoting from `faer`. Singularity shows up as non-finite entries.
#[derive(Debug, Clone, Default)]
pub struct FaerSolver;

impl LinearSystemBackend for FaerSolver {
    fn solve(&self, matrix: &[Vec<f64>], rhs: &[f64]) -> Result<Vec<f64>, LinearSolveError> {
        check_shape(matrix, rhs)?;
        let n = matrix.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        let mat = Mat::from_fn(n, n, |i, j| matrix[i][j]);
        let rhs_mat = Mat::from_fn(n, 1, |i, _| rhs[i]);
        let lu = PartialPivLu::new(mat.as_ref());
        let sol = lu.solve(&rhs_mat);

        let solution: Vec<f64> = (0..n).map(|i| sol.read(i, 0)).collect();
        if let Some(pivot) = solution.iter().position(|x| !x.is_finite()) {
            return Err(LinearSolveError::Singular { pivot });
        }
        Ok(solution)
    }
}
