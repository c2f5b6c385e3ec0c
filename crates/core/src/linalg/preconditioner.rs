//! Preconditioners for symmetric upper-storage CRS matrices
//!
//! # SSOR
//!
//! With `ω = 1` and `A = L + D + U` (`L = Uᵀ`), the preconditioner is
//!
//! ```text
//! M = (D + L) D⁻¹ (D + U)
//! ```
//!
//! which is symmetric positive definite whenever every diagonal entry is
//! positive. Applying `M⁻¹` is one forward and one backward triangular sweep
//! over the stored upper triangle.

use crate::sparse::CrsMatrix;

/// Approximate inverse applied to residuals
#[derive(Debug, Clone, PartialEq)]
pub enum Preconditioner {
    /// Diagonal scaling; stores the inverse diagonal
    Jacobi(Vec<f64>),
    /// Symmetric Gauss–Seidel; stores the diagonal
    Ssor(Vec<f64>),
}

impl Preconditioner {
    /// SSOR preconditioner, `None` if any diagonal entry is not positive
    #[must_use]
    pub fn ssor(a: &CrsMatrix) -> Option<Self> {
        let diagonal: Vec<f64> = (0..a.nrows()).map(|row| a.diagonal(row)).collect();
        diagonal
            .iter()
            .all(|d| *d > 0.0 && d.is_finite())
            .then_some(Preconditioner::Ssor(diagonal))
    }

    /// Jacobi preconditioner, `None` if any diagonal entry is zero
    #[must_use]
    pub fn jacobi(a: &CrsMatrix) -> Option<Self> {
        (0..a.nrows())
            .map(|row| {
                let d = a.diagonal(row);
                (d != 0.0 && d.is_finite()).then(|| 1.0 / d)
            })
            .collect::<Option<Vec<_>>>()
            .map(Preconditioner::Jacobi)
    }

    /// Jacobi on absolute diagonal values
    ///
    /// Positive definite even when the matrix is not, as MINRES requires.
    #[must_use]
    pub fn abs_jacobi(a: &CrsMatrix) -> Option<Self> {
        (0..a.nrows())
            .map(|row| {
                let d = a.diagonal(row).abs();
                (d > 0.0 && d.is_finite()).then(|| 1.0 / d)
            })
            .collect::<Option<Vec<_>>>()
            .map(Preconditioner::Jacobi)
    }

    /// Short name for log messages
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Preconditioner::Jacobi(_) => "Jacobi",
            Preconditioner::Ssor(_) => "SSOR",
        }
    }

    /// `z = M⁻¹ r`
    pub fn apply(&self, a: &CrsMatrix, r: &[f64], z: &mut [f64]) {
        match self {
            Preconditioner::Jacobi(inverse) => {
                for ((zi, ri), di) in z.iter_mut().zip(r).zip(inverse) {
                    *zi = ri * di;
                }
            }
            Preconditioner::Ssor(diagonal) => ssor_sweep(a, diagonal, r, z),
        }
    }
}

fn ssor_sweep(a: &CrsMatrix, diagonal: &[f64], r: &[f64], z: &mut [f64]) {
    let n = a.nrows();

    // Forward: (D + L) y = r, column-oriented over the stored upper rows
    z.copy_from_slice(r);
    for row in 0..n {
        z[row] /= diagonal[row];
        let yr = z[row];
        let (columns, values) = a.row(row);
        for (&col, &value) in columns.iter().zip(values) {
            if col != row {
                z[col] -= value * yr;
            }
        }
    }

    // Backward: (D + U) z = D y
    for row in (0..n).rev() {
        let (columns, values) = a.row(row);
        let mut sum = 0.0;
        for (&col, &value) in columns.iter().zip(values) {
            if col != row {
                sum += value * z[col];
            }
        }
        z[row] -= sum / diagonal[row];
    }
}
