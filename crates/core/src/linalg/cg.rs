//! Preconditioned conjugate gradient

use super::preconditioner::Preconditioner;
use super::vector_ops::{axpy, dot, norm2, xpay};
use super::{check_sizes, LinearSolverConfig, ProgressTracker, SolveReport, SolveStatus, SolverKind};
use crate::error::Result;
use crate::progress::{ProgressSink, Severity};
use crate::sparse::CrsMatrix;
use tracing::{debug, warn};

/// Conjugate gradient solver with preallocated scratch vectors
#[derive(Debug, Clone)]
pub struct ConjugateGradient {
    r: Vec<f64>,
    z: Vec<f64>,
    p: Vec<f64>,
    q: Vec<f64>,
}

impl ConjugateGradient {
    /// Allocate scratch space for systems of `n` unknowns
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            r: vec![0.0; n],
            z: vec![0.0; n],
            p: vec![0.0; n],
            q: vec![0.0; n],
        }
    }

    fn report(status: SolveStatus, iterations: usize, residual: f64) -> SolveReport {
        SolveReport {
            status,
            iterations,
            residual,
            method: SolverKind::ConjugateGradient,
        }
    }

    /// Solve `A x = b` with `x` as the initial guess
    ///
    /// The preconditioner is SSOR, or Jacobi if the matrix has a non-positive
    /// diagonal entry. Convergence is `‖b - A x‖ / ‖b‖ < tolerance`, with a
    /// zero right-hand side treated as unit norm.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SizeMismatch`](crate::SolverError::SizeMismatch)
    /// if `x`, `b` or the scratch space do not match the matrix.
    #[allow(clippy::many_single_char_names)]
    pub fn solve(
        &mut self,
        a: &CrsMatrix,
        x: &mut [f64],
        b: &[f64],
        config: &LinearSolverConfig,
        sink: &dyn ProgressSink,
    ) -> Result<SolveReport> {
        check_sizes(a, x, b, self.r.len())?;

        let preconditioner = match Preconditioner::ssor(a) {
            Some(m) => m,
            None => {
                warn!("SSOR preconditioner unavailable, using Jacobi");
                sink.message(
                    Severity::Warning,
                    "SSOR preconditioner unavailable, falling back to Jacobi",
                );
                match Preconditioner::jacobi(a) {
                    Some(m) => m,
                    None => {
                        return Ok(Self::report(SolveStatus::PreconditionerFailed, 0, f64::NAN));
                    }
                }
            }
        };

        debug!("Conjugate gradient with {} preconditioning", preconditioner.name());

        let Self { r, z, p, q } = self;

        let b_norm = match norm2(b) {
            n if n > 0.0 => n,
            _ => 1.0,
        };

        // r = b - A x
        a.mul_vec(x, q);
        for ((ri, bi), qi) in r.iter_mut().zip(b).zip(q.iter()) {
            *ri = bi - qi;
        }

        let mut residual = norm2(r) / b_norm;
        if residual < config.tolerance {
            return Ok(Self::report(SolveStatus::Converged, 0, residual));
        }
        let mut progress = ProgressTracker::new(sink, config, residual);

        preconditioner.apply(a, r, z);
        p.copy_from_slice(z);
        let mut rho = dot(r, z);

        for iteration in 1..=config.max_iterations {
            a.mul_vec(p, q);
            let curvature = dot(p, q);
            if curvature <= 0.0 || !curvature.is_finite() {
                debug!(
                    "Conjugate gradient breakdown at iteration {}: pᵀAp = {:e}",
                    iteration, curvature
                );
                return Ok(Self::report(SolveStatus::Breakdown, iteration, residual));
            }

            let alpha = rho / curvature;
            axpy(alpha, p, x);
            axpy(-alpha, q, r);

            residual = norm2(r) / b_norm;
            progress.update(iteration, residual);
            if residual < config.tolerance {
                return Ok(Self::report(SolveStatus::Converged, iteration, residual));
            }

            preconditioner.apply(a, r, z);
            let rho_next = dot(r, z);
            if rho_next <= 0.0 || !rho_next.is_finite() {
                return Ok(Self::report(SolveStatus::Breakdown, iteration, residual));
            }
            xpay(z, rho_next / rho, p);
            rho = rho_next;
        }

        Ok(Self::report(
            SolveStatus::MaxIterationsReached,
            config.max_iterations,
            residual,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingProgress;
    use approx::assert_relative_eq;

    /// 1D Laplacian with Dirichlet ends, n unknowns
    fn laplacian(n: usize) -> CrsMatrix {
        let mut row_ptr = vec![0];
        let mut col_ind = Vec::new();
        let mut values = Vec::new();
        for row in 0..n {
            col_ind.push(row);
            values.push(2.0);
            if row + 1 < n {
                col_ind.push(row + 1);
                values.push(-1.0);
            }
            row_ptr.push(col_ind.len());
        }
        CrsMatrix::from_parts(row_ptr, col_ind, values).unwrap()
    }

    #[test]
    fn test_solves_spd_system() {
        let n = 50;
        let a = laplacian(n);
        let expected: Vec<f64> = (0..n).map(|i| (i as f64 * 0.1).sin()).collect();
        let mut b = vec![0.0; n];
        a.mul_vec(&expected, &mut b);

        let mut x = vec![0.0; n];
        let config = LinearSolverConfig {
            tolerance: 1e-10,
            ..LinearSolverConfig::default()
        };
        let report = ConjugateGradient::new(n)
            .solve(&a, &mut x, &b, &config, &RecordingProgress::new())
            .unwrap();

        assert!(report.converged());
        for (xi, ei) in x.iter().zip(&expected) {
            assert_relative_eq!(*xi, *ei, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_zero_rhs_converges_immediately() {
        let a = laplacian(4);
        let mut x = vec![0.0; 4];
        let report = ConjugateGradient::new(4)
            .solve(&a, &mut x, &[0.0; 4], &LinearSolverConfig::default(), &RecordingProgress::new())
            .unwrap();
        assert_eq!(report.status, SolveStatus::Converged);
        assert_eq!(report.iterations, 0);
    }

    #[test]
    fn test_iteration_budget() {
        let a = laplacian(40);
        let b = vec![1.0; 40];
        let mut x = vec![0.0; 40];
        let config = LinearSolverConfig {
            max_iterations: 2,
            tolerance: 1e-14,
            print_iterations: 1,
        };
        let sink = RecordingProgress::new();
        let report = ConjugateGradient::new(40).solve(&a, &mut x, &b, &config, &sink).unwrap();

        assert_eq!(report.status, SolveStatus::MaxIterationsReached);
        assert_eq!(report.iterations, 2);
        assert_eq!(sink.with_severity(Severity::SolverProgress).len(), 2);
    }
}
