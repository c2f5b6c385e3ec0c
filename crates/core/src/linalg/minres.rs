//! Preconditioned MINRES
//!
//! Lanczos tridiagonalization with a running QR factorization by Givens
//! rotations. The preconditioner must be symmetric positive definite, so the
//! absolute-value Jacobi preconditioner is used; the matrix itself may be
//! indefinite.
//!
//! The residual estimate is the preconditioned norm `‖r‖_M⁻¹`, updated by
//! `|s|` each iteration and compared against `‖b‖_M⁻¹`.

use super::preconditioner::Preconditioner;
use super::vector_ops::{axpy, dot, scale};
use super::{check_sizes, LinearSolverConfig, ProgressTracker, SolveReport, SolveStatus, SolverKind};
use crate::error::Result;
use crate::progress::ProgressSink;
use crate::sparse::CrsMatrix;
use std::mem;
use tracing::debug;

/// Relative slack allowed on the Lanczos norm before it counts as negative
const NEGATIVE_NORM_SLACK: f64 = 1e-14;

/// MINRES solver with preallocated scratch vectors
#[derive(Debug, Clone)]
pub struct Minres {
    r: Vec<f64>,
    z: Vec<f64>,
    v: Vec<f64>,
    v_old: Vec<f64>,
    u: Vec<f64>,
    u_old: Vec<f64>,
    w: Vec<f64>,
    w_old: Vec<f64>,
    w_oold: Vec<f64>,
}

impl Minres {
    /// Allocate scratch space for systems of `n` unknowns
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            r: vec![0.0; n],
            z: vec![0.0; n],
            v: vec![0.0; n],
            v_old: vec![0.0; n],
            u: vec![0.0; n],
            u_old: vec![0.0; n],
            w: vec![0.0; n],
            w_old: vec![0.0; n],
            w_oold: vec![0.0; n],
        }
    }

    fn report(status: SolveStatus, iterations: usize, residual: f64) -> SolveReport {
        SolveReport {
            status,
            iterations,
            residual,
            method: SolverKind::Minres,
        }
    }

    /// Solve `A x = b` with `x` as the initial guess
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

        let Some(preconditioner) = Preconditioner::abs_jacobi(a) else {
            return Ok(Self::report(SolveStatus::PreconditionerFailed, 0, f64::NAN));
        };

        let Self {
            r,
            z,
            v,
            v_old,
            u,
            u_old,
            w,
            w_old,
            w_oold,
        } = self;

        // ‖b‖ in the preconditioned norm
        preconditioner.apply(a, b, z);
        let b_norm = match dot(b, z) {
            d if d > 0.0 => d.sqrt(),
            _ => 1.0,
        };

        // r = b - A x, z = M⁻¹ r
        a.mul_vec(x, z);
        for ((ri, bi), zi) in r.iter_mut().zip(b).zip(z.iter()) {
            *ri = bi - zi;
        }
        preconditioner.apply(a, r, z);

        let dp = dot(r, z);
        if dp < 0.0 {
            return Ok(Self::report(SolveStatus::Breakdown, 0, f64::NAN));
        }
        let mut beta = dp.sqrt();
        let mut eta = beta;
        let mut rnorm = beta;

        let mut residual = rnorm / b_norm;
        if residual < config.tolerance {
            return Ok(Self::report(SolveStatus::Converged, 0, residual));
        }
        let mut progress = ProgressTracker::new(sink, config, residual);

        v.copy_from_slice(r);
        u.copy_from_slice(z);
        scale(1.0 / beta, v);
        scale(1.0 / beta, u);
        v_old.fill(0.0);
        u_old.fill(0.0);
        w.fill(0.0);
        w_old.fill(0.0);
        w_oold.fill(0.0);

        let (mut c, mut s) = (1.0, 0.0);
        let (mut c_old, mut s_old) = (1.0, 0.0);

        for iteration in 1..=config.max_iterations {
            // Lanczos step
            a.mul_vec(u, r);
            let alpha = dot(u, r);
            preconditioner.apply(a, r, z);
            axpy(-alpha, v, r);
            axpy(-beta, v_old, r);
            axpy(-alpha, u, z);
            axpy(-beta, u_old, z);

            let beta_old = beta;
            let dp = dot(r, z);
            if dp < -NEGATIVE_NORM_SLACK * (alpha * alpha + beta_old * beta_old) {
                debug!("MINRES breakdown at iteration {}: indefinite preconditioned norm", iteration);
                return Ok(Self::report(SolveStatus::Breakdown, iteration, residual));
            }
            beta = dp.max(0.0).sqrt();

            // QR factorization of the tridiagonal matrix
            let c_oold = c_old;
            let s_oold = s_old;
            c_old = c;
            s_old = s;
            let rho0 = c_old * alpha - c_oold * s_old * beta_old;
            let rho1 = rho0.hypot(beta);
            let rho2 = s_old * alpha + c_oold * c_old * beta_old;
            let rho3 = s_oold * beta_old;
            if rho1 == 0.0 || !rho1.is_finite() {
                return Ok(Self::report(SolveStatus::Breakdown, iteration, residual));
            }

            // Givens rotation
            c = rho0 / rho1;
            s = beta / rho1;

            // Search direction and solution update
            mem::swap(w_oold, w_old);
            mem::swap(w_old, w);
            for (((wi, ui), wo), woo) in w.iter_mut().zip(u.iter()).zip(w_old.iter()).zip(w_oold.iter()) {
                *wi = (ui - rho2 * wo - rho3 * woo) / rho1;
            }
            axpy(c * eta, w, x);
            eta *= -s;

            rnorm *= s.abs();
            residual = rnorm / b_norm;
            progress.update(iteration, residual);
            if residual < config.tolerance {
                return Ok(Self::report(SolveStatus::Converged, iteration, residual));
            }

            // Next Lanczos vectors
            mem::swap(v_old, v);
            mem::swap(v, r);
            mem::swap(u_old, u);
            mem::swap(u, z);
            scale(1.0 / beta, v);
            scale(1.0 / beta, u);
        }

        Ok(Self::report(
            SolveStatus::MaxIterationsReached,
            config.max_iterations,
            residual,
        ))
    }
}
