//! Iterative linear solvers for the symmetric stiffness systems
//!
//! Conjugate gradient is tried first. When it cannot converge (iteration
//! budget exhausted, loss of positive curvature, or no usable
//! preconditioner) the caller falls back to MINRES, which tolerates mildly
//! indefinite systems. Non-convergence of a single solver is reported in a
//! [`SolveReport`], never as an error; only the failure of both solvers in
//! [`LinearSolver::solve_with_fallback`] is.

pub mod cg;
pub mod minres;
pub mod preconditioner;
pub mod vector_ops;

pub use cg::ConjugateGradient;
pub use minres::Minres;
pub use preconditioner::Preconditioner;

use crate::error::{Result, SolverError};
use crate::progress::{ProgressSink, Severity};
use crate::sparse::CrsMatrix;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Stopping rule and reporting cadence shared by both solvers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSolverConfig {
    /// Maximum iterations per solve
    pub max_iterations: usize,

    /// Convergence threshold on the residual norm relative to the
    /// right-hand-side norm
    pub tolerance: f64,

    /// Report progress every this many iterations (0 disables reporting)
    pub print_iterations: usize,
}

impl Default for LinearSolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100_000,
            tolerance: 1e-6,
            print_iterations: 10,
        }
    }
}

/// How a single solve ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Converged,
    MaxIterationsReached,
    /// Non-positive curvature or a negative preconditioned norm
    Breakdown,
    /// No preconditioner could be built for the matrix
    PreconditionerFailed,
}

/// Which iterative method produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverKind {
    ConjugateGradient,
    Minres,
}

/// Outcome of a single linear solve
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub status: SolveStatus,
    pub iterations: usize,
    /// Final relative residual
    pub residual: f64,
    pub method: SolverKind,
}

impl SolveReport {
    #[must_use]
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}

/// Check that the system and scratch space agree in size
pub(crate) fn check_sizes(a: &CrsMatrix, x: &[f64], b: &[f64], scratch: usize) -> Result<()> {
    let n = a.nrows();
    for (what, len) in [
        ("solution vector", x.len()),
        ("right-hand side", b.len()),
        ("solver workspace", scratch),
    ] {
        if len != n {
            return Err(SolverError::SizeMismatch {
                what,
                expected: n,
                found: len,
            });
        }
    }
    Ok(())
}

/// Percent-complete reporting for one solve
///
/// Residual progress is measured on a linear scale between the starting
/// residual and the tolerance, then mapped through an exponential so the
/// estimate tracks wall time more closely, since residuals drop quickly early
/// on and slowly near convergence.
pub(crate) struct ProgressTracker<'a> {
    sink: &'a dyn ProgressSink,
    print_iterations: usize,
    tolerance: f64,
    start: f64,
    residual_percent: f64,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink, config: &LinearSolverConfig, start: f64) -> Self {
        Self {
            sink,
            print_iterations: config.print_iterations,
            tolerance: config.tolerance,
            start,
            residual_percent: 0.0,
        }
    }

    pub(crate) fn update(&mut self, iteration: usize, residual: f64) {
        if self.print_iterations == 0 || iteration % self.print_iterations != 0 {
            return;
        }

        self.sink.message(
            Severity::Debug,
            &format!(
                "Iteration = {}\tResidual = {:e}\ttol = {:e}",
                iteration, residual, self.tolerance
            ),
        );

        let span = self.start - self.tolerance;
        let percent = if span > 0.0 {
            100.0 - 100.0 * (residual - self.tolerance) / span
        } else {
            100.0
        };
        self.residual_percent = percent.clamp(0.0, 100.0).max(self.residual_percent);

        let time_percent = (1.8 * (0.0401 * self.residual_percent).exp()).min(99.0);
        self.sink.message(
            Severity::SolverProgress,
            &format!("Solver: {:.0}% complete", time_percent),
        );
    }
}

/// Conjugate gradient with a MINRES fallback, sharing one problem size
#[derive(Debug, Clone)]
pub struct LinearSolver {
    cg: ConjugateGradient,
    minres: Minres,
}

impl LinearSolver {
    /// Allocate scratch space for systems of `n` unknowns
    #[must_use]
    pub fn new(n: usize) -> Self {
        Self {
            cg: ConjugateGradient::new(n),
            minres: Minres::new(n),
        }
    }

    /// Solve with conjugate gradient only
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SizeMismatch`] if the system does not match the
    /// allocated size.
    pub fn solve_cg(
        &mut self,
        a: &CrsMatrix,
        x: &mut [f64],
        b: &[f64],
        config: &LinearSolverConfig,
        sink: &dyn ProgressSink,
    ) -> Result<SolveReport> {
        self.cg.solve(a, x, b, config, sink)
    }

    /// Solve with MINRES only
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SizeMismatch`] if the system does not match the
    /// allocated size.
    pub fn solve_minres(
        &mut self,
        a: &CrsMatrix,
        x: &mut [f64],
        b: &[f64],
        config: &LinearSolverConfig,
        sink: &dyn ProgressSink,
    ) -> Result<SolveReport> {
        self.minres.solve(a, x, b, config, sink)
    }

    /// Solve `A x = b`, falling back from conjugate gradient to MINRES
    ///
    /// `x` holds the initial guess on entry. MINRES restarts from that same
    /// guess, not from the point where conjugate gradient stopped.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SolverDiverged`] (after a `Fatal` message) if
    /// both solvers fail, and [`SolverError::SizeMismatch`] for mismatched
    /// inputs.
    pub fn solve_with_fallback(
        &mut self,
        a: &CrsMatrix,
        x: &mut [f64],
        b: &[f64],
        config: &LinearSolverConfig,
        sink: &dyn ProgressSink,
        component: &'static str,
    ) -> Result<SolveReport> {
        let initial = x.to_vec();

        let report = self.cg.solve(a, x, b, config, sink)?;
        if report.converged() {
            info!(
                "{}: conjugate gradient converged in {} iterations (residual {:e})",
                component, report.iterations, report.residual
            );
            return Ok(report);
        }

        warn!(
            "{}: conjugate gradient stopped with {:?} after {} iterations, trying MINRES",
            component, report.status, report.iterations
        );
        sink.message(
            Severity::Warning,
            &format!("{component}: solver divergence detected, trying MINRES"),
        );

        x.copy_from_slice(&initial);
        let report = self.minres.solve(a, x, b, config, sink)?;
        if report.converged() {
            info!(
                "{}: MINRES converged in {} iterations (residual {:e})",
                component, report.iterations, report.residual
            );
            return Ok(report);
        }

        let error = SolverError::SolverDiverged { component };
        sink.message(Severity::Fatal, &error.to_string());
        Err(error)
    }
}
