//! Steady-state driver
//!
//! Iterates a projected velocity field through transport, optional diffusion
//! and re-projection, averaging the projected fields of all iterations.
//!
//! ```text
//! initialize → null-run check → project
//!     loop: refresh inlets → transport → diffuse → zero ground → project
//!     average
//! ```

use super::cancel::CancellationToken;
use super::initializer::FieldInitializer;
use crate::conservation::{MassConservation, Stability};
use crate::diffusion::{DiffusionConfig, DiffusionEquation};
use crate::error::{Result, SolverError};
use crate::fem::QuadratureRule;
use crate::field::VectorField;
use crate::linalg::{LinearSolverConfig, SolveReport};
use crate::mesh::Mesh;
use crate::progress::{ProgressSink, Severity};
use crate::transport::{SemiLagrangian, TransportConfig};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, enabled, error, info, Level};

/// Settings of a steady-state run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SteadyStateConfig {
    /// Outer iterations after the first projection
    pub max_iterations: usize,

    /// Diffusion step between transport and projection; `None` disables it
    pub diffusion: Option<DiffusionConfig>,

    pub transport: TransportConfig,
    pub linear_solver: LinearSolverConfig,
    pub quadrature: QuadratureRule,
    pub stability: Stability,

    /// Zero the ground layer after every projection, the first included
    pub enforce_no_slip: bool,
}

impl Default for SteadyStateConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            diffusion: None,
            transport: TransportConfig::default(),
            linear_solver: LinearSolverConfig::default(),
            quadrature: QuadratureRule::One,
            stability: Stability::Neutral,
            enforce_no_slip: true,
        }
    }
}

/// Fields and statistics of a finished run
#[derive(Debug, Clone)]
pub struct SteadyStateResult {
    /// Mean of the projected fields of every outer iteration
    pub average: VectorField,
    /// Field after the last iteration
    pub last: VectorField,
    /// Outer iterations performed
    pub iterations: usize,
    /// The initial field was identically zero and nothing was solved
    pub null_run: bool,
    /// One report per projection, the first projection included
    pub projection_reports: Vec<SolveReport>,
}

/// Steady-state wind solver
#[derive(Debug, Clone, Default)]
pub struct SteadyStateSolver {
    config: SteadyStateConfig,
}

impl SteadyStateSolver {
    #[must_use]
    pub fn new(config: SteadyStateConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &SteadyStateConfig {
        &self.config
    }

    /// Run the solver on `mesh` from the field produced by `initializer`
    ///
    /// Every error aborts the run and is also sent to `sink` as
    /// [`Severity::Fatal`]. No partial result is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Cancelled`] if `cancel` fires, and any error of
    /// the initializer, the projection, the diffusion or the transport step.
    pub fn run(
        &self,
        mesh: &Mesh,
        initializer: &dyn FieldInitializer,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<SteadyStateResult> {
        let start = Instant::now();
        match self.run_stages(mesh, initializer, sink, cancel) {
            Ok(result) => {
                info!(
                    "Steady-state run finished: {} iterations in {:.2?}",
                    result.iterations,
                    start.elapsed()
                );
                Ok(result)
            }
            Err(e) => {
                error!("Steady-state run aborted: {}", e);
                // The linear solver has already reported its own divergence
                if !matches!(e, SolverError::SolverDiverged { .. }) {
                    sink.message(Severity::Fatal, &e.to_string());
                }
                Err(e)
            }
        }
    }

    fn run_stages(
        &self,
        mesh: &Mesh,
        initializer: &dyn FieldInitializer,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<SteadyStateResult> {
        let config = &self.config;

        sink.message(Severity::None, "Initializing flow...");
        let initial = initializer.initialize_fields(mesh)?;
        mesh.check_len("initial velocity", initial.len())?;
        cancel.check()?;

        if initial.is_all_zero() {
            info!("Initial field is zero everywhere, skipping the solve");
            return Ok(SteadyStateResult {
                average: VectorField::new(mesh),
                last: initial,
                iterations: 0,
                null_run: true,
                projection_reports: Vec::new(),
            });
        }

        sink.message(Severity::None, "Building equations...");
        let mut projection = MassConservation::new(config.quadrature);
        projection.initialize(mesh, &initial)?;
        projection.set_stability(&config.stability)?;

        let mut diffusion = match &config.diffusion {
            Some(diffusion_config) => {
                let mut equation = DiffusionEquation::new();
                equation.initialize(mesh, diffusion_config)?;
                Some(equation)
            }
            None => None,
        };
        cancel.check()?;

        sink.message(Severity::None, "First project...");
        let mut u = initial;
        let mut reports = vec![project(&mut projection, &mut u, config, sink)?];
        if config.enforce_no_slip {
            u.zero_ground();
        }

        let inflow = u.clone();
        let mut u_1 = u.clone();
        let max_speed = u.max_magnitude();
        if max_speed == 0.0 || config.max_iterations == 0 {
            return Ok(SteadyStateResult {
                average: u.clone(),
                last: u,
                iterations: 0,
                null_run: false,
                projection_reports: reports,
            });
        }

        let dt = mesh.resolution() / max_speed;
        debug!("Outer time step {:.3} s from a peak speed of {:.3} m/s", dt, max_speed);
        let transport = SemiLagrangian::new(config.transport.clone());
        let mut average = VectorField::new(mesh);

        sink.message(Severity::None, "Starting iteration loop...");
        for iteration in 1..=config.max_iterations {
            cancel.check()?;
            u.copy_inlet_nodes(&inflow);

            cancel.check()?;
            transport.transport_vector(mesh, &u, &mut u_1, dt)?;

            match diffusion.as_mut() {
                Some(equation) => {
                    cancel.check()?;
                    equation.solve(&u_1, &mut u, dt, &config.linear_solver, sink)?;
                }
                None => u.clone_from(&u_1),
            }

            cancel.check()?;
            u.zero_ground();
            reports.push(project(&mut projection, &mut u, config, sink)?);
            if config.enforce_no_slip {
                u.zero_ground();
            }

            if enabled!(Level::DEBUG) {
                let divergence = projection.divergence(&u)?;
                debug!(
                    "Iteration {}: max |div U| = {:e}",
                    iteration,
                    divergence.max_abs()
                );
            }

            average.accumulate(&u);
            let percent = 100 * iteration / config.max_iterations;
            sink.message(Severity::OuterIterProgress, &percent.to_string());
        }

        average.scale(1.0 / config.max_iterations as f64);
        Ok(SteadyStateResult {
            average,
            last: u,
            iterations: config.max_iterations,
            null_run: false,
            projection_reports: reports,
        })
    }
}

/// Project `u` in place: set it as the initial velocity, rebuild, solve and
/// write back the corrected field
fn project(
    projection: &mut MassConservation<'_>,
    u: &mut VectorField,
    config: &SteadyStateConfig,
    sink: &dyn ProgressSink,
) -> Result<SolveReport> {
    projection.set_initial_velocity(u)?;
    projection.discretize()?;
    projection.set_boundary_conditions()?;
    let report = projection.solve_with_fallback(&config.linear_solver, sink)?;
    projection.compute_uvw_field(u)?;
    Ok(report)
}
