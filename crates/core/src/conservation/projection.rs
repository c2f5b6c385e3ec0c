//! Mass-conserving projection of a velocity field
//!
//! # Equation
//!
//! ```text
//!  ∂/∂x (Rx ∂Φ/∂x) + ∂/∂y (Ry ∂Φ/∂y) + ∂/∂z (Rz ∂Φ/∂z) + H = 0
//!
//!  H = ∂u0/∂x + ∂v0/∂y + ∂w0/∂z
//! ```
//!
//! with `Φ = 0` on the lateral faces and the top and zero normal flux through
//! the ground. The corrected field
//!
//! ```text
//!  u = u0 + Rx ∂Φ/∂x    v = v0 + Ry ∂Φ/∂y    w = w0 + Rz ∂Φ/∂z
//! ```
//!
//! is divergence free.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized -initialize-> Initialized -discretize-> Discretized
//!     -set_boundary_conditions-> BoundaryApplied -solve-> Solved
//! ```
//!
//! `discretize` may be repeated from any allocated stage and always rebuilds
//! the matrix and right-hand side from zero.

use super::stability::{horizontal_weight, vertical_weight, AlphaSource, ALPHA_H};
use crate::core_types::Vec3;
use crate::error::{Result, SolverError};
use crate::fem::{FiniteElement, QuadratureRule};
use crate::field::{ScalarField, VectorField};
use crate::linalg::{LinearSolver, LinearSolverConfig, SolveReport};
use crate::mesh::Mesh;
use crate::progress::ProgressSink;
use crate::sparse::{boundary_mask, CrsMatrix};
use tracing::debug;

const COMPONENT: &str = "mass conservation";

/// Progress of a projection through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProjectionStage {
    Uninitialized,
    Initialized,
    Discretized,
    BoundaryApplied,
    Solved,
}

/// Buffers that exist only between `initialize` and `deallocate`
#[derive(Debug)]
struct Workspace<'m> {
    mesh: &'m Mesh,
    elements: FiniteElement<'m>,
    u0: VectorField,
    alpha_v: ScalarField,
    phi: Vec<f64>,
    rhs: Vec<f64>,
    matrix: CrsMatrix,
    boundary: Vec<bool>,
    solver: LinearSolver,
}

/// Conservation-of-mass solver owning its own stiffness matrix
#[derive(Debug)]
pub struct MassConservation<'m> {
    rule: QuadratureRule,
    stage: ProjectionStage,
    workspace: Option<Workspace<'m>>,
}

impl<'m> MassConservation<'m> {
    #[must_use]
    pub fn new(rule: QuadratureRule) -> Self {
        Self {
            rule,
            stage: ProjectionStage::Uninitialized,
            workspace: None,
        }
    }

    #[must_use]
    pub fn stage(&self) -> ProjectionStage {
        self.stage
    }

    /// Bind the mesh and initial velocity and allocate every buffer
    ///
    /// Builds this solver's own compressed-row structure and evaluates element
    /// geometry. Stability starts neutral.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::AlreadyInitialized`] if called twice without
    /// [`deallocate`](Self::deallocate), [`SolverError::SizeMismatch`] if `u0`
    /// does not match the mesh, and any mesh error from building the matrix
    /// structure or element geometry.
    pub fn initialize(&mut self, mesh: &'m Mesh, u0: &VectorField) -> Result<()> {
        if self.workspace.is_some() {
            return Err(SolverError::AlreadyInitialized {
                component: COMPONENT,
            });
        }
        mesh.check_len("initial velocity", u0.len())?;

        let matrix = CrsMatrix::for_mesh(mesh)?;
        let elements = FiniteElement::new(mesh, self.rule)?;
        let numnp = mesh.numnp();

        self.workspace = Some(Workspace {
            mesh,
            elements,
            u0: u0.clone(),
            alpha_v: ScalarField::with_value(mesh, ALPHA_H),
            phi: vec![0.0; numnp],
            rhs: vec![0.0; numnp],
            matrix,
            boundary: boundary_mask(mesh),
            solver: LinearSolver::new(numnp),
        });
        self.stage = ProjectionStage::Initialized;
        debug!("Mass conservation initialized for {} nodes", numnp);
        Ok(())
    }

    /// Release all buffers and return to the uninitialized state
    pub fn deallocate(&mut self) {
        self.workspace = None;
        self.stage = ProjectionStage::Uninitialized;
    }

    fn workspace(&self) -> Result<&Workspace<'m>> {
        self.workspace.as_ref().ok_or(SolverError::NotInitialized {
            component: COMPONENT,
        })
    }

    fn workspace_mut(&mut self) -> Result<&mut Workspace<'m>> {
        self.workspace.as_mut().ok_or(SolverError::NotInitialized {
            component: COMPONENT,
        })
    }

    fn require(&self, operation: &'static str, stage: ProjectionStage, required: &'static str) -> Result<()> {
        self.workspace()?;
        if self.stage < stage {
            return Err(SolverError::OutOfOrder {
                component: COMPONENT,
                operation,
                required,
            });
        }
        Ok(())
    }

    /// Set the vertical precision modulus from a stability source
    ///
    /// Takes effect at the next [`discretize`](Self::discretize).
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::NotInitialized`] before `initialize` and
    /// [`SolverError::InvalidConfig`] if the source yields a non-positive or
    /// non-finite `α` at any node. The previous setting is kept on error.
    pub fn set_stability(&mut self, source: &dyn AlphaSource) -> Result<()> {
        let ws = self.workspace_mut()?;
        let mesh = ws.mesh;
        let alpha_v = (0..mesh.numnp())
            .map(|node| {
                let (i, j, k) = mesh.ijk(node);
                let alpha = source.alpha(mesh, i, j, k);
                if alpha.is_finite() && alpha > 0.0 {
                    Ok(ALPHA_H / alpha)
                } else {
                    Err(SolverError::InvalidConfig(format!(
                        "stability parameter must be positive and finite, got {alpha} at node ({i}, {j}, {k})"
                    )))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        ws.alpha_v.as_mut_slice().copy_from_slice(&alpha_v);
        self.stage = ProjectionStage::Initialized;
        Ok(())
    }

    /// Replace the velocity field to be projected
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::NotInitialized`] before `initialize` and
    /// [`SolverError::SizeMismatch`] if `u0` does not match the mesh.
    pub fn set_initial_velocity(&mut self, u0: &VectorField) -> Result<()> {
        let ws = self.workspace_mut()?;
        ws.mesh.check_len("initial velocity", u0.len())?;
        ws.u0.clone_from(u0);
        self.stage = ProjectionStage::Initialized;
        Ok(())
    }

    /// Assemble the stiffness matrix and right-hand side from the current
    /// initial velocity
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::NotInitialized`] before `initialize`.
    pub fn discretize(&mut self) -> Result<()> {
        let ws = self.workspace_mut()?;
        let Workspace {
            elements,
            u0,
            alpha_v,
            rhs,
            matrix,
            ..
        } = ws;

        matrix.clear();
        rhs.fill(0.0);

        let (ux, uy, uz) = (u0.x().as_slice(), u0.y().as_slice(), u0.z().as_slice());
        let alpha_v = alpha_v.as_slice();
        let rh = horizontal_weight();

        elements.map_elements(
            |_, nodes, qps| {
                let mut stiffness = [[0.0; 8]; 8];
                let mut load = [0.0; 8];
                for qp in qps {
                    let divergence: f64 = (0..8)
                        .map(|a| {
                            let node = nodes[a];
                            qp.dndx[a] * ux[node] + qp.dndy[a] * uy[node] + qp.dndz[a] * uz[node]
                        })
                        .sum();
                    let rz = vertical_weight(qp.interpolate(nodes, alpha_v));
                    qp.add_stiffness(&Vec3::new(rh, rh, rz), &mut stiffness);
                    qp.add_load(divergence, &mut load);
                }
                (stiffness, load)
            },
            |nodes, (stiffness, load)| {
                matrix.assemble_element(nodes, &stiffness);
                for (a, &node) in nodes.iter().enumerate() {
                    rhs[node] += load[a];
                }
            },
        );

        self.stage = ProjectionStage::Discretized;
        Ok(())
    }

    /// Impose `Φ = 0` on the lateral faces and the top
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::OutOfOrder`] unless the system has been
    /// discretized since the last change of inputs.
    pub fn set_boundary_conditions(&mut self) -> Result<()> {
        self.require("set_boundary_conditions", ProjectionStage::Discretized, "discretize")?;
        if self.stage >= ProjectionStage::BoundaryApplied {
            return Ok(());
        }
        let ws = self.workspace_mut()?;
        let zeros = vec![0.0; ws.rhs.len()];
        ws.matrix.apply_dirichlet(&mut ws.rhs, &ws.boundary, &zeros)?;
        self.stage = ProjectionStage::BoundaryApplied;
        Ok(())
    }

    /// Solve for `Φ` with conjugate gradient, starting from zero
    ///
    /// A report that did not converge is not an error; call
    /// [`solve_minres`](Self::solve_minres) next.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::OutOfOrder`] before boundary conditions are applied.
    pub fn solve(&mut self, config: &LinearSolverConfig, sink: &dyn ProgressSink) -> Result<SolveReport> {
        self.run_solver(config, sink, |solver, a, x, b, config, sink| {
            solver.solve_cg(a, x, b, config, sink)
        })
    }

    /// Solve for `Φ` with MINRES, starting from zero
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::OutOfOrder`] before boundary conditions are applied.
    pub fn solve_minres(&mut self, config: &LinearSolverConfig, sink: &dyn ProgressSink) -> Result<SolveReport> {
        self.run_solver(config, sink, |solver, a, x, b, config, sink| {
            solver.solve_minres(a, x, b, config, sink)
        })
    }

    /// Solve for `Φ` with conjugate gradient, then MINRES if needed
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SolverDiverged`] if both solvers fail and
    /// [`SolverError::OutOfOrder`] before boundary conditions are applied.
    pub fn solve_with_fallback(
        &mut self,
        config: &LinearSolverConfig,
        sink: &dyn ProgressSink,
    ) -> Result<SolveReport> {
        self.run_solver(config, sink, |solver, a, x, b, config, sink| {
            solver.solve_with_fallback(a, x, b, config, sink, COMPONENT)
        })
    }

    fn run_solver<F>(&mut self, config: &LinearSolverConfig, sink: &dyn ProgressSink, method: F) -> Result<SolveReport>
    where
        F: FnOnce(
            &mut LinearSolver,
            &CrsMatrix,
            &mut [f64],
            &[f64],
            &LinearSolverConfig,
            &dyn ProgressSink,
        ) -> Result<SolveReport>,
    {
        self.require("solve", ProjectionStage::BoundaryApplied, "set_boundary_conditions")?;
        let ws = self.workspace_mut()?;
        ws.phi.fill(0.0);
        let report = method(&mut ws.solver, &ws.matrix, &mut ws.phi, &ws.rhs, config, sink)?;
        if report.converged() {
            self.stage = ProjectionStage::Solved;
        }
        Ok(report)
    }

    /// Write `U = U0 + R ∇Φ` into `u`
    ///
    /// `∇Φ` is recovered at the nodes by stress smoothing.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::OutOfOrder`] unless the last solve converged, and
    /// [`SolverError::SizeMismatch`] if `u` does not match the mesh.
    pub fn compute_uvw_field(&self, u: &mut VectorField) -> Result<()> {
        self.require("compute_uvw_field", ProjectionStage::Solved, "a converged solve")?;
        let ws = self.workspace()?;
        ws.mesh.check_len("output velocity", u.len())?;

        let gradient = ws.elements.smoothed_gradient(&ws.phi);
        let rh = horizontal_weight();
        for node in 0..u.len() {
            let g = gradient.get(node);
            let rz = vertical_weight(ws.alpha_v[node]);
            let base = ws.u0.get(node);
            u.set(node, base + Vec3::new(rh * g.x, rh * g.y, rz * g.z));
        }
        Ok(())
    }

    /// Nodal divergence of a field on this solver's mesh, for diagnostics
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::NotInitialized`] before `initialize`.
    pub fn divergence(&self, u: &VectorField) -> Result<ScalarField> {
        let ws = self.workspace()?;
        ws.mesh.check_len("velocity", u.len())?;
        Ok(ws.elements.divergence(u))
    }

    /// Current potential, if allocated
    #[must_use]
    pub fn phi(&self) -> Option<&[f64]> {
        self.workspace.as_ref().map(|ws| ws.phi.as_slice())
    }

    /// Current right-hand side, if allocated
    #[must_use]
    pub fn rhs(&self) -> Option<&[f64]> {
        self.workspace.as_ref().map(|ws| ws.rhs.as_slice())
    }

    /// Current stiffness matrix, if allocated
    #[must_use]
    pub fn matrix(&self) -> Option<&CrsMatrix> {
        self.workspace.as_ref().map(|ws| &ws.matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conservation::Stability;
    use crate::linalg::vector_ops::norm2;
    use crate::progress::RecordingProgress;
    use std::f64::consts::PI;

    fn divergent_field(mesh: &Mesh) -> VectorField {
        let (_, max) = mesh.bounding_box();
        VectorField::from_fn(mesh, |p| Vec3::new(5.0 + 2.0 * (PI * p.x / max.x).sin(), 0.0, 0.0))
    }

    fn project<'m>(
        mesh: &'m Mesh,
        u0: &VectorField,
        rule: QuadratureRule,
    ) -> (MassConservation<'m>, VectorField) {
        let mut projection = MassConservation::new(rule);
        projection.initialize(mesh, u0).unwrap();
        projection.set_stability(&Stability::Neutral).unwrap();
        projection.discretize().unwrap();
        projection.set_boundary_conditions().unwrap();
        let report = projection
            .solve_with_fallback(&LinearSolverConfig::default(), &RecordingProgress::new())
            .unwrap();
        assert!(report.converged());

        let mut u = VectorField::new(mesh);
        projection.compute_uvw_field(&mut u).unwrap();
        (projection, u)
    }

    #[test]
    fn test_uniform_flow_is_unchanged() {
        let mesh = Mesh::flat(5, 5, 4, 100.0, 50.0).unwrap();
        let u0 = VectorField::uniform(&mesh, Vec3::new(5.0, -3.0, 0.0));
        let (projection, u) = project(&mesh, &u0, QuadratureRule::One);

        assert!(projection.rhs().unwrap().iter().all(|r| r.abs() < 1e-9));
        for n in 0..mesh.numnp() {
            assert!((u.get(n) - u0.get(n)).norm() < 1e-9);
        }
    }

    #[test]
    fn test_projection_reduces_divergence() {
        let mesh = Mesh::flat(11, 11, 8, 100.0, 50.0).unwrap();
        let u0 = divergent_field(&mesh);
        let (projection, u) = project(&mesh, &u0, QuadratureRule::Eight);

        let before = projection.divergence(&u0).unwrap();
        let after = projection.divergence(&u).unwrap();

        // Interior nodes away from the boundary rows and the ground
        let mut max_before: f64 = 0.0;
        let mut max_after: f64 = 0.0;
        for k in 2..6 {
            for i in 2..9 {
                for j in 2..9 {
                    max_before = max_before.max(before.get(i, j, k).abs());
                    max_after = max_after.max(after.get(i, j, k).abs());
                }
            }
        }
        assert!(max_before > 1e-3);
        assert!(max_after < 0.5 * max_before, "{max_after} vs {max_before}");
    }

    #[test]
    fn test_linear_system_is_satisfied() {
        let mesh = Mesh::flat(6, 6, 5, 50.0, 25.0).unwrap();
        let u0 = divergent_field(&mesh);
        let (projection, _) = project(&mesh, &u0, QuadratureRule::One);

        let a = projection.matrix().unwrap();
        let phi = projection.phi().unwrap();
        let rhs = projection.rhs().unwrap();
        let mut ax = vec![0.0; phi.len()];
        a.mul_vec(phi, &mut ax);
        let residual: Vec<f64> = ax.iter().zip(rhs).map(|(l, r)| l - r).collect();
        assert!(norm2(&residual) <= 1e-5 * norm2(rhs));

        // Φ vanishes on the Dirichlet boundary
        let boundary = boundary_mask(&mesh);
        assert!(phi.iter().zip(&boundary).all(|(p, &b)| !b || *p == 0.0));
    }

    #[test]
    fn test_lifecycle_errors() {
        let mesh = Mesh::flat(3, 3, 3, 10.0, 10.0).unwrap();
        let u0 = VectorField::new(&mesh);
        let mut projection = MassConservation::new(QuadratureRule::One);

        assert!(matches!(
            projection.discretize(),
            Err(SolverError::NotInitialized { .. })
        ));
        projection.initialize(&mesh, &u0).unwrap();
        assert!(matches!(
            projection.initialize(&mesh, &u0),
            Err(SolverError::AlreadyInitialized { .. })
        ));
        assert!(matches!(
            projection.set_boundary_conditions(),
            Err(SolverError::OutOfOrder { .. })
        ));
        let mut u = VectorField::new(&mesh);
        assert!(projection.compute_uvw_field(&mut u).is_err());

        projection.deallocate();
        assert_eq!(projection.stage(), ProjectionStage::Uninitialized);
        assert!(projection.phi().is_none());
        projection.initialize(&mesh, &u0).unwrap();
    }

    #[test]
    fn test_rejects_meaningless_stability() {
        let mesh = Mesh::flat(3, 3, 3, 10.0, 10.0).unwrap();
        let u0 = VectorField::uniform(&mesh, Vec3::new(1.0, 0.0, 0.0));
        let mut projection = MassConservation::new(QuadratureRule::One);
        projection.initialize(&mesh, &u0).unwrap();

        for alpha in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                projection.set_stability(&Stability::Alpha(alpha)),
                Err(SolverError::InvalidConfig(_))
            ));
        }
        projection.set_stability(&Stability::Alpha(0.5)).unwrap();
    }

    #[test]
    fn test_stability_scales_vertical_correction() {
        let mesh = Mesh::flat(7, 7, 6, 100.0, 50.0).unwrap();
        let u0 = divergent_field(&mesh);

        let (_, neutral) = project(&mesh, &u0, QuadratureRule::One);

        let mut projection = MassConservation::new(QuadratureRule::One);
        projection.initialize(&mesh, &u0).unwrap();
        projection.set_stability(&Stability::Alpha(0.25)).unwrap();
        projection.discretize().unwrap();
        projection.set_boundary_conditions().unwrap();
        projection
            .solve_with_fallback(&LinearSolverConfig::default(), &RecordingProgress::new())
            .unwrap();
        let mut stable = VectorField::new(&mesh);
        projection.compute_uvw_field(&mut stable).unwrap();

        // Stable air resists vertical motion
        let max_w = |f: &VectorField| f.z().max_abs();
        assert!(max_w(&stable) < max_w(&neutral));
    }
}
