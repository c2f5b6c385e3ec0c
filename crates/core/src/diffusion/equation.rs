//! Finite-element diffusion of a velocity field over one time step
//!
//! The element stiffness `S` carries the mixing-length diffusivity and the
//! consistent capacitance `C` carries `Rc = 1`. The schemes combine them as
//!
//! ```text
//!  explicit lumped:  CL (uⁿ⁺¹ - uⁿ) / Δt = -S uⁿ            CL = row sums of C
//!  backward:         (S + C/Δt) uⁿ⁺¹    = (C/Δt) uⁿ
//!  central:          (C + Δt/2 S) uⁿ⁺¹  = (C - Δt/2 S) uⁿ
//! ```
//!
//! The implicit schemes hold the lateral faces, the top and the ground at the
//! incoming field. All schemes leave ground nodes at their incoming value.

use crate::core_types::Vec3;
use crate::error::{Result, SolverError};
use crate::fem::{FiniteElement, QuadratureRule};
use crate::field::VectorField;
use crate::linalg::{LinearSolver, LinearSolverConfig};
use crate::mesh::Mesh;
use crate::progress::ProgressSink;
use crate::sparse::{boundary_mask, ground_mask, CrsMatrix};
use serde::{Deserialize, Serialize};
use tracing::debug;

const COMPONENT: &str = "diffusion";

type ElementMatrix = [[f64; 8]; 8];

/// Time discretization of the diffusion equation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DiffusionScheme {
    /// Forward Euler with a lumped capacitance; no linear solve
    #[default]
    ExplicitLumpedCapacitance,
    /// Backward Euler
    ImplicitBackwardDifference,
    /// Crank–Nicolson
    ImplicitCentralDifference,
}

impl DiffusionScheme {
    #[must_use]
    pub fn is_implicit(self) -> bool {
        !matches!(self, DiffusionScheme::ExplicitLumpedCapacitance)
    }

    /// Left-hand element matrix (implicit schemes only) and the operator
    /// applied to the incoming field to form the right-hand side
    fn element_operators(self, s: &ElementMatrix, c: &ElementMatrix, dt: f64) -> (Option<ElementMatrix>, ElementMatrix) {
        let combine = |fs: f64, fc: f64| {
            let mut m = [[0.0; 8]; 8];
            for a in 0..8 {
                for b in 0..8 {
                    m[a][b] = fs * s[a][b] + fc * c[a][b];
                }
            }
            m
        };
        match self {
            DiffusionScheme::ExplicitLumpedCapacitance => (None, combine(-1.0, 0.0)),
            DiffusionScheme::ImplicitBackwardDifference => {
                (Some(combine(1.0, 1.0 / dt)), combine(0.0, 1.0 / dt))
            }
            DiffusionScheme::ImplicitCentralDifference => {
                (Some(combine(0.5 * dt, 1.0)), combine(-0.5 * dt, 1.0))
            }
        }
    }
}

/// Diffusion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffusionConfig {
    pub scheme: DiffusionScheme,

    /// `c` in `R = c · height · |∂speed/∂z|`
    pub mixing_length_coefficient: f64,

    /// Volume quadrature used for the element matrices
    pub quadrature: QuadratureRule,
}

impl Default for DiffusionConfig {
    fn default() -> Self {
        Self {
            scheme: DiffusionScheme::default(),
            mixing_length_coefficient: 0.4,
            quadrature: QuadratureRule::One,
        }
    }
}

/// Whether the buffers of a [`DiffusionEquation`] exist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffusionState {
    Uninitialized,
    Allocated,
}

/// Stiffness system shared by the three components of an implicit step
#[derive(Debug)]
struct ImplicitSystem {
    matrix: CrsMatrix,
    fixed: Vec<bool>,
    solver: LinearSolver,
}

#[derive(Debug)]
struct Workspace<'m> {
    mesh: &'m Mesh,
    config: DiffusionConfig,
    elements: FiniteElement<'m>,
    height: Vec<f64>,
    speed: Vec<f64>,
    speed_gradient: VectorField,
    u0: VectorField,
    rhs: [Vec<f64>; 3],
    capacitance: Vec<f64>,
    phi: Vec<f64>,
    ground: Vec<bool>,
    implicit: Option<ImplicitSystem>,
    discretized_dt: Option<f64>,
    boundary_applied: bool,
}

/// Diffusion solver for one mesh, reused across time steps
#[derive(Debug, Default)]
pub struct DiffusionEquation<'m> {
    workspace: Option<Workspace<'m>>,
}

impl<'m> DiffusionEquation<'m> {
    #[must_use]
    pub fn new() -> Self {
        Self { workspace: None }
    }

    #[must_use]
    pub fn state(&self) -> DiffusionState {
        if self.workspace.is_some() {
            DiffusionState::Allocated
        } else {
            DiffusionState::Uninitialized
        }
    }

    /// Allocate buffers and record each node's height above the ground
    ///
    /// The implicit schemes also build their own compressed-row matrix.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::AlreadyInitialized`] if called twice without
    /// [`deallocate`](Self::deallocate), and any mesh error from building the
    /// matrix structure or element geometry.
    pub fn initialize(&mut self, mesh: &'m Mesh, config: &DiffusionConfig) -> Result<()> {
        if self.workspace.is_some() {
            return Err(SolverError::AlreadyInitialized {
                component: COMPONENT,
            });
        }

        let numnp = mesh.numnp();
        let height = (0..numnp)
            .map(|node| {
                let (i, j, k) = mesh.ijk(node);
                mesh.z(i, j, k) - mesh.z(i, j, 0)
            })
            .collect();

        let ground = ground_mask(mesh);
        let implicit = if config.scheme.is_implicit() {
            let fixed = boundary_mask(mesh)
                .into_iter()
                .zip(&ground)
                .map(|(boundary, &ground)| boundary || ground)
                .collect();
            Some(ImplicitSystem {
                matrix: CrsMatrix::for_mesh(mesh)?,
                fixed,
                solver: LinearSolver::new(numnp),
            })
        } else {
            None
        };

        self.workspace = Some(Workspace {
            mesh,
            config: config.clone(),
            elements: FiniteElement::new(mesh, config.quadrature)?,
            height,
            speed: vec![0.0; numnp],
            speed_gradient: VectorField::new(mesh),
            u0: VectorField::new(mesh),
            rhs: [vec![0.0; numnp], vec![0.0; numnp], vec![0.0; numnp]],
            capacitance: vec![0.0; numnp],
            phi: vec![0.0; numnp],
            ground,
            implicit,
            discretized_dt: None,
            boundary_applied: false,
        });
        debug!("Diffusion ({:?}) initialized for {} nodes", config.scheme, numnp);
        Ok(())
    }

    /// Release all buffers
    pub fn deallocate(&mut self) {
        self.workspace = None;
    }

    fn workspace_mut(&mut self) -> Result<&mut Workspace<'m>> {
        self.workspace.as_mut().ok_or(SolverError::NotInitialized {
            component: COMPONENT,
        })
    }

    /// Build the step operators from the field `u` and time step `dt`
    ///
    /// Computes the horizontal speed, its smoothed vertical gradient and the
    /// diffusivity at every quadrature point, then assembles the capacitance,
    /// the right-hand sides of all three components and, for the implicit
    /// schemes, the system matrix.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::NotInitialized`] before `initialize`,
    /// [`SolverError::InvalidTimeStep`] unless `dt` is positive and finite, and
    /// [`SolverError::SizeMismatch`] if `u` does not match the mesh.
    pub fn discretize(&mut self, u: &VectorField, dt: f64) -> Result<()> {
        check_time_step(dt)?;
        let ws = self.workspace_mut()?;
        ws.mesh.check_len("diffusion velocity", u.len())?;

        ws.u0.clone_from(u);
        for (node, speed) in ws.speed.iter_mut().enumerate() {
            *speed = u.x()[node].hypot(u.y()[node]);
        }
        ws.speed_gradient = ws.elements.smoothed_gradient(&ws.speed);

        let Workspace {
            config,
            elements,
            height,
            speed_gradient,
            u0,
            rhs,
            capacitance,
            implicit,
            discretized_dt,
            boundary_applied,
            ..
        } = ws;

        for r in &mut *rhs {
            r.fill(0.0);
        }
        capacitance.fill(0.0);
        if let Some(system) = implicit.as_mut() {
            system.matrix.clear();
        }

        let height: &[f64] = height;
        let dspeed_dz = speed_gradient.z().as_slice();
        let components = [u0.x().as_slice(), u0.y().as_slice(), u0.z().as_slice()];
        let coefficient = config.mixing_length_coefficient;
        let scheme = config.scheme;

        elements.map_elements(
            |_, nodes, qps| {
                let mut stiffness = [[0.0; 8]; 8];
                let mut capacity = [[0.0; 8]; 8];
                for qp in qps {
                    let diffusivity = coefficient
                        * qp.interpolate(nodes, height)
                        * qp.interpolate(nodes, dspeed_dz).abs();
                    qp.add_stiffness(&Vec3::repeat(diffusivity), &mut stiffness);
                    qp.add_capacitance(1.0, &mut capacity);
                }

                let (lhs, operator) = scheme.element_operators(&stiffness, &capacity, dt);
                let mut loads = [[0.0; 8]; 3];
                for (load, values) in loads.iter_mut().zip(&components) {
                    for a in 0..8 {
                        load[a] = (0..8).map(|b| operator[a][b] * values[nodes[b]]).sum();
                    }
                }
                let lumped = capacity.map(|row| row.iter().sum::<f64>());
                (lhs, loads, lumped)
            },
            |nodes, (lhs, loads, lumped)| {
                if let (Some(system), Some(lhs)) = (implicit.as_mut(), lhs) {
                    system.matrix.assemble_element(nodes, &lhs);
                }
                for (a, &node) in nodes.iter().enumerate() {
                    for (r, load) in rhs.iter_mut().zip(&loads) {
                        r[node] += load[a];
                    }
                    capacitance[node] += lumped[a];
                }
            },
        );

        *discretized_dt = Some(dt);
        *boundary_applied = false;
        Ok(())
    }

    /// Hold the lateral faces, the top and the ground at the discretized field
    ///
    /// Only the implicit schemes have anything to fix. Repeated calls after one
    /// discretization are no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::OutOfOrder`] before [`discretize`](Self::discretize).
    pub fn set_boundary_conditions(&mut self) -> Result<()> {
        let ws = self.workspace_mut()?;
        if ws.discretized_dt.is_none() {
            return Err(SolverError::OutOfOrder {
                component: COMPONENT,
                operation: "set_boundary_conditions",
                required: "discretize",
            });
        }
        if ws.boundary_applied {
            return Ok(());
        }

        if let Some(system) = ws.implicit.as_mut() {
            let values = [ws.u0.x().as_slice(), ws.u0.y().as_slice(), ws.u0.z().as_slice()];
            // Every component shares the matrix, so lift all of them before
            // the fixed rows and columns are cleared.
            for (r, v) in ws.rhs.iter_mut().zip(&values) {
                system.matrix.lift_dirichlet(r, &system.fixed, v);
            }
            system.matrix.eliminate_dirichlet(&system.fixed);
            for (r, v) in ws.rhs.iter_mut().zip(&values) {
                for (node, &fixed) in system.fixed.iter().enumerate() {
                    if fixed {
                        r[node] = v[node];
                    }
                }
            }
        }

        ws.boundary_applied = true;
        Ok(())
    }

    /// Diffuse `u1` over `dt` and write the result into `u`
    ///
    /// Discretizes from `u1` and applies boundary conditions before stepping.
    /// The implicit schemes solve the three components in turn, each starting
    /// from its incoming value.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::NotInitialized`] before `initialize`,
    /// [`SolverError::InvalidTimeStep`] for a non-positive `dt`,
    /// [`SolverError::SizeMismatch`] for fields that do not match the mesh and
    /// [`SolverError::SolverDiverged`] if an implicit component cannot be
    /// solved.
    pub fn solve(
        &mut self,
        u1: &VectorField,
        u: &mut VectorField,
        dt: f64,
        config: &LinearSolverConfig,
        sink: &dyn ProgressSink,
    ) -> Result<()> {
        check_time_step(dt)?;
        self.workspace_mut()?.mesh.check_len("diffused velocity", u.len())?;
        self.discretize(u1, dt)?;
        self.set_boundary_conditions()?;

        let ws = self.workspace_mut()?;
        let Workspace {
            rhs,
            capacitance,
            phi,
            ground,
            implicit,
            ..
        } = ws;

        match implicit.as_mut() {
            None => {
                debug!("Solving diffusion with lumped capacitance");
                for axis in 0..3 {
                    let source = u1.component(axis).as_slice();
                    let target = u.component_mut(axis).as_mut_slice();
                    for node in 0..target.len() {
                        target[node] = if ground[node] || capacitance[node] <= 0.0 {
                            source[node]
                        } else {
                            source[node] + dt * rhs[axis][node] / capacitance[node]
                        };
                    }
                }
            }
            Some(ImplicitSystem { matrix, solver, .. }) => {
                for axis in 0..3 {
                    phi.copy_from_slice(u1.component(axis).as_slice());
                    solver.solve_with_fallback(matrix, phi, &rhs[axis], config, sink, COMPONENT)?;
                    u.component_mut(axis).as_mut_slice().copy_from_slice(phi);
                }
                for node in 0..u.len() {
                    if ground[node] {
                        u.set(node, u1.get(node));
                    }
                }
            }
        }
        Ok(())
    }

    /// Lumped capacitance of the last discretization
    #[must_use]
    pub fn lumped_capacitance(&self) -> Option<&[f64]> {
        self.workspace.as_ref().map(|ws| ws.capacitance.as_slice())
    }

    /// Height of every node above the ground beneath it
    #[must_use]
    pub fn height_above_ground(&self) -> Option<&[f64]> {
        self.workspace.as_ref().map(|ws| ws.height.as_slice())
    }
}

fn check_time_step(dt: f64) -> Result<()> {
    if dt.is_finite() && dt > 0.0 {
        Ok(())
    } else {
        Err(SolverError::InvalidTimeStep(dt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingProgress;
    use approx::assert_relative_eq;

    const SHEAR: f64 = 0.5;

    /// `u = 1 + a z`, so `∂²u/∂z² = 0` and the only change comes from the
    /// growth of the diffusivity with height: `∂u/∂t = c a²`
    fn shear_flow(mesh: &Mesh) -> VectorField {
        VectorField::from_fn(mesh, |p| Vec3::new(1.0 + SHEAR * p.z, 0.0, 0.0))
    }

    fn step(mesh: &Mesh, scheme: DiffusionScheme, u1: &VectorField, dt: f64) -> VectorField {
        let mut diffusion = DiffusionEquation::new();
        let config = DiffusionConfig {
            scheme,
            ..DiffusionConfig::default()
        };
        diffusion.initialize(mesh, &config).unwrap();
        let solver_config = LinearSolverConfig {
            tolerance: 1e-10,
            ..LinearSolverConfig::default()
        };
        let mut u = VectorField::new(mesh);
        diffusion
            .solve(u1, &mut u, dt, &solver_config, &RecordingProgress::new())
            .unwrap();
        u
    }

    #[test]
    fn test_explicit_step_matches_mixing_length_rate() {
        let mesh = Mesh::flat(5, 5, 6, 10.0, 10.0).unwrap();
        let u1 = shear_flow(&mesh);
        let dt = 2.0;
        let u = step(&mesh, DiffusionScheme::ExplicitLumpedCapacitance, &u1, dt);

        let expected = dt * 0.4 * SHEAR * SHEAR;
        for k in 1..5 {
            for i in 1..4 {
                for j in 1..4 {
                    let n = mesh.index(i, j, k);
                    assert_relative_eq!(u.x()[n] - u1.x()[n], expected, epsilon = 1e-9);
                    assert_relative_eq!(u.y()[n], 0.0, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_explicit_change_shrinks_with_time_step() {
        let mesh = Mesh::flat(5, 5, 6, 10.0, 10.0).unwrap();
        let u1 = shear_flow(&mesh);

        let change = |dt: f64| {
            let u = step(&mesh, DiffusionScheme::ExplicitLumpedCapacitance, &u1, dt);
            (0..mesh.numnp())
                .map(|n| (u.get(n) - u1.get(n)).norm())
                .fold(0.0, f64::max)
        };

        let full = change(2.0);
        let half = change(1.0);
        assert!(full > 0.0);
        assert!(half < full);
        assert_relative_eq!(half, 0.5 * full, epsilon = 1e-9);
    }

    #[test]
    fn test_ground_copies_incoming_field() {
        let mesh = Mesh::flat(5, 5, 5, 10.0, 10.0).unwrap();
        let u1 = shear_flow(&mesh);
        for scheme in [
            DiffusionScheme::ExplicitLumpedCapacitance,
            DiffusionScheme::ImplicitBackwardDifference,
            DiffusionScheme::ImplicitCentralDifference,
        ] {
            let u = step(&mesh, scheme, &u1, 2.0);
            for n in 0..mesh.layer_size() {
                assert_eq!(u.get(n), u1.get(n), "{scheme:?}");
            }
        }
    }

    #[test]
    fn test_implicit_schemes_hold_boundary_and_diffuse_interior() {
        let mesh = Mesh::flat(7, 7, 7, 10.0, 10.0).unwrap();
        let u1 = shear_flow(&mesh);
        let explicit_rate = 2.0 * 0.4 * SHEAR * SHEAR;

        for scheme in [
            DiffusionScheme::ImplicitBackwardDifference,
            DiffusionScheme::ImplicitCentralDifference,
        ] {
            let u = step(&mesh, scheme, &u1, 2.0);
            for n in 0..mesh.numnp() {
                let (i, j, k) = mesh.ijk(n);
                if mesh.is_boundary(i, j, k) {
                    assert_relative_eq!(u.x()[n], u1.x()[n], epsilon = 1e-5);
                }
            }
            let centre = mesh.index(3, 3, 3);
            let change = u.x()[centre] - u1.x()[centre];
            assert!(change > 0.0 && change < 1.5 * explicit_rate, "{scheme:?}: {change}");
        }
    }

    #[test]
    fn test_uniform_flow_does_not_diffuse() {
        let mesh = Mesh::flat(4, 4, 4, 10.0, 10.0).unwrap();
        let u1 = VectorField::uniform(&mesh, Vec3::new(3.0, -1.0, 0.0));
        for scheme in [
            DiffusionScheme::ExplicitLumpedCapacitance,
            DiffusionScheme::ImplicitCentralDifference,
        ] {
            let u = step(&mesh, scheme, &u1, 5.0);
            for n in 0..mesh.numnp() {
                assert!((u.get(n) - u1.get(n)).norm() < 1e-6, "{scheme:?}");
            }
        }
    }

    #[test]
    fn test_height_above_terrain() {
        let mesh = Mesh::flat(3, 3, 4, 10.0, 7.5).unwrap();
        let mut diffusion = DiffusionEquation::new();
        diffusion.initialize(&mesh, &DiffusionConfig::default()).unwrap();
        let height = diffusion.height_above_ground().unwrap();
        assert_eq!(height[mesh.index(1, 1, 0)], 0.0);
        assert_relative_eq!(height[mesh.index(2, 0, 3)], 22.5);
    }

    #[test]
    fn test_lifecycle_errors() {
        let mesh = Mesh::flat(3, 3, 3, 10.0, 10.0).unwrap();
        let u1 = VectorField::new(&mesh);
        let mut diffusion = DiffusionEquation::new();

        assert!(matches!(
            diffusion.discretize(&u1, 1.0),
            Err(SolverError::NotInitialized { .. })
        ));
        let config = DiffusionConfig {
            scheme: DiffusionScheme::ImplicitBackwardDifference,
            ..DiffusionConfig::default()
        };
        diffusion.initialize(&mesh, &config).unwrap();
        assert_eq!(diffusion.state(), DiffusionState::Allocated);
        assert!(matches!(
            diffusion.initialize(&mesh, &config),
            Err(SolverError::AlreadyInitialized { .. })
        ));
        assert!(matches!(
            diffusion.set_boundary_conditions(),
            Err(SolverError::OutOfOrder { .. })
        ));

        let mut u = VectorField::new(&mesh);
        let sink = RecordingProgress::new();
        let config = LinearSolverConfig::default();
        assert!(matches!(
            diffusion.solve(&u1, &mut u, 0.0, &config, &sink),
            Err(SolverError::InvalidTimeStep(_))
        ));
        assert!(matches!(
            diffusion.solve(&u1, &mut u, f64::NAN, &config, &sink),
            Err(SolverError::InvalidTimeStep(_))
        ));

        diffusion.deallocate();
        assert_eq!(diffusion.state(), DiffusionState::Uninitialized);
        assert!(diffusion.lumped_capacitance().is_none());
    }
}
