//! First-order semi-Lagrangian transport of vector and scalar fields

use crate::core_types::Vec3;
use crate::error::{Result, SolverError};
use crate::fem::element::interpolate;
use crate::field::{ScalarField, VectorField};
use crate::mesh::{CellLocation, Mesh};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Times a departure point outside the mesh is retried with half the
    /// previous time step
    pub max_halvings: u32,

    /// Once the halvings run out, clamp the full-step departure point onto
    /// the mesh instead of failing
    pub clip_to_boundary: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_halvings: 30,
            clip_to_boundary: true,
        }
    }
}

/// Backward-tracing transport
#[derive(Debug, Clone, Default)]
pub struct SemiLagrangian {
    config: TransportConfig,
}

impl SemiLagrangian {
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Position of a particle starting at `node` after moving for `dt` along
    /// the node's velocity in `u0`
    ///
    /// A negative `dt` traces backward. A particle at rest stays where it is.
    #[must_use]
    pub fn trace_particle(mesh: &Mesh, u0: &VectorField, dt: f64, node: usize) -> Vec3 {
        let start = mesh.position(node);
        let velocity = u0.get(node);
        let speed = velocity.norm();
        if speed == 0.0 {
            return start;
        }
        start + velocity / speed * (dt * speed)
    }

    /// Departure point of `node`, halving the time step while it falls
    /// outside the mesh
    ///
    /// Edge and corner outlets whose velocity points out through one of their
    /// faces never trace inside; those are clamped when allowed.
    fn departure(&self, mesh: &Mesh, u0: &VectorField, dt: f64, node: usize) -> Result<CellLocation> {
        let mut step = -dt;
        for halving in 0..=self.config.max_halvings {
            let end = Self::trace_particle(mesh, u0, step, node);
            if let Some(location) = mesh.locate(&end) {
                if halving > 0 {
                    trace!("Node {} traced inside the mesh after {} halvings", node, halving);
                }
                return Ok(location);
            }
            step *= 0.5;
        }

        if self.config.clip_to_boundary {
            let end = Self::trace_particle(mesh, u0, -dt, node);
            if let Some(location) = mesh.locate(&mesh.clamp_point(&end)) {
                trace!("Node {} departure clamped onto the mesh", node);
                return Ok(location);
            }
        }
        Err(SolverError::ParticleTraceFailed {
            node,
            retries: self.config.max_halvings,
        })
    }

    /// Advect `u0` by itself for `dt` into `u1`
    ///
    /// Ground nodes are set to zero, inlet nodes keep their value from `u0`,
    /// and every other node takes `u0` interpolated at its departure point.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::InvalidTimeStep`] unless `dt` is positive and
    /// finite, [`SolverError::SizeMismatch`] for fields that do not match the
    /// mesh and [`SolverError::ParticleTraceFailed`] if a departure point
    /// cannot be brought inside the mesh.
    pub fn transport_vector(&self, mesh: &Mesh, u0: &VectorField, u1: &mut VectorField, dt: f64) -> Result<()> {
        check_time_step(dt)?;
        mesh.check_len("transported velocity", u0.len())?;
        mesh.check_len("output velocity", u1.len())?;

        let values = (0..mesh.numnp())
            .into_par_iter()
            .map(|node| {
                if u0.is_on_ground(node) {
                    return Ok(Vec3::zeros());
                }
                if u0.is_inlet_node(node) {
                    return Ok(u0.get(node));
                }
                let location = self.departure(mesh, u0, dt, node)?;
                Ok(Vec3::new(
                    interpolate(mesh, &location, u0.x().as_slice()),
                    interpolate(mesh, &location, u0.y().as_slice()),
                    interpolate(mesh, &location, u0.z().as_slice()),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        for (node, value) in values.into_iter().enumerate() {
            u1.set(node, value);
        }
        Ok(())
    }

    /// Advect the scalar `s0` by the flow `u0` for `dt` into `s1`
    ///
    /// Ground and inlet nodes keep their value from `s0`.
    ///
    /// # Errors
    ///
    /// As [`transport_vector`](Self::transport_vector).
    pub fn transport_scalar(
        &self,
        mesh: &Mesh,
        u0: &VectorField,
        s0: &ScalarField,
        s1: &mut ScalarField,
        dt: f64,
    ) -> Result<()> {
        check_time_step(dt)?;
        mesh.check_len("flow velocity", u0.len())?;
        mesh.check_len("transported scalar", s0.len())?;
        mesh.check_len("output scalar", s1.len())?;

        let source = s0.as_slice();
        s1.as_mut_slice()
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(node, value)| {
                *value = if u0.is_on_ground(node) || u0.is_inlet_node(node) {
                    source[node]
                } else {
                    interpolate(mesh, &self.departure(mesh, u0, dt, node)?, source)
                };
                Ok(())
            })
    }
}

fn check_time_step(dt: f64) -> Result<()> {
    if dt.is_finite() && dt > 0.0 {
        Ok(())
    } else {
        Err(SolverError::InvalidTimeStep(dt))
    }
}
