//! Initial velocity fields
//!
//! A run starts from a field produced by a [`FieldInitializer`]. The solver
//! only needs one velocity per node; how it is obtained (a domain average,
//! station data, a coarse weather model) is up to the implementation.

use crate::core_types::Vec3;
use crate::error::{Result, SolverError};
use crate::field::VectorField;
use crate::mesh::Mesh;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Reference height of a standard wind measurement (m)
pub const INPUT_HEIGHT_DEFAULT: f64 = 10.0;

/// Roughness length of low vegetation (m)
pub const ROUGHNESS_DEFAULT: f64 = 0.3;

/// Producer of the initial velocity field of a run
pub trait FieldInitializer: Send + Sync {
    /// Velocity at every node of `mesh`
    ///
    /// # Errors
    ///
    /// Implementations report invalid settings as
    /// [`SolverError::InvalidConfig`].
    fn initialize_fields(&self, mesh: &Mesh) -> Result<VectorField>;
}

/// The same velocity at every node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformInitializer {
    pub velocity: Vec3,
}

impl FieldInitializer for UniformInitializer {
    fn initialize_fields(&self, mesh: &Mesh) -> Result<VectorField> {
        Ok(VectorField::uniform(mesh, self.velocity))
    }
}

/// A single domain-average wind spread over the mesh with a logarithmic
/// profile
///
/// ```text
///  speed(z) = speed_in · ln(z / z0) / ln(z_in / z0)     z > z0
///  speed(z) = 0                                          z ≤ z0
/// ```
///
/// where `z` is the height above the ground beneath the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainAverageInitializer {
    /// Wind speed at `input_height` (m/s)
    pub speed: f64,

    /// Direction the wind blows from, degrees clockwise from north
    pub direction_deg: f64,

    /// Height above ground of the input speed (m)
    pub input_height: f64,

    /// Surface roughness length `z0` (m)
    pub roughness_length: f64,
}

impl Default for DomainAverageInitializer {
    fn default() -> Self {
        Self {
            speed: 5.0,
            direction_deg: 270.0,
            input_height: INPUT_HEIGHT_DEFAULT,
            roughness_length: ROUGHNESS_DEFAULT,
        }
    }
}

impl DomainAverageInitializer {
    /// Unit horizontal vector the wind blows toward
    #[must_use]
    pub fn heading(&self) -> Vec3 {
        let theta = self.direction_deg.to_radians();
        Vec3::new(-theta.sin(), -theta.cos(), 0.0)
    }

    /// Profile speed at `height` above ground
    #[must_use]
    pub fn speed_at(&self, height: f64) -> f64 {
        let z0 = self.roughness_length;
        if height <= z0 {
            return 0.0;
        }
        self.speed * (height / z0).ln() / (self.input_height / z0).ln()
    }
}

impl FieldInitializer for DomainAverageInitializer {
    fn initialize_fields(&self, mesh: &Mesh) -> Result<VectorField> {
        if self.roughness_length <= 0.0 || self.input_height <= self.roughness_length {
            return Err(SolverError::InvalidConfig(format!(
                "log profile needs 0 < roughness ({} m) < input height ({} m)",
                self.roughness_length, self.input_height
            )));
        }
        if !self.speed.is_finite() || self.speed < 0.0 {
            return Err(SolverError::InvalidConfig(format!(
                "input speed must be finite and non-negative, got {}",
                self.speed
            )));
        }

        let heading = self.heading();
        let mut field = VectorField::new(mesh);
        for node in 0..mesh.numnp() {
            let (i, j, k) = mesh.ijk(node);
            let height = mesh.z(i, j, k) - mesh.z(i, j, 0);
            field.set(node, heading * self.speed_at(height));
        }

        debug!(
            "Domain-average initialization: {} m/s from {}° at {} m",
            self.speed, self.direction_deg, self.input_height
        );
        Ok(field)
    }
}
