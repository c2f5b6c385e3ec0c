//! Vector and matrix aliases for 3D positions, directions and Jacobians.

use nalgebra::{Matrix3, Vector3};

/// 3D vector type for node positions, velocities and trace directions.
///
/// This is a simple alias for `nalgebra::Vector3<f64>`. The flow solver works
/// in double precision throughout.
pub type Vec3 = Vector3<f64>;

/// 3×3 matrix, used for the volume Jacobian of hexahedral elements.
pub type Mat3 = Matrix3<f64>;
