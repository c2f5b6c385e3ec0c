//! Trilinear 8-node hexahedral element
//!
//! # Shape functions
//!
//! ```text
//! N_k(u, v, w) = 1/8 (1 + u u_k)(1 + v v_k)(1 + w w_k)
//! ```
//!
//! where `(u_k, v_k, w_k)` are the parent coordinates of local node `k`.
//!
//! # Jacobian
//!
//! ```text
//! J[r][c] = Σ_k ∂N_k/∂ξ_c · X_k,r        ∇ₓN = J⁻ᵀ ∇_ξ N        dV = det(J)
//! ```

use crate::core_types::{Mat3, Vec3};
use crate::error::{Result, SolverError};
use crate::mesh::{CellLocation, Mesh};
use serde::{Deserialize, Serialize};

/// Parent coordinates of the 8 local nodes
pub const LOCAL_NODES: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

/// Gauss–Legendre volume quadrature rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuadratureRule {
    /// One point at the element centre, weight 8
    #[default]
    One,
    /// 2×2×2 points at ±1/√3, weight 1
    Eight,
    /// 3×3×3 points at 0 and ±√0.6
    TwentySeven,
}

impl QuadratureRule {
    /// Rule with the given number of points
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::InvalidQuadrature`] for anything other than 1, 8 or 27.
    pub fn from_count(count: usize) -> Result<Self> {
        match count {
            1 => Ok(QuadratureRule::One),
            8 => Ok(QuadratureRule::Eight),
            27 => Ok(QuadratureRule::TwentySeven),
            other => Err(SolverError::InvalidQuadrature(other)),
        }
    }

    #[must_use]
    pub fn count(self) -> usize {
        match self {
            QuadratureRule::One => 1,
            QuadratureRule::Eight => 8,
            QuadratureRule::TwentySeven => 27,
        }
    }

    /// Parent coordinates and weights of every point
    #[must_use]
    pub fn points(self) -> Vec<([f64; 3], f64)> {
        let (abscissae, weights): (Vec<f64>, Vec<f64>) = match self {
            QuadratureRule::One => return vec![([0.0, 0.0, 0.0], 8.0)],
            QuadratureRule::Eight => {
                let a = 1.0 / 3.0_f64.sqrt();
                (vec![-a, a], vec![1.0, 1.0])
            }
            QuadratureRule::TwentySeven => {
                let a = 0.6_f64.sqrt();
                (vec![-a, 0.0, a], vec![5.0 / 9.0, 8.0 / 9.0, 5.0 / 9.0])
            }
        };

        let mut points = Vec::with_capacity(self.count());
        for (iw, &w) in abscissae.iter().enumerate() {
            for (iv, &v) in abscissae.iter().enumerate() {
                for (iu, &u) in abscissae.iter().enumerate() {
                    points.push(([u, v, w], weights[iu] * weights[iv] * weights[iw]));
                }
            }
        }
        points
    }
}

/// Shape function values at parent coordinates `(u, v, w)`
#[must_use]
pub fn shape_functions(u: f64, v: f64, w: f64) -> [f64; 8] {
    LOCAL_NODES.map(|[uk, vk, wk]| 0.125 * (1.0 + u * uk) * (1.0 + v * vk) * (1.0 + w * wk))
}

/// Shape function derivatives `[∂N/∂u, ∂N/∂v, ∂N/∂w]` at parent coordinates
#[must_use]
pub fn shape_derivatives(u: f64, v: f64, w: f64) -> [[f64; 3]; 8] {
    LOCAL_NODES.map(|[uk, vk, wk]| {
        [
            0.125 * uk * (1.0 + v * vk) * (1.0 + w * wk),
            0.125 * vk * (1.0 + u * uk) * (1.0 + w * wk),
            0.125 * wk * (1.0 + u * uk) * (1.0 + v * vk),
        ]
    })
}

/// Interpolate nodal values at a located point
#[must_use]
pub fn interpolate(mesh: &Mesh, location: &CellLocation, values: &[f64]) -> f64 {
    let element = mesh.element_index(location.cell_i, location.cell_j, location.cell_k);
    let nodes = mesh.element_nodes(element);
    shape_functions(location.u, location.v, location.w)
        .iter()
        .zip(nodes.iter())
        .map(|(n, &node)| n * values[node])
        .sum()
}

/// Everything an element integral needs at one quadrature point
#[derive(Debug, Clone)]
pub struct QuadraturePoint {
    /// Quadrature weight
    pub weight: f64,
    /// Shape function values
    pub shape: [f64; 8],
    /// Global shape function derivatives
    pub dndx: [f64; 8],
    pub dndy: [f64; 8],
    pub dndz: [f64; 8],
    /// Volume Jacobian determinant
    pub dv: f64,
    /// World position of the point
    pub position: Vec3,
}

impl QuadraturePoint {
    /// Evaluate the element geometry at one parent point
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::NegativeJacobian`] if the element is degenerate or
    /// inverted at this point.
    pub fn evaluate(
        element: usize,
        coordinates: &[Vec3; 8],
        parent: [f64; 3],
        weight: f64,
    ) -> Result<Self> {
        let [u, v, w] = parent;
        let shape = shape_functions(u, v, w);
        let derivatives = shape_derivatives(u, v, w);

        let mut jacobian = Mat3::zeros();
        for (node, d) in coordinates.iter().zip(derivatives.iter()) {
            for r in 0..3 {
                for c in 0..3 {
                    jacobian[(r, c)] += d[c] * node[r];
                }
            }
        }

        let det = jacobian.determinant();
        if det <= 0.0 || !det.is_finite() {
            return Err(SolverError::NegativeJacobian { element, det });
        }
        let inverse = jacobian
            .try_inverse()
            .ok_or(SolverError::NegativeJacobian { element, det })?;

        let mut dndx = [0.0; 8];
        let mut dndy = [0.0; 8];
        let mut dndz = [0.0; 8];
        for (k, d) in derivatives.iter().enumerate() {
            dndx[k] = inverse[(0, 0)] * d[0] + inverse[(1, 0)] * d[1] + inverse[(2, 0)] * d[2];
            dndy[k] = inverse[(0, 1)] * d[0] + inverse[(1, 1)] * d[1] + inverse[(2, 1)] * d[2];
            dndz[k] = inverse[(0, 2)] * d[0] + inverse[(1, 2)] * d[1] + inverse[(2, 2)] * d[2];
        }

        let position = coordinates
            .iter()
            .zip(shape.iter())
            .fold(Vec3::zeros(), |acc, (x, n)| acc + x * *n);

        Ok(Self {
            weight,
            shape,
            dndx,
            dndy,
            dndz,
            dv: det,
            position,
        })
    }

    /// Value of a nodal field at this point
    #[inline]
    #[must_use]
    pub fn interpolate(&self, nodes: &[usize; 8], values: &[f64]) -> f64 {
        (0..8).map(|k| self.shape[k] * values[nodes[k]]).sum()
    }

    /// Gradient of a nodal field at this point
    #[inline]
    #[must_use]
    pub fn gradient(&self, nodes: &[usize; 8], values: &[f64]) -> Vec3 {
        let mut g = Vec3::zeros();
        for k in 0..8 {
            let value = values[nodes[k]];
            g.x += self.dndx[k] * value;
            g.y += self.dndy[k] * value;
            g.z += self.dndz[k] * value;
        }
        g
    }

    /// Weighted stiffness `w (∂N_a/∂x Rx ∂N_b/∂x + ∂N_a/∂y Ry ∂N_b/∂y + ∂N_a/∂z Rz ∂N_b/∂z) dV`
    /// added into `s`
    #[inline]
    pub fn add_stiffness(&self, r: &Vec3, s: &mut [[f64; 8]; 8]) {
        let scale = self.weight * self.dv;
        for a in 0..8 {
            for b in 0..8 {
                s[a][b] += scale
                    * (self.dndx[a] * r.x * self.dndx[b]
                        + self.dndy[a] * r.y * self.dndy[b]
                        + self.dndz[a] * r.z * self.dndz[b]);
            }
        }
    }

    /// Weighted capacitance `w N_a Rc N_b dV` added into `c`
    #[inline]
    pub fn add_capacitance(&self, rc: f64, c: &mut [[f64; 8]; 8]) {
        let scale = self.weight * self.dv * rc;
        for a in 0..8 {
            for b in 0..8 {
                c[a][b] += scale * self.shape[a] * self.shape[b];
            }
        }
    }

    /// Weighted load `w N_a H dV` added into `q`
    #[inline]
    pub fn add_load(&self, h: f64, q: &mut [f64; 8]) {
        let scale = self.weight * self.dv * h;
        for (qa, na) in q.iter_mut().zip(self.shape.iter()) {
            *qa += scale * na;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_cube(dx: f64, dy: f64, dz: f64) -> [Vec3; 8] {
        LOCAL_NODES.map(|[u, v, w]| {
            Vec3::new((u + 1.0) * 0.5 * dx, (v + 1.0) * 0.5 * dy, (w + 1.0) * 0.5 * dz)
        })
    }

    #[test]
    fn test_shape_functions_partition_of_unity() {
        for &(u, v, w) in &[(0.0, 0.0, 0.0), (0.3, -0.7, 0.9), (-1.0, 1.0, -1.0)] {
            let n = shape_functions(u, v, w);
            assert_relative_eq!(n.iter().sum::<f64>(), 1.0, epsilon = 1e-14);
        }
        // Kronecker property at the nodes
        let n = shape_functions(1.0, 1.0, -1.0);
        assert_relative_eq!(n[2], 1.0);
        assert_relative_eq!(n[0], 0.0);
    }

    #[test]
    fn test_quadrature_weights_sum_to_volume() {
        for rule in [QuadratureRule::One, QuadratureRule::Eight, QuadratureRule::TwentySeven] {
            let points = rule.points();
            assert_eq!(points.len(), rule.count());
            let total: f64 = points.iter().map(|(_, w)| w).sum();
            assert_relative_eq!(total, 8.0, epsilon = 1e-12);
        }
        assert!(matches!(
            QuadratureRule::from_count(4),
            Err(SolverError::InvalidQuadrature(4))
        ));
    }

    #[test]
    fn test_jacobian_of_box_element() {
        let coords = unit_cube(10.0, 20.0, 4.0);
        let qp = QuadraturePoint::evaluate(0, &coords, [0.0, 0.0, 0.0], 8.0).unwrap();

        // Element volume = 8 * det(J)
        assert_relative_eq!(qp.weight * qp.dv, 800.0, epsilon = 1e-9);
        assert_relative_eq!(qp.position, Vec3::new(5.0, 10.0, 2.0), epsilon = 1e-12);

        // Gradient of a linear field is exact
        let nodes = [0, 1, 2, 3, 4, 5, 6, 7];
        let values: Vec<f64> = coords.iter().map(|p| 2.0 * p.x - p.y + 3.0 * p.z).collect();
        let g = qp.gradient(&nodes, &values);
        assert_relative_eq!(g, Vec3::new(2.0, -1.0, 3.0), epsilon = 1e-12);
    }

    #[test]
    fn test_inverted_element_rejected() {
        let mut coords = unit_cube(1.0, 1.0, 1.0);
        coords.swap(0, 4);
        coords.swap(1, 5);
        coords.swap(2, 6);
        coords.swap(3, 7);
        let result = QuadraturePoint::evaluate(3, &coords, [0.0, 0.0, 0.0], 8.0);
        assert!(matches!(
            result,
            Err(SolverError::NegativeJacobian { element: 3, .. })
        ));
    }
}
