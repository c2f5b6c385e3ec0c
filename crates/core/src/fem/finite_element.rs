//! Element geometry cache and element-loop driver
//!
//! [`FiniteElement`] evaluates every element of a mesh at the chosen
//! quadrature points once and keeps the results. Solvers then loop over
//! elements with [`FiniteElement::map_elements`], which computes local
//! element quantities in parallel and hands them to a sequential consumer
//! for assembly. Assembly is never parallel, so global arrays need no locks.

use super::element::{QuadraturePoint, QuadratureRule};
use crate::core_types::Vec3;
use crate::error::Result;
use crate::field::{ScalarField, VectorField};
use crate::mesh::Mesh;
use rayon::prelude::*;
use tracing::debug;

/// Elements computed per parallel batch before assembly
const ELEMENT_CHUNK: usize = 4096;

/// Precomputed quadrature data for every element of a mesh
#[derive(Debug, Clone)]
pub struct FiniteElement<'m> {
    mesh: &'m Mesh,
    rule: QuadratureRule,
    points: Vec<Vec<QuadraturePoint>>,
}

impl<'m> FiniteElement<'m> {
    /// Evaluate element geometry for the whole mesh
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::NegativeJacobian`](crate::SolverError::NegativeJacobian)
    /// if any element is degenerate or inverted at a quadrature point.
    pub fn new(mesh: &'m Mesh, rule: QuadratureRule) -> Result<Self> {
        let parent_points = rule.points();
        let points = (0..mesh.numel())
            .into_par_iter()
            .map(|element| {
                let coordinates = mesh.element_coordinates(element);
                parent_points
                    .iter()
                    .map(|&(parent, weight)| {
                        QuadraturePoint::evaluate(element, &coordinates, parent, weight)
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Element geometry ready: {} elements x {} quadrature points",
            mesh.numel(),
            rule.count()
        );

        Ok(Self { mesh, rule, points })
    }

    #[must_use]
    pub fn mesh(&self) -> &'m Mesh {
        self.mesh
    }

    #[must_use]
    pub fn rule(&self) -> QuadratureRule {
        self.rule
    }

    /// Quadrature data of one element
    #[must_use]
    pub fn points(&self, element: usize) -> &[QuadraturePoint] {
        &self.points[element]
    }

    /// Total meshed volume
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.points
            .par_iter()
            .map(|qps| qps.iter().map(|qp| qp.weight * qp.dv).sum::<f64>())
            .sum()
    }

    /// Run `compute` on every element in parallel and feed the results to
    /// `consume` in element order
    ///
    /// `compute` receives the element number, its global node numbers and its
    /// quadrature data. `consume` receives the same node numbers and the
    /// computed value.
    pub fn map_elements<T, F, G>(&self, compute: F, mut consume: G)
    where
        T: Send,
        F: Fn(usize, &[usize; 8], &[QuadraturePoint]) -> T + Sync,
        G: FnMut(&[usize; 8], T),
    {
        let numel = self.mesh.numel();
        let mut start = 0;
        while start < numel {
            let end = (start + ELEMENT_CHUNK).min(numel);
            let batch: Vec<([usize; 8], T)> = (start..end)
                .into_par_iter()
                .map(|element| {
                    let nodes = self.mesh.element_nodes(element);
                    let value = compute(element, &nodes, &self.points[element]);
                    (nodes, value)
                })
                .collect();

            for (nodes, value) in batch {
                consume(&nodes, value);
            }
            start = end;
        }
    }

    /// Nodal gradient of a scalar by stress smoothing
    ///
    /// Gradients evaluated at quadrature points are distributed to the
    /// element's nodes with inverse-distance weights, then each node is
    /// divided by its summed weight.
    pub fn smoothed_gradient(&self, values: &[f64]) -> VectorField {
        let numnp = self.mesh.numnp();
        let mut sums = vec![Vec3::zeros(); numnp];
        let mut diag = vec![0.0; numnp];

        self.map_elements(
            |_, nodes, qps| {
                let mut local = [(Vec3::zeros(), 0.0); 8];
                for qp in qps {
                    let gradient = qp.gradient(nodes, values);
                    for (a, &node) in nodes.iter().enumerate() {
                        let distance = (self.mesh.position(node) - qp.position).norm();
                        let weight = 1.0 / distance.max(f64::EPSILON);
                        local[a].0 += gradient * weight;
                        local[a].1 += weight;
                    }
                }
                local
            },
            |nodes, local| {
                for (a, &node) in nodes.iter().enumerate() {
                    sums[node] += local[a].0;
                    diag[node] += local[a].1;
                }
            },
        );

        let mut gradient = VectorField::new(self.mesh);
        for (node, (sum, weight)) in sums.iter().zip(diag.iter()).enumerate() {
            if *weight > 0.0 {
                gradient.set(node, sum / *weight);
            }
        }
        gradient
    }

    /// Nodal divergence of a velocity field from smoothed component gradients
    pub fn divergence(&self, field: &VectorField) -> ScalarField {
        let du = self.smoothed_gradient(field.x().as_slice());
        let dv = self.smoothed_gradient(field.y().as_slice());
        let dw = self.smoothed_gradient(field.z().as_slice());

        let mut divergence = ScalarField::new(self.mesh);
        for (node, value) in divergence.as_mut_slice().iter_mut().enumerate() {
            *value = du.x()[node] + dv.y()[node] + dw.z()[node];
        }
        divergence
    }
}
