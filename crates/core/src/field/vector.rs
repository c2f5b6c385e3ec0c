//! Nodal velocity fields and the node kinds derived from them
//!
//! Ground, inlet and outlet status is not stored. Ground is purely positional
//! (`k == 0`). Inlet and outlet depend on the sign of the velocity against the
//! outward boundary normal, so they can change whenever the field changes.

use super::scalar::ScalarField;
use crate::core_types::Vec3;
use crate::error::{Result, SolverError};
use crate::mesh::Mesh;
use rayon::prelude::*;

/// Three co-located scalar fields holding the x, y and z velocity components
#[derive(Debug, Clone, PartialEq)]
pub struct VectorField {
    x: ScalarField,
    y: ScalarField,
    z: ScalarField,
}

impl VectorField {
    /// Zero field sized for the mesh
    #[must_use]
    pub fn new(mesh: &Mesh) -> Self {
        Self {
            x: ScalarField::new(mesh),
            y: ScalarField::new(mesh),
            z: ScalarField::new(mesh),
        }
    }

    /// Constant field
    #[must_use]
    pub fn uniform(mesh: &Mesh, value: Vec3) -> Self {
        Self {
            x: ScalarField::with_value(mesh, value.x),
            y: ScalarField::with_value(mesh, value.y),
            z: ScalarField::with_value(mesh, value.z),
        }
    }

    /// Assemble a field from its three components
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SizeMismatch`] if the components differ in size.
    pub fn from_components(x: ScalarField, y: ScalarField, z: ScalarField) -> Result<Self> {
        for (what, component) in [("y component", &y), ("z component", &z)] {
            if component.dims() != x.dims() {
                return Err(SolverError::SizeMismatch {
                    what,
                    expected: x.len(),
                    found: component.len(),
                });
            }
        }
        Ok(Self { x, y, z })
    }

    /// Build a field by evaluating `f` at every node position
    #[must_use]
    pub fn from_fn(mesh: &Mesh, f: impl Fn(Vec3) -> Vec3) -> Self {
        let mut field = Self::new(mesh);
        for n in 0..mesh.numnp() {
            field.set(n, f(mesh.position(n)));
        }
        field
    }

    #[inline]
    #[must_use]
    pub fn x(&self) -> &ScalarField {
        &self.x
    }

    #[inline]
    #[must_use]
    pub fn y(&self) -> &ScalarField {
        &self.y
    }

    #[inline]
    #[must_use]
    pub fn z(&self) -> &ScalarField {
        &self.z
    }

    /// Component by axis number (0 = x, 1 = y, 2 = z)
    #[must_use]
    pub fn component(&self, axis: usize) -> &ScalarField {
        match axis {
            0 => &self.x,
            1 => &self.y,
            _ => &self.z,
        }
    }

    /// Mutable component by axis number (0 = x, 1 = y, 2 = z)
    pub fn component_mut(&mut self, axis: usize) -> &mut ScalarField {
        match axis {
            0 => &mut self.x,
            1 => &mut self.y,
            _ => &mut self.z,
        }
    }

    /// Number of nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Velocity at a node
    #[inline]
    #[must_use]
    pub fn get(&self, node: usize) -> Vec3 {
        Vec3::new(self.x[node], self.y[node], self.z[node])
    }

    /// Set velocity at a node
    #[inline]
    pub fn set(&mut self, node: usize, value: Vec3) {
        self.x[node] = value.x;
        self.y[node] = value.y;
        self.z[node] = value.z;
    }

    /// Speed at a node
    #[inline]
    #[must_use]
    pub fn magnitude_at(&self, node: usize) -> f64 {
        self.get(node).norm()
    }

    /// Largest nodal speed
    #[must_use]
    pub fn max_magnitude(&self) -> f64 {
        (0..self.len())
            .into_par_iter()
            .map(|n| self.magnitude_at(n))
            .reduce(|| 0.0, f64::max)
    }

    /// True when every component of every node is exactly zero
    #[must_use]
    pub fn is_all_zero(&self) -> bool {
        [&self.x, &self.y, &self.z]
            .iter()
            .all(|c| c.as_slice().iter().all(|&v| v == 0.0))
    }

    /// True for ground-layer nodes
    #[inline]
    #[must_use]
    pub fn is_on_ground(&self, node: usize) -> bool {
        node < self.x.layer_size()
    }

    /// True for nodes on the lateral faces or the top of the domain
    #[inline]
    #[must_use]
    pub fn is_boundary(&self, i: usize, j: usize, k: usize) -> bool {
        let (nrows, ncols, nlayers) = self.x.dims();
        i == 0 || i == nrows - 1 || j == 0 || j == ncols - 1 || k == nlayers - 1
    }

    /// Outward normal of the domain boundary at a node
    ///
    /// Sum of the unit normals of every lateral face or top the node lies on.
    /// Zero for interior and pure ground nodes.
    #[must_use]
    pub fn outward_normal(&self, i: usize, j: usize, k: usize) -> Vec3 {
        let (nrows, ncols, nlayers) = self.x.dims();
        let mut normal = Vec3::zeros();
        if j == 0 {
            normal.x -= 1.0;
        }
        if j == ncols - 1 {
            normal.x += 1.0;
        }
        if i == 0 {
            normal.y -= 1.0;
        }
        if i == nrows - 1 {
            normal.y += 1.0;
        }
        if k == nlayers - 1 {
            normal.z += 1.0;
        }
        normal
    }

    /// Normal flux `U·n` at a boundary node, zero elsewhere
    fn normal_flux(&self, i: usize, j: usize, k: usize) -> f64 {
        if k == 0 || !self.is_boundary(i, j, k) {
            return 0.0;
        }
        let node = self.x.index(i, j, k);
        self.get(node).dot(&self.outward_normal(i, j, k))
    }

    /// True for boundary nodes where the flow enters the domain
    #[must_use]
    pub fn is_inlet(&self, i: usize, j: usize, k: usize) -> bool {
        self.normal_flux(i, j, k) < 0.0
    }

    /// True for boundary nodes where the flow leaves the domain
    #[must_use]
    pub fn is_outlet(&self, i: usize, j: usize, k: usize) -> bool {
        self.normal_flux(i, j, k) > 0.0
    }

    /// True if the node at linear index `node` is an inlet
    #[must_use]
    pub fn is_inlet_node(&self, node: usize) -> bool {
        let (i, j, k) = self.ijk(node);
        self.is_inlet(i, j, k)
    }

    fn ijk(&self, node: usize) -> (usize, usize, usize) {
        let (_, ncols, _) = self.x.dims();
        let layer = self.x.layer_size();
        let rem = node % layer;
        (rem / ncols, rem % ncols, node / layer)
    }

    /// Reset inlet nodes to the values of `source`
    ///
    /// Inlet status is decided by the direction of `source`, not of `self`.
    pub fn copy_inlet_nodes(&mut self, source: &VectorField) {
        for node in 0..self.len() {
            if source.is_inlet_node(node) {
                self.set(node, source.get(node));
            }
        }
    }

    /// Set every ground-layer node to zero (no slip)
    pub fn zero_ground(&mut self) {
        let layer = self.x.layer_size();
        for component in [&mut self.x, &mut self.y, &mut self.z] {
            component.as_mut_slice()[..layer].fill(0.0);
        }
    }

    /// Velocity at an arbitrary point
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::PointOutsideMesh`] if `p` is not inside the mesh.
    pub fn interpolate(&self, mesh: &Mesh, p: &Vec3) -> Result<Vec3> {
        Ok(Vec3::new(
            self.x.interpolate(mesh, p)?,
            self.y.interpolate(mesh, p)?,
            self.z.interpolate(mesh, p)?,
        ))
    }

    /// Add another field node by node
    pub fn accumulate(&mut self, other: &VectorField) {
        self.x.add_assign_field(&other.x);
        self.y.add_assign_field(&other.y);
        self.z.add_assign_field(&other.z);
    }

    /// Multiply every component by `factor`
    pub fn scale(&mut self, factor: f64) {
        self.x.scale(factor);
        self.y.scale(factor);
        self.z.scale(factor);
    }
}
