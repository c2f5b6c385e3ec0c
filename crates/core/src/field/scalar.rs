//! Nodal scalar fields
//!
//! A [`ScalarField`] stores one `f64` per mesh node, laid out with the mesh
//! node numbering (`k * nrows * ncols + i * ncols + j`). Its length is fixed
//! at construction and always equals the node count of the mesh it was
//! built for.

use crate::core_types::Vec3;
use crate::error::{Result, SolverError};
use crate::fem::element;
use crate::mesh::Mesh;
use rayon::prelude::*;
use std::ops::{Index, IndexMut};

/// One value per mesh node
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    data: Vec<f64>,
    nrows: usize,
    ncols: usize,
    nlayers: usize,
}

impl ScalarField {
    /// Create a zero field sized for the mesh
    ///
    /// # Arguments
    ///
    /// * `mesh` - Mesh that fixes the node count and layout
    ///
    /// # Returns
    ///
    /// New field with `mesh.numnp()` zeros
    #[must_use]
    pub fn new(mesh: &Mesh) -> Self {
        Self::with_value(mesh, 0.0)
    }

    /// Create a field sized for the mesh, initialized to a value
    ///
    /// # Arguments
    ///
    /// * `mesh` - Mesh that fixes the node count and layout
    /// * `value` - Initial value for every node
    #[must_use]
    pub fn with_value(mesh: &Mesh, value: f64) -> Self {
        Self {
            data: vec![value; mesh.numnp()],
            nrows: mesh.nrows(),
            ncols: mesh.ncols(),
            nlayers: mesh.nlayers(),
        }
    }

    /// Wrap existing nodal values
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SizeMismatch`] if `data` does not hold one value
    /// per mesh node.
    pub fn from_vec(mesh: &Mesh, data: Vec<f64>) -> Result<Self> {
        if data.len() != mesh.numnp() {
            return Err(SolverError::SizeMismatch {
                what: "scalar field",
                expected: mesh.numnp(),
                found: data.len(),
            });
        }
        Ok(Self {
            data,
            nrows: mesh.nrows(),
            ncols: mesh.ncols(),
            nlayers: mesh.nlayers(),
        })
    }

    /// Number of nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Grid extents `(nrows, ncols, nlayers)`
    #[inline]
    #[must_use]
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.nrows, self.ncols, self.nlayers)
    }

    /// Number of nodes in one horizontal layer
    #[inline]
    #[must_use]
    pub fn layer_size(&self) -> usize {
        self.nrows * self.ncols
    }

    /// Linear index of node `(i, j, k)`
    #[inline]
    #[must_use]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        k * self.layer_size() + i * self.ncols + j
    }

    /// Get value at node `(i, j, k)`
    ///
    /// # Panics
    ///
    /// Panics if the indices are outside the grid
    #[inline]
    #[must_use]
    pub fn get(&self, i: usize, j: usize, k: usize) -> f64 {
        self.data[self.index(i, j, k)]
    }

    /// Set value at node `(i, j, k)`
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: f64) {
        let n = self.index(i, j, k);
        self.data[n] = value;
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Set every node to `value`
    pub fn fill(&mut self, value: f64) {
        self.data.fill(value);
    }

    /// Largest absolute nodal value
    #[must_use]
    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
    }

    /// Value at an arbitrary point by trilinear shape-function interpolation
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::PointOutsideMesh`] if `p` is not inside the mesh.
    pub fn interpolate(&self, mesh: &Mesh, p: &Vec3) -> Result<f64> {
        let location = mesh.locate(p).ok_or(SolverError::PointOutsideMesh {
            x: p.x,
            y: p.y,
            z: p.z,
        })?;
        Ok(element::interpolate(mesh, &location, &self.data))
    }

    /// Add another field node by node
    pub fn add_assign_field(&mut self, other: &ScalarField) {
        self.data
            .par_iter_mut()
            .zip(other.data.par_iter())
            .for_each(|(a, b)| *a += b);
    }

    /// Multiply every node by `factor`
    pub fn scale(&mut self, factor: f64) {
        self.data.par_iter_mut().for_each(|v| *v *= factor);
    }
}

impl Index<usize> for ScalarField {
    type Output = f64;

    #[inline]
    fn index(&self, node: usize) -> &f64 {
        &self.data[node]
    }
}

impl IndexMut<usize> for ScalarField {
    #[inline]
    fn index_mut(&mut self, node: usize) -> &mut f64 {
        &mut self.data[node]
    }
}
