//! Symmetric compressed-row storage
//!
//! Only the upper triangle (columns ≥ row) is stored. Row `n` owns the
//! slots `row_ptr[n]..row_ptr[n + 1]` of `col_ind` and `values`, with column
//! indices strictly increasing, so the diagonal is always the first slot of a
//! row when present.
//!
//! The structure for a mesh is the 27-point stencil: every node couples to
//! itself and to each existing neighbour one step away along any combination
//! of row, column and layer.

use crate::error::{Result, SolverError};
use crate::mesh::{Mesh, NodeType};
use rayon::prelude::*;
use tracing::debug;

/// Upper-triangular CRS matrix
#[derive(Debug, Clone, PartialEq)]
pub struct CrsMatrix {
    row_ptr: Vec<usize>,
    col_ind: Vec<usize>,
    values: Vec<f64>,
}

impl CrsMatrix {
    /// Build the zero-valued stiffness structure for a mesh
    ///
    /// Rows follow node order. For each row every candidate neighbour offset
    /// is bound-checked on its own axis, so partial stencils on faces, edges
    /// and corners come out right regardless of which face the node lies on.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::InvalidNodeType`] if a node carries an
    /// unrecognized classification, or claims to be internal while missing
    /// neighbours.
    pub fn for_mesh(mesh: &Mesh) -> Result<Self> {
        let numnp = mesh.numnp();
        let rows = (0..numnp)
            .into_par_iter()
            .map(|node| stencil_columns(mesh, node))
            .collect::<Result<Vec<_>>>()?;

        let mut row_ptr = Vec::with_capacity(numnp + 1);
        let mut col_ind = Vec::with_capacity(Self::estimated_nonzeros(mesh));
        row_ptr.push(0);
        for columns in rows {
            col_ind.extend_from_slice(&columns);
            row_ptr.push(col_ind.len());
        }

        let values = vec![0.0; col_ind.len()];
        debug!(
            "Stiffness structure built: {} rows, {} stored non-zeros",
            numnp,
            col_ind.len()
        );

        Ok(Self {
            row_ptr,
            col_ind,
            values,
        })
    }

    /// Wrap existing upper-triangular CRS arrays
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::InvalidMatrix`] if the arrays are inconsistent,
    /// contain entries below the diagonal, or have unsorted rows.
    pub fn from_parts(row_ptr: Vec<usize>, col_ind: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        let Some(&nnz) = row_ptr.last() else {
            return Err(SolverError::InvalidMatrix("empty row pointer".to_string()));
        };
        if row_ptr[0] != 0 || nnz != col_ind.len() || nnz != values.len() {
            return Err(SolverError::InvalidMatrix(format!(
                "row pointer ends at {nnz} but there are {} columns and {} values",
                col_ind.len(),
                values.len()
            )));
        }

        let nrows = row_ptr.len() - 1;
        for row in 0..nrows {
            if row_ptr[row + 1] < row_ptr[row] {
                return Err(SolverError::InvalidMatrix(format!(
                    "row pointer decreases at row {row}"
                )));
            }
            let columns = &col_ind[row_ptr[row]..row_ptr[row + 1]];
            if columns.iter().any(|&c| c < row || c >= nrows)
                || columns.windows(2).any(|w| w[1] <= w[0])
            {
                return Err(SolverError::InvalidMatrix(format!(
                    "row {row} is not upper-triangular with increasing columns"
                )));
            }
        }

        Ok(Self {
            row_ptr,
            col_ind,
            values,
        })
    }

    /// Stored non-zero count of the 27-point structure for a mesh
    ///
    /// Along an axis with `m` nodes the number of valid (node, offset) pairs
    /// is `3m - 2`, so the full stencil holds the product of these over the
    /// three axes. The upper triangle keeps the diagonal and half of the rest.
    #[must_use]
    pub fn estimated_nonzeros(mesh: &Mesh) -> usize {
        let numnp = mesh.numnp();
        let full = (3 * mesh.nrows() - 2) * (3 * mesh.ncols() - 2) * (3 * mesh.nlayers() - 2);
        (full - numnp) / 2 + numnp
    }

    /// Number of rows (and columns)
    #[inline]
    #[must_use]
    pub fn nrows(&self) -> usize {
        self.row_ptr.len() - 1
    }

    /// Number of stored entries
    #[inline]
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.col_ind.len()
    }

    #[must_use]
    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    #[must_use]
    pub fn col_ind(&self) -> &[usize] {
        &self.col_ind
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Column indices and values of one row
    #[inline]
    #[must_use]
    pub fn row(&self, row: usize) -> (&[usize], &[f64]) {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        (&self.col_ind[range.clone()], &self.values[range])
    }

    /// Storage slot of entry `(row, col)` with `col ≥ row`
    #[must_use]
    pub fn position(&self, row: usize, col: usize) -> Option<usize> {
        let start = self.row_ptr[row];
        self.col_ind[start..self.row_ptr[row + 1]]
            .binary_search(&col)
            .ok()
            .map(|offset| start + offset)
    }

    /// Add `value` to the symmetric entry `(row, col)`
    ///
    /// Lower-triangle coordinates are mirrored. Entries outside the sparsity
    /// structure are ignored.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        let (r, c) = if col < row { (col, row) } else { (row, col) };
        if let Some(slot) = self.position(r, c) {
            self.values[slot] += value;
        }
    }

    /// Diagonal entry of a row, zero if not stored
    #[inline]
    #[must_use]
    pub fn diagonal(&self, row: usize) -> f64 {
        let start = self.row_ptr[row];
        if start < self.row_ptr[row + 1] && self.col_ind[start] == row {
            self.values[start]
        } else {
            0.0
        }
    }

    /// Zero every stored value, keeping the structure
    pub fn clear(&mut self) {
        self.values.par_iter_mut().for_each(|v| *v = 0.0);
    }

    /// Add an element matrix into the global matrix
    ///
    /// Only the upper-triangle couplings of the element's nodes are added; the
    /// element matrix must be symmetric.
    pub fn assemble_element(&mut self, nodes: &[usize; 8], local: &[[f64; 8]; 8]) {
        for a in 0..8 {
            for b in 0..8 {
                if nodes[b] >= nodes[a] {
                    if let Some(slot) = self.position(nodes[a], nodes[b]) {
                        self.values[slot] += local[a][b];
                    }
                }
            }
        }
    }

    /// `y = A x` using the symmetric upper storage
    pub fn mul_vec(&self, x: &[f64], y: &mut [f64]) {
        y.fill(0.0);
        for row in 0..self.nrows() {
            let xr = x[row];
            let mut sum = 0.0;
            for slot in self.row_ptr[row]..self.row_ptr[row + 1] {
                let col = self.col_ind[slot];
                let value = self.values[slot];
                sum += value * x[col];
                if col != row {
                    y[col] += value * xr;
                }
            }
            y[row] += sum;
        }
    }

    /// Move the contribution of fixed unknowns to the right-hand side of the
    /// free rows. The matrix is not changed.
    pub fn lift_dirichlet(&self, rhs: &mut [f64], fixed: &[bool], values: &[f64]) {
        for row in 0..self.nrows() {
            for slot in self.row_ptr[row]..self.row_ptr[row + 1] {
                let col = self.col_ind[slot];
                if col == row {
                    continue;
                }
                let a = self.values[slot];
                if fixed[col] && !fixed[row] {
                    rhs[row] -= a * values[col];
                } else if fixed[row] && !fixed[col] {
                    rhs[col] -= a * values[row];
                }
            }
        }
    }

    /// Replace each fixed row and column by the identity equation
    ///
    /// Rows are edited in parallel, each thread owning a disjoint slice of the
    /// value array.
    pub fn eliminate_dirichlet(&mut self, fixed: &[bool]) {
        let Self {
            row_ptr,
            col_ind,
            values,
        } = self;
        let row_ptr: &[usize] = row_ptr;
        let col_ind: &[usize] = col_ind;

        let nrows = row_ptr.len() - 1;
        let mut rows: Vec<&mut [f64]> = Vec::with_capacity(nrows);
        let mut rest: &mut [f64] = values;
        for row in 0..nrows {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(row_ptr[row + 1] - row_ptr[row]);
            rows.push(head);
            rest = tail;
        }

        rows.into_par_iter().enumerate().for_each(|(row, row_values)| {
            let columns = &col_ind[row_ptr[row]..row_ptr[row + 1]];
            for (value, &col) in row_values.iter_mut().zip(columns) {
                if col == row {
                    if fixed[row] {
                        *value = 1.0;
                    }
                } else if fixed[row] || fixed[col] {
                    *value = 0.0;
                }
            }
        });
    }

    /// Impose `x[n] = values[n]` for every fixed node
    ///
    /// Lifts the fixed contributions into `rhs`, turns fixed rows and columns
    /// into the identity and sets the fixed right-hand-side entries, leaving a
    /// symmetric system with the same solution on the free nodes.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SizeMismatch`] if any slice is not one entry per row.
    pub fn apply_dirichlet(&mut self, rhs: &mut [f64], fixed: &[bool], values: &[f64]) -> Result<()> {
        let n = self.nrows();
        for (what, len) in [
            ("right-hand side", rhs.len()),
            ("fixed mask", fixed.len()),
            ("fixed values", values.len()),
        ] {
            if len != n {
                return Err(SolverError::SizeMismatch {
                    what,
                    expected: n,
                    found: len,
                });
            }
        }

        self.lift_dirichlet(rhs, fixed, values);
        self.eliminate_dirichlet(fixed);
        rhs.par_iter_mut()
            .zip(fixed.par_iter().zip(values.par_iter()))
            .for_each(|(r, (&is_fixed, &value))| {
                if is_fixed {
                    *r = value;
                }
            });
        Ok(())
    }
}

/// Upper-triangle column list of one node's stencil row
fn stencil_columns(mesh: &Mesh, node: usize) -> Result<Vec<usize>> {
    let (i, j, k) = mesh.ijk(node);
    let class = mesh.node_class(i, j, k);
    let node_type =
        NodeType::from_class(class).ok_or(SolverError::InvalidNodeType { node, kind: class })?;

    let span = |c: usize, n: usize| c.saturating_sub(1)..=(c + 1).min(n - 1);

    let mut columns = Vec::with_capacity(14);
    let mut neighbours = 0;
    for kk in span(k, mesh.nlayers()) {
        for ii in span(i, mesh.nrows()) {
            for jj in span(j, mesh.ncols()) {
                neighbours += 1;
                let col = mesh.index(ii, jj, kk);
                if col >= node {
                    columns.push(col);
                }
            }
        }
    }

    if node_type == NodeType::Internal && neighbours != 27 {
        return Err(SolverError::InvalidNodeType { node, kind: class });
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_structure_invariants() {
        for (nrows, ncols, nlayers) in [(2, 2, 2), (3, 3, 3), (3, 4, 5), (6, 2, 4)] {
            let mesh = Mesh::flat(nrows, ncols, nlayers, 1.0, 1.0).unwrap();
            let crs = CrsMatrix::for_mesh(&mesh).unwrap();

            assert_eq!(crs.row_ptr().len(), mesh.numnp() + 1);
            assert_eq!(crs.row_ptr()[mesh.numnp()], crs.nnz());
            assert_eq!(crs.values().len(), crs.nnz());
            assert_eq!(crs.nnz(), CrsMatrix::estimated_nonzeros(&mesh));

            for row in 0..crs.nrows() {
                let (columns, _) = crs.row(row);
                assert_eq!(columns[0], row);
                assert!(columns.windows(2).all(|w| w[0] < w[1]));
            }
        }
    }

    #[test]
    fn test_interior_row_width() {
        let mesh = Mesh::flat(3, 3, 3, 1.0, 1.0).unwrap();
        let crs = CrsMatrix::for_mesh(&mesh).unwrap();
        let centre = mesh.index(1, 1, 1);
        // 13 neighbours above the centre plus the diagonal
        assert_eq!(crs.row(centre).0.len(), 14);
        // Top corner couples only to itself
        assert_eq!(crs.row(mesh.numnp() - 1).0.len(), 1);
    }

    #[test]
    fn test_unrecognized_node_type_is_fatal() {
        let mesh = Mesh::flat(2, 2, 2, 1.0, 1.0).unwrap();
        let mut classes = vec![3; 8];
        classes[5] = 7;
        let mesh = mesh.with_node_classes(classes).unwrap();
        assert!(matches!(
            CrsMatrix::for_mesh(&mesh),
            Err(SolverError::InvalidNodeType { node: 5, kind: 7 })
        ));

        // A corner claiming to be internal is also rejected
        let mesh = Mesh::flat(2, 2, 2, 1.0, 1.0)
            .unwrap()
            .with_node_classes(vec![0; 8])
            .unwrap();
        assert!(CrsMatrix::for_mesh(&mesh).is_err());
    }

    #[test]
    fn test_symmetric_product() {
        // [[4, 1, 0], [1, 3, 2], [0, 2, 5]]
        let a = CrsMatrix::from_parts(
            vec![0, 2, 4, 5],
            vec![0, 1, 1, 2, 2],
            vec![4.0, 1.0, 3.0, 2.0, 5.0],
        )
        .unwrap();
        let mut y = vec![0.0; 3];
        a.mul_vec(&[1.0, 2.0, 3.0], &mut y);
        assert_eq!(y, vec![6.0, 13.0, 19.0]);
        assert_eq!(a.diagonal(1), 3.0);
        assert_eq!(a.position(0, 2), None);
    }

    #[test]
    fn test_dirichlet_elimination_keeps_free_solution() {
        // [[2, -1, 0], [-1, 2, -1], [0, -1, 2]] x = [0, 0, 0] with x0 = 1, x2 = 3
        let mut a = CrsMatrix::from_parts(
            vec![0, 2, 4, 5],
            vec![0, 1, 1, 2, 2],
            vec![2.0, -1.0, 2.0, -1.0, 2.0],
        )
        .unwrap();
        let mut rhs = vec![0.0; 3];
        let fixed = [true, false, true];
        let values = [1.0, 0.0, 3.0];
        a.apply_dirichlet(&mut rhs, &fixed, &values).unwrap();

        assert_eq!(a.values(), &[1.0, 0.0, 2.0, 0.0, 1.0]);
        assert_eq!(rhs, vec![1.0, 4.0, 3.0]);
        // Free row now reads 2 x1 = 4
        assert_relative_eq!(rhs[1] / a.diagonal(1), 2.0);
    }

    #[test]
    fn test_rejects_lower_triangle() {
        let result = CrsMatrix::from_parts(vec![0, 1, 2], vec![0, 0], vec![1.0, 1.0]);
        assert!(matches!(result, Err(SolverError::InvalidMatrix(_))));
    }
}
