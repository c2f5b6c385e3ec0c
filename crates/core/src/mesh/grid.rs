//! Structured terrain-following hexahedral mesh
//!
//! The mesh is a `nrows × ncols × nlayers` lattice of nodes. Columns run along
//! x, rows along y and layers along z. Horizontal coordinates are rectilinear
//! (x depends only on the column, y only on the row), while node heights follow
//! the terrain so each column may be stretched differently.
//!
//! # Indexing
//!
//! ```text
//! node(i, j, k)    = k * (nrows * ncols) + i * ncols + j
//! element(i, j, k) = k * (nrows - 1) * (ncols - 1) + i * (ncols - 1) + j
//! ```
//!
//! # Local node ordering
//!
//! Local nodes run counter-clockwise from the lower-left corner, bottom layer
//! first:
//!
//! ```text
//!   7----6          3----2
//!   |    |  upper   |    |  lower
//!   4----5          0----1
//! ```

use super::node::{CellLocation, NodeType};
use super::terrain::Elevation;
use crate::core_types::Vec3;
use crate::error::{Result, SolverError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Relative tolerance used when checking that horizontal coordinates are rectilinear
const RECTILINEAR_TOLERANCE: f64 = 1e-9;

/// Vertical layout of a terrain-following mesh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Number of node layers (ground layer included)
    pub nlayers: usize,

    /// Height of the flat domain top above the highest terrain point (m)
    pub domain_height: f64,

    /// Ratio between consecutive layer thicknesses
    /// 1.0 gives uniform layers, values above 1.0 cluster layers near the ground.
    pub vertical_growth: f64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            nlayers: 20,
            domain_height: 1000.0,
            vertical_growth: 1.1,
        }
    }
}

/// Immutable volumetric mesh shared read-only by every solver component
///
/// Deserialization goes through [`Mesh::from_parts`], so a stored mesh is
/// validated like a freshly built one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoredMesh")]
pub struct Mesh {
    nrows: usize,
    ncols: usize,
    nlayers: usize,
    xord: Vec<f64>,
    yord: Vec<f64>,
    zord: Vec<f64>,

    /// Classification supplied by an external mesh generator, if any
    node_classes: Option<Vec<u8>>,
}

/// Serialized form of [`Mesh`], checked before use
#[derive(Deserialize)]
struct StoredMesh {
    nrows: usize,
    ncols: usize,
    nlayers: usize,
    xord: Vec<f64>,
    yord: Vec<f64>,
    zord: Vec<f64>,
    node_classes: Option<Vec<u8>>,
}

impl TryFrom<StoredMesh> for Mesh {
    type Error = SolverError;

    fn try_from(stored: StoredMesh) -> Result<Self> {
        let mesh = Self::from_parts(
            stored.nrows,
            stored.ncols,
            stored.nlayers,
            stored.xord,
            stored.yord,
            stored.zord,
        )?;
        match stored.node_classes {
            Some(classes) => mesh.with_node_classes(classes),
            None => Ok(mesh),
        }
    }
}

impl Mesh {
    /// Build a mesh from per-node coordinate arrays
    ///
    /// # Arguments
    ///
    /// * `nrows`, `ncols`, `nlayers` - Node counts along y, x and z
    /// * `xord`, `yord`, `zord` - Node coordinates indexed as `k*nrows*ncols + i*ncols + j`
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SizeMismatch`] when an array does not hold one value
    /// per node, and [`SolverError::InvalidMesh`] when the lattice is smaller than
    /// one element, the horizontal coordinates are not rectilinear, or node
    /// coordinates do not increase strictly along their axis.
    pub fn from_parts(
        nrows: usize,
        ncols: usize,
        nlayers: usize,
        xord: Vec<f64>,
        yord: Vec<f64>,
        zord: Vec<f64>,
    ) -> Result<Self> {
        if nrows < 2 || ncols < 2 || nlayers < 2 {
            return Err(SolverError::InvalidMesh(format!(
                "need at least 2 nodes per axis, got {nrows}x{ncols}x{nlayers}"
            )));
        }

        let numnp = nrows * ncols * nlayers;
        for (what, len) in [
            ("x coordinates", xord.len()),
            ("y coordinates", yord.len()),
            ("z coordinates", zord.len()),
        ] {
            if len != numnp {
                return Err(SolverError::SizeMismatch {
                    what,
                    expected: numnp,
                    found: len,
                });
            }
        }

        let mesh = Mesh {
            nrows,
            ncols,
            nlayers,
            xord,
            yord,
            zord,
            node_classes: None,
        };
        mesh.validate()?;

        debug!(
            "Mesh assembled: {}x{}x{} nodes, {} elements",
            nrows,
            ncols,
            nlayers,
            mesh.numel()
        );
        Ok(mesh)
    }

    /// Build a flat-bottomed box mesh with uniform spacing
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::InvalidMesh`] for fewer than two nodes per axis or
    /// non-positive spacing.
    pub fn flat(
        nrows: usize,
        ncols: usize,
        nlayers: usize,
        resolution: f64,
        layer_height: f64,
    ) -> Result<Self> {
        if resolution <= 0.0 || layer_height <= 0.0 {
            return Err(SolverError::InvalidMesh(format!(
                "spacing must be positive, got {resolution} m horizontal and {layer_height} m vertical"
            )));
        }

        let numnp = nrows * ncols * nlayers;
        let mut xord = Vec::with_capacity(numnp);
        let mut yord = Vec::with_capacity(numnp);
        let mut zord = Vec::with_capacity(numnp);
        for k in 0..nlayers {
            for i in 0..nrows {
                for j in 0..ncols {
                    xord.push(j as f64 * resolution);
                    yord.push(i as f64 * resolution);
                    zord.push(k as f64 * layer_height);
                }
            }
        }

        Self::from_parts(nrows, ncols, nlayers, xord, yord, zord)
    }

    /// Build a terrain-following mesh over an elevation grid
    ///
    /// One mesh column is placed on each elevation sample. Layer thicknesses
    /// grow geometrically by `config.vertical_growth` from the ground up to a
    /// flat top at `max_elevation + domain_height`.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::InvalidMesh`] for fewer than two layers, a
    /// non-positive domain height or a non-positive growth ratio.
    pub fn terrain_following(elevation: &Elevation, config: &MeshConfig) -> Result<Self> {
        let nlayers = config.nlayers;
        if nlayers < 2 {
            return Err(SolverError::InvalidMesh(format!(
                "need at least 2 layers, got {nlayers}"
            )));
        }
        if config.domain_height <= 0.0 || config.vertical_growth <= 0.0 {
            return Err(SolverError::InvalidMesh(format!(
                "domain height ({}) and vertical growth ({}) must be positive",
                config.domain_height, config.vertical_growth
            )));
        }

        let nrows = elevation.ny();
        let ncols = elevation.nx();
        let resolution = elevation.resolution();
        let top = elevation.max_elevation() + config.domain_height;

        let growth = config.vertical_growth;
        let last = (nlayers - 1) as f64;
        let fractions: Vec<f64> = (0..nlayers)
            .map(|k| {
                if (growth - 1.0).abs() < 1e-12 {
                    k as f64 / last
                } else {
                    (growth.powi(k as i32) - 1.0) / (growth.powf(last) - 1.0)
                }
            })
            .collect();

        let numnp = nrows * ncols * nlayers;
        let mut xord = Vec::with_capacity(numnp);
        let mut yord = Vec::with_capacity(numnp);
        let mut zord = Vec::with_capacity(numnp);
        for fraction in &fractions {
            for i in 0..nrows {
                for j in 0..ncols {
                    let ground = elevation.sample(j, i);
                    xord.push(j as f64 * resolution);
                    yord.push(i as f64 * resolution);
                    zord.push(ground + fraction * (top - ground));
                }
            }
        }

        let mesh = Self::from_parts(nrows, ncols, nlayers, xord, yord, zord)?;
        info!(
            "Terrain-following mesh: {}x{}x{} nodes, resolution {:.1} m, top at {:.1} m",
            nrows, ncols, nlayers, resolution, top
        );
        Ok(mesh)
    }

    /// Attach a node classification produced by an external mesh generator
    ///
    /// Classes are the raw counts understood by [`NodeType::from_class`]. Any
    /// other value marks a corrupted mesh and is rejected when the stiffness
    /// matrix structure is built.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SizeMismatch`] if `classes` does not hold one
    /// entry per node.
    pub fn with_node_classes(mut self, classes: Vec<u8>) -> Result<Self> {
        if classes.len() != self.numnp() {
            return Err(SolverError::SizeMismatch {
                what: "node classes",
                expected: self.numnp(),
                found: classes.len(),
            });
        }
        self.node_classes = Some(classes);
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        for k in 0..self.nlayers {
            for i in 0..self.nrows {
                for j in 0..self.ncols {
                    let x = self.x(i, j, k);
                    let y = self.y(i, j, k);
                    let x_ref = self.x(0, j, 0);
                    let y_ref = self.y(i, 0, 0);
                    if (x - x_ref).abs() > RECTILINEAR_TOLERANCE * (1.0 + x_ref.abs())
                        || (y - y_ref).abs() > RECTILINEAR_TOLERANCE * (1.0 + y_ref.abs())
                    {
                        return Err(SolverError::InvalidMesh(format!(
                            "horizontal coordinates of node ({i}, {j}, {k}) are not rectilinear"
                        )));
                    }
                    if k + 1 < self.nlayers && self.z(i, j, k + 1) <= self.z(i, j, k) {
                        return Err(SolverError::InvalidMesh(format!(
                            "layer heights must increase upward at node ({i}, {j}, {k})"
                        )));
                    }
                }
            }
        }

        if (1..self.ncols).any(|j| self.x(0, j, 0) <= self.x(0, j - 1, 0))
            || (1..self.nrows).any(|i| self.y(i, 0, 0) <= self.y(i - 1, 0, 0))
        {
            return Err(SolverError::InvalidMesh(
                "horizontal coordinates must increase strictly along rows and columns".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of node rows (y direction)
    #[must_use]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of node columns (x direction)
    #[must_use]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Number of node layers (z direction)
    #[must_use]
    pub fn nlayers(&self) -> usize {
        self.nlayers
    }

    /// Total number of nodes (NUMNP)
    #[must_use]
    pub fn numnp(&self) -> usize {
        self.nrows * self.ncols * self.nlayers
    }

    /// Check that a per-node buffer has one entry per node
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::SizeMismatch`] naming `what` otherwise.
    pub fn check_len(&self, what: &'static str, len: usize) -> Result<()> {
        if len == self.numnp() {
            Ok(())
        } else {
            Err(SolverError::SizeMismatch {
                what,
                expected: self.numnp(),
                found: len,
            })
        }
    }

    /// Total number of hexahedral elements (NUMEL)
    #[must_use]
    pub fn numel(&self) -> usize {
        (self.nrows - 1) * (self.ncols - 1) * (self.nlayers - 1)
    }

    /// Number of nodes in one horizontal layer
    #[inline]
    #[must_use]
    pub fn layer_size(&self) -> usize {
        self.nrows * self.ncols
    }

    /// Linear node index from (row, column, layer)
    #[inline]
    #[must_use]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        k * self.layer_size() + i * self.ncols + j
    }

    /// (row, column, layer) of a linear node index
    #[inline]
    #[must_use]
    pub fn ijk(&self, node: usize) -> (usize, usize, usize) {
        let k = node / self.layer_size();
        let rem = node % self.layer_size();
        (rem / self.ncols, rem % self.ncols, k)
    }

    #[inline]
    #[must_use]
    pub fn x(&self, i: usize, j: usize, k: usize) -> f64 {
        self.xord[self.index(i, j, k)]
    }

    #[inline]
    #[must_use]
    pub fn y(&self, i: usize, j: usize, k: usize) -> f64 {
        self.yord[self.index(i, j, k)]
    }

    #[inline]
    #[must_use]
    pub fn z(&self, i: usize, j: usize, k: usize) -> f64 {
        self.zord[self.index(i, j, k)]
    }

    /// World position of a node
    #[inline]
    #[must_use]
    pub fn position(&self, node: usize) -> Vec3 {
        Vec3::new(self.xord[node], self.yord[node], self.zord[node])
    }

    /// Raw classification count of a node
    ///
    /// Without an external classification this is the number of axes on which
    /// the node sits at an extreme index (0 = internal ... 3 = corner).
    #[must_use]
    pub fn node_class(&self, i: usize, j: usize, k: usize) -> u8 {
        if let Some(classes) = &self.node_classes {
            return classes[self.index(i, j, k)];
        }

        u8::from(i == 0 || i == self.nrows - 1)
            + u8::from(j == 0 || j == self.ncols - 1)
            + u8::from(k == 0 || k == self.nlayers - 1)
    }

    /// Node classification, or `None` if the stored class is unrecognized
    #[must_use]
    pub fn node_type(&self, i: usize, j: usize, k: usize) -> Option<NodeType> {
        NodeType::from_class(self.node_class(i, j, k))
    }

    /// True for nodes on the lateral faces or the top of the domain
    ///
    /// Ground nodes (k = 0) away from the lateral faces are not boundary nodes;
    /// they carry the no-slip / zero-flux condition instead.
    #[inline]
    #[must_use]
    pub fn is_boundary(&self, i: usize, j: usize, k: usize) -> bool {
        i == 0 || i == self.nrows - 1 || j == 0 || j == self.ncols - 1 || k == self.nlayers - 1
    }

    /// Element number from its (row, column, layer) position
    #[inline]
    #[must_use]
    pub fn element_index(&self, i: usize, j: usize, k: usize) -> usize {
        k * (self.nrows - 1) * (self.ncols - 1) + i * (self.ncols - 1) + j
    }

    /// (row, column, layer) of an element number
    #[inline]
    #[must_use]
    pub fn element_ijk(&self, element: usize) -> (usize, usize, usize) {
        let layer_elements = (self.nrows - 1) * (self.ncols - 1);
        let k = element / layer_elements;
        let rem = element % layer_elements;
        (rem / (self.ncols - 1), rem % (self.ncols - 1), k)
    }

    /// Global node numbers of an element's 8 local nodes
    #[must_use]
    pub fn element_nodes(&self, element: usize) -> [usize; 8] {
        let (i, j, k) = self.element_ijk(element);
        let node0 = self.index(i, j, k);
        let nc = self.ncols;
        let up = self.layer_size();

        [
            node0,
            node0 + 1,
            node0 + nc + 1,
            node0 + nc,
            node0 + up,
            node0 + up + 1,
            node0 + up + nc + 1,
            node0 + up + nc,
        ]
    }

    /// World positions of an element's 8 local nodes
    #[must_use]
    pub fn element_coordinates(&self, element: usize) -> [Vec3; 8] {
        self.element_nodes(element).map(|n| self.position(n))
    }

    /// Smallest horizontal node spacing (m)
    #[must_use]
    pub fn resolution(&self) -> f64 {
        let dx = (1..self.ncols)
            .map(|j| self.x(0, j, 0) - self.x(0, j - 1, 0))
            .fold(f64::INFINITY, f64::min);
        let dy = (1..self.nrows)
            .map(|i| self.y(i, 0, 0) - self.y(i - 1, 0, 0))
            .fold(f64::INFINITY, f64::min);
        dx.min(dy)
    }

    /// Axis-aligned bounding box of all node coordinates
    #[must_use]
    pub fn bounding_box(&self) -> (Vec3, Vec3) {
        let z_min = self.zord.iter().copied().fold(f64::INFINITY, f64::min);
        let z_max = self.zord.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        (
            Vec3::new(self.x(0, 0, 0), self.y(0, 0, 0), z_min),
            Vec3::new(
                self.x(0, self.ncols - 1, 0),
                self.y(self.nrows - 1, 0, 0),
                z_max,
            ),
        )
    }

    /// True if the point lies inside the meshed volume
    ///
    /// Points between the terrain surface and the domain top are inside; the
    /// bounding box alone is not enough over uneven terrain.
    #[must_use]
    pub fn contains_point(&self, p: &Vec3) -> bool {
        self.locate(p).is_some()
    }

    /// Find the element containing `p` and the point's parent coordinates
    ///
    /// Returns `None` if the point lies outside the mesh.
    #[must_use]
    pub fn locate(&self, p: &Vec3) -> Option<CellLocation> {
        let (cell_j, u) = bracket(self.ncols, |j| self.x(0, j, 0), p.x)?;
        let (cell_i, v) = bracket(self.nrows, |i| self.y(i, 0, 0), p.y)?;
        let (cell_k, w) = bracket(
            self.nlayers,
            |k| self.surface_height(cell_i, cell_j, k, u, v),
            p.z,
        )?;

        Some(CellLocation {
            cell_i,
            cell_j,
            cell_k,
            u,
            v,
            w,
        })
    }

    /// Nearest point of the meshed volume found by clamping `p` to the
    /// horizontal extent, then between the terrain and the top above it
    ///
    /// Returns `p` unchanged if it has a NaN coordinate.
    #[must_use]
    pub fn clamp_point(&self, p: &Vec3) -> Vec3 {
        let x = p.x.clamp(self.x(0, 0, 0), self.x(0, self.ncols - 1, 0));
        let y = p.y.clamp(self.y(0, 0, 0), self.y(self.nrows - 1, 0, 0));
        let (Some((cell_j, u)), Some((cell_i, v))) = (
            bracket(self.ncols, |j| self.x(0, j, 0), x),
            bracket(self.nrows, |i| self.y(i, 0, 0), y),
        ) else {
            return *p;
        };

        let bottom = self.surface_height(cell_i, cell_j, 0, u, v);
        let top = self.surface_height(cell_i, cell_j, self.nlayers - 1, u, v);
        Vec3::new(x, y, p.z.clamp(bottom, top))
    }

    /// Height of node layer `k` inside cell column `(ci, cj)` at parent coordinates `(u, v)`
    fn surface_height(&self, ci: usize, cj: usize, k: usize, u: f64, v: f64) -> f64 {
        0.25 * ((1.0 - u) * (1.0 - v) * self.z(ci, cj, k)
            + (1.0 + u) * (1.0 - v) * self.z(ci, cj + 1, k)
            + (1.0 + u) * (1.0 + v) * self.z(ci + 1, cj + 1, k)
            + (1.0 - u) * (1.0 + v) * self.z(ci + 1, cj, k))
    }
}

/// Find the interval `[coord(c), coord(c + 1)]` holding `value` and the value's
/// parent coordinate in `[-1, 1]` within it
fn bracket(n: usize, coord: impl Fn(usize) -> f64, value: f64) -> Option<(usize, f64)> {
    if value.is_nan() || value < coord(0) || value > coord(n - 1) {
        return None;
    }

    let upper = (1..n).find(|&c| value <= coord(c))?;
    let a = coord(upper - 1);
    let b = coord(upper);
    let t = 2.0 * (value - a) / (b - a) - 1.0;
    Some((upper - 1, t.clamp(-1.0, 1.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_index_round_trip() {
        let mesh = Mesh::flat(4, 5, 3, 10.0, 5.0).unwrap();
        for n in 0..mesh.numnp() {
            let (i, j, k) = mesh.ijk(n);
            assert_eq!(mesh.index(i, j, k), n);
        }
        assert_eq!(mesh.numnp(), 60);
        assert_eq!(mesh.numel(), 3 * 4 * 2);
    }

    #[test]
    fn test_node_type_counts() {
        let mesh = Mesh::flat(3, 3, 3, 1.0, 1.0).unwrap();
        let mut counts = [0usize; 4];
        for k in 0..3 {
            for i in 0..3 {
                for j in 0..3 {
                    counts[mesh.node_class(i, j, k) as usize] += 1;
                }
            }
        }
        assert_eq!(counts, [1, 6, 12, 8]);
        assert_eq!(mesh.node_type(1, 1, 1), Some(NodeType::Internal));
        assert_eq!(mesh.node_type(0, 0, 0), Some(NodeType::Corner));
    }

    #[test]
    fn test_element_nodes_ordering() {
        let mesh = Mesh::flat(3, 4, 2, 1.0, 1.0).unwrap();
        let nodes = mesh.element_nodes(mesh.element_index(1, 2, 0));

        assert_eq!(nodes[0], mesh.index(1, 2, 0));
        assert_eq!(nodes[1], mesh.index(1, 3, 0));
        assert_eq!(nodes[2], mesh.index(2, 3, 0));
        assert_eq!(nodes[3], mesh.index(2, 2, 0));
        assert_eq!(nodes[4], mesh.index(1, 2, 1));
        assert_eq!(nodes[6], mesh.index(2, 3, 1));
    }

    #[test]
    fn test_locate_point() {
        let mesh = Mesh::flat(3, 3, 3, 10.0, 4.0).unwrap();
        let loc = mesh.locate(&Vec3::new(15.0, 2.5, 6.0)).unwrap();

        assert_eq!((loc.cell_i, loc.cell_j, loc.cell_k), (0, 1, 1));
        assert_relative_eq!(loc.u, 0.0, epsilon = 1e-12);
        assert_relative_eq!(loc.v, -0.5, epsilon = 1e-12);
        assert_relative_eq!(loc.w, 0.0, epsilon = 1e-12);

        assert!(mesh.locate(&Vec3::new(-1.0, 5.0, 1.0)).is_none());
        assert!(mesh.locate(&Vec3::new(5.0, 5.0, 8.5)).is_none());
    }

    #[test]
    fn test_terrain_following_mesh() {
        let terrain = Elevation::single_hill(200.0, 200.0, 20.0, 100.0, 50.0, 60.0);
        let config = MeshConfig {
            nlayers: 6,
            domain_height: 300.0,
            vertical_growth: 1.2,
        };
        let mesh = Mesh::terrain_following(&terrain, &config).unwrap();

        assert_eq!(mesh.ncols(), terrain.nx());
        assert_eq!(mesh.nrows(), terrain.ny());
        assert_relative_eq!(mesh.z(5, 5, 0), terrain.sample(5, 5));
        assert_relative_eq!(mesh.z(5, 5, 5), 450.0, epsilon = 1e-9);
        assert_relative_eq!(mesh.resolution(), 20.0);

        // A point just above the hill top is inside, one just below is not
        let peak = Vec3::new(100.0, 100.0, 150.5);
        assert!(mesh.contains_point(&peak));
        assert!(!mesh.contains_point(&Vec3::new(100.0, 100.0, 149.0)));

        let clamped = mesh.clamp_point(&Vec3::new(100.0, 100.0, 0.0));
        assert_relative_eq!(clamped.z, mesh.z(5, 5, 0), epsilon = 1e-9);
        let clamped = mesh.clamp_point(&Vec3::new(-50.0, 100.0, 1000.0));
        assert_relative_eq!(clamped, Vec3::new(0.0, 100.0, 450.0), epsilon = 1e-9);
        assert!(mesh.contains_point(&clamped));
    }

    #[test]
    fn test_invalid_mesh_rejected() {
        assert!(Mesh::flat(1, 3, 3, 1.0, 1.0).is_err());
        let result = Mesh::from_parts(2, 2, 2, vec![0.0; 8], vec![0.0; 8], vec![0.0; 7]);
        assert!(matches!(result, Err(SolverError::SizeMismatch { .. })));
    }

    #[test]
    fn test_stored_mesh_is_validated() {
        let mesh = Mesh::flat(3, 4, 3, 10.0, 5.0).unwrap();
        let json = serde_json::to_string(&mesh).unwrap();
        let restored: Mesh = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.numnp(), mesh.numnp());
        assert_eq!(restored.z(2, 3, 2), mesh.z(2, 3, 2));

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["zord"].as_array_mut().unwrap().pop();
        let error = serde_json::from_value::<Mesh>(value).unwrap_err();
        assert!(error.to_string().contains("z coordinates"), "{error}");

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["node_classes"] = serde_json::json!([0, 1, 2]);
        let error = serde_json::from_value::<Mesh>(value).unwrap_err();
        assert!(error.to_string().contains("node classes"), "{error}");
    }
}
