//! Volumetric mesh consumed by the flow solver
//!
//! Mesh generation proper belongs to the caller. The types here describe the
//! finished lattice (node coordinates, node classes, element connectivity and
//! point location) plus a small terrain-following builder for tests and
//! examples.

pub mod grid;
pub mod node;
pub mod terrain;

pub use grid::{Mesh, MeshConfig};
pub use node::{CellLocation, NodeType};
pub use terrain::Elevation;
