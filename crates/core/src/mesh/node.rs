//! Node classification and point-location results

use serde::{Deserialize, Serialize};

/// Boundary class of a mesh node
///
/// The class counts on how many axes the node sits at an extreme index
/// (row 0 / last row, column 0 / last column, ground / top layer). It decides
/// which of the 26 neighbours exist and therefore the width of the node's
/// stiffness-matrix row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Not on any domain face (27-point stencil)
    Internal,
    /// On exactly one domain face
    Face,
    /// On the intersection of two faces
    Edge,
    /// On a domain corner
    Corner,
}

impl NodeType {
    /// Convert a raw classification count into a node type
    ///
    /// Returns `None` for anything outside `0..=3`, which indicates a corrupted
    /// mesh.
    #[must_use]
    pub fn from_class(class: u8) -> Option<Self> {
        match class {
            0 => Some(NodeType::Internal),
            1 => Some(NodeType::Face),
            2 => Some(NodeType::Edge),
            3 => Some(NodeType::Corner),
            _ => None,
        }
    }
}

/// Element containing a point, plus the point's parent coordinates
///
/// `u`, `v`, `w` are in `[-1, 1]` and run along columns (x), rows (y) and
/// layers (z) respectively.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellLocation {
    pub cell_i: usize,
    pub cell_j: usize,
    pub cell_k: usize,
    pub u: f64,
    pub v: f64,
    pub w: f64,
}
