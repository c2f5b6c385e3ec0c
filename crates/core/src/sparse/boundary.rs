//! Node masks used to impose Dirichlet conditions

use crate::mesh::Mesh;
use rayon::prelude::*;

/// Nodes on the lateral faces or the top of the domain
///
/// Ground nodes are not included unless they also sit on a lateral face.
#[must_use]
pub fn boundary_mask(mesh: &Mesh) -> Vec<bool> {
    (0..mesh.numnp())
        .into_par_iter()
        .map(|node| {
            let (i, j, k) = mesh.ijk(node);
            mesh.is_boundary(i, j, k)
        })
        .collect()
}

/// Nodes of the ground layer
#[must_use]
pub fn ground_mask(mesh: &Mesh) -> Vec<bool> {
    let mut mask = vec![false; mesh.numnp()];
    mask[..mesh.layer_size()].fill(true);
    mask
}
