//! Sparse stiffness-matrix storage and boundary-condition elimination

pub mod boundary;
pub mod crs;

pub use boundary::{boundary_mask, ground_mask};
pub use crs::CrsMatrix;
