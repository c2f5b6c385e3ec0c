//! Nodal field storage
//!
//! Dense arrays with one value per mesh node, shared by every solver stage.

pub mod scalar;
pub mod vector;

pub use scalar::ScalarField;
pub use vector::VectorField;
