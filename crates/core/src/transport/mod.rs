//! Semi-Lagrangian advection
//!
//! Each node takes the value found where a particle arriving at the node was
//! one time step earlier. Departure points are traced backward along the
//! node's own velocity and sampled by trilinear interpolation.

pub mod semi_lagrangian;

pub use semi_lagrangian::{SemiLagrangian, TransportConfig};
