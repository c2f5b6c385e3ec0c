//! Conservation-of-mass projection
//!
//! Solves for the scalar potential whose gradient removes the divergence of
//! a velocity field, weighted by atmospheric stability.

pub mod projection;
pub mod stability;

pub use projection::{MassConservation, ProjectionStage};
pub use stability::{AlphaSource, Stability, ALPHA_H};
