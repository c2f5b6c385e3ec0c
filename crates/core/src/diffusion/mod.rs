//! Turbulent diffusion of the velocity field
//!
//! Each velocity component obeys
//!
//! ```text
//!  ∂/∂x (R ∂u/∂x) + ∂/∂y (R ∂u/∂y) + ∂/∂z (R ∂u/∂z) + H - Rc ∂u/∂t = 0
//! ```
//!
//! with a mixing-length diffusivity `R = c · height · |∂speed/∂z|`, `Rc = 1`
//! and no source term. Three time discretizations are available, selected by
//! [`DiffusionScheme`].

pub mod equation;

pub use equation::{DiffusionConfig, DiffusionEquation, DiffusionScheme, DiffusionState};
