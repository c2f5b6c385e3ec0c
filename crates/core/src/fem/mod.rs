//! Finite-element layer shared by the projection and diffusion solvers
//!
//! Trilinear hexahedral elements, Gauss–Legendre volume quadrature and the
//! element loop used for assembly and gradient recovery.

pub mod element;
pub mod finite_element;

pub use element::{shape_derivatives, shape_functions, QuadraturePoint, QuadratureRule, LOCAL_NODES};
pub use finite_element::FiniteElement;
