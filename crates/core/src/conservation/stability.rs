//! Atmospheric stability weighting of the projection
//!
//! The Gauss precision moduli set how strongly the projection may adjust each
//! velocity direction. The horizontal modulus is fixed at one; the vertical
//! modulus is `αV = αH / α` where `α` comes from a stability source. Larger
//! `α` (more unstable air) makes vertical adjustment cheaper.

use crate::mesh::Mesh;
use serde::{Deserialize, Serialize};

/// Horizontal Gauss precision modulus
pub const ALPHA_H: f64 = 1.0;

/// Supplier of the stability parameter `α` at each node
pub trait AlphaSource: Send + Sync {
    /// Stability parameter at node `(i, j, k)`; 1.0 is neutral
    fn alpha(&self, mesh: &Mesh, i: usize, j: usize, k: usize) -> f64;
}

/// Domain-wide stability setting
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Stability {
    /// `α = 1` everywhere
    #[default]
    Neutral,
    /// Constant user-supplied `α`
    Alpha(f64),
}

impl AlphaSource for Stability {
    fn alpha(&self, _mesh: &Mesh, _i: usize, _j: usize, _k: usize) -> f64 {
        match self {
            Stability::Neutral => 1.0,
            Stability::Alpha(alpha) => *alpha,
        }
    }
}

/// `Rx = Ry = 1 / (2 αH²)`
#[inline]
pub fn horizontal_weight() -> f64 {
    1.0 / (2.0 * ALPHA_H * ALPHA_H)
}

/// `Rz = 1 / (2 αV²)`
#[inline]
pub fn vertical_weight(alpha_v: f64) -> f64 {
    1.0 / (2.0 * alpha_v * alpha_v)
}
