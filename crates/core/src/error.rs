//! Error types for the flow solver
//!
//! Numerical non-convergence of a single linear solve is not an error: the
//! iterative solvers return a [`SolveReport`](crate::linalg::SolveReport) and
//! the caller decides whether to fall back. Everything here aborts the
//! operation that raised it.

use thiserror::Error;

/// Errors raised by the mesh, field and solver components
#[derive(Debug, Error)]
pub enum SolverError {
    /// A component was initialized twice without being deallocated
    #[error("{component} is already initialized")]
    AlreadyInitialized { component: &'static str },

    /// An operation was called before `initialize`
    #[error("{component} used before initialization")]
    NotInitialized { component: &'static str },

    /// An operation was called out of its required order
    #[error("{component}: {operation} requires {required}")]
    OutOfOrder {
        component: &'static str,
        operation: &'static str,
        required: &'static str,
    },

    /// A node carries a classification outside internal/face/edge/corner
    #[error("error arranging stiffness matrix: node {node} has unrecognized type {kind}")]
    InvalidNodeType { node: usize, kind: u8 },

    /// Unsupported number of volume quadrature points
    #[error("unsupported number of volume quadrature points: {0}")]
    InvalidQuadrature(usize),

    /// Element with a degenerate or inverted geometry
    #[error("volume Jacobian of element {element} is zero or negative ({det:e})")]
    NegativeJacobian { element: usize, det: f64 },

    /// Compressed-row arrays that do not describe an upper-triangular matrix
    #[error("invalid sparse matrix: {0}")]
    InvalidMatrix(String),

    /// Buffer length does not match the mesh
    #[error("{what}: expected length {expected}, found {found}")]
    SizeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// Both conjugate gradient and MINRES failed to converge
    #[error("{component}: conjugate gradient and MINRES both failed to converge")]
    SolverDiverged { component: &'static str },

    /// The semi-Lagrangian trace never landed inside the mesh
    #[error("particle traced from node {node} stayed outside the mesh after {retries} step halvings")]
    ParticleTraceFailed { node: usize, retries: u32 },

    /// Interpolation requested outside the meshed volume
    #[error("point ({x}, {y}, {z}) is outside the mesh")]
    PointOutsideMesh { x: f64, y: f64, z: f64 },

    /// Time step that is not strictly positive and finite
    #[error("invalid time step: {0}")]
    InvalidTimeStep(f64),

    /// Mesh construction input that cannot form a valid mesh
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),

    /// Physically meaningless run settings
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cooperative cancellation was requested
    #[error("simulation cancelled")]
    Cancelled,
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SolverError>;
