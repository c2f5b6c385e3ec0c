//! Mass-Conserving Wind Solver Core Library
//!
//! Finite-element numerics for diagnostic wind simulation over terrain.
//! An initial velocity field is adjusted to be divergence-free with a
//! variational projection, then iterated toward a steady state with
//! semi-Lagrangian transport and turbulent diffusion.
//!
//! ## Components
//!
//! - Terrain-following hexahedral mesh and node-based vector/scalar fields
//! - Trilinear hexahedral elements with Gauss quadrature
//! - CRS sparse matrices with symmetric Dirichlet handling
//! - Preconditioned conjugate gradient with a MINRES fallback
//! - Conservation-of-mass projection, diffusion and transport steps
//! - Steady-state driver with progress reporting and cancellation

// Core types and utilities
pub mod core_types;
pub mod error;
pub mod progress;

// Discretization
pub mod fem;
pub mod field;
pub mod mesh;

// Linear algebra
pub mod linalg;
pub mod sparse;

// Physics steps
pub mod conservation;
pub mod diffusion;
pub mod transport;

// Orchestration
pub mod simulation;

// Re-export core types
pub use core_types::Vec3;
pub use error::{Result, SolverError};
pub use progress::{ProgressSink, RecordingProgress, Severity, TracingProgress};

// Re-export mesh and field types
pub use field::{ScalarField, VectorField};
pub use mesh::{Elevation, Mesh, MeshConfig};

// Re-export solver components
pub use conservation::{MassConservation, Stability};
pub use diffusion::{DiffusionConfig, DiffusionEquation, DiffusionScheme};
pub use linalg::{LinearSolver, LinearSolverConfig, SolveReport, SolveStatus};
pub use transport::{SemiLagrangian, TransportConfig};

// Re-export simulation types
pub use simulation::{
    CancellationToken, DomainAverageInitializer, FieldInitializer, SteadyStateConfig, SteadyStateResult,
    SteadyStateSolver, UniformInitializer,
};
