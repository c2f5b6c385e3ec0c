//! Steady-state wind simulation
//!
//! [`SteadyStateSolver`] drives the projection, transport and diffusion
//! components from an initial field supplied by a [`FieldInitializer`].

pub mod cancel;
pub mod initializer;
pub mod steady_state;

pub use cancel::CancellationToken;
pub use initializer::{
    DomainAverageInitializer, FieldInitializer, UniformInitializer, INPUT_HEIGHT_DEFAULT, ROUGHNESS_DEFAULT,
};
pub use steady_state::{SteadyStateConfig, SteadyStateResult, SteadyStateSolver};
