pub mod autodiff;
pub mod collections;
mod config;
pub mod controller;
mod dynamics;
mod error;
pub mod linalg;
mod linear;
mod model;
mod prelude;
mod qp;
mod system;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub use config::{IterationConfig, OptionValue, SolverOptions};
pub use controller::Controller;
pub use dynamics::{jacobian_by_autodiff, Dynamics};
pub use error::{Error, Result, SolveError, SolveFailure};
pub use linear::{lift, LinearDynamics};
pub use model::{FullState, LinearObservation, Model, Observation};
pub use prelude::*;
pub use system::{ContinuousSystem, DiscreteSystem, Discretization, Discretized};
