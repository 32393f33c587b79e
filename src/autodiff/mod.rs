//! Forward-mode automatic differentiation.
//!
//! Dynamics and observation maps are written once against the generic
//! [`Scalar`] bound. Evaluating them on [`Autodiff1`] values instead of `f64`
//! yields their Jacobians alongside their values.

mod autodiff1;

pub use autodiff1::Autodiff1;

pub trait Scalar: nalgebra::ComplexField + Copy {}
impl<T> Scalar for T where T: nalgebra::ComplexField + Copy {}
