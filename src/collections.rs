//! Ready-made dynamics.

use crate::autodiff::Scalar;
use crate::dynamics::Dynamics;
use crate::prelude::*;

/// A damped pendulum driven by a torque at the pivot.
///
/// State `[theta, omega]` with `theta = 0` hanging straight down; input `[torque]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pendulum {
	pub length: f64,
	pub mass: f64,
	pub damping: f64,
	pub gravity: f64,
}

impl Pendulum {
	pub fn new(length: f64, mass: f64, damping: f64) -> Self {
		Pendulum {
			length,
			mass,
			damping,
			gravity: 9.81,
		}
	}
}

impl Dynamics<2, 1> for Pendulum {
	fn eval<U: Scalar>(&self, x: Vector<U, 2>, u: Vector<U, 1>) -> Vector<U, 2> {
		let inertia = self.mass * self.length * self.length;
		let theta = x[0];
		let omega = x[1];
		let omega_dot = omega * U::from_subset(&(-self.damping / inertia))
			- theta.sin() * U::from_subset(&(self.gravity / self.length))
			+ u[0] * U::from_subset(&inertia.recip());
		nalgebra::vector![omega, omega_dot]
	}
}

/// `N` independent integrators, `x' = u`.
///
/// Only Euler and RK4 discretization apply: exact discretization needs
/// [`LinearDynamics`](crate::LinearDynamics), and with `A = 0` its
/// pseudo-inverse formula would drop the input entirely. Both integrators are
/// exact for this system anyway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Integrator<const N: usize>;

impl<const N: usize> Dynamics<N, N> for Integrator<N> {
	fn eval<U: Scalar>(&self, _x: Vector<U, N>, u: Vector<U, N>) -> Vector<U, N> {
		u
	}

	fn is_affine(&self) -> bool {
		true
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::Error;
	use crate::system::{ContinuousSystem, Discretization};
	use approx::assert_relative_eq;
	use nalgebra::{matrix, vector};

	#[test]
	fn pendulum_jacobian_at_rest() {
		let pendulum = Pendulum::new(2.0, 0.5, 0.1);
		let (a, b) = pendulum.jacobian(&vector![0.0, 0.0], &vector![0.0]);
		let inertia = 0.5 * 4.0;
		assert_relative_eq!(
			a,
			matrix![0.0, 1.0; -9.81 / 2.0, -0.1 / inertia],
			epsilon = 1e-12
		);
		assert_relative_eq!(b, matrix![0.0; 1.0 / inertia], epsilon = 1e-12);
	}

	#[test]
	fn pendulum_inverted_is_unstable() {
		let pendulum = Pendulum::new(1.0, 1.0, 0.0);
		let (a, _) = pendulum.jacobian(&vector![std::f64::consts::PI, 0.0], &vector![0.0]);
		assert_relative_eq!(a[(1, 0)], 9.81, epsilon = 1e-12);
	}

	#[test]
	fn integrator_discretizes_without_matrix_exponential() {
		let system = ContinuousSystem::new(Integrator::<2>);
		let exact = system.discretize(0.1, Discretization::Exact);
		assert!(matches!(exact, Err(Error::UnsupportedMethod { .. })));

		let rk4 = system.discretize(0.1, Discretization::Rk4).unwrap();
		assert_relative_eq!(rk4.step(&vector![1.0, 2.0], &vector![3.0, -4.0]), vector![1.3, 1.6], epsilon = 1e-12);
	}

	#[test]
	fn integrator_jacobian() {
		let (a, b) = Integrator::<2>.jacobian(&vector![1.0, 2.0], &vector![3.0, 4.0]);
		assert_eq!(a, Matrix::<f64, 2, 2>::zeros());
		assert_eq!(b, Matrix::<f64, 2, 2>::identity());
	}
}
