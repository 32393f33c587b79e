//! Continuous- and discrete-time systems built from [`Dynamics`].

use std::fmt;
use std::str::FromStr;

use crate::autodiff::Scalar;
use crate::dynamics::{jacobian_by_autodiff, Dynamics};
use crate::error::{Error, Result};
use crate::linalg::{expm, pinv};
use crate::linear::{lift, LinearDynamics};
use crate::prelude::*;

/// How a continuous-time system is turned into a discrete-time one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Discretization {
	/// `x + dt f(x, u)`.
	Euler,
	/// Classic four-stage Runge-Kutta.
	Rk4,
	/// Zero-order-hold solution of linear dynamics via the matrix exponential.
	Exact,
}

impl FromStr for Discretization {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		match s {
			"euler" => Ok(Discretization::Euler),
			"rk4" => Ok(Discretization::Rk4),
			"exact" => Ok(Discretization::Exact),
			_ => Err(Error::UnsupportedMethod {
				method: s.to_owned(),
				reason: "expected one of `euler`, `rk4`, `exact`",
			}),
		}
	}
}

impl fmt::Display for Discretization {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Discretization::Euler => "euler",
			Discretization::Rk4 => "rk4",
			Discretization::Exact => "exact",
		})
	}
}

/// Discrete-time dynamics obtained from continuous-time dynamics `D`.
#[derive(Debug, Clone, PartialEq)]
pub enum Discretized<D, const N: usize, const M: usize> {
	Euler { dynamics: D, sample_time: f64 },
	Rk4 { dynamics: D, sample_time: f64 },
	/// `x_op + a_d (x - x_op) + b_d (u - u_op)`.
	Exact {
		a_d: Matrix<f64, N, N>,
		b_d: Matrix<f64, N, M>,
		x_op: Vector<f64, N>,
		u_op: Vector<f64, M>,
	},
}

impl<D: Dynamics<N, M>, const N: usize, const M: usize> Dynamics<N, M> for Discretized<D, N, M> {
	fn eval<U: Scalar>(&self, x: Vector<U, N>, u: Vector<U, M>) -> Vector<U, N> {
		match self {
			Discretized::Euler {
				dynamics,
				sample_time,
			} => {
				let dt = U::from_subset(sample_time);
				dynamics.eval(x, u) * dt + x
			}
			Discretized::Rk4 {
				dynamics,
				sample_time,
			} => {
				let dt = U::from_subset(sample_time);
				let half_dt = U::from_subset(&(sample_time * 0.5));
				let two = U::from_subset(&2.0);
				let k1 = dynamics.eval(x, u);
				let k2 = dynamics.eval(x + k1 * half_dt, u);
				let k3 = dynamics.eval(x + k2 * half_dt, u);
				let k4 = dynamics.eval(x + k3 * dt, u);
				x + (k1 + k2 * two + k3 * two + k4) * (dt / U::from_subset(&6.0))
			}
			Discretized::Exact {
				a_d,
				b_d,
				x_op,
				u_op,
			} => {
				let x_op = lift(x_op);
				lift(a_d) * (x - x_op) + lift(b_d) * (u - lift(u_op)) + x_op
			}
		}
	}

	fn is_affine(&self) -> bool {
		match self {
			Discretized::Euler { dynamics, .. } | Discretized::Rk4 { dynamics, .. } => {
				dynamics.is_affine()
			}
			Discretized::Exact { .. } => true,
		}
	}

	fn jacobian(&self, x: &Vector<f64, N>, u: &Vector<f64, M>) -> (Matrix<f64, N, N>, Matrix<f64, N, M>) {
		match self {
			Discretized::Exact { a_d, b_d, .. } => (*a_d, *b_d),
			_ => jacobian_by_autodiff(self, x, u),
		}
	}
}

fn check_sample_time(sample_time: f64) -> Result<()> {
	if !sample_time.is_finite() || sample_time <= 0.0 {
		return Err(Error::invalid_config(format!(
			"sample time must be finite and positive, got {sample_time}"
		)));
	}
	Ok(())
}

fn checked_jacobian<D: Dynamics<N, M>, const N: usize, const M: usize>(
	dynamics: &D,
	x_op: &[f64],
	u_op: &[f64],
) -> Result<(Matrix<f64, N, N>, Matrix<f64, N, M>)> {
	let x_op = vector_from_slice::<N>("state", x_op)?;
	let u_op = vector_from_slice::<M>("input", u_op)?;
	Ok(dynamics.jacobian(&x_op, &u_op))
}

/// A system `x' = f(x, u)` with `N` states and `M` inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuousSystem<D, const N: usize, const M: usize> {
	dynamics: D,
}

impl<D: Dynamics<N, M>, const N: usize, const M: usize> ContinuousSystem<D, N, M> {
	pub fn new(dynamics: D) -> Self {
		ContinuousSystem { dynamics }
	}

	pub fn dynamics(&self) -> &D {
		&self.dynamics
	}

	pub fn dim_x(&self) -> usize {
		N
	}

	pub fn dim_u(&self) -> usize {
		M
	}

	pub fn derivative(&self, x: &Vector<f64, N>, u: &Vector<f64, M>) -> Vector<f64, N> {
		self.dynamics.eval(*x, *u)
	}

	/// Jacobians at an operating point given as runtime slices.
	///
	/// # Errors
	///
	/// Returns [`Error::DimensionMismatch`] if a slice length differs from `N` or `M`.
	pub fn get_jacobian(
		&self,
		x_op: &[f64],
		u_op: &[f64],
	) -> Result<(Matrix<f64, N, N>, Matrix<f64, N, M>)> {
		checked_jacobian(&self.dynamics, x_op, u_op)
	}

	pub fn jacobian(&self, x_op: &Vector<f64, N>, u_op: &Vector<f64, M>) -> (Matrix<f64, N, N>, Matrix<f64, N, M>) {
		self.dynamics.jacobian(x_op, u_op)
	}

	/// A new system with dynamics `A (x - x_op) + B (u - u_op)`; `self` is unchanged.
	pub fn linearize(
		&self,
		x_op: Vector<f64, N>,
		u_op: Vector<f64, M>,
	) -> ContinuousSystem<LinearDynamics<N, M>, N, M> {
		ContinuousSystem::new(self.dynamics.linearize(x_op, u_op))
	}

	/// A new discrete-time system with the given sample time; `self` is unchanged.
	///
	/// `Exact` uses `A_d = exp(A dt)` and `B_d = pinv(A) (A_d - I) B`. When `A`
	/// is singular the pseudo-inverse is still used (with a logged warning), so
	/// `B_d` is only a least-squares approximation in that case.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] for a non-positive sample time and
	/// [`Error::UnsupportedMethod`] when `Exact` is requested for dynamics that
	/// are not [`LinearDynamics`].
	pub fn discretize(
		&self,
		sample_time: f64,
		method: Discretization,
	) -> Result<DiscreteSystem<Discretized<D, N, M>, N, M>>
	where
		D: Clone,
	{
		check_sample_time(sample_time)?;
		let dynamics = match method {
			Discretization::Euler => Discretized::Euler {
				dynamics: self.dynamics.clone(),
				sample_time,
			},
			Discretization::Rk4 => Discretized::Rk4 {
				dynamics: self.dynamics.clone(),
				sample_time,
			},
			Discretization::Exact => {
				let linear = self.dynamics.as_linear().ok_or(Error::UnsupportedMethod {
					method: method.to_string(),
					reason: "exact discretization requires linear dynamics",
				})?;
				let a_d = expm(&(linear.a * sample_time));
				let a_pinv = pinv("continuous-time state matrix", &linear.a)?;
				let b_d = a_pinv * (a_d - Matrix::<f64, N, N>::identity()) * linear.b;
				Discretized::Exact {
					a_d,
					b_d,
					x_op: linear.x_op,
					u_op: linear.u_op,
				}
			}
		};
		DiscreteSystem::new(dynamics, sample_time)
	}
}

/// A system `x[k + 1] = f(x[k], u[k])` with a fixed sample time.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteSystem<D, const N: usize, const M: usize> {
	dynamics: D,
	sample_time: f64,
}

impl<D: Dynamics<N, M>, const N: usize, const M: usize> DiscreteSystem<D, N, M> {
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] if `sample_time` is not finite and positive.
	pub fn new(dynamics: D, sample_time: f64) -> Result<Self> {
		check_sample_time(sample_time)?;
		Ok(DiscreteSystem {
			dynamics,
			sample_time,
		})
	}

	pub fn dynamics(&self) -> &D {
		&self.dynamics
	}

	pub fn sample_time(&self) -> f64 {
		self.sample_time
	}

	pub fn dim_x(&self) -> usize {
		N
	}

	pub fn dim_u(&self) -> usize {
		M
	}

	pub fn step(&self, x: &Vector<f64, N>, u: &Vector<f64, M>) -> Vector<f64, N> {
		self.dynamics.eval(*x, *u)
	}

	/// One step with zero input.
	pub fn step_unforced(&self, x: &Vector<f64, N>) -> Vector<f64, N> {
		self.step(x, &Vector::zeros())
	}

	/// The `us.len() + 1` states visited from `x0` under the inputs `us`.
	pub fn rollout(&self, x0: Vector<f64, N>, us: &[Vector<f64, M>]) -> Vec<Vector<f64, N>> {
		let mut xs = Vec::with_capacity(us.len() + 1);
		xs.push(x0);
		for u in us {
			let x = self.step(&xs[xs.len() - 1], u);
			xs.push(x);
		}
		xs
	}

	/// Jacobians at an operating point given as runtime slices.
	///
	/// # Errors
	///
	/// Returns [`Error::DimensionMismatch`] if a slice length differs from `N` or `M`.
	pub fn get_jacobian(
		&self,
		x_op: &[f64],
		u_op: &[f64],
	) -> Result<(Matrix<f64, N, N>, Matrix<f64, N, M>)> {
		checked_jacobian(&self.dynamics, x_op, u_op)
	}

	pub fn jacobian(&self, x_op: &Vector<f64, N>, u_op: &Vector<f64, M>) -> (Matrix<f64, N, N>, Matrix<f64, N, M>) {
		self.dynamics.jacobian(x_op, u_op)
	}

	/// A new system with dynamics `A (x - x_op) + B (u - u_op)`; `self` is unchanged.
	pub fn linearize(
		&self,
		x_op: Vector<f64, N>,
		u_op: Vector<f64, M>,
	) -> DiscreteSystem<LinearDynamics<N, M>, N, M> {
		DiscreteSystem {
			dynamics: self.dynamics.linearize(x_op, u_op),
			sample_time: self.sample_time,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::collections::{Integrator, Pendulum};
	use approx::assert_relative_eq;
	use more_asserts::*;
	use nalgebra::{matrix, vector};

	fn rotation() -> ContinuousSystem<LinearDynamics<2, 1>, 2, 1> {
		ContinuousSystem::new(LinearDynamics::new(
			matrix![0.0, 1.0; -1.0, 0.0],
			matrix![0.0; 1.0],
		))
	}

	/// Integrates `system` to time `t_end` with a fine RK4 grid.
	fn reference_solution(x0: Vector<f64, 2>, u: Vector<f64, 1>, t_end: f64) -> Vector<f64, 2> {
		let steps = 20_000;
		let fine = ContinuousSystem::new(Pendulum::new(1.0, 1.0, 0.2))
			.discretize(t_end / steps as f64, Discretization::Rk4)
			.unwrap();
		(0..steps).fold(x0, |x, _| fine.step(&x, &u))
	}

	fn simulate<D: Dynamics<2, 1>>(
		system: &DiscreteSystem<D, 2, 1>,
		x0: Vector<f64, 2>,
		u: Vector<f64, 1>,
		t_end: f64,
	) -> Vector<f64, 2> {
		let steps = (t_end / system.sample_time()).round() as usize;
		(0..steps).fold(x0, |x, _| system.step(&x, &u))
	}

	#[test]
	fn method_names() {
		assert_eq!("euler".parse::<Discretization>().unwrap(), Discretization::Euler);
		assert_eq!("rk4".parse::<Discretization>().unwrap(), Discretization::Rk4);
		assert_eq!("exact".parse::<Discretization>().unwrap(), Discretization::Exact);
		assert!(matches!(
			"trapezoid".parse::<Discretization>(),
			Err(Error::UnsupportedMethod { .. })
		));
	}

	#[test]
	fn euler_step() {
		let decay = ContinuousSystem::new(LinearDynamics::new(matrix![-1.0], matrix![1.0]));
		let discrete = decay.discretize(0.1, Discretization::Euler).unwrap();
		assert_relative_eq!(discrete.step(&vector![1.0], &vector![0.5]), vector![0.95]);
		assert_relative_eq!(discrete.step_unforced(&vector![1.0]), vector![0.9]);
	}

	#[test]
	fn exact_requires_linear_dynamics() {
		let pendulum = ContinuousSystem::new(Pendulum::new(1.0, 1.0, 0.0));
		assert!(matches!(
			pendulum.discretize(0.1, Discretization::Exact),
			Err(Error::UnsupportedMethod { .. })
		));
	}

	#[test]
	fn sample_time_must_be_positive() {
		let pendulum = ContinuousSystem::new(Pendulum::new(1.0, 1.0, 0.0));
		assert!(matches!(
			pendulum.discretize(0.0, Discretization::Euler),
			Err(Error::InvalidConfig { .. })
		));
		assert!(DiscreteSystem::new(Integrator::<1>, f64::NAN).is_err());
	}

	#[test]
	fn exact_matches_matrix_exponential() {
		let discrete = rotation().discretize(0.1, Discretization::Exact).unwrap();
		let x0 = vector![1.0, 0.5];
		let x = (0..10).fold(x0, |x, _| discrete.step_unforced(&x));
		let t: f64 = 1.0;
		let closed_form = matrix![t.cos(), t.sin(); -t.sin(), t.cos()] * x0;
		assert_relative_eq!(x, closed_form, epsilon = 1e-10);
	}

	#[test]
	fn exact_agrees_with_integrators_for_small_steps() {
		let dt = 1e-3;
		let system = rotation();
		let x0 = vector![0.3, -0.7];
		let u = vector![0.4];
		let exact = system.discretize(dt, Discretization::Exact).unwrap().step(&x0, &u);
		let rk4 = system.discretize(dt, Discretization::Rk4).unwrap().step(&x0, &u);
		let euler = system.discretize(dt, Discretization::Euler).unwrap().step(&x0, &u);
		assert_lt!((exact - rk4).amax(), 1e-12);
		assert_lt!((exact - euler).amax(), 1e-5);
	}

	#[test]
	fn exact_keeps_operating_point() {
		let system = rotation().linearize(vector![1.0, 0.0], vector![0.0]);
		let discrete = system.discretize(0.2, Discretization::Exact).unwrap();
		assert_relative_eq!(
			discrete.step(&vector![1.0, 0.0], &vector![0.0]),
			vector![1.0, 0.0],
			epsilon = 1e-12
		);
	}

	#[test]
	fn exact_with_singular_state_matrix_uses_pseudo_inverse() {
		let integrator = ContinuousSystem::new(LinearDynamics::new(matrix![0.0], matrix![1.0]));
		let discrete = integrator.discretize(0.1, Discretization::Exact).unwrap();
		// pinv(0) = 0, so the input has no effect: the documented inaccuracy for singular `A`.
		assert_relative_eq!(discrete.step(&vector![2.0], &vector![1.0]), vector![2.0]);
	}

	#[test]
	fn integrators_converge_as_sample_time_shrinks() {
		let system = ContinuousSystem::new(Pendulum::new(1.0, 1.0, 0.2));
		let x0 = vector![1.0, 0.0];
		let u = vector![0.3];
		let t_end = 2.0;
		let reference = reference_solution(x0, u, t_end);

		for method in [Discretization::Euler, Discretization::Rk4] {
			let errors: Vec<f64> = [0.1, 0.05, 0.025]
				.iter()
				.map(|&dt| {
					let discrete = system.discretize(dt, method).unwrap();
					(simulate(&discrete, x0, u, t_end) - reference).amax()
				})
				.collect();
			assert_lt!(errors[1], errors[0]);
			assert_lt!(errors[2], errors[1]);
		}
	}

	#[test]
	fn rk4_is_more_accurate_than_euler() {
		let system = ContinuousSystem::new(Pendulum::new(1.0, 1.0, 0.2));
		let x0 = vector![2.5, 0.0];
		let u = vector![0.0];
		let t_end = 3.0;
		let reference = reference_solution(x0, u, t_end);
		for dt in [0.1, 0.02] {
			let euler = simulate(&system.discretize(dt, Discretization::Euler).unwrap(), x0, u, t_end);
			let rk4 = simulate(&system.discretize(dt, Discretization::Rk4).unwrap(), x0, u, t_end);
			assert_le!((rk4 - reference).amax(), (euler - reference).amax());
		}
	}

	#[test]
	fn rollout_visits_every_state() {
		let accumulator = LinearDynamics::new(matrix![1.0], matrix![1.0]);
		let system = DiscreteSystem::new(accumulator, 1.0).unwrap();
		let xs = system.rollout(vector![0.0], &[vector![1.0], vector![2.0], vector![-0.5]]);
		assert_eq!(xs, vec![vector![0.0], vector![1.0], vector![3.0], vector![2.5]]);
	}

	#[test]
	fn get_jacobian_checks_dimensions() {
		let system = ContinuousSystem::new(Pendulum::new(1.0, 1.0, 0.0));
		assert!(system.get_jacobian(&[0.0, 0.0], &[0.0]).is_ok());
		match system.get_jacobian(&[0.0, 0.0, 0.0], &[0.0]) {
			Err(Error::DimensionMismatch {
				expected, actual, ..
			}) => {
				assert_eq!(expected, 2);
				assert_eq!(actual, 3);
			}
			other => panic!("unexpected result {other:?}"),
		}
		assert!(system.get_jacobian(&[0.0, 0.0], &[]).is_err());
	}

	#[test]
	fn linearize_keeps_original_and_sample_time() {
		let pendulum = ContinuousSystem::new(Pendulum::new(1.0, 1.0, 0.0));
		let discrete = pendulum.discretize(0.05, Discretization::Rk4).unwrap();
		let lin = discrete.linearize(vector![0.0, 0.0], vector![0.0]);
		assert_eq!(lin.sample_time(), 0.05);
		let (a, b) = discrete.jacobian(&vector![0.0, 0.0], &vector![0.0]);
		assert_eq!(lin.dynamics().a, a);
		assert_eq!(lin.dynamics().b, b);
		assert_relative_eq!(
			discrete.step(&vector![0.1, 0.0], &vector![0.0]),
			pendulum.discretize(0.05, Discretization::Rk4).unwrap().step(&vector![0.1, 0.0], &vector![0.0])
		);
	}
}
