//! Systems paired with an observation map `y = h(x, u)`.

use crate::autodiff::{Autodiff1, Scalar};
use crate::dynamics::Dynamics;
use crate::error::Result;
use crate::linear::{lift, LinearDynamics};
use crate::prelude::*;
use crate::system::{ContinuousSystem, DiscreteSystem, Discretization, Discretized};

/// An output map `h(x, u)` with `N` states, `M` inputs and `P` outputs.
pub trait Observation<const N: usize, const M: usize, const P: usize> {
	fn observe<U: Scalar>(&self, x: Vector<U, N>, u: Vector<U, M>) -> Vector<U, P>;

	/// Whether `h` is affine in `(x, u)`.
	fn is_affine(&self) -> bool {
		false
	}

	/// Jacobians `(dh/dx, dh/du)` at `(x, u)`.
	fn jacobian(&self, x: &Vector<f64, N>, u: &Vector<f64, M>) -> (Matrix<f64, P, N>, Matrix<f64, P, M>) {
		let ax = Vector::<Autodiff1<f64, N>, N>::from_fn(|i, _| Autodiff1::var(x[i], i));
		let au: Vector<Autodiff1<f64, N>, M> = u.map(Autodiff1::from);
		let hx = self.observe(ax, au);
		let c = Matrix::<f64, P, N>::from_fn(|i, j| hx[i].gradient()[j]);

		let ax: Vector<Autodiff1<f64, M>, N> = x.map(Autodiff1::from);
		let au = Vector::<Autodiff1<f64, M>, M>::from_fn(|i, _| Autodiff1::var(u[i], i));
		let hu = self.observe(ax, au);
		let d = Matrix::<f64, P, M>::from_fn(|i, j| hu[i].gradient()[j]);

		(c, d)
	}
}

/// The whole state is measured: `y = x`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FullState;

impl<const N: usize, const M: usize> Observation<N, M, N> for FullState {
	fn observe<U: Scalar>(&self, x: Vector<U, N>, _u: Vector<U, M>) -> Vector<U, N> {
		x
	}

	fn is_affine(&self) -> bool {
		true
	}

	fn jacobian(&self, _x: &Vector<f64, N>, _u: &Vector<f64, M>) -> (Matrix<f64, N, N>, Matrix<f64, N, M>) {
		(Matrix::identity(), Matrix::zeros())
	}
}

/// `y = c x + d u`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearObservation<const N: usize, const M: usize, const P: usize> {
	pub c: Matrix<f64, P, N>,
	pub d: Matrix<f64, P, M>,
}

impl<const N: usize, const M: usize, const P: usize> LinearObservation<N, M, P> {
	pub fn new(c: Matrix<f64, P, N>, d: Matrix<f64, P, M>) -> Self {
		LinearObservation { c, d }
	}
}

impl<const N: usize, const M: usize, const P: usize> Observation<N, M, P> for LinearObservation<N, M, P> {
	fn observe<U: Scalar>(&self, x: Vector<U, N>, u: Vector<U, M>) -> Vector<U, P> {
		lift(&self.c) * x + lift(&self.d) * u
	}

	fn is_affine(&self) -> bool {
		true
	}

	fn jacobian(&self, _x: &Vector<f64, N>, _u: &Vector<f64, M>) -> (Matrix<f64, P, N>, Matrix<f64, P, M>) {
		(self.c, self.d)
	}
}

/// A system `S` together with an observation `H` producing `P` outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Model<S, H, const P: usize> {
	system: S,
	observation: H,
}

impl<S, H, const P: usize> Model<S, H, P> {
	pub fn new(system: S, observation: H) -> Self {
		Model {
			system,
			observation,
		}
	}

	pub fn system(&self) -> &S {
		&self.system
	}

	pub fn observation(&self) -> &H {
		&self.observation
	}

	pub fn dim_y(&self) -> usize {
		P
	}

	pub fn observe<const N: usize, const M: usize>(&self, x: &Vector<f64, N>, u: &Vector<f64, M>) -> Vector<f64, P>
	where
		H: Observation<N, M, P>,
	{
		self.observation.observe(*x, *u)
	}

	/// Jacobians `(C, D)` of the observation at `(x, u)`.
	pub fn observation_jacobian<const N: usize, const M: usize>(
		&self,
		x: &Vector<f64, N>,
		u: &Vector<f64, M>,
	) -> (Matrix<f64, P, N>, Matrix<f64, P, M>)
	where
		H: Observation<N, M, P>,
	{
		self.observation.jacobian(x, u)
	}
}

/// A model that measures the whole state of a continuous-time system.
impl<D, const N: usize, const M: usize> From<ContinuousSystem<D, N, M>>
	for Model<ContinuousSystem<D, N, M>, FullState, N>
{
	fn from(system: ContinuousSystem<D, N, M>) -> Self {
		Model::new(system, FullState)
	}
}

/// A model that measures the whole state of a discrete-time system.
impl<D, const N: usize, const M: usize> From<DiscreteSystem<D, N, M>>
	for Model<DiscreteSystem<D, N, M>, FullState, N>
{
	fn from(system: DiscreteSystem<D, N, M>) -> Self {
		Model::new(system, FullState)
	}
}

impl<D, H, const N: usize, const M: usize, const P: usize> Model<ContinuousSystem<D, N, M>, H, P>
where
	D: Dynamics<N, M>,
	H: Observation<N, M, P> + Clone,
{
	pub fn dim_x(&self) -> usize {
		N
	}

	pub fn dim_u(&self) -> usize {
		M
	}

	/// A model with linearized dynamics and the same observation.
	pub fn linearize(
		&self,
		x_op: Vector<f64, N>,
		u_op: Vector<f64, M>,
	) -> Model<ContinuousSystem<LinearDynamics<N, M>, N, M>, H, P> {
		Model::new(self.system.linearize(x_op, u_op), self.observation.clone())
	}

	/// See [`ContinuousSystem::discretize`].
	pub fn discretize(
		&self,
		sample_time: f64,
		method: Discretization,
	) -> Result<Model<DiscreteSystem<Discretized<D, N, M>, N, M>, H, P>>
	where
		D: Clone,
	{
		let system = self.system.discretize(sample_time, method)?;
		Ok(Model::new(system, self.observation.clone()))
	}
}

impl<D, H, const N: usize, const M: usize, const P: usize> Model<DiscreteSystem<D, N, M>, H, P>
where
	D: Dynamics<N, M>,
	H: Observation<N, M, P> + Clone,
{
	pub fn dim_x(&self) -> usize {
		N
	}

	pub fn dim_u(&self) -> usize {
		M
	}

	pub fn sample_time(&self) -> f64 {
		self.system.sample_time()
	}

	pub fn step(&self, x: &Vector<f64, N>, u: &Vector<f64, M>) -> Vector<f64, N> {
		self.system.step(x, u)
	}

	/// A model with linearized dynamics and the same observation.
	pub fn linearize(
		&self,
		x_op: Vector<f64, N>,
		u_op: Vector<f64, M>,
	) -> Model<DiscreteSystem<LinearDynamics<N, M>, N, M>, H, P> {
		Model::new(self.system.linearize(x_op, u_op), self.observation.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::collections::Pendulum;
	use approx::assert_relative_eq;
	use nalgebra::{matrix, vector};

	#[derive(Clone)]
	struct Height {
		length: f64,
	}

	impl Observation<2, 1, 1> for Height {
		fn observe<U: Scalar>(&self, x: Vector<U, 2>, _u: Vector<U, 1>) -> Vector<U, 1> {
			vector![-x[0].cos() * U::from_subset(&self.length)]
		}
	}

	#[test]
	fn full_state_is_identity() {
		let model = Model::from(ContinuousSystem::new(Pendulum::new(1.0, 1.0, 0.0)));
		assert_eq!(model.dim_y(), model.dim_x());
		let x = vector![0.3, -0.1];
		assert_eq!(model.observe(&x, &vector![1.0]), x);
		let (c, d) = model.observation_jacobian(&x, &vector![1.0]);
		assert_eq!(c, Matrix::<f64, 2, 2>::identity());
		assert_eq!(d, Matrix::<f64, 2, 1>::zeros());
	}

	#[test]
	fn nonlinear_observation_jacobian() {
		let model: Model<_, _, 1> = Model::new(
			ContinuousSystem::new(Pendulum::new(2.0, 1.0, 0.0)),
			Height { length: 2.0 },
		);
		let x = vector![0.4, 0.0];
		assert_relative_eq!(model.observe(&x, &vector![0.0]), vector![-2.0 * 0.4f64.cos()]);
		let (c, d) = model.observation_jacobian(&x, &vector![0.0]);
		assert_relative_eq!(c, matrix![2.0 * 0.4f64.sin(), 0.0], epsilon = 1e-12);
		assert_eq!(d, matrix![0.0]);
	}

	#[test]
	fn linear_observation() {
		let h = LinearObservation::new(matrix![1.0, 2.0], matrix![0.5]);
		let (c, d) = Observation::<2, 1, 1>::jacobian(&h, &vector![9.0, 9.0], &vector![9.0]);
		assert_eq!(c, h.c);
		assert_eq!(d, h.d);
		assert_relative_eq!(h.observe(vector![1.0, 1.0], vector![2.0]), vector![4.0]);
	}

	#[test]
	fn linearize_and_discretize_keep_observation() {
		let model: Model<_, _, 1> = Model::new(
			ContinuousSystem::new(Pendulum::new(1.0, 1.0, 0.1)),
			Height { length: 1.0 },
		);
		let x = vector![0.2, 0.0];
		let u = vector![0.0];

		let linear = model.linearize(x, u);
		assert_eq!(linear.observe(&x, &u), model.observe(&x, &u));
		assert_eq!(linear.dim_y(), 1);

		let discrete = model.discretize(0.01, Discretization::Rk4).unwrap();
		assert_eq!(discrete.observe(&x, &u), model.observe(&x, &u));
		assert_eq!(discrete.sample_time(), 0.01);
		let next = discrete.step(&x, &u);
		assert!(next[0] < x[0]);

		let relinearized = discrete.linearize(x, u);
		assert_eq!(relinearized.sample_time(), 0.01);
		assert_eq!(relinearized.dim_x(), 2);
		assert_eq!(relinearized.dim_u(), 1);
	}
}
