use crate::autodiff::Scalar;
use crate::dynamics::Dynamics;
use crate::prelude::*;

/// Dynamics `a (x - x_op) + b (u - u_op)`.
///
/// The matrices are the source of truth; evaluation is always derived from
/// them. With the default (zero) operating point this is plain `a x + b u`.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct LinearDynamics<const N: usize, const M: usize> {
	pub a: Matrix<f64, N, N>,
	pub b: Matrix<f64, N, M>,
	pub x_op: Vector<f64, N>,
	pub u_op: Vector<f64, M>,
}

impl<const N: usize, const M: usize> LinearDynamics<N, M> {
	pub fn new(a: Matrix<f64, N, N>, b: Matrix<f64, N, M>) -> Self {
		LinearDynamics {
			a,
			b,
			x_op: Vector::zeros(),
			u_op: Vector::zeros(),
		}
	}

	pub fn about(mut self, x_op: Vector<f64, N>, u_op: Vector<f64, M>) -> Self {
		self.x_op = x_op;
		self.u_op = u_op;
		self
	}

	pub fn step(&self, x: &Vector<f64, N>, u: &Vector<f64, M>) -> Vector<f64, N> {
		&self.a * (x - &self.x_op) + &self.b * (u - &self.u_op)
	}

	/// The constant term `c` when the dynamics are written as `a x + b u + c`.
	pub fn offset(&self) -> Vector<f64, N> {
		-(&self.a * &self.x_op + &self.b * &self.u_op)
	}
}

impl<const N: usize, const M: usize> Dynamics<N, M> for LinearDynamics<N, M> {
	fn eval<U: Scalar>(&self, x: Vector<U, N>, u: Vector<U, M>) -> Vector<U, N> {
		let a = lift(&self.a);
		let b = lift(&self.b);
		a * (x - lift(&self.x_op)) + b * (u - lift(&self.u_op))
	}

	fn as_linear(&self) -> Option<&LinearDynamics<N, M>> {
		Some(self)
	}
}

/// Converts an `f64` matrix into any scalar type.
pub fn lift<U: Scalar, const R: usize, const C: usize>(m: &Matrix<f64, R, C>) -> Matrix<U, R, C> {
	Matrix::<U, R, C>::from_fn(|i, j| U::from_subset(&m[(i, j)]))
}
