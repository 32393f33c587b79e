use crate::autodiff::{Autodiff1, Scalar};
use crate::linear::LinearDynamics;
use crate::prelude::*;

/// State dynamics `f(x, u)` with `N` states and `M` inputs.
///
/// For a continuous-time system `f` is the state derivative; for a
/// discrete-time system it is the next state. Implementations are written
/// against a generic [`Scalar`] so they can be differentiated.
pub trait Dynamics<const N: usize, const M: usize> {
	fn eval<U: Scalar>(&self, x: Vector<U, N>, u: Vector<U, M>) -> Vector<U, N>;

	/// The matrix form, if these dynamics are [`LinearDynamics`].
	fn as_linear(&self) -> Option<&LinearDynamics<N, M>> {
		None
	}

	/// Whether `f` is affine in `(x, u)`, so its Jacobian is constant.
	fn is_affine(&self) -> bool {
		self.as_linear().is_some()
	}

	/// Jacobians `(df/dx, df/du)` at `(x, u)`.
	fn jacobian(&self, x: &Vector<f64, N>, u: &Vector<f64, M>) -> (Matrix<f64, N, N>, Matrix<f64, N, M>) {
		match self.as_linear() {
			Some(linear) => (linear.a, linear.b),
			None => jacobian_by_autodiff(self, x, u),
		}
	}

	/// First-order model about `(x_op, u_op)` in deviation coordinates:
	/// `A (x - x_op) + B (u - u_op)`.
	///
	/// The constant `f(x_op, u_op)` is dropped, so the result describes how
	/// `f` changes away from the operating point.
	fn linearize(&self, x_op: Vector<f64, N>, u_op: Vector<f64, M>) -> LinearDynamics<N, M> {
		let (a, b) = self.jacobian(&x_op, &u_op);
		LinearDynamics::new(a, b).about(x_op, u_op)
	}
}

/// Jacobians of `dynamics` at `(x, u)`, one dual-number pass for the state and one for the input.
pub fn jacobian_by_autodiff<D, const N: usize, const M: usize>(
	dynamics: &D,
	x: &Vector<f64, N>,
	u: &Vector<f64, M>,
) -> (Matrix<f64, N, N>, Matrix<f64, N, M>)
where
	D: Dynamics<N, M> + ?Sized,
{
	let ax = Vector::<Autodiff1<f64, N>, N>::from_fn(|i, _| Autodiff1::var(x[i], i));
	let au: Vector<Autodiff1<f64, N>, M> = u.map(Autodiff1::from);
	let fx = dynamics.eval(ax, au);
	let a = Matrix::<f64, N, N>::from_fn(|i, j| fx[i].gradient()[j]);

	let ax: Vector<Autodiff1<f64, M>, N> = x.map(Autodiff1::from);
	let au = Vector::<Autodiff1<f64, M>, M>::from_fn(|i, _| Autodiff1::var(u[i], i));
	let fu = dynamics.eval(ax, au);
	let b = Matrix::<f64, N, M>::from_fn(|i, j| fu[i].gradient()[j]);

	(a, b)
}
