use log::debug;

use super::{Controller, StateFeedback};
use crate::error::{Error, Result};
use crate::linalg::{is_positive_semidefinite, pinv};
use crate::prelude::*;

const DARE_MAX_ITERS: usize = 10_000;

/// Relative change in the cost-to-go below which the Riccati iteration has converged.
const DARE_TOLERANCE: f64 = 1e-11;

/// One backward Riccati recursion,
/// `AᵀPA − AᵀPB (R + BᵀPB)⁺ BᵀPA + Q`.
fn riccati_step<const N: usize, const M: usize>(
	a: &Matrix<f64, N, N>,
	b: &Matrix<f64, N, M>,
	q: &Matrix<f64, N, N>,
	r: &Matrix<f64, M, M>,
	p: &Matrix<f64, N, N>,
) -> Result<Matrix<f64, N, N>> {
	let k = optimal_gain(a, b, r, p)?;
	let atp = a.transpose() * p;
	Ok(&atp * a - &atp * b * k + q)
}

/// `(R + BᵀPB)⁺ BᵀPA`.
fn optimal_gain<const N: usize, const M: usize>(
	a: &Matrix<f64, N, N>,
	b: &Matrix<f64, N, M>,
	r: &Matrix<f64, M, M>,
	p: &Matrix<f64, N, N>,
) -> Result<Matrix<f64, M, N>> {
	let btp = b.transpose() * p;
	let inverse = pinv("R + BᵀPB", &(r + &btp * b))?;
	Ok(inverse * btp * a)
}

/// Linear-quadratic regulator for `x[k + 1] = A x[k] + B u[k]` with stage cost
/// `xᵀQx + uᵀRu`.
#[derive(Debug, Clone, PartialEq)]
pub struct Lqr<const N: usize, const M: usize> {
	feedback: StateFeedback<N, M>,
	cost_to_go: Matrix<f64, N, N>,
}

impl<const N: usize, const M: usize> Lqr<N, M> {
	/// With `horizon` of `None` the gain is the infinite-horizon one, from the
	/// stabilizing solution of the discrete algebraic Riccati equation.
	/// `Some(n)` applies `n` backward recursions starting from `P = Q`.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] if `q` or `r` is not symmetric positive
	/// semidefinite, and [`Error::RiccatiDivergence`] if the infinite-horizon
	/// iteration does not settle.
	pub fn new(
		a: Matrix<f64, N, N>,
		b: Matrix<f64, N, M>,
		q: Matrix<f64, N, N>,
		r: Matrix<f64, M, M>,
		horizon: Option<usize>,
	) -> Result<Self> {
		if !is_positive_semidefinite(&q) {
			return Err(Error::invalid_config("q must be symmetric positive semidefinite"));
		}
		if !is_positive_semidefinite(&r) {
			return Err(Error::invalid_config("r must be symmetric positive semidefinite"));
		}

		let mut p = q;
		match horizon {
			Some(n) => {
				for _ in 0..n {
					p = riccati_step(&a, &b, &q, &r, &p)?;
				}
			}
			None => {
				let mut iterations = 0;
				loop {
					if iterations == DARE_MAX_ITERS {
						return Err(Error::RiccatiDivergence { iterations });
					}
					iterations += 1;
					let next = riccati_step(&a, &b, &q, &r, &p)?;
					if !next.iter().all(|v| v.is_finite()) {
						return Err(Error::RiccatiDivergence { iterations });
					}
					let change = (next - p).amax();
					p = next;
					if change <= DARE_TOLERANCE * p.amax().max(1.0) {
						break;
					}
				}
				debug!("riccati iteration converged after {iterations} iterations");
			}
		}

		let k = optimal_gain(&a, &b, &r, &p)?;
		Ok(Lqr {
			feedback: StateFeedback::new(k),
			cost_to_go: p,
		})
	}

	pub fn gain(&self) -> &Matrix<f64, M, N> {
		&self.feedback.k
	}

	/// The Riccati matrix `P` the gain was computed from.
	pub fn cost_to_go(&self) -> &Matrix<f64, N, N> {
		&self.cost_to_go
	}

	pub fn feedback(&self, x: &Vector<f64, N>, x_ref: Option<&Vector<f64, N>>) -> Vector<f64, M> {
		self.feedback.feedback(x, x_ref)
	}
}

impl<const N: usize, const M: usize> Controller for Lqr<N, M> {
	type Measurement = Vector<f64, N>;
	type Reference = Vector<f64, N>;
	type Actuation = Vector<f64, M>;

	fn control(&mut self, x: &Vector<f64, N>, x_ref: &Vector<f64, N>) -> Result<Vector<f64, M>> {
		self.feedback.control(x, x_ref)
	}

	fn reset(&mut self) {}
}
