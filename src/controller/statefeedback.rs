use super::Controller;
use crate::error::Result;
use crate::prelude::*;

/// The static law `u = -k (x - x_ref)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateFeedback<const N: usize, const M: usize> {
	pub k: Matrix<f64, M, N>,
}

impl<const N: usize, const M: usize> StateFeedback<N, M> {
	pub fn new(k: Matrix<f64, M, N>) -> Self {
		StateFeedback { k }
	}

	/// A missing reference regulates to the origin.
	pub fn feedback(&self, x: &Vector<f64, N>, x_ref: Option<&Vector<f64, N>>) -> Vector<f64, M> {
		match x_ref {
			Some(x_ref) => -(&self.k * (x - x_ref)),
			None => -(&self.k * x),
		}
	}
}

impl<const N: usize, const M: usize> Controller for StateFeedback<N, M> {
	type Measurement = Vector<f64, N>;
	type Reference = Vector<f64, N>;
	type Actuation = Vector<f64, M>;

	fn control(&mut self, x: &Vector<f64, N>, x_ref: &Vector<f64, N>) -> Result<Vector<f64, M>> {
		Ok(self.feedback(x, Some(x_ref)))
	}

	fn reset(&mut self) {}
}
