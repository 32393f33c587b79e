use std::ops::RangeInclusive;

use crate::{prelude::*, LinearDynamics};
use nalgebra::Const;
use proptest::strategy::Strategy;

fn scalar() -> RangeInclusive<f64> {
	-2.0..=2.0
}

pub fn matrix<const N: usize, const M: usize>() -> impl Strategy<Value = Matrix<f64, N, M>> {
	nalgebra::proptest::matrix(scalar(), Const::<N>, Const::<M>)
}

pub fn vector<const N: usize>() -> impl Strategy<Value = Vector<f64, N>> {
	matrix::<N, 1>()
}

/// Symmetric positive semidefinite matrices `aᵀa`.
pub fn psd_matrix<const N: usize>() -> impl Strategy<Value = Matrix<f64, N, N>> {
	matrix::<N, N>().prop_map(|a| a.tr_mul(&a))
}

/// Symmetric positive definite matrices `aᵀa + I`.
pub fn pd_matrix<const N: usize>() -> impl Strategy<Value = Matrix<f64, N, N>> {
	psd_matrix::<N>().prop_map(|p| p + Matrix::<f64, N, N>::identity())
}

pub fn linear_dynamics<const N: usize, const M: usize>(
) -> impl Strategy<Value = LinearDynamics<N, M>> {
	let a = matrix::<N, N>();
	let b = matrix::<N, M>();

	(a, b).prop_map(|(a, b)| LinearDynamics::new(a, b))
}

/// Fully actuated discrete-time pairs (`b` is the identity scaled into `[0.5, 2]`),
/// which are always controllable.
pub fn controllable_pair<const N: usize>(
) -> impl Strategy<Value = (Matrix<f64, N, N>, Matrix<f64, N, N>)> {
	(matrix::<N, N>(), 0.5..=2.0f64)
		.prop_map(|(a, gain)| (a, Matrix::<f64, N, N>::identity() * gain))
}
