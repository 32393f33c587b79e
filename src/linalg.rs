//! Dense linear algebra on fixed-size matrices.
//!
//! nalgebra's decompositions carry dimension bounds that are awkward to state
//! for generic const sizes, so these helpers round-trip through `DMatrix`.

use log::warn;
use nalgebra::DMatrix;

use crate::error::{Error, Result};
use crate::prelude::*;

/// Singular values below this fraction of the largest are discarded by [`pinv`].
const PINV_RCOND: f64 = 1e-15;

/// A matrix whose smallest singular value is below this fraction of the largest
/// is reported as singular.
const SINGULAR_RCOND: f64 = 1e-12;

pub fn to_dynamic<const R: usize, const C: usize>(m: &Matrix<f64, R, C>) -> DMatrix<f64> {
	DMatrix::from_column_slice(R, C, m.as_slice())
}

pub fn to_static<const R: usize, const C: usize>(m: &DMatrix<f64>) -> Matrix<f64, R, C> {
	debug_assert_eq!(m.shape(), (R, C));
	Matrix::<f64, R, C>::from_fn(|i, j| m[(i, j)])
}

/// Moore-Penrose pseudo-inverse.
///
/// Never fails on rank deficiency. A near-singular input is logged as a
/// warning because the result is then only a least-squares approximation.
pub fn pinv<const R: usize, const C: usize>(
	what: &'static str,
	m: &Matrix<f64, R, C>,
) -> Result<Matrix<f64, C, R>> {
	let svd = to_dynamic(m).svd(true, true);
	let largest = svd.singular_values.max();
	let smallest = svd.singular_values.min();
	if smallest <= SINGULAR_RCOND * largest {
		warn!(
			"{what} is singular or nearly so (singular values {smallest:e}..{largest:e}); using pseudo-inverse"
		);
	}
	let inverse = svd
		.pseudo_inverse(PINV_RCOND * largest)
		.map_err(|reason| Error::Numerical { reason })?;
	Ok(to_static(&inverse))
}

/// Matrix exponential.
pub fn expm<const N: usize>(m: &Matrix<f64, N, N>) -> Matrix<f64, N, N> {
	to_static(&to_dynamic(m).exp())
}

/// Largest eigenvalue modulus.
pub fn spectral_radius<const N: usize>(m: &Matrix<f64, N, N>) -> f64 {
	to_dynamic(m)
		.complex_eigenvalues()
		.iter()
		.map(|lambda| lambda.norm_sqr().sqrt())
		.fold(0.0, f64::max)
}

/// Checks that `m` is symmetric and has no eigenvalue below zero (up to rounding).
pub fn is_positive_semidefinite<const N: usize>(m: &Matrix<f64, N, N>) -> bool {
	let scale = m.amax().max(1.0);
	if (m - m.transpose()).amax() > 1e-9 * scale {
		return false;
	}
	if N == 0 {
		return true;
	}
	to_dynamic(m).symmetric_eigenvalues().min() >= -1e-9 * scale
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;
	use nalgebra::matrix;

	#[test]
	fn pinv_of_invertible_matrix_is_inverse() {
		let a = matrix![2.0, 1.0; 1.0, 3.0];
		let a_inv = pinv("a", &a).unwrap();
		assert_relative_eq!(a * a_inv, Matrix::<f64, 2, 2>::identity(), epsilon = 1e-12);
	}

	#[test]
	fn pinv_of_singular_matrix_is_least_squares() {
		let a = matrix![1.0, 0.0; 0.0, 0.0];
		let a_inv = pinv("a", &a).unwrap();
		assert_relative_eq!(a_inv, matrix![1.0, 0.0; 0.0, 0.0], epsilon = 1e-12);
	}

	#[test]
	fn pinv_of_rectangular_matrix() {
		let a = matrix![1.0, 2.0, 3.0];
		let a_inv = pinv("a", &a).unwrap();
		assert_relative_eq!((a * a_inv)[(0, 0)], 1.0, epsilon = 1e-12);
	}

	#[test]
	fn expm_of_rotation_generator() {
		let t: f64 = 0.3;
		let a = matrix![0.0, t; -t, 0.0];
		let expected = matrix![t.cos(), t.sin(); -t.sin(), t.cos()];
		assert_relative_eq!(expm(&a), expected, epsilon = 1e-12);
	}

	#[test]
	fn spectral_radius_of_triangular_matrix() {
		let a = matrix![0.5, 10.0; 0.0, -0.8];
		assert_relative_eq!(spectral_radius(&a), 0.8, epsilon = 1e-9);
	}

	#[test]
	fn semidefinite_check() {
		assert!(is_positive_semidefinite(&matrix![1.0, 0.0; 0.0, 0.0]));
		assert!(!is_positive_semidefinite(&matrix![1.0, 0.0; 0.0, -1.0]));
		assert!(!is_positive_semidefinite(&matrix![1.0, 0.5; 0.0, 1.0]));
	}
}
