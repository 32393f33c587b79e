use nalgebra::{Const, OMatrix};

use crate::error::{Error, Result};

pub type Matrix<T, const N: usize, const M: usize> = OMatrix<T, Const<N>, Const<M>>;
pub type Vector<T, const N: usize> = Matrix<T, N, 1>;

/// Copies a runtime-sized slice into a fixed-size vector, checking its length.
pub fn vector_from_slice<const N: usize>(what: &'static str, values: &[f64]) -> Result<Vector<f64, N>> {
	if values.len() != N {
		return Err(Error::DimensionMismatch {
			what,
			expected: N,
			actual: values.len(),
		});
	}
	Ok(Vector::<f64, N>::from_column_slice(values))
}
