//! Data-enabled predictive control.
//!
//! Recorded input/output data `u_d`, `y_d` replace a model: every trajectory
//! of length `T_ini + N` of the (unknown) linear system is a combination `g`
//! of the columns of the block-Hankel matrices built from the data. With the
//! first `T_ini` block rows as the past (`U_p`, `Y_p`) and the rest as the
//! future (`U_f`, `Y_f`), each step solves
//!
//! ```text
//! min  Σ (y_i − y_ref_i)ᵀ Q (y_i − y_ref_i) + u_iᵀ R u_i
//! s.t. [U_p; Y_p; U_f; Y_f] g = [u_init; y_init; u; y]
//! ```
//!
//! There are no input or output bounds and `g` is not regularized, so the
//! data should come from a system that is close to linear and noise free.

use log::debug;
use nalgebra::{DMatrix, DVector};

use super::Controller;
use crate::config::SolverOptions;
use crate::error::{Error, Result, SolveError, SolveFailure};
use crate::linalg::is_positive_semidefinite;
use crate::prelude::*;
use crate::qp::QuadraticProgram;

/// Block-Hankel matrix of `signal` with `depth` block rows.
///
/// Column `j` stacks `signal[j], signal[j + 1], .., signal[j + depth − 1]`, so
/// the result has `D · depth` rows and `T − depth + 1` columns.
///
/// # Errors
///
/// Returns [`Error::InsufficientData`] if `signal` has fewer than `depth`
/// samples and [`Error::InvalidConfig`] if `depth` is zero.
pub fn hankel<const D: usize>(signal: &[Vector<f64, D>], depth: usize) -> Result<DMatrix<f64>> {
	if depth == 0 {
		return Err(Error::invalid_config("hankel depth must be at least 1"));
	}
	if signal.len() < depth {
		return Err(Error::InsufficientData {
			what: "samples for the hankel matrix",
			required: depth,
			available: signal.len(),
		});
	}
	let columns = signal.len() - depth + 1;
	Ok(DMatrix::from_fn(D * depth, columns, |row, col| {
		signal[col + row / D][row % D]
	}))
}

/// The most recent `T_ini` inputs and outputs, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct DeepcWindow<const M: usize, const P: usize> {
	pub u_init: Vec<Vector<f64, M>>,
	pub y_init: Vec<Vector<f64, P>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeepcSolution<const M: usize, const P: usize> {
	pub u: Vec<Vector<f64, M>>,
	pub y: Vec<Vector<f64, P>>,
	pub g: DVector<f64>,
	pub cost: f64,
}

/// DeePC controller with `M` inputs and `P` outputs.
pub struct Deepc<const M: usize, const P: usize> {
	u_p: DMatrix<f64>,
	u_f: DMatrix<f64>,
	y_p: DMatrix<f64>,
	y_f: DMatrix<f64>,
	q: Matrix<f64, P, P>,
	r: Matrix<f64, M, M>,
	initial_length: usize,
	horizon_length: usize,
	qp: QuadraticProgram,
	a: DMatrix<f64>,
}

impl<const M: usize, const P: usize> Deepc<M, P> {
	/// # Errors
	///
	/// - [`Error::DimensionMismatch`] if `u_d` and `y_d` differ in length.
	/// - [`Error::InsufficientData`] if there are fewer than
	///   `initial_length + horizon_length` samples.
	/// - [`Error::InvalidConfig`] for a zero length, weights that are not
	///   positive semidefinite, or invalid solver options.
	pub fn new(
		u_d: &[Vector<f64, M>],
		y_d: &[Vector<f64, P>],
		q: Matrix<f64, P, P>,
		r: Matrix<f64, M, M>,
		initial_length: usize,
		horizon_length: usize,
		solver: SolverOptions,
	) -> Result<Self> {
		if initial_length == 0 || horizon_length == 0 {
			return Err(Error::invalid_config(
				"initial_length and horizon_length must be at least 1",
			));
		}
		if u_d.len() != y_d.len() {
			return Err(Error::DimensionMismatch {
				what: "output data samples",
				expected: u_d.len(),
				actual: y_d.len(),
			});
		}
		if !is_positive_semidefinite(&q) || !is_positive_semidefinite(&r) {
			return Err(Error::invalid_config(
				"q and r must be symmetric positive semidefinite",
			));
		}
		let settings = solver.settings()?;

		let depth = initial_length + horizon_length;
		let u_hankel = hankel(u_d, depth)?;
		let y_hankel = hankel(y_d, depth)?;
		let columns = u_hankel.ncols();
		let u_p = u_hankel.rows(0, M * initial_length).into_owned();
		let u_f = u_hankel.rows(M * initial_length, M * horizon_length).into_owned();
		let y_p = y_hankel.rows(0, P * initial_length).into_owned();
		let y_f = y_hankel.rows(P * initial_length, P * horizon_length).into_owned();

		// z = [u; y; g]
		let u_len = M * horizon_length;
		let y_len = P * horizon_length;
		let variables = u_len + y_len + columns;
		let rows = (M + P) * depth;

		let mut a = DMatrix::zeros(rows, variables);
		let g = u_len + y_len;
		let mut row = 0;
		for block in [&u_p, &y_p, &u_f, &y_f] {
			a.slice_mut((row, g), (block.nrows(), columns)).copy_from(block);
			row += block.nrows();
		}
		let future = (M + P) * initial_length;
		a.slice_mut((future, 0), (u_len + y_len, u_len + y_len))
			.fill_diagonal(-1.0);

		let mut hessian = DMatrix::zeros(variables, variables);
		for i in 0..horizon_length {
			hessian
				.fixed_slice_mut::<M, M>(i * M, i * M)
				.copy_from(&(r * 2.0));
			hessian
				.fixed_slice_mut::<P, P>(u_len + i * P, u_len + i * P)
				.copy_from(&(q * 2.0));
		}

		debug!("deepc problem: {columns} hankel columns, {variables} variables, {rows} equalities");

		Ok(Deepc {
			u_p,
			u_f,
			y_p,
			y_f,
			q,
			r,
			initial_length,
			horizon_length,
			qp: QuadraticProgram::new(&hessian, rows, 0, settings),
			a,
		})
	}

	pub fn u_p(&self) -> &DMatrix<f64> {
		&self.u_p
	}

	pub fn u_f(&self) -> &DMatrix<f64> {
		&self.u_f
	}

	pub fn y_p(&self) -> &DMatrix<f64> {
		&self.y_p
	}

	pub fn y_f(&self) -> &DMatrix<f64> {
		&self.y_f
	}

	pub fn initial_length(&self) -> usize {
		self.initial_length
	}

	pub fn horizon_length(&self) -> usize {
		self.horizon_length
	}

	/// # Errors
	///
	/// Returns [`Error::DimensionMismatch`] if the window does not hold
	/// `initial_length` samples or `y_ref` does not hold `horizon_length`
	/// outputs, and [`Error::Solve`] if the solver fails.
	pub fn solve(&self, window: &DeepcWindow<M, P>, y_ref: &[Vector<f64, P>]) -> Result<DeepcSolution<M, P>> {
		let checks = [
			("initial input window", self.initial_length, window.u_init.len()),
			("initial output window", self.initial_length, window.y_init.len()),
			("output reference trajectory", self.horizon_length, y_ref.len()),
		];
		for (what, expected, actual) in checks {
			if expected != actual {
				return Err(Error::DimensionMismatch {
					what,
					expected,
					actual,
				});
			}
		}

		self.solve_bound(window, y_ref).map_err(|failure| {
			let err = SolveError {
				failure,
				parameters: vec![
					("u_init", stack(&window.u_init)),
					("y_init", stack(&window.y_init)),
					("y_ref", stack(y_ref)),
				],
			};
			debug!("deepc {err}");
			Error::from(err)
		})
	}

	fn solve_bound(
		&self,
		window: &DeepcWindow<M, P>,
		y_ref: &[Vector<f64, P>],
	) -> std::result::Result<DeepcSolution<M, P>, SolveFailure> {
		let u_len = M * self.horizon_length;
		let y_len = P * self.horizon_length;

		let mut q = vec![0.0; self.qp.variables()];
		for (i, r) in y_ref.iter().enumerate() {
			let offset = u_len + i * P;
			q[offset..offset + P].copy_from_slice((self.q * r * -2.0).as_slice());
		}

		let mut b = Vec::with_capacity(self.qp.rows());
		b.extend(window.u_init.iter().flat_map(|u| u.iter().copied()));
		b.extend(window.y_init.iter().flat_map(|y| y.iter().copied()));
		b.resize(self.qp.rows(), 0.0);

		let solution = self.qp.solve(&q, &self.a, &b)?;
		let z = &solution.z;
		let u: Vec<Vector<f64, M>> = (0..self.horizon_length)
			.map(|i| Vector::from_column_slice(&z[i * M..(i + 1) * M]))
			.collect();
		let y: Vec<Vector<f64, P>> = (0..self.horizon_length)
			.map(|i| Vector::from_column_slice(&z[u_len + i * P..u_len + (i + 1) * P]))
			.collect();
		let g = DVector::from_column_slice(&z[u_len + y_len..]);

		let cost: f64 = u
			.iter()
			.zip(&y)
			.zip(y_ref)
			.map(|((u, y), r)| {
				let e = y - r;
				e.dot(&(self.q * e)) + u.dot(&(self.r * u))
			})
			.sum();
		debug!("deepc solved in {} interior-point iterations, cost {cost:e}", solution.iterations);

		Ok(DeepcSolution { u, y, g, cost })
	}
}

/// Samples side by side as columns.
fn stack<const D: usize>(samples: &[Vector<f64, D>]) -> DMatrix<f64> {
	DMatrix::from_fn(D, samples.len(), |i, j| samples[j][i])
}

impl<const M: usize, const P: usize> Controller for Deepc<M, P> {
	type Measurement = DeepcWindow<M, P>;
	type Reference = [Vector<f64, P>];
	type Actuation = (Vector<f64, M>, DeepcSolution<M, P>);

	fn control(
		&mut self,
		window: &DeepcWindow<M, P>,
		y_ref: &[Vector<f64, P>],
	) -> Result<(Vector<f64, M>, DeepcSolution<M, P>)> {
		let solution = self.solve(window, y_ref)?;
		Ok((solution.u[0], solution))
	}

	fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;
	use more_asserts::*;
	use nalgebra::{matrix, vector};

	/// Uniform samples in `[-1, 1]` from a linear congruential generator.
	fn excitation(len: usize) -> Vec<Vector<f64, 1>> {
		let mut state: u64 = 0x2545_f491;
		(0..len)
			.map(|_| {
				state = state
					.wrapping_mul(6_364_136_223_846_793_005)
					.wrapping_add(1_442_695_040_888_963_407);
				vector![(state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0]
			})
			.collect()
	}

	/// `x[k + 1] = 0.9 x[k] + 0.5 u[k]`, `y[k] = x[k]`, from `x[0] = 0`.
	fn first_order_data(us: &[Vector<f64, 1>]) -> (Vec<Vector<f64, 1>>, Vector<f64, 1>) {
		let mut x = vector![0.0];
		let mut ys = Vec::with_capacity(us.len());
		for u in us {
			ys.push(x);
			x = x * 0.9 + u * 0.5;
		}
		(ys, x)
	}

	#[test]
	fn hankel_layout() {
		let signal: Vec<Vector<f64, 1>> = (1..=5).map(|k| vector![k as f64]).collect();
		let h = hankel(&signal, 3).unwrap();
		assert_eq!(h, DMatrix::from_row_slice(3, 3, &[1.0, 2.0, 3.0, 2.0, 3.0, 4.0, 3.0, 4.0, 5.0]));
	}

	#[test]
	fn block_hankel_layout() {
		let signal: Vec<Vector<f64, 2>> = (0..4).map(|k| vector![k as f64, -(k as f64)]).collect();
		let h = hankel(&signal, 2).unwrap();
		assert_eq!(h.shape(), (4, 3));
		assert_eq!(h.column(1).iter().copied().collect::<Vec<_>>(), vec![1.0, -1.0, 2.0, -2.0]);
	}

	#[test]
	fn hankel_needs_enough_samples() {
		let signal = vec![vector![1.0]; 4];
		assert!(hankel(&signal, 4).is_ok());
		assert!(matches!(
			hankel(&signal, 5),
			Err(Error::InsufficientData {
				required: 5,
				available: 4,
				..
			})
		));
		assert!(hankel(&signal, 0).is_err());
	}

	#[test]
	fn sinusoid_hankel_has_rank_two() {
		let signal: Vec<Vector<f64, 1>> = (0..50).map(|k| vector![(0.3 * k as f64).sin()]).collect();
		let h = hankel(&signal, 10).unwrap();
		assert_eq!(h.rank(1e-8), 2);
	}

	#[test]
	fn data_lengths_must_match() {
		let us = excitation(40);
		let (ys, _) = first_order_data(&us[..39]);
		let result = Deepc::new(&us, &ys, matrix![1.0], matrix![0.1], 2, 3, SolverOptions::default());
		assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
	}

	#[test]
	fn too_little_data() {
		let us = excitation(5);
		let (ys, _) = first_order_data(&us);
		let result = Deepc::new(&us, &ys, matrix![1.0], matrix![0.1], 3, 3, SolverOptions::default());
		assert!(matches!(result, Err(Error::InsufficientData { .. })));
	}

	#[test]
	fn combination_reproduces_window_and_predicts_model() {
		let us = excitation(60);
		let (ys, _) = first_order_data(&us);
		let deepc = Deepc::new(&us, &ys, matrix![1.0], matrix![0.1], 4, 5, SolverOptions::default()).unwrap();
		assert_eq!(deepc.u_p().nrows(), 4);
		assert_eq!(deepc.y_f().nrows(), 5);
		assert_eq!(deepc.u_p().ncols(), 52);

		let window = DeepcWindow {
			u_init: us[10..14].to_vec(),
			y_init: ys[10..14].to_vec(),
		};
		let reference = vec![vector![1.0]; 5];
		let solution = deepc.solve(&window, &reference).unwrap();

		let past_u = deepc.u_p() * &solution.g;
		let past_y = deepc.y_p() * &solution.g;
		for k in 0..4 {
			assert_relative_eq!(past_u[k], window.u_init[k][0], epsilon = 1e-5);
			assert_relative_eq!(past_y[k], window.y_init[k][0], epsilon = 1e-5);
		}

		let mut x = window.y_init[3][0] * 0.9 + window.u_init[3][0] * 0.5;
		for (u, y) in solution.u.iter().zip(&solution.y) {
			assert_relative_eq!(y[0], x, epsilon = 1e-4);
			x = 0.9 * x + 0.5 * u[0];
		}
	}

	#[test]
	fn window_lengths_are_checked() {
		let us = excitation(40);
		let (ys, _) = first_order_data(&us);
		let deepc = Deepc::new(&us, &ys, matrix![1.0], matrix![0.1], 3, 4, SolverOptions::default()).unwrap();
		let window = DeepcWindow {
			u_init: us[..2].to_vec(),
			y_init: ys[..3].to_vec(),
		};
		assert!(matches!(
			deepc.solve(&window, &[vector![0.0]; 4]),
			Err(Error::DimensionMismatch { .. })
		));
		let window = DeepcWindow {
			u_init: us[..3].to_vec(),
			y_init: ys[..3].to_vec(),
		};
		assert!(matches!(
			deepc.solve(&window, &[vector![0.0]; 5]),
			Err(Error::DimensionMismatch { .. })
		));
	}

	#[test]
	fn closed_loop_tracking() {
		let us = excitation(80);
		let (ys, mut x) = first_order_data(&us);
		let mut deepc = Deepc::new(&us, &ys, matrix![10.0], matrix![0.01], 4, 10, SolverOptions::default()).unwrap();
		let mut window = DeepcWindow {
			u_init: us[76..].to_vec(),
			y_init: ys[76..].to_vec(),
		};
		let reference = vec![vector![1.0]; 10];

		for _ in 0..30 {
			let (u, _) = deepc.control(&window, &reference).unwrap();
			window.u_init.remove(0);
			window.u_init.push(u);
			window.y_init.remove(0);
			window.y_init.push(x);
			x = x * 0.9 + u * 0.5;
		}
		assert_lt!((x[0] - 1.0).abs(), 0.05);
	}
}
