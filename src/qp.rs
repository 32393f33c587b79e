//! Quadratic programs handed to Clarabel.
//!
//! Problems have the form `min ½ zᵀPz + qᵀz` subject to `A z + s = b`, where the
//! first `equalities` slack entries are zero and the rest are non-negative.
//! `P` and the cone layout are fixed when the program is built; `q`, `A` and
//! `b` are supplied on every solve.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
	DefaultSettings, DefaultSolver, IPSolver, SolverStatus,
	SupportedConeT::{self, NonnegativeConeT, ZeroConeT},
};
use nalgebra::DMatrix;

use crate::error::SolveFailure;

/// Entries with smaller magnitude are left out of the sparse matrices.
const DROP_TOLERANCE: f64 = 1e-15;

pub(crate) struct QpSolution {
	pub z: Vec<f64>,
	pub objective: f64,
	pub iterations: u32,
}

pub(crate) struct QuadraticProgram {
	p: CscMatrix<f64>,
	cones: Vec<SupportedConeT<f64>>,
	rows: usize,
	settings: DefaultSettings<f64>,
}

impl QuadraticProgram {
	/// `p` must be symmetric; only its upper triangle is kept.
	pub fn new(p: &DMatrix<f64>, equalities: usize, inequalities: usize, settings: DefaultSettings<f64>) -> Self {
		let mut cones = Vec::with_capacity(2);
		if equalities > 0 {
			cones.push(ZeroConeT(equalities));
		}
		if inequalities > 0 {
			cones.push(NonnegativeConeT(inequalities));
		}
		QuadraticProgram {
			p: csc_upper_triangle(p),
			cones,
			rows: equalities + inequalities,
			settings,
		}
	}

	pub fn variables(&self) -> usize {
		self.p.n
	}

	pub fn rows(&self) -> usize {
		self.rows
	}

	/// Seconds each solve may take, from the `time_limit` option.
	pub fn time_limit(&self) -> f64 {
		self.settings.time_limit
	}

	pub fn solve(&self, q: &[f64], a: &DMatrix<f64>, b: &[f64]) -> Result<QpSolution, SolveFailure> {
		self.solve_within(q, a, b, self.settings.time_limit)
	}

	/// Like [`solve`](Self::solve), but limited to `time_limit` seconds.
	pub fn solve_within(
		&self,
		q: &[f64],
		a: &DMatrix<f64>,
		b: &[f64],
		time_limit: f64,
	) -> Result<QpSolution, SolveFailure> {
		debug_assert_eq!(q.len(), self.variables());
		debug_assert_eq!(a.shape(), (self.rows, self.variables()));
		debug_assert_eq!(b.len(), self.rows);

		if !q.iter().chain(b).chain(a.iter()).all(|v| v.is_finite()) {
			return Err(SolveFailure::Setup("problem data contains non-finite values".to_owned()));
		}

		if time_limit <= 0.0 {
			return Err(SolveFailure::Timeout);
		}
		let mut settings = self.settings.clone();
		settings.time_limit = time_limit;

		let a = csc_from_dense(a);
		let mut solver = DefaultSolver::new(&self.p, q, &a, b, &self.cones, settings)
			.map_err(|err| SolveFailure::Setup(err.to_string()))?;
		solver.solve();

		let solution = &solver.solution;
		match solution.status {
			SolverStatus::Solved | SolverStatus::AlmostSolved => {}
			SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
				return Err(SolveFailure::Infeasible)
			}
			SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
				return Err(SolveFailure::Unbounded)
			}
			SolverStatus::MaxTime => return Err(SolveFailure::Timeout),
			status => return Err(SolveFailure::Status(format!("{status:?}"))),
		}
		if !solution.x.iter().all(|v| v.is_finite()) {
			return Err(SolveFailure::NonFinite);
		}

		Ok(QpSolution {
			z: solution.x.clone(),
			objective: solution.obj_val,
			iterations: solution.iterations,
		})
	}
}

fn csc_from_dense(m: &DMatrix<f64>) -> CscMatrix<f64> {
	let (nrows, ncols) = m.shape();
	let mut colptr = vec![0usize; ncols + 1];
	let mut rowval = Vec::new();
	let mut nzval = Vec::new();

	for j in 0..ncols {
		for (i, &v) in m.column(j).iter().enumerate() {
			if v.abs() > DROP_TOLERANCE {
				rowval.push(i);
				nzval.push(v);
			}
		}
		colptr[j + 1] = rowval.len();
	}

	CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

fn csc_upper_triangle(m: &DMatrix<f64>) -> CscMatrix<f64> {
	let (nrows, ncols) = m.shape();
	let mut colptr = vec![0usize; ncols + 1];
	let mut rowval = Vec::new();
	let mut nzval = Vec::new();

	for j in 0..ncols {
		for i in 0..nrows.min(j + 1) {
			let v = m[(i, j)];
			if v.abs() > DROP_TOLERANCE {
				rowval.push(i);
				nzval.push(v);
			}
		}
		colptr[j + 1] = rowval.len();
	}

	CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::SolverOptions;
	use approx::assert_relative_eq;

	fn settings() -> DefaultSettings<f64> {
		SolverOptions::default().settings().unwrap()
	}

	#[test]
	fn equality_constrained_minimum() {
		// min x² + y² s.t. x + y = 1
		let qp = QuadraticProgram::new(&(DMatrix::identity(2, 2) * 2.0), 1, 0, settings());
		let a = DMatrix::from_row_slice(1, 2, &[1.0, 1.0]);
		let solution = qp.solve(&[0.0, 0.0], &a, &[1.0]).unwrap();
		assert_relative_eq!(solution.z[0], 0.5, epsilon = 1e-6);
		assert_relative_eq!(solution.z[1], 0.5, epsilon = 1e-6);
		assert_relative_eq!(solution.objective, 0.5, epsilon = 1e-6);
	}

	#[test]
	fn inequality_is_active() {
		// min (x - 3)² s.t. x <= 1
		let qp = QuadraticProgram::new(&DMatrix::from_element(1, 1, 2.0), 0, 1, settings());
		let a = DMatrix::from_element(1, 1, 1.0);
		let solution = qp.solve(&[-6.0], &a, &[1.0]).unwrap();
		assert_relative_eq!(solution.z[0], 1.0, epsilon = 1e-6);
	}

	#[test]
	fn infeasible_problem() {
		// x <= -1 and x >= 1
		let qp = QuadraticProgram::new(&DMatrix::from_element(1, 1, 2.0), 0, 2, settings());
		let a = DMatrix::from_column_slice(2, 1, &[1.0, -1.0]);
		let result = qp.solve(&[0.0], &a, &[-1.0, -1.0]);
		assert!(matches!(result, Err(SolveFailure::Infeasible)));
	}

	#[test]
	fn non_finite_data_is_rejected() {
		let qp = QuadraticProgram::new(&DMatrix::from_element(1, 1, 2.0), 1, 0, settings());
		let a = DMatrix::from_element(1, 1, 1.0);
		let result = qp.solve(&[0.0], &a, &[f64::NAN]);
		assert!(matches!(result, Err(SolveFailure::Setup(_))));
	}

	#[test]
	fn exhausted_time_budget_times_out() {
		let qp = QuadraticProgram::new(&DMatrix::from_element(1, 1, 2.0), 0, 1, settings());
		let a = DMatrix::from_element(1, 1, 1.0);
		assert!(matches!(qp.solve_within(&[-6.0], &a, &[1.0], 0.0), Err(SolveFailure::Timeout)));
		assert!(qp.solve_within(&[-6.0], &a, &[1.0], 10.0).is_ok());
		assert_eq!(qp.time_limit(), f64::INFINITY);
	}

	#[test]
	fn upper_triangle_only() {
		let p = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]);
		let csc = csc_upper_triangle(&p);
		assert_eq!(csc.colptr, vec![0, 1, 3]);
		assert_eq!(csc.rowval, vec![0, 0, 1]);
		assert_eq!(csc.nzval, vec![2.0, 1.0, 3.0]);
	}
}
