//! Output-tracking model predictive control with soft bounds.
//!
//! Decision variables over a horizon of `H` steps, stacked into one vector
//! `z = [x_0..x_H, u_0..u_{H-1}, y_0..y_{H-1}, eps_y_0.., eps_u_0..]`:
//!
//! ```text
//! min  Σ (y_ref_i − y_i)ᵀ Q (y_ref_i − y_i) + u_iᵀ R u_i + eps_y_iᵀ λ_y eps_y_i + eps_u_iᵀ λ_u eps_u_i
//! s.t. x_0 = x_init
//!      x_{i+1} = f(x_i, u_i)
//!      y_i = h(x_{i+1}, u_i)
//!      lby − eps_y_i ≤ y_i ≤ uby + eps_y_i
//!      lbu − eps_u_i ≤ u_i ≤ ubu + eps_u_i
//!      eps_y_i, eps_u_i ≥ 0
//! ```
//!
//! There is no terminal cost or terminal constraint. Nonlinear `f` and `h` are
//! handled by sequential quadratic programming: both are linearized along the
//! current guess and the QP is re-solved until the trajectory stops moving.

use std::time::Instant;

use itertools::izip;
use log::{debug, trace};
use nalgebra::DMatrix;

use super::Controller;
use crate::config::{IterationConfig, SolverOptions};
use crate::dynamics::Dynamics;
use crate::error::{Error, Result, SolveError, SolveFailure};
use crate::linalg::{is_positive_semidefinite, to_dynamic};
use crate::model::{Model, Observation};
use crate::prelude::*;
use crate::qp::QuadraticProgram;
use crate::system::DiscreteSystem;

/// Weights, bounds and solver settings for [`Mpc`], with `M` inputs and `P` outputs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MpcConfig<const M: usize, const P: usize> {
	pub prediction_horizon: usize,
	/// Output tracking weight.
	pub q: Matrix<f64, P, P>,
	/// Input weight.
	pub r: Matrix<f64, M, M>,
	/// Output bound violation weight.
	pub lam_y: Matrix<f64, P, P>,
	/// Input bound violation weight.
	pub lam_u: Matrix<f64, M, M>,
	pub lby: Vector<f64, P>,
	pub uby: Vector<f64, P>,
	pub lbu: Vector<f64, M>,
	pub ubu: Vector<f64, M>,
	pub solver: SolverOptions,
	pub iteration: IterationConfig,
}

impl<const M: usize, const P: usize> MpcConfig<M, P> {
	/// A configuration without bounds.
	pub fn new(
		prediction_horizon: usize,
		q: Matrix<f64, P, P>,
		r: Matrix<f64, M, M>,
		lam_y: Matrix<f64, P, P>,
		lam_u: Matrix<f64, M, M>,
	) -> Self {
		MpcConfig {
			prediction_horizon,
			q,
			r,
			lam_y,
			lam_u,
			lby: Vector::repeat(f64::NEG_INFINITY),
			uby: Vector::repeat(f64::INFINITY),
			lbu: Vector::repeat(f64::NEG_INFINITY),
			ubu: Vector::repeat(f64::INFINITY),
			solver: SolverOptions::default(),
			iteration: IterationConfig::default(),
		}
	}

	pub fn with_output_bounds(mut self, lby: Vector<f64, P>, uby: Vector<f64, P>) -> Self {
		self.lby = lby;
		self.uby = uby;
		self
	}

	pub fn with_input_bounds(mut self, lbu: Vector<f64, M>, ubu: Vector<f64, M>) -> Self {
		self.lbu = lbu;
		self.ubu = ubu;
		self
	}

	pub fn with_solver(mut self, solver: SolverOptions) -> Self {
		self.solver = solver;
		self
	}

	pub fn with_iteration(mut self, iteration: IterationConfig) -> Self {
		self.iteration = iteration;
		self
	}

	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] if the horizon is zero, a weight is not
	/// symmetric positive semidefinite, a bound is NaN or out of order, or the
	/// solver or iteration settings are invalid.
	pub fn validate(&self) -> Result<()> {
		if self.prediction_horizon == 0 {
			return Err(Error::invalid_config("prediction_horizon must be at least 1"));
		}
		check_weight("q", &self.q)?;
		check_weight("r", &self.r)?;
		check_weight("lam_y", &self.lam_y)?;
		check_weight("lam_u", &self.lam_u)?;
		check_bounds("output", &self.lby, &self.uby)?;
		check_bounds("input", &self.lbu, &self.ubu)?;
		self.solver.validate()?;
		self.iteration.validate()
	}
}

fn check_weight<const K: usize>(name: &str, weight: &Matrix<f64, K, K>) -> Result<()> {
	if !weight.iter().all(|v| v.is_finite()) || !is_positive_semidefinite(weight) {
		return Err(Error::invalid_config(format!(
			"{name} must be finite, symmetric and positive semidefinite"
		)));
	}
	Ok(())
}

fn check_bounds<const K: usize>(name: &str, lower: &Vector<f64, K>, upper: &Vector<f64, K>) -> Result<()> {
	for (j, (&lb, &ub)) in lower.iter().zip(upper.iter()).enumerate() {
		if lb.is_nan() || ub.is_nan() {
			return Err(Error::invalid_config(format!("{name} bound {j} is NaN")));
		}
		if lb > ub || lb == f64::INFINITY || ub == f64::NEG_INFINITY {
			return Err(Error::invalid_config(format!(
				"{name} bound {j} is empty: [{lb}, {ub}]"
			)));
		}
	}
	Ok(())
}

/// The optimal trajectory found by one [`Mpc`] solve.
#[derive(Debug, Clone, PartialEq)]
pub struct MpcSolution<const N: usize, const M: usize, const P: usize> {
	/// `H + 1` predicted states starting at the measured one.
	pub x: Vec<Vector<f64, N>>,
	pub u: Vec<Vector<f64, M>>,
	pub y: Vec<Vector<f64, P>>,
	pub eps_y: Vec<Vector<f64, P>>,
	pub eps_u: Vec<Vector<f64, M>>,
	pub cost: f64,
	/// Quadratic programs solved; always 1 for affine models.
	pub iterations: usize,
}

/// Offsets of each variable block in `z` and of each equality block in the constraints.
#[derive(Debug, Clone, Copy)]
struct Layout<const N: usize, const M: usize, const P: usize> {
	horizon: usize,
}

impl<const N: usize, const M: usize, const P: usize> Layout<N, M, P> {
	fn x(&self, i: usize) -> usize {
		i * N
	}

	fn u(&self, i: usize) -> usize {
		(self.horizon + 1) * N + i * M
	}

	fn y(&self, i: usize) -> usize {
		self.u(self.horizon) + i * P
	}

	fn eps_y(&self, i: usize) -> usize {
		self.y(self.horizon) + i * P
	}

	fn eps_u(&self, i: usize) -> usize {
		self.eps_y(self.horizon) + i * M
	}

	fn variables(&self) -> usize {
		self.eps_u(self.horizon)
	}

	fn dynamics_row(&self, i: usize) -> usize {
		N + i * N
	}

	fn observation_row(&self, i: usize) -> usize {
		N + self.horizon * N + i * P
	}

	fn equalities(&self) -> usize {
		N + self.horizon * (N + P)
	}

	fn block<const K: usize>(z: &[f64], offset: usize) -> Vector<f64, K> {
		Vector::<f64, K>::from_column_slice(&z[offset..offset + K])
	}

	fn states(&self, z: &[f64]) -> Vec<Vector<f64, N>> {
		(0..=self.horizon).map(|i| Self::block(z, self.x(i))).collect()
	}

	fn inputs(&self, z: &[f64]) -> Vec<Vector<f64, M>> {
		(0..self.horizon).map(|i| Self::block(z, self.u(i))).collect()
	}
}

/// One soft bound row `sign · z[var] − z[slack] ≤ rhs`.
struct SoftBound {
	var: usize,
	sign: f64,
	slack: usize,
	rhs: f64,
}

fn soft_bounds<const K: usize>(
	var: usize,
	slack: usize,
	lower: &Vector<f64, K>,
	upper: &Vector<f64, K>,
	rows: &mut Vec<SoftBound>,
) {
	for j in 0..K {
		if upper[j].is_finite() {
			rows.push(SoftBound {
				var: var + j,
				sign: 1.0,
				slack: slack + j,
				rhs: upper[j],
			});
		}
		if lower[j].is_finite() {
			rows.push(SoftBound {
				var: var + j,
				sign: -1.0,
				slack: slack + j,
				rhs: -lower[j],
			});
		}
	}
}

/// Model predictive controller for a discrete-time model with `N` states,
/// `M` inputs and `P` outputs.
///
/// The problem structure is assembled once in [`Mpc::new`]; each call to
/// [`Mpc::solve`] binds the measured state and the reference trajectory.
pub struct Mpc<D, H, const N: usize, const M: usize, const P: usize> {
	model: Model<DiscreteSystem<D, N, M>, H, P>,
	config: MpcConfig<M, P>,
	layout: Layout<N, M, P>,
	qp: QuadraticProgram,
	a_template: DMatrix<f64>,
	b_template: Vec<f64>,
	warm_start: Option<Vec<Vector<f64, M>>>,
}

impl<D, H, const N: usize, const M: usize, const P: usize> Mpc<D, H, N, M, P>
where
	D: Dynamics<N, M>,
	H: Observation<N, M, P>,
{
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] if `config` does not validate.
	pub fn new(model: Model<DiscreteSystem<D, N, M>, H, P>, config: MpcConfig<M, P>) -> Result<Self> {
		config.validate()?;
		let settings = config.solver.settings()?;
		let layout = Layout::<N, M, P> {
			horizon: config.prediction_horizon,
		};
		let horizon = layout.horizon;

		let mut hessian = DMatrix::zeros(layout.variables(), layout.variables());
		for i in 0..horizon {
			hessian
				.fixed_slice_mut::<P, P>(layout.y(i), layout.y(i))
				.copy_from(&(config.q * 2.0));
			hessian
				.fixed_slice_mut::<M, M>(layout.u(i), layout.u(i))
				.copy_from(&(config.r * 2.0));
			hessian
				.fixed_slice_mut::<P, P>(layout.eps_y(i), layout.eps_y(i))
				.copy_from(&(config.lam_y * 2.0));
			hessian
				.fixed_slice_mut::<M, M>(layout.eps_u(i), layout.eps_u(i))
				.copy_from(&(config.lam_u * 2.0));
		}

		let mut bounds = Vec::new();
		for i in 0..horizon {
			soft_bounds(layout.y(i), layout.eps_y(i), &config.lby, &config.uby, &mut bounds);
			soft_bounds(layout.u(i), layout.eps_u(i), &config.lbu, &config.ubu, &mut bounds);
		}
		let slacks = layout.eps_y(0)..layout.variables();
		let inequalities = bounds.len() + slacks.len();
		let rows = layout.equalities() + inequalities;

		let mut a = DMatrix::zeros(rows, layout.variables());
		let mut b = vec![0.0; rows];
		a.fixed_slice_mut::<N, N>(0, layout.x(0))
			.fill_with_identity();
		for i in 0..horizon {
			a.fixed_slice_mut::<N, N>(layout.dynamics_row(i), layout.x(i + 1))
				.fill_with_identity();
			a.fixed_slice_mut::<P, P>(layout.observation_row(i), layout.y(i))
				.fill_with_identity();
		}
		let mut row = layout.equalities();
		for bound in &bounds {
			a[(row, bound.var)] = bound.sign;
			a[(row, bound.slack)] = -1.0;
			b[row] = bound.rhs;
			row += 1;
		}
		for slack in slacks {
			a[(row, slack)] = -1.0;
			row += 1;
		}

		debug!(
			"mpc problem: {} variables, {} equalities, {} inequalities",
			layout.variables(),
			layout.equalities(),
			inequalities
		);

		Ok(Mpc {
			model,
			qp: QuadraticProgram::new(&hessian, layout.equalities(), inequalities, settings),
			config,
			layout,
			a_template: a,
			b_template: b,
			warm_start: None,
		})
	}

	pub fn model(&self) -> &Model<DiscreteSystem<D, N, M>, H, P> {
		&self.model
	}

	pub fn config(&self) -> &MpcConfig<M, P> {
		&self.config
	}

	/// Solves for the optimal trajectory from `x_init` tracking `y_ref`.
	///
	/// # Errors
	///
	/// Returns [`Error::DimensionMismatch`] if `y_ref` does not hold exactly
	/// `prediction_horizon` outputs, and [`Error::Solve`] when the solver fails,
	/// times out, returns non-finite values, or the linearization loop does not
	/// settle. The error carries the bound `x_init` and `y_ref`.
	pub fn solve(&mut self, x_init: &Vector<f64, N>, y_ref: &[Vector<f64, P>]) -> Result<MpcSolution<N, M, P>> {
		if y_ref.len() != self.layout.horizon {
			return Err(Error::DimensionMismatch {
				what: "output reference trajectory",
				expected: self.layout.horizon,
				actual: y_ref.len(),
			});
		}
		self.solve_bound(x_init, y_ref).map_err(|failure| {
			let err = SolveError {
				failure,
				parameters: vec![
					("x_init", to_dynamic(x_init)),
					("y_ref", DMatrix::from_fn(P, y_ref.len(), |i, j| y_ref[j][i])),
				],
			};
			debug!("mpc {err}");
			Error::from(err)
		})
	}

	fn solve_bound(
		&mut self,
		x_init: &Vector<f64, N>,
		y_ref: &[Vector<f64, P>],
	) -> std::result::Result<MpcSolution<N, M, P>, SolveFailure> {
		let q = self.linear_cost(y_ref);
		let mut us = self.initial_inputs();
		let mut xs = self.model.system().rollout(*x_init, &us);
		let affine = self.model.system().dynamics().is_affine() && self.model.observation().is_affine();
		// `time_limit` bounds the whole solve, shared by every SQP iteration.
		let started = Instant::now();

		for iteration in 1..=self.config.iteration.max_iters {
			let (a, b) = self.constraints(x_init, &xs, &us);
			let remaining = self.qp.time_limit() - started.elapsed().as_secs_f64();
			let solution = self.qp.solve_within(&q, &a, &b, remaining)?;
			let next_xs = self.layout.states(&solution.z);
			let next_us = self.layout.inputs(&solution.z);

			let step = izip!(&xs, &next_xs)
				.map(|(x, next)| (x - next).amax())
				.chain(izip!(&us, &next_us).map(|(u, next)| (u - next).amax()))
				.fold(0.0, f64::max);
			trace!(
				"sqp iteration {iteration}: step {step:e}, qp objective {:e}, {} interior-point iterations",
				solution.objective,
				solution.iterations
			);

			if affine || step <= self.config.iteration.step_tol {
				let result = self.unpack(&solution.z, y_ref, iteration);
				debug!("mpc solved in {iteration} iterations, cost {:e}", result.cost);
				self.warm_start = Some(result.u.clone());
				return Ok(result);
			}
			xs = next_xs;
			us = next_us;
		}
		Err(SolveFailure::NotConverged {
			iterations: self.config.iteration.max_iters,
		})
	}

	/// The previous inputs shifted one step, or zeros.
	fn initial_inputs(&self) -> Vec<Vector<f64, M>> {
		match &self.warm_start {
			Some(previous) => {
				let mut us = previous[1..].to_vec();
				us.push(previous[previous.len() - 1]);
				us
			}
			None => vec![Vector::zeros(); self.layout.horizon],
		}
	}

	fn linear_cost(&self, y_ref: &[Vector<f64, P>]) -> Vec<f64> {
		let mut q = vec![0.0; self.layout.variables()];
		for (i, r) in y_ref.iter().enumerate() {
			let offset = self.layout.y(i);
			let gradient = self.config.q * r * -2.0;
			q[offset..offset + P].copy_from_slice(gradient.as_slice());
		}
		q
	}

	/// Equality blocks linearized along `(xs, us)`; the inequality rows never change.
	fn constraints(
		&self,
		x_init: &Vector<f64, N>,
		xs: &[Vector<f64, N>],
		us: &[Vector<f64, M>],
	) -> (DMatrix<f64>, Vec<f64>) {
		let layout = &self.layout;
		let system = self.model.system();
		let mut a = self.a_template.clone();
		let mut b = self.b_template.clone();
		b[..N].copy_from_slice(x_init.as_slice());

		for (i, (x, u, x_next)) in izip!(xs, us, &xs[1..]).enumerate() {
			let (ai, bi) = system.jacobian(x, u);
			let row = layout.dynamics_row(i);
			a.fixed_slice_mut::<N, N>(row, layout.x(i)).copy_from(&(-ai));
			a.fixed_slice_mut::<N, M>(row, layout.u(i)).copy_from(&(-bi));
			let offset = system.step(x, u) - ai * x - bi * u;
			b[row..row + N].copy_from_slice(offset.as_slice());

			let (ci, di) = self.model.observation_jacobian(x_next, u);
			let row = layout.observation_row(i);
			a.fixed_slice_mut::<P, N>(row, layout.x(i + 1)).copy_from(&(-ci));
			a.fixed_slice_mut::<P, M>(row, layout.u(i)).copy_from(&(-di));
			let offset = self.model.observe(x_next, u) - ci * x_next - di * u;
			b[row..row + P].copy_from_slice(offset.as_slice());
		}
		(a, b)
	}

	fn unpack(&self, z: &[f64], y_ref: &[Vector<f64, P>], iterations: usize) -> MpcSolution<N, M, P> {
		let layout = &self.layout;
		let horizon = layout.horizon;
		let y: Vec<Vector<f64, P>> = (0..horizon).map(|i| Layout::<N, M, P>::block(z, layout.y(i))).collect();
		let eps_y: Vec<Vector<f64, P>> = (0..horizon)
			.map(|i| Layout::<N, M, P>::block::<P>(z, layout.eps_y(i)).map(|v: f64| v.max(0.0)))
			.collect();
		let eps_u: Vec<Vector<f64, M>> = (0..horizon)
			.map(|i| Layout::<N, M, P>::block::<M>(z, layout.eps_u(i)).map(|v: f64| v.max(0.0)))
			.collect();
		let u = layout.inputs(z);

		let config = &self.config;
		let cost: f64 = izip!(y_ref, &y, &u, &eps_y, &eps_u)
			.map(|(r, y, u, ey, eu)| {
				let e = r - y;
				e.dot(&(config.q * e))
					+ u.dot(&(config.r * u))
					+ ey.dot(&(config.lam_y * ey))
					+ eu.dot(&(config.lam_u * eu))
			})
			.sum();

		MpcSolution {
			x: layout.states(z),
			u,
			y,
			eps_y,
			eps_u,
			cost,
			iterations,
		}
	}
}

impl<D, H, const N: usize, const M: usize, const P: usize> Controller for Mpc<D, H, N, M, P>
where
	D: Dynamics<N, M>,
	H: Observation<N, M, P>,
{
	type Measurement = Vector<f64, N>;
	type Reference = [Vector<f64, P>];
	type Actuation = (Vector<f64, M>, MpcSolution<N, M, P>);

	fn control(
		&mut self,
		x_init: &Vector<f64, N>,
		y_ref: &[Vector<f64, P>],
	) -> Result<(Vector<f64, M>, MpcSolution<N, M, P>)> {
		let solution = self.solve(x_init, y_ref)?;
		Ok((solution.u[0], solution))
	}

	/// Drops the warm start.
	fn reset(&mut self) {
		self.warm_start = None;
	}
}
