use std::fmt;

use nalgebra::DMatrix;
use thiserror::Error;

/// Errors produced while building systems and controllers or computing actuation.
///
/// This enum is marked `#[non_exhaustive]` and may include additional variants
/// in future releases.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
	#[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
	DimensionMismatch {
		what: &'static str,
		expected: usize,
		actual: usize,
	},

	#[error("not enough {what}: need at least {required}, got {available}")]
	InsufficientData {
		what: &'static str,
		required: usize,
		available: usize,
	},

	#[error("unsupported discretization method `{method}`: {reason}")]
	UnsupportedMethod { method: String, reason: &'static str },

	#[error("invalid config: {reason}")]
	InvalidConfig { reason: String },

	#[error("riccati iteration did not converge after {iterations} iterations")]
	RiccatiDivergence { iterations: usize },

	#[error("numerical failure: {reason}")]
	Numerical { reason: &'static str },

	#[error(transparent)]
	Solve(#[from] Box<SolveError>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
	pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
		Error::InvalidConfig {
			reason: reason.into(),
		}
	}
}

impl From<SolveError> for Error {
	fn from(err: SolveError) -> Self {
		Error::Solve(Box::new(err))
	}
}

/// Why a numeric solve did not produce a usable solution.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SolveFailure {
	/// The backend rejected the problem data before iterating.
	Setup(String),
	Infeasible,
	Unbounded,
	/// The `time_limit` solver option expired.
	Timeout,
	/// Any other terminal status reported by the backend.
	Status(String),
	/// The backend reported success but the solution contains NaN or infinity.
	NonFinite,
	/// Successive linearizations did not settle within the iteration limit.
	NotConverged { iterations: usize },
}

impl fmt::Display for SolveFailure {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SolveFailure::Setup(reason) => write!(f, "solver setup failed: {reason}"),
			SolveFailure::Infeasible => write!(f, "problem is infeasible"),
			SolveFailure::Unbounded => write!(f, "problem is unbounded"),
			SolveFailure::Timeout => write!(f, "solver time limit reached"),
			SolveFailure::Status(status) => write!(f, "solver stopped with status {status}"),
			SolveFailure::NonFinite => write!(f, "solution contains non-finite values"),
			SolveFailure::NotConverged { iterations } => {
				write!(f, "no convergence after {iterations} iterations")
			}
		}
	}
}

/// A failed control step, with the parameter values that were bound when it failed.
#[derive(Debug, Clone, Error)]
#[error("solve failed: {failure}")]
pub struct SolveError {
	pub failure: SolveFailure,
	pub parameters: Vec<(&'static str, DMatrix<f64>)>,
}

impl SolveError {
	/// Looks up a bound parameter by name.
	pub fn parameter(&self, name: &str) -> Option<&DMatrix<f64>> {
		self.parameters
			.iter()
			.find(|(n, _)| *n == name)
			.map(|(_, value)| value)
	}
}
