use std::collections::BTreeMap;

use clarabel::solver::{DefaultSettings, DefaultSettingsBuilder};

use crate::error::{Error, Result};

/// A solver option value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum OptionValue {
	Bool(bool),
	Int(i64),
	Float(f64),
	Text(String),
}

impl From<bool> for OptionValue {
	fn from(value: bool) -> Self {
		OptionValue::Bool(value)
	}
}

impl From<i32> for OptionValue {
	fn from(value: i32) -> Self {
		OptionValue::Int(value.into())
	}
}

impl From<u32> for OptionValue {
	fn from(value: u32) -> Self {
		OptionValue::Int(value.into())
	}
}

impl From<i64> for OptionValue {
	fn from(value: i64) -> Self {
		OptionValue::Int(value)
	}
}

impl From<usize> for OptionValue {
	fn from(value: usize) -> Self {
		OptionValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
	}
}

impl From<f64> for OptionValue {
	fn from(value: f64) -> Self {
		OptionValue::Float(value)
	}
}

impl From<&str> for OptionValue {
	fn from(value: &str) -> Self {
		OptionValue::Text(value.to_owned())
	}
}

impl From<String> for OptionValue {
	fn from(value: String) -> Self {
		OptionValue::Text(value)
	}
}

impl OptionValue {
	fn as_bool(&self, key: &str) -> Result<bool> {
		match self {
			OptionValue::Bool(value) => Ok(*value),
			_ => Err(Error::invalid_config(format!("solver option `{key}` expects a bool, got {self:?}"))),
		}
	}

	fn as_u32(&self, key: &str) -> Result<u32> {
		match self {
			OptionValue::Int(value) => u32::try_from(*value).map_err(|_| {
				Error::invalid_config(format!("solver option `{key}` is out of range: {value}"))
			}),
			_ => Err(Error::invalid_config(format!(
				"solver option `{key}` expects an integer, got {self:?}"
			))),
		}
	}

	fn as_f64(&self, key: &str) -> Result<f64> {
		let value = match self {
			OptionValue::Float(value) => *value,
			OptionValue::Int(value) => *value as f64,
			_ => {
				return Err(Error::invalid_config(format!(
					"solver option `{key}` expects a number, got {self:?}"
				)))
			}
		};
		if value.is_nan() || value < 0.0 {
			return Err(Error::invalid_config(format!(
				"solver option `{key}` must be non-negative, got {value}"
			)));
		}
		Ok(value)
	}
}

/// Name of the quadratic-program backend plus its options.
///
/// Only `"clarabel"` is available. Recognized options are `verbose`,
/// `max_iter`, `time_limit` (seconds for a whole control step, including
/// every SQP iteration of a nonlinear MPC solve), `tol_gap_abs`, `tol_gap_rel`,
/// `tol_feas`, `tol_infeas_abs`, `tol_infeas_rel`, `max_step_fraction`,
/// `equilibrate_enable` and `presolve_enable`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverOptions {
	pub name: String,
	pub options: BTreeMap<String, OptionValue>,
}

impl Default for SolverOptions {
	fn default() -> Self {
		Self::clarabel()
	}
}

impl SolverOptions {
	pub const CLARABEL: &'static str = "clarabel";

	pub fn clarabel() -> Self {
		SolverOptions {
			name: Self::CLARABEL.to_owned(),
			options: BTreeMap::new(),
		}
	}

	pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
		self.options.insert(key.into(), value.into());
		self
	}

	/// Checks the solver name and every option.
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] for an unknown solver, an unknown option,
	/// or an option value of the wrong kind.
	pub fn validate(&self) -> Result<()> {
		self.settings().map(|_| ())
	}

	/// Backend settings with these options applied over quiet defaults.
	pub(crate) fn settings(&self) -> Result<DefaultSettings<f64>> {
		if self.name != Self::CLARABEL {
			return Err(Error::invalid_config(format!(
				"unknown solver `{}`; available: {}",
				self.name,
				Self::CLARABEL
			)));
		}

		let mut builder = DefaultSettingsBuilder::<f64>::default();
		builder.verbose(false);
		for (key, value) in &self.options {
			match key.as_str() {
				"verbose" => {
					builder.verbose(value.as_bool(key)?);
				}
				"max_iter" => {
					builder.max_iter(value.as_u32(key)?);
				}
				"time_limit" => {
					builder.time_limit(value.as_f64(key)?);
				}
				"tol_gap_abs" => {
					builder.tol_gap_abs(value.as_f64(key)?);
				}
				"tol_gap_rel" => {
					builder.tol_gap_rel(value.as_f64(key)?);
				}
				"tol_feas" => {
					builder.tol_feas(value.as_f64(key)?);
				}
				"tol_infeas_abs" => {
					builder.tol_infeas_abs(value.as_f64(key)?);
				}
				"tol_infeas_rel" => {
					builder.tol_infeas_rel(value.as_f64(key)?);
				}
				"max_step_fraction" => {
					builder.max_step_fraction(value.as_f64(key)?);
				}
				"equilibrate_enable" => {
					builder.equilibrate_enable(value.as_bool(key)?);
				}
				"presolve_enable" => {
					builder.presolve_enable(value.as_bool(key)?);
				}
				_ => {
					return Err(Error::invalid_config(format!("unknown solver option `{key}`")));
				}
			}
		}
		builder
			.build()
			.map_err(|err| Error::invalid_config(format!("solver settings: {err}")))
	}
}

/// Limits for the sequential linearization loop used with nonlinear models.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IterationConfig {
	pub max_iters: usize,
	/// Stop once no trajectory entry moves by more than this between iterations.
	pub step_tol: f64,
}

impl Default for IterationConfig {
	fn default() -> Self {
		Self {
			max_iters: 30,
			step_tol: 1e-6,
		}
	}
}

impl IterationConfig {
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] if `max_iters` is zero or `step_tol` is
	/// negative or non-finite.
	pub fn validate(&self) -> Result<()> {
		if self.max_iters == 0 {
			return Err(Error::invalid_config("max_iters must be at least 1"));
		}
		if !self.step_tol.is_finite() || self.step_tol < 0.0 {
			return Err(Error::invalid_config("step_tol must be finite and non-negative"));
		}
		Ok(())
	}
}
