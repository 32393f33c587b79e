use super::Controller;
use crate::error::{Error, Result};
use crate::prelude::*;

/// Discrete PID controller on the error `e = reference − y`, with `P`
/// measured outputs and `M` actuated inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct Pid<const M: usize, const P: usize> {
	kp: Matrix<f64, M, P>,
	ki: Matrix<f64, M, P>,
	kd: Matrix<f64, M, P>,
	sample_time: f64,
	integral: Vector<f64, P>,
	previous_error: Vector<f64, P>,
}

impl<const M: usize, const P: usize> Pid<M, P> {
	/// # Errors
	///
	/// Returns [`Error::InvalidConfig`] if `sample_time` is not finite and positive.
	pub fn new(
		kp: Matrix<f64, M, P>,
		ki: Matrix<f64, M, P>,
		kd: Matrix<f64, M, P>,
		sample_time: f64,
	) -> Result<Self> {
		if !sample_time.is_finite() || sample_time <= 0.0 {
			return Err(Error::invalid_config(format!(
				"sample time must be finite and positive, got {sample_time}"
			)));
		}
		Ok(Pid {
			kp,
			ki,
			kd,
			sample_time,
			integral: Vector::zeros(),
			previous_error: Vector::zeros(),
		})
	}

	pub fn sample_time(&self) -> f64 {
		self.sample_time
	}

	pub fn integral(&self) -> &Vector<f64, P> {
		&self.integral
	}

	pub fn update(&mut self, y: &Vector<f64, P>, reference: &Vector<f64, P>) -> Vector<f64, M> {
		let error = reference - y;
		self.integral += error * self.sample_time;
		let derivative = (error - self.previous_error) / self.sample_time;
		self.previous_error = error;
		self.kp * error + self.ki * self.integral + self.kd * derivative
	}
}

impl<const M: usize, const P: usize> Controller for Pid<M, P> {
	type Measurement = Vector<f64, P>;
	type Reference = Vector<f64, P>;
	type Actuation = Vector<f64, M>;

	fn control(&mut self, y: &Vector<f64, P>, reference: &Vector<f64, P>) -> Result<Vector<f64, M>> {
		Ok(self.update(y, reference))
	}

	fn reset(&mut self) {
		self.integral = Vector::zeros();
		self.previous_error = Vector::zeros();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use approx::assert_relative_eq;
	use more_asserts::*;
	use nalgebra::{matrix, vector};

	#[test]
	fn proportional_only() {
		let mut pid = Pid::new(matrix![2.0], matrix![0.0], matrix![0.0], 0.1).unwrap();
		let u = pid.control(&vector![1.0], &vector![3.0]).unwrap();
		assert_relative_eq!(u, vector![4.0]);
		let u = pid.control(&vector![3.5], &vector![3.0]).unwrap();
		assert_relative_eq!(u, vector![-1.0]);
	}

	#[test]
	fn integral_and_derivative_terms() {
		let mut pid = Pid::new(matrix![0.0], matrix![1.0], matrix![1.0], 0.5).unwrap();
		// e = 2: integral 1, derivative 4
		assert_relative_eq!(pid.control(&vector![0.0], &vector![2.0]).unwrap(), vector![5.0]);
		// e = 2: integral 2, derivative 0
		assert_relative_eq!(pid.control(&vector![0.0], &vector![2.0]).unwrap(), vector![2.0]);
		assert_relative_eq!(*pid.integral(), vector![2.0]);
	}

	#[test]
	fn proportional_control_reduces_error() {
		// x[k + 1] = x[k] + u[k], y = x.
		let mut pid = Pid::new(matrix![0.5], matrix![0.0], matrix![0.0], 1.0).unwrap();
		let reference = vector![1.0];
		let mut x = vector![0.0];
		let mut last_error = f64::INFINITY;
		for _ in 0..20 {
			let u = pid.control(&x, &reference).unwrap();
			x += u;
			let error = (reference - x).abs()[0];
			assert_lt!(error, last_error);
			last_error = error;
		}
		assert_lt!(last_error, 1e-5);
	}

	#[test]
	fn reset_matches_fresh_controller() {
		let gains = (matrix![1.0, 0.5], matrix![0.2, 0.1], matrix![0.05, 0.0]);
		let fresh = Pid::new(gains.0, gains.1, gains.2, 0.01).unwrap();
		let mut used = fresh.clone();
		for k in 0..10 {
			used.control(&vector![k as f64, 1.0], &vector![0.0, 2.0]).unwrap();
		}
		used.reset();
		assert_eq!(used, fresh);

		let mut fresh = fresh;
		let y = vector![0.3, 0.7];
		let r = vector![1.0, 1.0];
		assert_eq!(used.control(&y, &r).unwrap(), fresh.control(&y, &r).unwrap());
	}

	#[test]
	fn sample_time_is_validated() {
		let zero = Pid::new(matrix![1.0], matrix![0.0], matrix![0.0], 0.0);
		assert!(matches!(zero, Err(Error::InvalidConfig { .. })));
		assert!(Pid::new(matrix![1.0], matrix![0.0], matrix![0.0], -1.0).is_err());
	}
}
