//! Feedback controllers.

mod deepc;
mod lqr;
mod mpc;
mod pid;
mod statefeedback;

pub use deepc::{hankel, Deepc, DeepcSolution, DeepcWindow};
pub use lqr::Lqr;
pub use mpc::{Mpc, MpcConfig, MpcSolution};
pub use pid::Pid;
pub use statefeedback::StateFeedback;

use crate::error::Result;

/// Computes an actuation from a measurement and a reference.
///
/// `control` takes `&mut self`: a controller may carry state between calls
/// (integrators, warm starts), and [`Controller::reset`] returns it to its
/// freshly constructed behavior.
pub trait Controller {
	type Measurement: ?Sized;
	type Reference: ?Sized;
	type Actuation;

	fn control(&mut self, measurement: &Self::Measurement, reference: &Self::Reference) -> Result<Self::Actuation>;

	fn reset(&mut self);
}
