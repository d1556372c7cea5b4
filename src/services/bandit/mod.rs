//! Linear upper-confidence-bound arms.
//!
//! One [`Arm`] per game holds the ridge-regression statistics `(A, b)`.
//! [`ArmModel`] owns all arms and mediates access to them.

mod arm;
mod linalg;
mod model;

pub use arm::{Arm, ArmError, ArmEstimate};
pub use linalg::Matrix;
pub use model::{ArmModel, SharedArm, TrackedArm};
