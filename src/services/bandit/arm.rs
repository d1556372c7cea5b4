use thiserror::Error;

use super::linalg::{dot, Matrix};

/// Errors from arm arithmetic
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ArmError {
    #[error("context has {actual} features, arm expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("arm layout cannot shrink from {from} to {to} features")]
    LayoutShrink { from: usize, to: usize },
}

/// Point estimate and confidence bonus for one context
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArmEstimate {
    pub expected_reward: f64,
    pub uncertainty: f64,
    pub ucb: f64,
}

/// Ridge-regression sufficient statistics for one candidate.
///
/// `a` starts as the identity (the ridge prior) and accumulates `x·xᵗ`;
/// `b` starts at zero and accumulates `reward·x`.
#[derive(Debug, Clone, PartialEq)]
pub struct Arm {
    a: Matrix,
    b: Vec<f64>,
}

impl Arm {
    pub fn new(dimension: usize) -> Self {
        Self {
            a: Matrix::identity(dimension),
            b: vec![0.0; dimension],
        }
    }

    /// Rebuilds an arm from stored statistics; `None` on inconsistent sizes.
    pub fn from_parts(a: Matrix, b: Vec<f64>) -> Option<Self> {
        (a.dimension() == b.len()).then_some(Self { a, b })
    }

    pub fn dimension(&self) -> usize {
        self.b.len()
    }

    pub fn design_matrix(&self) -> &Matrix {
        &self.a
    }

    pub fn reward_vector(&self) -> &[f64] {
        &self.b
    }

    /// False until the first update with a non-zero reward contribution
    pub fn has_training_data(&self) -> bool {
        self.b.iter().any(|v| *v != 0.0)
    }

    /// LinUCB score for `context`.
    ///
    /// `None` if the context has the wrong length or `a` cannot be inverted.
    pub fn score(&self, context: &[f64], alpha: f64) -> Option<ArmEstimate> {
        if context.len() != self.dimension() {
            return None;
        }
        let a_inv = self.a.inverse()?;
        let theta = a_inv.mul_vec(&self.b);
        let expected_reward = dot(&theta, context);
        let variance = dot(context, &a_inv.mul_vec(context));
        // Rounding can leave a tiny negative quadratic form.
        let uncertainty = variance.max(0.0).sqrt();
        Some(ArmEstimate {
            expected_reward,
            uncertainty,
            ucb: expected_reward + alpha * uncertainty,
        })
    }

    pub fn update(&mut self, context: &[f64], reward: f64) -> Result<(), ArmError> {
        if context.len() != self.dimension() {
            return Err(ArmError::DimensionMismatch {
                expected: self.dimension(),
                actual: context.len(),
            });
        }
        self.a.add_outer(context);
        for (bi, xi) in self.b.iter_mut().zip(context) {
            *bi += reward * xi;
        }
        Ok(())
    }

    /// Moves every statistic into a larger feature space.
    ///
    /// `position(i)` gives the new index of old feature `i`. Features without
    /// an old counterpart start from the prior.
    pub fn remap(&self, dimension: usize, position: impl Fn(usize) -> usize) -> Arm {
        let mut remapped = Arm::new(dimension);
        let old = self.dimension();
        for i in 0..old {
            let new_i = position(i);
            remapped.b[new_i] = self.b[i];
            for j in 0..old {
                remapped.a.set(new_i, position(j), self.a.get(i, j));
            }
        }
        remapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn test_single_update_matches_closed_form() {
        let mut arm = Arm::new(2);
        arm.update(&[1.0, 0.0], 1.0).unwrap();

        assert_eq!(arm.design_matrix().as_row_major(), &[2.0, 0.0, 0.0, 1.0]);
        assert_eq!(arm.reward_vector(), &[1.0, 0.0]);

        let estimate = arm.score(&[1.0, 0.0], 1.0).unwrap();
        assert_close(estimate.expected_reward, 0.5);
        assert_close(estimate.uncertainty, 0.5_f64.sqrt());
        assert_close(estimate.ucb, 0.5 + 0.5_f64.sqrt());
    }

    #[test]
    fn test_fresh_arm_predicts_zero() {
        let arm = Arm::new(3);
        assert!(!arm.has_training_data());
        for context in [[1.0, 0.0, 0.0], [0.3, 1.0, 1.0], [0.0, 0.0, 0.0]] {
            let estimate = arm.score(&context, 2.0).unwrap();
            assert_eq!(estimate.expected_reward, 0.0);
        }
    }

    #[test]
    fn test_zero_reward_update_keeps_no_data_flag() {
        let mut arm = Arm::new(2);
        arm.update(&[1.0, 1.0], 0.0).unwrap();
        assert!(!arm.has_training_data());
        assert_eq!(arm.design_matrix().get(0, 1), 1.0);
    }

    #[test]
    fn test_updates_commute() {
        let updates = [
            (vec![1.0, 0.0, 0.5], 0.25),
            (vec![0.0, 1.0, 1.0], 1.0),
            (vec![1.0, 1.0, 0.0], 0.5),
            (vec![0.5, 0.0, 1.0], 0.75),
        ];

        let mut forward = Arm::new(3);
        for (x, r) in &updates {
            forward.update(x, *r).unwrap();
        }
        let mut backward = Arm::new(3);
        for (x, r) in updates.iter().rev() {
            backward.update(x, *r).unwrap();
        }
        let mut shuffled = Arm::new(3);
        for idx in [2, 0, 3, 1] {
            let (x, r) = &updates[idx];
            shuffled.update(x, *r).unwrap();
        }

        assert_eq!(forward, backward);
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn test_update_rejects_wrong_dimension() {
        let mut arm = Arm::new(3);
        let err = arm.update(&[1.0, 0.0], 1.0).unwrap_err();
        assert_eq!(
            err,
            ArmError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        );
        assert!(arm.score(&[1.0], 1.0).is_none());
    }

    #[test]
    fn test_singular_arm_has_no_score() {
        let a = Matrix::from_row_major(2, vec![1.0, 1.0, 1.0, 1.0]).unwrap();
        let arm = Arm::from_parts(a, vec![1.0, 0.0]).unwrap();
        assert!(arm.score(&[1.0, 0.0], 1.0).is_none());
    }

    #[test]
    fn test_remap_preserves_estimates_on_old_features() {
        let mut arm = Arm::new(2);
        arm.update(&[1.0, 1.0], 1.0).unwrap();
        arm.update(&[1.0, 0.0], 0.5).unwrap();

        // Insert a new feature between the two existing ones.
        let grown = arm.remap(3, |i| if i == 0 { 0 } else { 2 });
        assert_eq!(grown.dimension(), 3);
        assert_eq!(grown.design_matrix().get(1, 1), 1.0);
        assert_eq!(grown.design_matrix().get(0, 1), 0.0);
        assert_eq!(grown.reward_vector()[1], 0.0);

        let before = arm.score(&[1.0, 1.0], 1.0).unwrap();
        let after = grown.score(&[1.0, 0.0, 1.0], 1.0).unwrap();
        assert_close(before.expected_reward, after.expected_reward);
        assert_close(before.uncertainty, after.uncertainty);
    }
}
