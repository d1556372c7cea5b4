use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, RwLock};

use super::arm::{Arm, ArmError};
use crate::services::vocabulary::FeatureLayout;

/// An arm together with the feature layout its statistics refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedArm {
    layout: FeatureLayout,
    arm: Arm,
}

impl TrackedArm {
    pub fn new(layout: FeatureLayout) -> Self {
        Self {
            layout,
            arm: Arm::new(layout.dimension()),
        }
    }

    /// `None` when the arm's dimension does not match `layout`.
    pub fn from_parts(layout: FeatureLayout, arm: Arm) -> Option<Self> {
        (arm.dimension() == layout.dimension()).then_some(Self { layout, arm })
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    pub fn arm(&self) -> &Arm {
        &self.arm
    }

    pub fn arm_mut(&mut self) -> &mut Arm {
        &mut self.arm
    }

    /// Moves the statistics into `target` if the vocabulary grew.
    ///
    /// Returns whether anything changed. A target smaller than the current
    /// layout is refused.
    pub fn align_to(&mut self, target: FeatureLayout) -> Result<bool, ArmError> {
        if self.layout == target {
            return Ok(false);
        }
        if !self.layout.fits_within(&target) {
            return Err(ArmError::LayoutShrink {
                from: self.layout.dimension(),
                to: target.dimension(),
            });
        }
        let from = self.layout;
        *self = self.remapped(target, |i| from.position_in(i, &target));
        Ok(true)
    }

    /// Copy of this arm laid out as `target`, feature `i` moved to `position(i)`.
    ///
    /// `position` must be injective and land inside `target`; slots it never
    /// reaches start at the prior.
    pub fn remapped(&self, target: FeatureLayout, position: impl Fn(usize) -> usize) -> TrackedArm {
        TrackedArm {
            layout: target,
            arm: self.arm.remap(target.dimension(), position),
        }
    }
}

pub type SharedArm = Arc<Mutex<TrackedArm>>;

/// Owner of every arm, keyed by game identifier.
///
/// Each arm has its own lock so an update and a score on the same game never
/// interleave, while different games proceed independently.
#[derive(Debug, Default)]
pub struct ArmModel {
    arms: RwLock<HashMap<String, SharedArm>>,
}

impl ArmModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the arm for `game_id`, creating it with `layout` on first use.
    pub async fn get_or_create(&self, game_id: &str, layout: FeatureLayout) -> SharedArm {
        if let Some(arm) = self.arms.read().await.get(game_id) {
            return Arc::clone(arm);
        }

        let mut arms = self.arms.write().await;
        let arm = arms.entry(game_id.to_string()).or_insert_with(|| {
            tracing::debug!(game_id = %game_id, dimension = layout.dimension(), "Created arm");
            Arc::new(Mutex::new(TrackedArm::new(layout)))
        });
        Arc::clone(arm)
    }

    pub async fn get(&self, game_id: &str) -> Option<SharedArm> {
        self.arms.read().await.get(game_id).cloned()
    }

    /// Installs or replaces the arm for `game_id`.
    pub async fn install(&self, game_id: impl Into<String>, arm: TrackedArm) {
        self.arms
            .write()
            .await
            .insert(game_id.into(), Arc::new(Mutex::new(arm)));
    }

    /// Copy of the current state of `game_id`'s arm
    pub async fn snapshot(&self, game_id: &str) -> Option<TrackedArm> {
        let arm = self.get(game_id).await?;
        let guard = arm.lock().await;
        Some(guard.clone())
    }

    pub async fn len(&self) -> usize {
        self.arms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.arms.read().await.is_empty()
    }
}
