//! Session length to reward.
//!
//! One continuous ramp is used for both history replay and live updates:
//! sessions under ten minutes earn nothing, two hours or more earn the full
//! reward, and everything in between is linear.

const MIN_REWARDED_MINUTES: f64 = 10.0;
const FULL_REWARD_MINUTES: f64 = 120.0;

/// Reward in [0, 1] for a session of `duration_minutes`.
pub fn session_reward(duration_minutes: f64) -> f64 {
    if !duration_minutes.is_finite() || duration_minutes < MIN_REWARDED_MINUTES {
        return 0.0;
    }
    if duration_minutes >= FULL_REWARD_MINUTES {
        return 1.0;
    }
    (duration_minutes - MIN_REWARDED_MINUTES) / (FULL_REWARD_MINUTES - MIN_REWARDED_MINUTES)
}

pub fn reward_for_seconds(duration_seconds: i64) -> f64 {
    session_reward(duration_seconds as f64 / 60.0)
}
