use serde::{Deserialize, Serialize};

use crate::goal::ExtraGoal;

/// Parameters of the per-goal points ceiling (about 20,000 points a year,
/// prorated by goal length).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapPolicy {
    pub points_per_month: i64,
    pub days_per_month: f64,
}

impl Default for CapPolicy {
    fn default() -> Self {
        Self {
            points_per_month: 1667,
            days_per_month: 30.44,
        }
    }
}

impl CapPolicy {
    /// Maximum points a goal may ever pay out, across all its evaluations.
    ///
    /// Uses the exclusive day difference of the goal period.
    pub fn annual_cap(&self, goal: &ExtraGoal) -> i64 {
        let days = (goal.goal_period_to - goal.goal_period_from).num_days() as f64;
        let months = days / self.days_per_month;
        (months * self.points_per_month as f64).trunc() as i64
    }
}

/// Limit `raw` to the headroom left under `cap`; never negative.
pub fn apply_cap(raw: i64, cap: i64, already_awarded: i64) -> i64 {
    raw.min(cap - already_awarded).max(0)
}
