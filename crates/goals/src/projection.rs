use serde::{Deserialize, Serialize};

use bonus_core::Money;

use crate::cap::CapPolicy;
use crate::goal::ExtraGoal;

/// What a goal would pay if its full-period target were hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GoalProjection {
    pub current_turnover: Money,
    /// Currency units still missing to the goal value; 0 once reached.
    pub turnover_needed: f64,
    /// Percent of goal value reached, two decimals.
    pub progress_percent: f64,
    pub projected_points: i64,
    /// Projected points not yet paid by earlier evaluations.
    pub net_new_points: i64,
}

/// Project a goal from the turnover booked so far.
pub fn project_goal(
    goal: &ExtraGoal,
    turnover_to_date: Money,
    already_awarded: i64,
    policy: &CapPolicy,
) -> GoalProjection {
    let current = turnover_to_date.as_major();
    let goal_value = goal.goal_value as f64;

    let progress_percent = if goal.goal_value > 0 {
        (current / goal_value * 100.0 * 100.0).round() / 100.0
    } else {
        0.0
    };

    let uplift = ((goal.goal_value - goal.goal_base) as f64 * goal.bonus_percentage).trunc() as i64;
    let projected_points = uplift.min(policy.annual_cap(goal));

    GoalProjection {
        current_turnover: turnover_to_date,
        turnover_needed: (goal_value - current).max(0.0),
        progress_percent,
        projected_points,
        net_new_points: (projected_points - already_awarded).max(0),
    }
}
