//! Goal evaluation records and the decision table that produces them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use bonus_core::{Entity, Money, UserId, entity_id};
use bonus_ledger::TransactionId;

use crate::cap::{CapPolicy, apply_cap};
use crate::goal::{ExtraGoal, GoalId};
use crate::schedule::{MilestonePeriod, PeriodTargets};

entity_id!(
    /// Goal evaluation identifier.
    EvaluationId
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationType {
    Milestone,
    Final,
    Recovery,
}

/// Immutable record of one evaluated `(goal, period)`.
///
/// At most one exists per `(goal_id, period_start, period_end)`. The sum of
/// `bonus_points` over a goal's evaluations is the "already awarded" figure
/// every later evaluation is capped against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalEvaluation {
    pub id: EvaluationId,
    pub goal_id: GoalId,
    pub evaluation_date: NaiveDate,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub actual_turnover: Money,
    pub target_turnover: f64,
    pub baseline_turnover: f64,
    pub is_achieved: bool,
    pub bonus_points: i64,
    pub evaluation_type: EvaluationType,
    pub evaluated_by: UserId,
    /// Ledger entry paying out `bonus_points`; `None` when nothing was paid.
    pub points_transaction: Option<TransactionId>,
}

impl Entity for GoalEvaluation {
    type Id = EvaluationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Everything the decision table needs about one period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationInput {
    pub period: MilestonePeriod,
    /// Net turnover over the period.
    pub actual: Money,
    pub targets: PeriodTargets,
    /// Points paid by all existing evaluations of the goal.
    pub already_awarded: i64,
    /// Points paid by evaluations of periods ending before this one.
    pub previous_milestone_points: i64,
    /// Net turnover over the whole goal period.
    pub full_period_actual: Money,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub evaluation_type: EvaluationType,
    pub bonus_points: i64,
    pub is_achieved: bool,
}

impl EvaluationOutcome {
    fn new(evaluation_type: EvaluationType, bonus_points: i64, is_achieved: bool) -> Self {
        Self {
            evaluation_type,
            bonus_points,
            is_achieved,
        }
    }
}

/// Points for `amount - base` at the goal's percentage, truncated toward zero.
fn raw_points(amount: f64, base: f64, percentage: f64) -> i64 {
    ((amount - base) * percentage).trunc() as i64
}

/// Decide type, points and achievement for one period.
///
/// Milestones pay the prorated target uplift when the period target is met.
/// The final period pays the actual uplift. With full-period recovery enabled
/// and the whole-goal target met, the final period instead pays whatever the
/// whole goal would have earned minus earlier milestones, if that is more.
pub fn decide(goal: &ExtraGoal, input: &EvaluationInput, policy: &CapPolicy) -> EvaluationOutcome {
    let cap = policy.annual_cap(goal);
    let actual = input.actual.as_major();
    let period_achieved = actual >= input.targets.goal_value;

    if !input.period.is_final {
        if !period_achieved {
            return EvaluationOutcome::new(EvaluationType::Milestone, 0, false);
        }
        let raw = raw_points(
            input.targets.goal_value,
            input.targets.goal_base,
            goal.bonus_percentage,
        );
        return EvaluationOutcome::new(
            EvaluationType::Milestone,
            apply_cap(raw, cap, input.already_awarded),
            true,
        );
    }

    let period_points = if period_achieved {
        let raw = raw_points(actual, input.targets.goal_base, goal.bonus_percentage);
        apply_cap(raw, cap, input.already_awarded)
    } else {
        0
    };

    if !goal.allow_full_period_recovery {
        return EvaluationOutcome::new(EvaluationType::Final, period_points, period_achieved);
    }

    let full_actual = input.full_period_actual.as_major();
    if full_actual < goal.goal_value as f64 {
        return EvaluationOutcome::new(EvaluationType::Final, period_points, period_achieved);
    }

    let year_points = raw_points(full_actual, goal.goal_base as f64, goal.bonus_percentage).min(cap);
    let recovery_points = year_points - input.previous_milestone_points;

    if recovery_points > period_points {
        EvaluationOutcome::new(EvaluationType::Recovery, recovery_points.max(0), true)
    } else {
        EvaluationOutcome::new(EvaluationType::Final, period_points.max(0), period_achieved)
    }
}
