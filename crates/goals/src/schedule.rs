//! Milestone period scheduling and target proration.
//!
//! Periods are inclusive date ranges. A non-final milestone runs from its
//! start to the day before `start + frequency months`; the next one begins on
//! that boundary. The last period is clamped to `goal_period_to` and flagged
//! final, so the periods tile the goal exactly.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use bonus_core::add_months;

use crate::goal::ExtraGoal;

/// One evaluation slice of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MilestonePeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub is_final: bool,
}

/// Prorated target and baseline for one period, in currency units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodTargets {
    pub goal_value: f64,
    pub goal_base: f64,
}

impl ExtraGoal {
    /// Ordered milestone periods covering the goal.
    ///
    /// Recomputed on every call; only evaluations are persisted.
    pub fn periods(&self) -> Vec<MilestonePeriod> {
        let mut periods = Vec::new();
        let mut start = self.goal_period_from;

        loop {
            let candidate = add_months(start, self.evaluation_frequency);
            match candidate.and_then(|end| end.pred_opt().map(|last| (end, last))) {
                Some((next_start, last_day)) if next_start < self.goal_period_to => {
                    periods.push(MilestonePeriod {
                        start,
                        end: last_day,
                        is_final: false,
                    });
                    start = next_start;
                }
                _ => {
                    periods.push(MilestonePeriod {
                        start,
                        end: self.goal_period_to,
                        is_final: true,
                    });
                    return periods;
                }
            }
        }
    }

    /// The scheduled period with exactly these bounds, if any.
    pub fn find_period(&self, start: NaiveDate, end: NaiveDate) -> Option<MilestonePeriod> {
        self.periods()
            .into_iter()
            .find(|p| p.start == start && p.end == end)
    }

    /// Share of the goal's value and base attributable to `[start, end]`.
    ///
    /// Linear in the number of days covered, bounds included on both sides.
    pub fn period_targets(&self, start: NaiveDate, end: NaiveDate) -> PeriodTargets {
        let total_days = (self.goal_period_to - self.goal_period_from).num_days() + 1;
        let period_days = (end - start).num_days() + 1;
        let fraction = if total_days > 0 {
            period_days as f64 / total_days as f64
        } else {
            0.0
        };

        PeriodTargets {
            goal_value: self.goal_value as f64 * fraction,
            goal_base: self.goal_base as f64 * fraction,
        }
    }
}
