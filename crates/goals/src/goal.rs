use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use bonus_core::{DomainError, DomainResult, Entity, entity_id};
use bonus_parties::{BrandId, ContractId};

entity_id!(
    /// Extra goal identifier.
    GoalId
);

/// A negotiated turnover target attached to a contract.
///
/// `goal_value` and `goal_base` are whole currency units and apply to the
/// entire goal period; milestones are judged against a prorated share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraGoal {
    pub id: GoalId,
    pub contract_id: ContractId,
    pub goal_period_from: NaiveDate,
    pub goal_period_to: NaiveDate,
    pub brands: Vec<BrandId>,
    pub goal_value: i64,
    pub goal_base: i64,
    /// Months per milestone.
    pub evaluation_frequency: u32,
    /// Fraction of turnover above the base paid out as points.
    pub bonus_percentage: f64,
    pub allow_full_period_recovery: bool,
}

impl ExtraGoal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: GoalId,
        contract_id: ContractId,
        goal_period_from: NaiveDate,
        goal_period_to: NaiveDate,
        brands: Vec<BrandId>,
        goal_value: i64,
        goal_base: i64,
        evaluation_frequency: u32,
        bonus_percentage: f64,
        allow_full_period_recovery: bool,
    ) -> DomainResult<Self> {
        if goal_period_to <= goal_period_from {
            return Err(DomainError::validation(format!(
                "goal period must end after it starts ({goal_period_from} .. {goal_period_to})"
            )));
        }
        if !(1..=12).contains(&evaluation_frequency) {
            return Err(DomainError::validation(format!(
                "evaluation frequency must be 1..=12 months, got {evaluation_frequency}"
            )));
        }
        if !(0.0..=1.0).contains(&bonus_percentage) {
            return Err(DomainError::validation(format!(
                "bonus percentage must be within 0..=1, got {bonus_percentage}"
            )));
        }
        if goal_value < 0 || goal_base < 0 {
            return Err(DomainError::validation("goal value and base must not be negative"));
        }
        if brands.is_empty() {
            return Err(DomainError::validation("goal must apply to at least one brand"));
        }

        Ok(Self {
            id,
            contract_id,
            goal_period_from,
            goal_period_to,
            brands,
            goal_value,
            goal_base,
            evaluation_frequency,
            bonus_percentage,
            allow_full_period_recovery,
        })
    }

    pub fn has_started(&self, today: NaiveDate) -> bool {
        self.goal_period_from <= today
    }
}

impl Entity for ExtraGoal {
    type Id = GoalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
