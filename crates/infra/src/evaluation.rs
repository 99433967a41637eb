//! Goal evaluation service: preview of due periods and the evaluate command.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use bonus_core::{DateRange, Money, UserId};
use bonus_goals::{
    CapPolicy, EvaluationId, EvaluationInput, EvaluationOutcome, ExtraGoal,
    GoalEvaluation, GoalId, GoalProjection, MilestonePeriod, decide, project_goal,
};
use bonus_ledger::{NewTransaction, PointsTransaction, TransactionStatus, TransactionType};
use bonus_parties::{Client, ClientId};

use crate::observer::{LedgerObserver, NoopObserver};
use crate::store::{EvaluationStore, InvoiceStore, PointsLedger, Registry, StoreError};
use crate::turnover::TurnoverAggregator;

#[derive(Debug, thiserror::Error)]
pub enum EvaluationError {
    #[error("goal {0} not found")]
    GoalNotFound(GoalId),
    #[error("goal {goal_id} belongs to a missing contract or client")]
    OrphanGoal { goal_id: GoalId },
    #[error("{start}..={end} is not a scheduled period of goal {goal_id}")]
    UnknownPeriod {
        goal_id: GoalId,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("period {start}..={end} of goal {goal_id} is already evaluated")]
    AlreadyEvaluated {
        goal_id: GoalId,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("period ending {end} is not due before {today}")]
    NotDue { end: NaiveDate, today: NaiveDate },
    /// Another evaluation of the goal landed first; re-run to pick it up.
    #[error("goal evaluated concurrently: {0}")]
    Concurrency(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which periods the preview lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationFilter {
    #[default]
    Pending,
    Evaluated,
    All,
}

/// Identifies one `(goal, period)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationKey {
    pub goal_id: GoalId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
}

/// One due period with the outcome evaluation would produce right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingEvaluation {
    pub key: EvaluationKey,
    pub client_id: ClientId,
    pub client_number: String,
    pub is_final: bool,
    pub actual_turnover: Money,
    pub target_turnover: f64,
    pub baseline_turnover: f64,
    pub proposed: EvaluationOutcome,
    pub full_period_actual: Money,
    pub goal_value: i64,
    pub goal_base: i64,
    pub full_period_met: bool,
    pub points_cap: i64,
    pub already_awarded: i64,
    pub existing: Option<GoalEvaluation>,
}

/// Result of evaluating several periods.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkEvaluation {
    pub evaluated: Vec<GoalEvaluation>,
    /// Keys that were not evaluated, with the reason.
    pub skipped: Vec<(EvaluationKey, String)>,
    pub total_points: i64,
}

/// Everything computed for a `(goal, period)` before anything is written.
struct Assessment {
    period: MilestonePeriod,
    input: EvaluationInput,
    outcome: EvaluationOutcome,
}

pub struct GoalEvaluationService<R, I, L, E> {
    registry: R,
    turnover: TurnoverAggregator<I>,
    ledger: L,
    evaluations: E,
    cap: CapPolicy,
    observer: Arc<dyn LedgerObserver>,
}

impl<R, I, L, E> GoalEvaluationService<R, I, L, E>
where
    R: Registry,
    I: InvoiceStore,
    L: PointsLedger,
    E: EvaluationStore,
{
    pub fn new(registry: R, invoices: I, ledger: L, evaluations: E, cap: CapPolicy) -> Self {
        Self {
            registry,
            turnover: TurnoverAggregator::new(invoices),
            ledger,
            evaluations,
            cap,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn LedgerObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Periods ended before `today` of goals that have started, optionally
    /// for one client, with a side-effect-free preview of the outcome.
    ///
    /// Sorted by client number, then period end.
    pub fn pending_evaluations(
        &self,
        scope: Option<ClientId>,
        filter: EvaluationFilter,
        today: NaiveDate,
    ) -> Result<Vec<PendingEvaluation>, EvaluationError> {
        let mut items = Vec::new();

        for goal in self.registry.goals()? {
            if !goal.has_started(today) {
                continue;
            }
            let client = match self.client_of(&goal) {
                Ok(client) => client,
                Err(e) => {
                    warn!(goal_id = %goal.id, error = %e, "skipping goal");
                    continue;
                }
            };
            if scope.is_some_and(|id| id != client.id) {
                continue;
            }

            match self.pending_for_goal(&goal, &client, filter, today) {
                Ok(pending) => items.extend(pending),
                Err(e) => warn!(goal_id = %goal.id, error = %e, "skipping goal"),
            }
        }

        items.sort_by(|a, b| {
            (&a.client_number, a.key.period_end).cmp(&(&b.client_number, b.key.period_end))
        });
        Ok(items)
    }

    /// Evaluate one period: store the evaluation and, when it pays points,
    /// a confirmed EXTRA_POINTS ledger entry dated at the period end.
    pub fn evaluate(
        &self,
        key: EvaluationKey,
        evaluated_by: UserId,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<GoalEvaluation, EvaluationError> {
        let goal = self
            .registry
            .goal(key.goal_id)?
            .ok_or(EvaluationError::GoalNotFound(key.goal_id))?;
        let period = goal
            .find_period(key.period_start, key.period_end)
            .ok_or(EvaluationError::UnknownPeriod {
                goal_id: goal.id,
                start: key.period_start,
                end: key.period_end,
            })?;
        if period.end >= today {
            return Err(EvaluationError::NotDue {
                end: period.end,
                today,
            });
        }
        let client = self.client_of(&goal)?;

        let history = self.evaluations.for_goal(goal.id)?;
        let already_evaluated = EvaluationError::AlreadyEvaluated {
            goal_id: goal.id,
            start: period.start,
            end: period.end,
        };
        if history
            .iter()
            .any(|e| e.period_start == period.start && e.period_end == period.end)
        {
            return Err(already_evaluated);
        }

        let assessment = self.assess(&goal, &client, period, &history)?;
        let outcome = assessment.outcome;

        let evaluation = GoalEvaluation {
            id: EvaluationId::new(),
            goal_id: goal.id,
            evaluation_date: today,
            period_start: assessment.period.start,
            period_end: assessment.period.end,
            actual_turnover: assessment.input.actual,
            target_turnover: assessment.input.targets.goal_value,
            baseline_turnover: assessment.input.targets.goal_base,
            is_achieved: outcome.is_achieved,
            bonus_points: outcome.bonus_points,
            evaluation_type: outcome.evaluation_type,
            evaluated_by,
            points_transaction: None,
        };

        // The evaluation is recorded before it is paid: the store's unique key
        // and history check let exactly one concurrent caller through.
        match self.evaluations.insert(evaluation.clone(), history.len()) {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(_)) => return Err(already_evaluated),
            Err(StoreError::Conflict(reason)) => return Err(EvaluationError::Concurrency(reason)),
            Err(e) => return Err(e.into()),
        }

        let evaluation = if outcome.bonus_points > 0 {
            self.pay(evaluation, client.id, now)?
        } else {
            evaluation
        };

        info!(
            goal_id = %goal.id,
            client_number = %client.client_number,
            period_start = %period.start,
            period_end = %period.end,
            evaluation_type = ?outcome.evaluation_type,
            bonus_points = outcome.bonus_points,
            achieved = outcome.is_achieved,
            "goal period evaluated"
        );
        self.observer.on_goal_evaluated(&evaluation);
        Ok(evaluation)
    }

    /// Evaluate each key independently; failures are skipped and reported.
    pub fn evaluate_selected(
        &self,
        keys: &[EvaluationKey],
        evaluated_by: UserId,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> BulkEvaluation {
        let mut result = BulkEvaluation::default();
        for key in keys {
            match self.evaluate(*key, evaluated_by, today, now) {
                Ok(evaluation) => {
                    result.total_points += evaluation.bonus_points;
                    result.evaluated.push(evaluation);
                }
                Err(e) => {
                    debug!(goal_id = %key.goal_id, error = %e, "skipping evaluation");
                    result.skipped.push((*key, e.to_string()));
                }
            }
        }
        info!(
            evaluated = result.evaluated.len(),
            skipped = result.skipped.len(),
            total_points = result.total_points,
            "bulk evaluation finished"
        );
        result
    }

    /// What the goal would pay if its full target were hit, from turnover
    /// booked up to `today`.
    pub fn project(&self, goal_id: GoalId, today: NaiveDate) -> Result<GoalProjection, EvaluationError> {
        let goal = self
            .registry
            .goal(goal_id)?
            .ok_or(EvaluationError::GoalNotFound(goal_id))?;
        let client = self.client_of(&goal)?;

        let to_date = match DateRange::new(goal.goal_period_from, today.min(goal.goal_period_to)) {
            Ok(range) => self.turnover.turnover(&client, &goal.brands, range)?,
            Err(_) => Money::ZERO,
        };
        let already_awarded: i64 = self
            .evaluations
            .for_goal(goal.id)?
            .iter()
            .map(|e| e.bonus_points)
            .sum();

        Ok(project_goal(&goal, to_date, already_awarded, &self.cap))
    }

    fn pending_for_goal(
        &self,
        goal: &ExtraGoal,
        client: &Client,
        filter: EvaluationFilter,
        today: NaiveDate,
    ) -> Result<Vec<PendingEvaluation>, EvaluationError> {
        let history = self.evaluations.for_goal(goal.id)?;
        let points_cap = self.cap.annual_cap(goal);
        let mut items = Vec::new();

        for period in goal.periods().into_iter().filter(|p| p.end < today) {
            let existing = history
                .iter()
                .find(|e| e.period_start == period.start && e.period_end == period.end)
                .cloned();
            let wanted = match filter {
                EvaluationFilter::Pending => existing.is_none(),
                EvaluationFilter::Evaluated => existing.is_some(),
                EvaluationFilter::All => true,
            };
            if !wanted {
                continue;
            }

            let assessment = self.assess(goal, client, period, &history)?;
            items.push(PendingEvaluation {
                key: EvaluationKey {
                    goal_id: goal.id,
                    period_start: period.start,
                    period_end: period.end,
                },
                client_id: client.id,
                client_number: client.client_number.clone(),
                is_final: period.is_final,
                actual_turnover: assessment.input.actual,
                target_turnover: assessment.input.targets.goal_value,
                baseline_turnover: assessment.input.targets.goal_base,
                proposed: assessment.outcome,
                full_period_actual: assessment.input.full_period_actual,
                goal_value: goal.goal_value,
                goal_base: goal.goal_base,
                full_period_met: assessment.input.full_period_actual.as_major()
                    >= goal.goal_value as f64,
                points_cap,
                already_awarded: assessment.input.already_awarded,
                existing,
            });
        }
        Ok(items)
    }

    /// Append the confirmed EXTRA_POINTS entry for a recorded evaluation and
    /// link it. On failure the evaluation is withdrawn so the period can be
    /// evaluated again, and a written entry is cancelled.
    fn pay(
        &self,
        evaluation: GoalEvaluation,
        client_id: ClientId,
        now: DateTime<Utc>,
    ) -> Result<GoalEvaluation, EvaluationError> {
        let entry = NewTransaction::new(
            client_id,
            evaluation.bonus_points,
            evaluation.period_end,
            format!(
                "Extra bonus for period {} to {}",
                evaluation.period_start, evaluation.period_end
            ),
            TransactionType::ExtraPoints,
            TransactionStatus::Confirmed,
        );

        let tx = match self.ledger.append(entry, now) {
            Ok(tx) => tx,
            Err(e) => {
                self.withdraw(&evaluation, None);
                return Err(e.into());
            }
        };
        match self.evaluations.attach_transaction(evaluation.id, tx.id) {
            Ok(linked) => Ok(linked),
            Err(e) => {
                self.withdraw(&evaluation, Some(&tx));
                Err(e.into())
            }
        }
    }

    fn withdraw(&self, evaluation: &GoalEvaluation, paid: Option<&PointsTransaction>) {
        if let Some(tx) = paid {
            if let Err(e) = self.ledger.set_status(tx.id, TransactionStatus::Cancelled) {
                error!(transaction_id = %tx.id, error = %e, "failed to cancel unlinked extra points");
            }
        }
        if let Err(e) = self.evaluations.remove(evaluation.id) {
            error!(evaluation_id = %evaluation.id, error = %e, "failed to withdraw unpaid evaluation");
        }
    }

    fn client_of(&self, goal: &ExtraGoal) -> Result<Client, EvaluationError> {
        let orphan = || EvaluationError::OrphanGoal { goal_id: goal.id };
        let contract = self.registry.contract(goal.contract_id)?.ok_or_else(orphan)?;
        self.registry.client(contract.client_id)?.ok_or_else(orphan)
    }

    fn assess(
        &self,
        goal: &ExtraGoal,
        client: &Client,
        period: MilestonePeriod,
        history: &[GoalEvaluation],
    ) -> Result<Assessment, EvaluationError> {
        let period_range = DateRange::new(period.start, period.end).map_err(StoreError::from)?;
        let full_range = DateRange::new(goal.goal_period_from, goal.goal_period_to)
            .map_err(StoreError::from)?;

        let input = EvaluationInput {
            period,
            actual: self.turnover.turnover(client, &goal.brands, period_range)?,
            targets: goal.period_targets(period.start, period.end),
            already_awarded: history.iter().map(|e| e.bonus_points).sum(),
            previous_milestone_points: history
                .iter()
                .filter(|e| e.period_end < period.end)
                .map(|e| e.bonus_points)
                .sum(),
            full_period_actual: self.turnover.turnover(client, &goal.brands, full_range)?,
        };
        let outcome = decide(goal, &input, &self.cap);

        Ok(Assessment {
            period,
            input,
            outcome,
        })
    }
}
