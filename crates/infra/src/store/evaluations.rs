use std::sync::{Arc, RwLock};

use chrono::NaiveDate;

use bonus_goals::{EvaluationId, GoalEvaluation, GoalId};
use bonus_ledger::TransactionId;

use super::StoreError;

/// Append-only goal evaluation history.
///
/// Writes are optimistic: the caller states how many evaluations of the goal
/// it based its decision on, and the insert is refused when that count moved.
pub trait EvaluationStore: Send + Sync {
    /// Insert a new evaluation.
    ///
    /// Refused with `AlreadyExists` when `(goal, period_start, period_end)` is
    /// already evaluated, and with `Conflict` when the goal no longer has
    /// exactly `expected_history` evaluations.
    fn insert(&self, evaluation: GoalEvaluation, expected_history: usize) -> Result<(), StoreError>;

    /// Link the ledger entry that pays an evaluation.
    fn attach_transaction(
        &self,
        id: EvaluationId,
        transaction: TransactionId,
    ) -> Result<GoalEvaluation, StoreError>;

    /// Drop an evaluation whose payment could not be written.
    fn remove(&self, id: EvaluationId) -> Result<(), StoreError>;

    /// Evaluations of a goal ordered by period end.
    fn for_goal(&self, goal_id: GoalId) -> Result<Vec<GoalEvaluation>, StoreError>;

    fn find(
        &self,
        goal_id: GoalId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<GoalEvaluation>, StoreError> {
        Ok(self
            .for_goal(goal_id)?
            .into_iter()
            .find(|e| e.period_start == start && e.period_end == end))
    }
}

impl<S> EvaluationStore for Arc<S>
where
    S: EvaluationStore + ?Sized,
{
    fn insert(&self, evaluation: GoalEvaluation, expected_history: usize) -> Result<(), StoreError> {
        (**self).insert(evaluation, expected_history)
    }

    fn attach_transaction(
        &self,
        id: EvaluationId,
        transaction: TransactionId,
    ) -> Result<GoalEvaluation, StoreError> {
        (**self).attach_transaction(id, transaction)
    }

    fn remove(&self, id: EvaluationId) -> Result<(), StoreError> {
        (**self).remove(id)
    }

    fn for_goal(&self, goal_id: GoalId) -> Result<Vec<GoalEvaluation>, StoreError> {
        (**self).for_goal(goal_id)
    }

    fn find(
        &self,
        goal_id: GoalId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<GoalEvaluation>, StoreError> {
        (**self).find(goal_id, start, end)
    }
}

/// In-memory evaluation history for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryEvaluationStore {
    inner: RwLock<Vec<GoalEvaluation>>,
}

impl InMemoryEvaluationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn all(&self) -> Result<Vec<GoalEvaluation>, StoreError> {
        Ok(self.inner.read()?.clone())
    }
}

impl EvaluationStore for InMemoryEvaluationStore {
    fn insert(&self, evaluation: GoalEvaluation, expected_history: usize) -> Result<(), StoreError> {
        let mut evaluations = self.inner.write()?;
        let mut history = 0;
        for e in evaluations.iter().filter(|e| e.goal_id == evaluation.goal_id) {
            if e.period_start == evaluation.period_start && e.period_end == evaluation.period_end {
                return Err(StoreError::AlreadyExists(format!(
                    "evaluation of goal {} for {}..={}",
                    evaluation.goal_id, evaluation.period_start, evaluation.period_end
                )));
            }
            history += 1;
        }
        if history != expected_history {
            return Err(StoreError::Conflict(format!(
                "goal {} has {history} evaluations, expected {expected_history}",
                evaluation.goal_id
            )));
        }
        evaluations.push(evaluation);
        Ok(())
    }

    fn attach_transaction(
        &self,
        id: EvaluationId,
        transaction: TransactionId,
    ) -> Result<GoalEvaluation, StoreError> {
        let mut evaluations = self.inner.write()?;
        let evaluation = evaluations
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("evaluation {id}")))?;
        evaluation.points_transaction = Some(transaction);
        Ok(evaluation.clone())
    }

    fn remove(&self, id: EvaluationId) -> Result<(), StoreError> {
        let mut evaluations = self.inner.write()?;
        let before = evaluations.len();
        evaluations.retain(|e| e.id != id);
        if evaluations.len() == before {
            return Err(StoreError::NotFound(format!("evaluation {id}")));
        }
        Ok(())
    }

    fn for_goal(&self, goal_id: GoalId) -> Result<Vec<GoalEvaluation>, StoreError> {
        let mut found: Vec<GoalEvaluation> = self
            .inner
            .read()?
            .iter()
            .filter(|e| e.goal_id == goal_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.period_end);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bonus_core::{Money, UserId};
    use bonus_goals::EvaluationType;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, day).unwrap()
    }

    fn evaluation(goal_id: GoalId, start: NaiveDate, end: NaiveDate) -> GoalEvaluation {
        GoalEvaluation {
            id: EvaluationId::new(),
            goal_id,
            evaluation_date: d(12, 31),
            period_start: start,
            period_end: end,
            actual_turnover: Money::ZERO,
            target_turnover: 0.0,
            baseline_turnover: 0.0,
            is_achieved: false,
            bonus_points: 0,
            evaluation_type: EvaluationType::Milestone,
            evaluated_by: UserId::new(),
            points_transaction: None,
        }
    }

    #[test]
    fn insert_refuses_duplicate_period() {
        let store = InMemoryEvaluationStore::new();
        let goal = GoalId::new();
        store.insert(evaluation(goal, d(1, 1), d(6, 30)), 0).unwrap();

        let err = store.insert(evaluation(goal, d(1, 1), d(6, 30)), 1).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.for_goal(goal).unwrap().len(), 1);
    }

    #[test]
    fn insert_refuses_stale_history() {
        let store = InMemoryEvaluationStore::new();
        let goal = GoalId::new();
        store.insert(evaluation(goal, d(1, 1), d(4, 30)), 0).unwrap();

        let err = store.insert(evaluation(goal, d(5, 1), d(8, 31)), 0).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // Other goals do not count towards the expected history.
        store.insert(evaluation(GoalId::new(), d(5, 1), d(8, 31)), 0).unwrap();
        store.insert(evaluation(goal, d(5, 1), d(8, 31)), 1).unwrap();
    }

    #[test]
    fn attach_and_remove() {
        let store = InMemoryEvaluationStore::new();
        let goal = GoalId::new();
        let record = evaluation(goal, d(1, 1), d(6, 30));
        let id = record.id;
        store.insert(record, 0).unwrap();

        let tx = TransactionId::new();
        assert_eq!(store.attach_transaction(id, tx).unwrap().points_transaction, Some(tx));
        assert_eq!(store.find(goal, d(1, 1), d(6, 30)).unwrap().unwrap().points_transaction, Some(tx));

        store.remove(id).unwrap();
        assert!(store.for_goal(goal).unwrap().is_empty());
        assert!(matches!(store.remove(id), Err(StoreError::NotFound(_))));
    }
}
