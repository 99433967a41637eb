//! Extra goals: negotiated turnover targets evaluated at milestones.
//!
//! Everything here is pure: the period scheduler, proration, the points cap,
//! the evaluation decision table and the projection report. Turnover figures
//! and prior evaluations are supplied by the caller.

pub mod cap;
pub mod evaluation;
pub mod goal;
pub mod projection;
pub mod schedule;

pub use cap::{CapPolicy, apply_cap};
pub use evaluation::{
    EvaluationId, EvaluationInput, EvaluationOutcome, EvaluationType, GoalEvaluation, decide,
};
pub use goal::{ExtraGoal, GoalId};
pub use projection::{GoalProjection, project_goal};
pub use schedule::{MilestonePeriod, PeriodTargets};
