//! Infrastructure layer: stores, ingestion, accrual, evaluation, config.

pub mod accrual;
pub mod approval;
pub mod config;
pub mod evaluation;
pub mod ingestion;
pub mod observer;
pub mod store;
pub mod turnover;

#[cfg(test)]
mod integration_tests;

pub use accrual::{AccrualProcessor, AccrualStats};
pub use approval::{ApprovalService, ApprovalSummary, default_approval_month};
pub use config::{BonusConfig, ConfigError};
pub use evaluation::{
    BulkEvaluation, EvaluationError, EvaluationFilter, EvaluationKey, GoalEvaluationService,
    PendingEvaluation,
};
pub use ingestion::{CsvRowSource, IngestionError, IngestionPipeline, IngestionReport, RowSource, VecRowSource};
pub use observer::{IngestionObserver, LedgerObserver, NoopObserver, Recorded, RecordingObserver};
pub use turnover::TurnoverAggregator;
