//! One CLI invocation: in-memory stores wired to the engine services.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info};

use bonus_core::UserId;
use bonus_goals::GoalId;
use bonus_infra::config::BonusConfig;
use bonus_infra::store::{
    InMemoryEvaluationStore, InMemoryInvoiceStore, InMemoryPointsLedger, InMemoryRegistry,
    InMemoryUploadStore, PointsLedger, Registry,
};
use bonus_infra::{
    ApprovalService, CsvRowSource, EvaluationFilter, GoalEvaluationService, IngestionPipeline,
    IngestionReport, RecordingObserver, default_approval_month,
};
use bonus_invoicing::{FileUpload, UploadId};

use crate::fixture::RegistryFixture;

/// Result of importing one file.
#[derive(Debug, Serialize)]
pub struct UploadOutcome {
    pub file: PathBuf,
    pub upload_id: UploadId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<IngestionReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Session {
    registry: Arc<InMemoryRegistry>,
    invoices: Arc<InMemoryInvoiceStore>,
    ledger: Arc<InMemoryPointsLedger>,
    uploads: Arc<InMemoryUploadStore>,
    evaluations: Arc<InMemoryEvaluationStore>,
    config: BonusConfig,
    operator: UserId,
    observer: Arc<RecordingObserver>,
}

impl Session {
    pub fn open(registry: &Path, operator: UserId) -> anyhow::Result<Self> {
        let config = BonusConfig::from_env().context("reading BONUS_* configuration")?;
        let registry = RegistryFixture::from_path(registry)?.load()?;
        info!(
            clients = registry.clients()?.len(),
            goals = registry.goals()?.len(),
            "registry loaded"
        );

        Ok(Self {
            registry,
            invoices: InMemoryInvoiceStore::arc(),
            ledger: InMemoryPointsLedger::arc(),
            uploads: InMemoryUploadStore::arc(),
            evaluations: InMemoryEvaluationStore::arc(),
            config,
            operator,
            observer: Arc::new(RecordingObserver::new()),
        })
    }

    /// Import files in order. A file that fails as a whole is reported and
    /// the next one still runs.
    pub fn import(&self, files: &[PathBuf], delimiter: u8) -> anyhow::Result<Vec<UploadOutcome>> {
        let pipeline = IngestionPipeline::new(
            self.registry.clone(),
            self.invoices.clone(),
            self.ledger.clone(),
            self.uploads.clone(),
            self.config.clone(),
        )
        .with_observer(self.observer.clone());

        let mut outcomes = Vec::with_capacity(files.len());
        for path in files {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            let upload = FileUpload::new(UploadId::new(), file_name, self.operator, Utc::now());
            let upload_id = upload.id;

            let result = CsvRowSource::from_path(path, delimiter)
                .and_then(|mut source| pipeline.ingest(upload, &mut source, Utc::now()));
            let outcome = match result {
                Ok(report) => UploadOutcome {
                    file: path.clone(),
                    upload_id,
                    report: Some(report),
                    error: None,
                },
                Err(e) => {
                    error!(file = %path.display(), error = %e, "import failed");
                    UploadOutcome {
                        file: path.clone(),
                        upload_id,
                        report: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    pub fn ingest_report(&self, uploads: Vec<UploadOutcome>) -> anyhow::Result<Value> {
        let mut balances = Vec::new();
        for client in self.registry.clients()? {
            let summary = self.ledger.summary(client.id)?;
            balances.push(json!({
                "client_number": client.client_number,
                "balance": summary.confirmed,
                "incoming": summary.pending,
            }));
        }
        Ok(json!({
            "uploads": uploads,
            "points_created": self.observer.snapshot().points_created.len(),
            "balances": balances,
        }))
    }

    pub fn approve(
        &self,
        year: Option<i32>,
        month: Option<u32>,
        today: Option<NaiveDate>,
    ) -> anyhow::Result<Value> {
        let (default_year, default_month) = default_approval_month(
            today.unwrap_or_else(|| Utc::now().date_naive()),
            self.config.approval_lag_months,
        );
        let summary = ApprovalService::new(self.ledger.clone())
            .with_observer(self.observer.clone())
            .approve_month(year.unwrap_or(default_year), month.unwrap_or(default_month))?;
        Ok(serde_json::to_value(summary)?)
    }

    pub fn evaluate(
        &self,
        today: Option<NaiveDate>,
        client_number: Option<&str>,
        apply: bool,
    ) -> anyhow::Result<Value> {
        let today = today.unwrap_or_else(|| Utc::now().date_naive());
        let scope = match client_number {
            Some(number) => Some(
                self.registry
                    .client_by_number(number)?
                    .ok_or_else(|| anyhow!("unknown client number '{number}'"))?
                    .id,
            ),
            None => None,
        };

        let service = self.evaluation_service();
        let pending = service.pending_evaluations(scope, EvaluationFilter::Pending, today)?;
        if !apply {
            return Ok(serde_json::to_value(pending)?);
        }

        let keys: Vec<_> = pending.iter().map(|p| p.key).collect();
        let result = service.evaluate_selected(&keys, self.operator, today, Utc::now());
        Ok(serde_json::to_value(result)?)
    }

    pub fn project(&self, goal: GoalId, today: Option<NaiveDate>) -> anyhow::Result<Value> {
        let today = today.unwrap_or_else(|| Utc::now().date_naive());
        let projection = self.evaluation_service().project(goal, today)?;
        Ok(serde_json::to_value(projection)?)
    }

    fn evaluation_service(
        &self,
    ) -> GoalEvaluationService<
        Arc<InMemoryRegistry>,
        Arc<InMemoryInvoiceStore>,
        Arc<InMemoryPointsLedger>,
        Arc<InMemoryEvaluationStore>,
    > {
        GoalEvaluationService::new(
            self.registry.clone(),
            self.invoices.clone(),
            self.ledger.clone(),
            self.evaluations.clone(),
            self.config.cap,
        )
        .with_observer(self.observer.clone())
    }
}
