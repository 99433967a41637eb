//! End-to-end tests across ingestion, accrual, evaluation and approval.
//!
//! Exercises: CSV -> IngestionPipeline -> InvoiceStore -> AccrualProcessor ->
//! PointsLedger, then GoalEvaluationService and ApprovalService on top.

use std::io::Cursor;
use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use bonus_core::{DateRange, Money, UserId};
use bonus_goals::{CapPolicy, EvaluationId, EvaluationType, ExtraGoal, GoalEvaluation, GoalId};
use bonus_invoicing::{
    FATAL_PREFIX, FileUpload, Invoice, InvoiceBrandTurnover, InvoiceId, UploadId, UploadStatus,
};
use bonus_ledger::{
    NewTransaction, PointsTransaction, TransactionId, TransactionStatus, TransactionType,
};
use bonus_parties::{Brand, BrandBonus, BrandBonusId, BrandId, Client, ClientId, Contract, ContractId};

use crate::accrual::AccrualProcessor;
use crate::approval::ApprovalService;
use crate::config::BonusConfig;
use crate::evaluation::{EvaluationError, EvaluationFilter, EvaluationKey, GoalEvaluationService};
use crate::ingestion::{CsvRowSource, IngestionError, IngestionPipeline, IngestionReport};
use crate::observer::{NoopObserver, RecordingObserver};
use crate::store::{
    EvaluationStore, InMemoryEvaluationStore, InMemoryInvoiceStore, InMemoryPointsLedger,
    InMemoryRegistry, InMemoryUploadStore, InvoiceStore, InvoiceWrite, PointsLedger, Registry,
    StoreError, TurnoverRow, UploadStore,
};
use crate::turnover::TurnoverAggregator;

const HEADER_INVOICE: &str = "ZČ;Cena;Kód;Datum;Faktura";
const HEADER_CREDIT: &str = "ZČ;Cena;Kód;Datum;Dobropis";

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap()
}

struct World {
    registry: Arc<InMemoryRegistry>,
    invoices: Arc<InMemoryInvoiceStore>,
    ledger: Arc<InMemoryPointsLedger>,
    uploads: Arc<InMemoryUploadStore>,
    evaluations: Arc<InMemoryEvaluationStore>,
    client: Client,
    brand: BrandId,
    goal: ExtraGoal,
}

impl World {
    /// Client `1001` with a 2025 contract paying 0.5 points per unit of
    /// brand `AC` turnover, and a half-yearly goal of 10 000 over 2025.
    fn new() -> Self {
        let registry = InMemoryRegistry::arc();
        let brand = BrandId::new();
        registry.save_brand(Brand::new(brand, "Acme", "AC").unwrap()).unwrap();
        registry.save_brand(Brand::new(BrandId::new(), "Other", "XY").unwrap()).unwrap();

        let client = Client::new(ClientId::new(), "1001", "Stavebniny Novák").unwrap();
        registry.save_client(client.clone()).unwrap();

        let contract = Contract::new(
            ContractId::new(),
            client.id,
            d(2025, 1, 1),
            d(2025, 12, 31),
            vec![BrandBonus::new(BrandBonusId::new(), "Acme", brand, 0.5).unwrap()],
        )
        .unwrap();
        registry.save_contract(contract.clone()).unwrap();

        let goal = ExtraGoal::new(
            GoalId::new(),
            contract.id,
            d(2025, 1, 1),
            d(2025, 12, 31),
            vec![brand],
            10_000,
            0,
            6,
            0.5,
            true,
        )
        .unwrap();
        registry.save_goal(goal.clone()).unwrap();

        Self {
            registry,
            invoices: InMemoryInvoiceStore::arc(),
            ledger: InMemoryPointsLedger::arc(),
            uploads: InMemoryUploadStore::arc(),
            evaluations: InMemoryEvaluationStore::arc(),
            client,
            brand,
            goal,
        }
    }

    fn pipeline(
        &self,
    ) -> IngestionPipeline<
        Arc<InMemoryRegistry>,
        Arc<InMemoryInvoiceStore>,
        Arc<InMemoryPointsLedger>,
        Arc<InMemoryUploadStore>,
    > {
        IngestionPipeline::new(
            self.registry.clone(),
            self.invoices.clone(),
            self.ledger.clone(),
            self.uploads.clone(),
            BonusConfig::default(),
        )
    }

    fn evaluator(
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
            CapPolicy::default(),
        )
    }

    fn ingest(&self, header: &str, lines: &[&str]) -> Result<IngestionReport, IngestionError> {
        let mut data = format!("{header}\n");
        for line in lines {
            data.push_str(line);
            data.push('\n');
        }
        let upload = FileUpload::new(UploadId::new(), "export.csv", UserId::new(), now());
        let mut source = CsvRowSource::from_reader(Cursor::new(data.into_bytes()), b';');
        self.pipeline().ingest(upload, &mut source, now())
    }

    fn invoice(&self, number: &str) -> Invoice {
        self.invoices.invoice_by_number(number).unwrap().unwrap()
    }

    fn turnover(&self, from: NaiveDate, to: NaiveDate) -> Money {
        TurnoverAggregator::new(self.invoices.clone())
            .turnover(&self.client, &[self.brand], DateRange::new(from, to).unwrap())
            .unwrap()
    }

    fn key(&self, start: NaiveDate, end: NaiveDate) -> EvaluationKey {
        EvaluationKey {
            goal_id: self.goal.id,
            period_start: start,
            period_end: end,
        }
    }

    fn extra_points(&self) -> Vec<PointsTransaction> {
        self.ledger
            .all()
            .unwrap()
            .into_iter()
            .filter(|t| t.transaction_type == TransactionType::ExtraPoints)
            .collect()
    }

    /// A second goal on client `1001`'s contract, evaluated every four months.
    fn add_quarterly_goal(&self, goal_value: i64) -> ExtraGoal {
        let contract = self.registry.contracts_for_client(self.client.id).unwrap()[0].clone();
        let goal = ExtraGoal::new(
            GoalId::new(),
            contract.id,
            d(2025, 1, 1),
            d(2025, 12, 31),
            vec![self.brand],
            goal_value,
            0,
            4,
            0.5,
            true,
        )
        .unwrap();
        self.registry.save_goal(goal.clone()).unwrap();
        goal
    }
}

fn goal_key(goal: &ExtraGoal, start: NaiveDate, end: NaiveDate) -> EvaluationKey {
    EvaluationKey {
        goal_id: goal.id,
        period_start: start,
        period_end: end,
    }
}

#[test]
fn csv_invoice_upload_creates_invoices_and_pending_points() {
    let world = World::new();
    let observer = Arc::new(RecordingObserver::new());

    let data = format!(
        "{HEADER_INVOICE}\n1001;600,00;AC-1;03.02.2025;FV-1\n1001;400,00;AC-2;03.02.2025;FV-1\n1001;50,00;XY-9;03.02.2025;FV-1\n1001;abc;AC-1;04.02.2025;FV-2\n"
    );
    let upload = FileUpload::new(UploadId::new(), "feb.csv", UserId::new(), now());
    let upload_id = upload.id;
    let mut source = CsvRowSource::from_reader(data.as_bytes(), b';');
    let report = world
        .pipeline()
        .with_observer(observer.clone())
        .ingest(upload, &mut source, now())
        .unwrap();

    assert_eq!(report.total_rows, 4);
    assert_eq!(report.rows_rejected, 1);
    assert_eq!(report.invoices_processed, 1);
    assert_eq!(report.accrual.transactions_created, 1);
    assert_eq!(report.errors.len(), 1);

    let invoice = world.invoice("FV-1");
    assert_eq!(invoice.total_amount, Money::from_major(1050));

    let entries = world.ledger.transactions_for_client(world.client.id).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].value, 500);
    assert_eq!(entries[0].status, TransactionStatus::Pending);
    assert_eq!(entries[0].transaction_type, TransactionType::StandardPoints);
    assert_eq!(entries[0].description, "Invoice FV-1");
    assert_eq!(entries[0].brand_id, Some(world.brand));

    let stored = world.uploads.get(upload_id).unwrap().unwrap();
    assert_eq!(stored.status, UploadStatus::Completed);
    assert_eq!(stored.processed_rows, 1);
    assert!(stored.error_message.contains("row 4"));

    let recorded = observer.snapshot();
    assert_eq!(recorded.progress, vec![(1, 1)]);
    assert_eq!(recorded.points_created.len(), 1);
}

#[test]
fn reingesting_same_rows_does_not_duplicate_points() {
    let world = World::new();
    let lines = ["1001;1000,00;AC-1;03.02.2025;FV-1"];

    let first = world.ingest(HEADER_INVOICE, &lines).unwrap();
    let second = world.ingest(HEADER_INVOICE, &lines).unwrap();

    assert_eq!(first.accrual.transactions_created, 1);
    assert_eq!(second.invoices_processed, 1);
    assert_eq!(second.accrual.transactions_created, 0);
    assert_eq!(second.accrual.transactions_skipped, 1);
    assert_eq!(world.ledger.all().unwrap().len(), 1);
    assert_eq!(world.turnover(d(2025, 2, 1), d(2025, 2, 28)), Money::from_major(1000));
}

#[test]
fn credit_notes_reduce_turnover_and_points_immediately() {
    let world = World::new();
    world
        .ingest(HEADER_INVOICE, &["1001;1000,00;AC-1;03.02.2025;FV-1"])
        .unwrap();
    let report = world
        .ingest(HEADER_CREDIT, &["1001;300,00;AC-1;10.02.2025;DB-1"])
        .unwrap();

    assert_eq!(report.accrual.transactions_created, 1);
    assert_eq!(world.turnover(d(2025, 2, 1), d(2025, 2, 28)), Money::from_major(700));

    let summary = world.ledger.summary(world.client.id).unwrap();
    assert_eq!(summary.pending, 500);
    assert_eq!(summary.confirmed, -150);

    let adjust = world
        .ledger
        .all()
        .unwrap()
        .into_iter()
        .find(|t| t.transaction_type == TransactionType::CreditNoteAdjust)
        .unwrap();
    assert_eq!(adjust.status, TransactionStatus::Confirmed);
    assert_eq!(adjust.description, "Credit Note DB-1");
}

#[test]
fn accrued_points_are_truncated() {
    let world = World::new();
    world
        .ingest(HEADER_INVOICE, &["1001;999,99;AC-1;03.02.2025;FV-1"])
        .unwrap();

    assert_eq!(world.ledger.incoming(world.client.id).unwrap(), 499);
}

#[test]
fn invoices_outside_contract_or_of_unknown_clients_earn_nothing() {
    let world = World::new();
    let report = world
        .ingest(
            HEADER_INVOICE,
            &[
                "1001;1000,00;AC-1;03.02.2026;FV-1",
                "9999;1000,00;AC-1;03.02.2025;FV-2",
            ],
        )
        .unwrap();

    assert_eq!(report.invoices_processed, 2);
    assert_eq!(report.accrual.invoices_found, 2);
    assert_eq!(report.accrual.transactions_created, 0);
    assert!(report.accrual.errors.is_empty());
    assert!(world.ledger.all().unwrap().is_empty());
}

#[test]
fn ambiguous_header_fails_whole_upload() {
    let world = World::new();
    let data = "ZČ;Cena;Kód;Datum;Faktura;Dobropis\n1001;1;AC;03.02.2025;FV-1;DB-1\n";
    let upload = FileUpload::new(UploadId::new(), "bad.csv", UserId::new(), now());
    let upload_id = upload.id;
    let mut source = CsvRowSource::from_reader(data.as_bytes(), b';');

    let err = world.pipeline().ingest(upload, &mut source, now()).unwrap_err();
    assert!(matches!(err, IngestionError::Input(_)));

    let stored = world.uploads.get(upload_id).unwrap().unwrap();
    assert_eq!(stored.status, UploadStatus::Failed);
    assert!(stored.error_message.starts_with(FATAL_PREFIX));
    assert!(stored.error_message.contains("Dobropis"));
    assert!(world.ledger.all().unwrap().is_empty());
}

#[test]
fn missing_required_column_fails_whole_upload() {
    let world = World::new();
    let err = world
        .ingest("ZČ;Cena;Datum;Faktura", &["1001;1;03.02.2025;FV-1"])
        .unwrap_err();
    assert!(err.to_string().contains("Kód"));
}

#[test]
fn full_period_recovery_pays_year_points_on_final_period() {
    let world = World::new();
    world
        .ingest(
            HEADER_INVOICE,
            &[
                "1001;4000,00;AC-1;15.03.2025;FV-1",
                "1001;7000,00;AC-1;10.09.2025;FV-2",
            ],
        )
        .unwrap();

    let observer = Arc::new(RecordingObserver::new());
    let service = world.evaluator().with_observer(observer.clone());
    let today = d(2026, 1, 15);
    let evaluator = UserId::new();

    let pending = service
        .pending_evaluations(Some(world.client.id), EvaluationFilter::Pending, today)
        .unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[1].proposed.evaluation_type, EvaluationType::Recovery);
    assert_eq!(pending[1].proposed.bonus_points, 5500);
    assert!(pending[1].full_period_met);
    assert_eq!(pending[1].points_cap, 19_933);

    let h1 = service
        .evaluate(world.key(d(2025, 1, 1), d(2025, 6, 30)), evaluator, today, now())
        .unwrap();
    assert_eq!(h1.evaluation_type, EvaluationType::Milestone);
    assert!(!h1.is_achieved);
    assert_eq!(h1.bonus_points, 0);
    assert!(h1.points_transaction.is_none());

    let h2 = service
        .evaluate(world.key(d(2025, 7, 1), d(2025, 12, 31)), evaluator, today, now())
        .unwrap();
    assert_eq!(h2.evaluation_type, EvaluationType::Recovery);
    assert!(h2.is_achieved);
    assert_eq!(h2.bonus_points, 5500);
    assert_eq!(h2.actual_turnover, Money::from_major(7000));

    let extra = world
        .ledger
        .get(h2.points_transaction.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(extra.transaction_type, TransactionType::ExtraPoints);
    assert_eq!(extra.status, TransactionStatus::Confirmed);
    assert_eq!(extra.date, d(2025, 12, 31));
    assert_eq!(extra.description, "Extra bonus for period 2025-07-01 to 2025-12-31");

    assert_eq!(observer.snapshot().evaluations.len(), 2);
    assert!(
        service
            .pending_evaluations(None, EvaluationFilter::Pending, today)
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        service
            .pending_evaluations(None, EvaluationFilter::Evaluated, today)
            .unwrap()
            .len(),
        2
    );
}

#[test]
fn period_is_evaluated_at_most_once_and_only_when_due() {
    let world = World::new();
    world
        .ingest(HEADER_INVOICE, &["1001;6000,00;AC-1;15.03.2025;FV-1"])
        .unwrap();
    let service = world.evaluator();
    let key = world.key(d(2025, 1, 1), d(2025, 6, 30));

    assert!(matches!(
        service.evaluate(key, UserId::new(), d(2025, 6, 30), now()),
        Err(EvaluationError::NotDue { .. })
    ));

    let first = service.evaluate(key, UserId::new(), d(2025, 7, 1), now()).unwrap();
    assert_eq!(first.evaluation_type, EvaluationType::Milestone);
    assert!(first.is_achieved);
    // Milestones pay on the prorated target: 10 000 * 181/365 * 0.5.
    assert_eq!(first.bonus_points, 2479);

    assert!(matches!(
        service.evaluate(key, UserId::new(), d(2025, 7, 2), now()),
        Err(EvaluationError::AlreadyEvaluated { .. })
    ));
    assert!(matches!(
        service.evaluate(world.key(d(2025, 1, 1), d(2025, 5, 31)), UserId::new(), d(2025, 7, 1), now()),
        Err(EvaluationError::UnknownPeriod { .. })
    ));

    let bulk = service.evaluate_selected(
        &[key, world.key(d(2025, 7, 1), d(2025, 12, 31))],
        UserId::new(),
        d(2025, 8, 1),
        now(),
    );
    assert!(bulk.evaluated.is_empty());
    assert_eq!(bulk.skipped.len(), 2);
    assert_eq!(bulk.total_points, 0);
}

#[test]
fn projection_uses_turnover_to_date() {
    let world = World::new();
    world
        .ingest(HEADER_INVOICE, &["1001;2500,00;AC-1;15.03.2025;FV-1"])
        .unwrap();
    let service = world.evaluator();

    let projection = service.project(world.goal.id, d(2025, 4, 1)).unwrap();
    assert_eq!(projection.current_turnover, Money::from_major(2500));
    assert_eq!(projection.turnover_needed, 7500.0);
    assert_eq!(projection.projected_points, 5000);

    let before = service.project(world.goal.id, d(2024, 12, 1)).unwrap();
    assert_eq!(before.current_turnover, Money::ZERO);
}

#[test]
fn historical_accrual_picks_up_invoices_of_new_client() {
    let world = World::new();
    world
        .ingest(
            HEADER_INVOICE,
            &[
                "2002;800,00;AC-1;03.02.2025;FV-7",
                "2002;100,00;AC-1;03.02.2024;FV-8",
            ],
        )
        .unwrap();
    assert!(world.ledger.all().unwrap().is_empty());

    let late = Client::new(ClientId::new(), "2002", "Late Joiner").unwrap();
    world.registry.save_client(late.clone()).unwrap();
    let contract = Contract::new(
        ContractId::new(),
        late.id,
        d(2025, 1, 1),
        d(2025, 12, 31),
        vec![BrandBonus::new(BrandBonusId::new(), "Acme", world.brand, 1.0).unwrap()],
    )
    .unwrap();
    world.registry.save_contract(contract.clone()).unwrap();

    let accrual = AccrualProcessor::new(world.registry.clone(), world.invoices.clone(), world.ledger.clone());
    let stats = accrual
        .accrue_historical(&late, &contract, &NoopObserver, now())
        .unwrap();
    assert_eq!(stats.invoices_found, 1);
    assert_eq!(stats.transactions_created, 1);
    assert_eq!(world.ledger.incoming(late.id).unwrap(), 800);

    let again = accrual
        .accrue_historical(&late, &contract, &NoopObserver, now())
        .unwrap();
    assert_eq!(again.transactions_skipped, 1);

    let bare = Contract::new(ContractId::new(), late.id, d(2025, 1, 1), d(2025, 12, 31), vec![]).unwrap();
    let none = accrual.accrue_historical(&late, &bare, &NoopObserver, now()).unwrap();
    assert_eq!(none.errors, vec!["No brand bonuses configured for this contract".to_string()]);
}

#[test]
fn monthly_approval_confirms_accrued_points() {
    let world = World::new();
    world
        .ingest(
            HEADER_INVOICE,
            &[
                "1001;1000,00;AC-1;03.02.2025;FV-1",
                "1001;200,00;AC-1;03.03.2025;FV-2",
            ],
        )
        .unwrap();

    let observer = Arc::new(RecordingObserver::new());
    let summary = ApprovalService::new(world.ledger.clone())
        .with_observer(observer.clone())
        .approve_month(2025, 2)
        .unwrap();

    assert_eq!(summary.transaction_count, 1);
    assert_eq!(summary.total_points, 500);
    assert_eq!(world.ledger.balance(world.client.id).unwrap(), 500);
    assert_eq!(world.ledger.incoming(world.client.id).unwrap(), 100);
    assert_eq!(observer.snapshot().confirmations, vec![(world.client.id, 500, 500)]);
}

#[test]
fn balance_always_equals_sum_of_confirmed_entries() {
    let world = World::new();
    world
        .ingest(
            HEADER_INVOICE,
            &[
                "1001;4000,00;AC-1;15.03.2025;FV-1",
                "1001;7000,00;AC-1;10.09.2025;FV-2",
            ],
        )
        .unwrap();
    world
        .ingest(HEADER_CREDIT, &["1001;500,00;AC-1;20.09.2025;DB-1"])
        .unwrap();
    ApprovalService::new(world.ledger.clone())
        .approve_month(2025, 3)
        .unwrap();
    world
        .evaluator()
        .evaluate_selected(
            &[
                world.key(d(2025, 1, 1), d(2025, 6, 30)),
                world.key(d(2025, 7, 1), d(2025, 12, 31)),
            ],
            UserId::new(),
            d(2026, 1, 15),
            now(),
        );

    let confirmed: i64 = world
        .ledger
        .all()
        .unwrap()
        .iter()
        .filter(|t| t.status == TransactionStatus::Confirmed)
        .map(|t| t.value)
        .sum();
    assert_eq!(world.ledger.balance(world.client.id).unwrap(), confirmed);
}

#[test]
fn recovery_subtracts_every_earlier_milestone() {
    let world = World::new();
    let goal = world.add_quarterly_goal(12_000);
    assert_eq!(goal.periods().len(), 3);
    world
        .ingest(
            HEADER_INVOICE,
            &[
                "1001;5000,00;AC-1;15.02.2025;FV-1",
                "1001;4500,00;AC-1;10.06.2025;FV-2",
                "1001;3000,00;AC-1;10.10.2025;FV-3",
            ],
        )
        .unwrap();
    let service = world.evaluator();
    let today = d(2026, 1, 15);
    let first = goal_key(&goal, d(2025, 1, 1), d(2025, 4, 30));
    let second = goal_key(&goal, d(2025, 5, 1), d(2025, 8, 31));
    let last = goal_key(&goal, d(2025, 9, 1), d(2025, 12, 31));

    // Middle period first: 12 000 * 123/365 * 0.5.
    let mid = service.evaluate(second, UserId::new(), today, now()).unwrap();
    assert_eq!(mid.evaluation_type, EvaluationType::Milestone);
    assert_eq!(mid.bonus_points, 2021);

    let pending: Vec<_> = service
        .pending_evaluations(Some(world.client.id), EvaluationFilter::Pending, today)
        .unwrap()
        .into_iter()
        .filter(|p| p.key.goal_id == goal.id)
        .collect();
    assert_eq!(pending.iter().map(|p| p.key).collect::<Vec<_>>(), vec![first, last]);
    assert_eq!(pending[0].proposed.bonus_points, 1972);
    assert_eq!(pending[0].already_awarded, 2021);
    // Only the middle milestone precedes the final period so far: 6250 - 2021.
    assert_eq!(pending[1].proposed.evaluation_type, EvaluationType::Recovery);
    assert_eq!(pending[1].proposed.bonus_points, 4229);

    let early = service.evaluate(first, UserId::new(), today, now()).unwrap();
    assert_eq!(early.bonus_points, 1972);

    // Full year 12 500 pays 6250, less both milestones.
    let closing = service.evaluate(last, UserId::new(), today, now()).unwrap();
    assert_eq!(closing.evaluation_type, EvaluationType::Recovery);
    assert!(closing.is_achieved);
    assert_eq!(closing.bonus_points, 2257);
    assert_eq!(closing.actual_turnover, Money::from_major(3000));

    let paid: i64 = world.extra_points().iter().map(|t| t.value).sum();
    assert_eq!(paid, 6250);
    let history = world.evaluations.for_goal(goal.id).unwrap();
    assert_eq!(history.iter().map(|e| e.bonus_points).sum::<i64>(), 6250);
    assert!(history.iter().all(|e| e.points_transaction.is_some()));
}

#[test]
fn concurrent_evaluations_of_one_period_pay_once() {
    for _ in 0..50 {
        let world = World::new();
        world
            .ingest(HEADER_INVOICE, &["1001;6000,00;AC-1;15.03.2025;FV-1"])
            .unwrap();
        let services = [world.evaluator(), world.evaluator()];
        let key = world.key(d(2025, 1, 1), d(2025, 6, 30));
        let barrier = Barrier::new(services.len());

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = services
                .iter()
                .map(|service| {
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        service.evaluate(key, UserId::new(), d(2025, 7, 1), now())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(EvaluationError::AlreadyEvaluated { .. })))
        );

        let extra = world.extra_points();
        assert_eq!(extra.len(), 1);
        assert_eq!(extra[0].value, 2479);
        let stored = world.evaluations.all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].points_transaction, Some(extra[0].id));
    }
}

/// Ledger whose appends always fail.
struct OfflineLedger(Arc<InMemoryPointsLedger>);

impl PointsLedger for OfflineLedger {
    fn append(&self, _tx: NewTransaction, _now: DateTime<Utc>) -> Result<PointsTransaction, StoreError> {
        Err(StoreError::Poisoned)
    }

    fn insert_unique(
        &self,
        tx: NewTransaction,
        now: DateTime<Utc>,
    ) -> Result<Option<PointsTransaction>, StoreError> {
        self.0.insert_unique(tx, now)
    }

    fn get(&self, id: TransactionId) -> Result<Option<PointsTransaction>, StoreError> {
        self.0.get(id)
    }

    fn transactions_for_client(&self, client_id: ClientId) -> Result<Vec<PointsTransaction>, StoreError> {
        self.0.transactions_for_client(client_id)
    }

    fn set_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<PointsTransaction, StoreError> {
        self.0.set_status(id, status)
    }

    fn transition_all(
        &self,
        range: DateRange,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Result<Vec<PointsTransaction>, StoreError> {
        self.0.transition_all(range, from, to)
    }
}

/// Evaluation history that cannot link ledger entries.
struct UnlinkableEvaluations(Arc<InMemoryEvaluationStore>);

impl EvaluationStore for UnlinkableEvaluations {
    fn insert(&self, evaluation: GoalEvaluation, expected_history: usize) -> Result<(), StoreError> {
        self.0.insert(evaluation, expected_history)
    }

    fn attach_transaction(
        &self,
        _id: EvaluationId,
        _transaction: TransactionId,
    ) -> Result<GoalEvaluation, StoreError> {
        Err(StoreError::Poisoned)
    }

    fn remove(&self, id: EvaluationId) -> Result<(), StoreError> {
        self.0.remove(id)
    }

    fn for_goal(&self, goal_id: GoalId) -> Result<Vec<GoalEvaluation>, StoreError> {
        self.0.for_goal(goal_id)
    }
}

#[test]
fn failed_payment_withdraws_the_evaluation() {
    let world = World::new();
    world
        .ingest(HEADER_INVOICE, &["1001;6000,00;AC-1;15.03.2025;FV-1"])
        .unwrap();
    let key = world.key(d(2025, 1, 1), d(2025, 6, 30));
    let today = d(2025, 7, 1);

    let offline = GoalEvaluationService::new(
        world.registry.clone(),
        world.invoices.clone(),
        OfflineLedger(world.ledger.clone()),
        world.evaluations.clone(),
        CapPolicy::default(),
    );
    let err = offline.evaluate(key, UserId::new(), today, now()).unwrap_err();
    assert!(matches!(err, EvaluationError::Store(StoreError::Poisoned)));
    assert!(world.evaluations.all().unwrap().is_empty());
    assert!(world.extra_points().is_empty());

    let pending = world
        .evaluator()
        .pending_evaluations(None, EvaluationFilter::Pending, today)
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key, key);

    let retried = world.evaluator().evaluate(key, UserId::new(), today, now()).unwrap();
    assert_eq!(retried.bonus_points, 2479);
    assert_eq!(world.ledger.balance(world.client.id).unwrap(), 2479);
}

#[test]
fn unlinked_payment_is_cancelled() {
    let world = World::new();
    world
        .ingest(HEADER_INVOICE, &["1001;6000,00;AC-1;15.03.2025;FV-1"])
        .unwrap();
    let key = world.key(d(2025, 1, 1), d(2025, 6, 30));
    let today = d(2025, 7, 1);

    let service = GoalEvaluationService::new(
        world.registry.clone(),
        world.invoices.clone(),
        world.ledger.clone(),
        UnlinkableEvaluations(world.evaluations.clone()),
        CapPolicy::default(),
    );
    let err = service.evaluate(key, UserId::new(), today, now()).unwrap_err();
    assert!(matches!(err, EvaluationError::Store(StoreError::Poisoned)));

    assert!(world.evaluations.all().unwrap().is_empty());
    let extra = world.extra_points();
    assert_eq!(extra.len(), 1);
    assert_eq!(extra[0].status, TransactionStatus::Cancelled);
    assert_eq!(world.ledger.balance(world.client.id).unwrap(), 0);

    world.evaluator().evaluate(key, UserId::new(), today, now()).unwrap();
    assert_eq!(world.ledger.balance(world.client.id).unwrap(), 2479);
}

/// Invoice store that cannot read turnover of one customer number.
struct PartlyBrokenInvoices {
    inner: Arc<InMemoryInvoiceStore>,
    broken: String,
}

impl InvoiceStore for PartlyBrokenInvoices {
    fn upsert_invoice(
        &self,
        write: InvoiceWrite,
        turnovers: &[(BrandId, Money)],
        now: DateTime<Utc>,
    ) -> Result<Invoice, StoreError> {
        self.inner.upsert_invoice(write, turnovers, now)
    }

    fn invoice(&self, id: InvoiceId) -> Result<Option<Invoice>, StoreError> {
        self.inner.invoice(id)
    }

    fn invoice_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>, StoreError> {
        self.inner.invoice_by_number(invoice_number)
    }

    fn invoices_for_upload(&self, upload_id: UploadId) -> Result<Vec<Invoice>, StoreError> {
        self.inner.invoices_for_upload(upload_id)
    }

    fn invoices_for_client(
        &self,
        client_number: &str,
        range: DateRange,
    ) -> Result<Vec<Invoice>, StoreError> {
        self.inner.invoices_for_client(client_number, range)
    }

    fn brand_turnovers(&self, invoice_id: InvoiceId) -> Result<Vec<InvoiceBrandTurnover>, StoreError> {
        self.inner.brand_turnovers(invoice_id)
    }

    fn turnover_rows(
        &self,
        client_number: &str,
        range: DateRange,
    ) -> Result<Vec<TurnoverRow>, StoreError> {
        if client_number == self.broken {
            return Err(StoreError::Poisoned);
        }
        self.inner.turnover_rows(client_number, range)
    }
}

#[test]
fn failing_goal_does_not_hide_other_pending_periods() {
    let world = World::new();
    let other = Client::new(ClientId::new(), "2002", "Železářství Dvořák").unwrap();
    world.registry.save_client(other.clone()).unwrap();
    let contract = Contract::new(
        ContractId::new(),
        other.id,
        d(2025, 1, 1),
        d(2025, 12, 31),
        vec![BrandBonus::new(BrandBonusId::new(), "Acme", world.brand, 0.5).unwrap()],
    )
    .unwrap();
    world.registry.save_contract(contract.clone()).unwrap();
    let other_goal = ExtraGoal::new(
        GoalId::new(),
        contract.id,
        d(2025, 1, 1),
        d(2025, 12, 31),
        vec![world.brand],
        10_000,
        0,
        6,
        0.5,
        false,
    )
    .unwrap();
    world.registry.save_goal(other_goal.clone()).unwrap();
    world
        .ingest(
            HEADER_INVOICE,
            &[
                "1001;6000,00;AC-1;15.03.2025;FV-1",
                "2002;6000,00;AC-1;15.03.2025;FV-2",
            ],
        )
        .unwrap();

    let service = GoalEvaluationService::new(
        world.registry.clone(),
        PartlyBrokenInvoices {
            inner: world.invoices.clone(),
            broken: "1001".into(),
        },
        world.ledger.clone(),
        world.evaluations.clone(),
        CapPolicy::default(),
    );
    let pending = service
        .pending_evaluations(None, EvaluationFilter::Pending, d(2026, 1, 15))
        .unwrap();

    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|p| p.key.goal_id == other_goal.id));
    assert!(pending.iter().all(|p| p.client_number == "2002"));
    assert_eq!(pending[0].proposed.bonus_points, 2479);
}
