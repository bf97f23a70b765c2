//! End-to-end runs of the orchestrator against in-memory collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use dispute_agent::{
    AuditAction, AuditTrail, Collaborators, EvidenceWriter, LogWarehouse, Orchestrator,
    ProfileService, QueueStore, RowOutcome, RunCollector, Service, SourceError, WriteReceipt,
};
use resolution::builder::NO_LOGS_NOTES;
use resolution::{
    BookingProfile, CallType, DisputeRow, DisputeRules, ErrorClassification, FailureStatus,
    LogRecord, ResolutionUpdate, WorkflowField, WorkflowTriple,
};

fn down(service: Service) -> SourceError {
    SourceError::Status {
        service,
        status: 503,
        body: "maintenance".into(),
    }
}

/// Queue that applies accepted updates to its own rows.
#[derive(Default)]
struct FakeQueue {
    rows: Mutex<Vec<DisputeRow>>,
    updates: Mutex<Vec<(u64, ResolutionUpdate)>>,
    failing_rows: HashSet<u64>,
}

impl FakeQueue {
    fn with_rows(rows: Vec<DisputeRow>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    fn updates(&self) -> Vec<(u64, ResolutionUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    fn update_for(&self, row_id: u64) -> Option<ResolutionUpdate> {
        self.updates()
            .into_iter()
            .find(|(id, _)| *id == row_id)
            .map(|(_, update)| update)
    }
}

#[async_trait]
impl QueueStore for FakeQueue {
    async fn list_eligible_candidate_rows(&self) -> Result<Vec<DisputeRow>, SourceError> {
        Ok(self.rows.lock().unwrap().clone())
    }

    async fn update_row(
        &self,
        row_id: u64,
        update: &ResolutionUpdate,
    ) -> Result<WriteReceipt, SourceError> {
        if self.failing_rows.contains(&row_id) {
            return Err(down(Service::QueueStore));
        }
        self.updates.lock().unwrap().push((row_id, update.clone()));

        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|r| r.row_id == row_id) {
            for (field, value) in &update.fields {
                match field {
                    WorkflowField::Notes => row.notes = value.clone(),
                    WorkflowField::SupplierComments => {
                        row.workflow.supplier_comments = value.clone()
                    }
                    WorkflowField::Status => row.workflow.status = value.clone(),
                    WorkflowField::Completion => row.workflow.completion = value.clone(),
                }
            }
        }
        Ok(WriteReceipt::applied())
    }

    async fn ping(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeWarehouse {
    events: HashMap<String, Vec<LogRecord>>,
    history: HashMap<String, Vec<LogRecord>>,
    down: bool,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl LogWarehouse for FakeWarehouse {
    async fn fetch_events(&self, client_reference: &str) -> Result<Vec<LogRecord>, SourceError> {
        self.calls.lock().unwrap().push(client_reference.to_string());
        if self.down {
            return Err(down(Service::LogWarehouse));
        }
        Ok(self.events.get(client_reference).cloned().unwrap_or_default())
    }

    async fn fetch_history(&self, client_reference: &str) -> Result<Vec<LogRecord>, SourceError> {
        if self.down {
            return Err(down(Service::LogWarehouse));
        }
        Ok(self.history.get(client_reference).cloned().unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

#[derive(Default)]
struct FakeProfiles {
    bookings: HashMap<String, BookingProfile>,
    related: HashMap<String, Vec<BookingProfile>>,
    down: bool,
}

#[async_trait]
impl ProfileService for FakeProfiles {
    async fn fetch_booking(
        &self,
        client_reference: &str,
    ) -> Result<Option<BookingProfile>, SourceError> {
        if self.down {
            return Err(down(Service::ProfileService));
        }
        Ok(self.bookings.get(client_reference).cloned())
    }

    async fn fetch_related_bookings(
        &self,
        profile: &BookingProfile,
    ) -> Result<Vec<BookingProfile>, SourceError> {
        Ok(self
            .related
            .get(&profile.client_reference_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

fn dispute_row(row_id: u64, client_reference: &str, workflow: WorkflowTriple) -> DisputeRow {
    DisputeRow {
        row_id,
        row_number: row_id as u32,
        client_reference: client_reference.into(),
        notes: "The booking was marked by supplier as provider error.".into(),
        workflow,
    }
}

fn initial() -> WorkflowTriple {
    WorkflowTriple::new("in escalation process", "escalation", "need help")
}

fn processed() -> WorkflowTriple {
    WorkflowTriple::new("reviewed by ST technical team", "will not pay", "ready to submit")
}

fn log(client_reference: &str, reason: &str) -> LogRecord {
    LogRecord {
        client_reference: client_reference.into(),
        call: Some(CallType::Book),
        reason: Some(reason.into()),
        ..Default::default()
    }
}

struct World {
    queue: FakeQueue,
    warehouse: FakeWarehouse,
    profiles: FakeProfiles,
    audit: AuditTrail,
    dir: tempfile::TempDir,
}

impl World {
    fn new(rows: Vec<DisputeRow>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self {
            queue: FakeQueue::with_rows(rows),
            warehouse: FakeWarehouse::default(),
            profiles: FakeProfiles::default(),
            audit: AuditTrail::with_file(dir.path().join("audit.jsonl")),
            dir,
        }
    }

    fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(
            Collaborators {
                queue: &self.queue,
                warehouse: &self.warehouse,
                profiles: &self.profiles,
                audit: &self.audit,
            },
            &DisputeRules::default(),
            EvidenceWriter::new(self.dir.path().join("logs")),
        )
    }

    async fn run(&self) -> dispute_agent::RunStats {
        let mut collector = RunCollector::new();
        self.orchestrator().run(&mut collector).await.unwrap();
        collector.stats()
    }
}

#[tokio::test]
async fn mixed_queue_counts_every_row_once() {
    let mut world = World::new(vec![
        dispute_row(1, "CR100", initial()),
        dispute_row(2, "CR101", initial()),
        dispute_row(3, "CR102", processed()),
        dispute_row(4, "CR103", WorkflowTriple::new("", "paid", "")),
    ]);
    world
        .warehouse
        .events
        .insert("CR100".into(), vec![log("CR100", "provider error")]);
    world
        .profiles
        .bookings
        .insert("CR100".into(), BookingProfile::new("CR100", "confirmed"));
    let mut invalid = BookingProfile::new("CR101", "confirmed");
    invalid.is_valid = false;
    world.profiles.bookings.insert("CR101".into(), invalid);

    let stats = world.run().await;

    assert_eq!(stats.total, 4);
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.updated, 2);
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.errors, 0);
    assert!(stats.is_consistent());

    let provider = world.queue.update_for(1).unwrap();
    assert!(provider.notes().unwrap().contains("PROVIDER_ERROR ERROR"));
    assert_eq!(provider.field(WorkflowField::Status), Some("will not pay"));
    let attachment = provider.attachment.expect("log evidence attached");
    assert!(attachment.exists());
    assert!(attachment
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("booking_logs_CR100_"));

    let invalid = world.queue.update_for(2).unwrap();
    assert_eq!(invalid.notes(), Some(NO_LOGS_NOTES));
    assert!(invalid.attachment.is_none());

    assert!(world.queue.update_for(3).is_none());
    assert!(world.queue.update_for(4).is_none());
    // Skipped rows never reach the warehouse.
    assert_eq!(*world.warehouse.calls.lock().unwrap(), vec!["CR100", "CR101"]);
}

#[tokio::test]
async fn failing_write_does_not_abort_the_run() {
    let mut world = World::new(vec![
        dispute_row(1, "CR1", initial()),
        dispute_row(2, "CR2", initial()),
        dispute_row(3, "CR3", initial()),
    ]);
    world.queue.failing_rows.insert(2);

    let stats = world.run().await;

    assert_eq!(stats.total, 3);
    assert_eq!(stats.updated, 2);
    assert_eq!(stats.errors, 1);
    assert!(stats.is_consistent());
    assert_eq!(world.queue.updates().len(), 2);

    let summary = world.audit.summary();
    assert_eq!(summary.actions_by_type[&AuditAction::RowProcessingError], 1);
    assert_eq!(summary.actions_by_type[&AuditAction::RowUpdated], 2);
}

#[tokio::test]
async fn rerun_skips_everything_already_processed() {
    let mut world = World::new(vec![
        dispute_row(1, "CR1", initial()),
        dispute_row(2, "CR2", initial()),
    ]);
    world
        .warehouse
        .events
        .insert("CR1".into(), vec![log("CR1", "CONNECTION_ERROR")]);

    let first = world.run().await;
    assert_eq!(first.updated, 2);

    let second = world.run().await;
    assert_eq!(second.total, 2);
    assert_eq!(second.skipped, 2);
    assert_eq!(second.updated, 0);
    assert_eq!(world.queue.updates().len(), 2);

    let skipped: Vec<_> = world
        .audit
        .entries()
        .into_iter()
        .filter(|e| e.action == AuditAction::RowSkipped)
        .map(|e| e.details["reason"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(skipped, vec!["Already processed", "Already processed"]);
}

#[tokio::test]
async fn warehouse_outage_falls_back_to_profile_status() {
    let mut world = World::new(vec![dispute_row(1, "CR9", initial())]);
    world.warehouse.down = true;
    world
        .profiles
        .bookings
        .insert("CR9".into(), BookingProfile::new("CR9", "failed"));

    let outcome = world
        .orchestrator()
        .process_row(&dispute_row(1, "CR9", initial()))
        .await;

    assert_eq!(
        outcome,
        RowOutcome::Updated {
            classification: Some(ErrorClassification::Status(FailureStatus::Failed)),
            has_logs: false,
        }
    );
    let update = world.queue.update_for(1).unwrap();
    assert_eq!(update.notes(), Some(NO_LOGS_NOTES));
    assert_eq!(
        world.audit.summary().actions_by_type[&AuditAction::SourceUnavailable],
        1
    );
}

#[tokio::test]
async fn both_sources_down_counts_as_error() {
    let mut world = World::new(vec![dispute_row(1, "CR9", initial())]);
    world.warehouse.down = true;
    world.profiles.down = true;

    let stats = world.run().await;

    assert_eq!(stats.errors, 1);
    assert_eq!(stats.updated, 0);
    assert!(world.queue.updates().is_empty());
}

#[tokio::test]
async fn cancel_and_rebook_history_sets_rebooking_notes() {
    let mut world = World::new(vec![dispute_row(1, "CR300", initial())]);
    let at = |minute| Some(Utc.with_ymd_and_hms(2024, 6, 1, 8, minute, 0).unwrap());
    world.warehouse.history.insert(
        "CR300".into(),
        vec![
            LogRecord {
                created_at: at(0),
                client_reference: "CR300".into(),
                supplier_order_id: Some("EX-1".into()),
                call: Some(CallType::Book),
                ..Default::default()
            },
            LogRecord {
                created_at: at(10),
                client_reference: "CR300".into(),
                supplier_order_id: Some("EX-1".into()),
                call: Some(CallType::Cancel),
                ..Default::default()
            },
            LogRecord {
                created_at: at(11),
                client_reference: "CR300".into(),
                supplier_order_id: Some("EX-2".into()),
                call: Some(CallType::Book),
                ..Default::default()
            },
        ],
    );
    world
        .warehouse
        .events
        .insert("CR300".into(), vec![log("CR300", "TIMEOUT_ERROR")]);

    world.run().await;

    let notes = world.queue.update_for(1).unwrap().notes().unwrap().to_string();
    assert!(notes.ends_with("We then immediately booked CR300 after canceling EX-1."));
}

#[tokio::test]
async fn related_bookings_are_audited() {
    let mut world = World::new(vec![dispute_row(1, "CR5", initial())]);
    world
        .profiles
        .bookings
        .insert("CR5".into(), BookingProfile::new("CR5", "confirmed"));
    world.profiles.related.insert(
        "CR5".into(),
        vec![BookingProfile::new("CR6", "confirmed")],
    );

    world.run().await;

    let updated = world
        .audit
        .entries()
        .into_iter()
        .find(|e| e.action == AuditAction::RowUpdated)
        .unwrap();
    assert_eq!(updated.details["related_bookings"][0], "CR6");
    assert_eq!(updated.details["basis"]["rule"], "no_signal");
    assert!(updated.details["transitions"].as_array().unwrap().len() == 5);
}

#[tokio::test]
async fn single_reference_mode_processes_one_row() {
    let world = World::new(vec![
        dispute_row(1, "CR1", initial()),
        dispute_row(2, "CR2", initial()),
    ]);

    let mut collector = RunCollector::new();
    let report = world
        .orchestrator()
        .process_client_reference(" CR2 ", &mut collector)
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.row_id, Some(2));
    assert_eq!(report.statistics.unwrap().total, 1);
    assert_eq!(world.queue.updates().len(), 1);
    assert_eq!(world.queue.updates()[0].0, 2);
}

#[tokio::test]
async fn audit_file_gets_one_line_per_outcome() {
    let world = World::new(vec![
        dispute_row(1, "CR1", initial()),
        dispute_row(2, "CR2", processed()),
    ]);

    world.run().await;

    let content = std::fs::read_to_string(world.dir.path().join("audit.jsonl")).unwrap();
    let actions: Vec<String> = content
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["action"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(actions, vec!["ROW_UPDATED", "ROW_SKIPPED"]);
}
