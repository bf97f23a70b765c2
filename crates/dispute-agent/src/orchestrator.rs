//! Orchestrator: drives every candidate row through the pipeline.
//!
//! Rows are processed one at a time. Within a row the warehouse and profile
//! reads run concurrently and are joined before classification. A failing
//! row is recorded and counted; it never stops the run.

use std::path::PathBuf;

use resolution::{
    BookingProfile, DisputeRow, DisputeRules, EligibilityGate, ErrorClassification,
    ErrorClassifier, Evidence, LogRecord, RebookingContext, ResolutionBuilder, SourceSignal,
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, info_span, warn, Instrument};

use crate::audit::{AuditAction, AuditSink};
use crate::error::{RowError, SourceError};
use crate::evidence::EvidenceWriter;
use crate::sources::{LogWarehouse, ProfileService, QueueStore};
use crate::state_machine::{RowStage, RowStateMachine};
use crate::telemetry::{RunCollector, RunStats};

/// Terminal result of one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
    Updated {
        classification: Option<ErrorClassification>,
        has_logs: bool,
    },
    Skipped {
        reason: String,
    },
    Errored {
        error: String,
    },
}

/// Result of single client reference mode.
#[derive(Debug, Clone, Serialize)]
pub struct SingleRunReport {
    pub success: bool,
    pub client_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RowOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<RunStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The four collaborators, borrowed for the lifetime of a run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub queue: &'a dyn QueueStore,
    pub warehouse: &'a dyn LogWarehouse,
    pub profiles: &'a dyn ProfileService,
    pub audit: &'a dyn AuditSink,
}

/// What the gathering stage hands to classification.
struct Gathered {
    evidence: Evidence,
    history: Option<Vec<LogRecord>>,
    related: Vec<BookingProfile>,
}

pub struct Orchestrator<'a> {
    queue: &'a dyn QueueStore,
    warehouse: &'a dyn LogWarehouse,
    profiles: &'a dyn ProfileService,
    audit: &'a dyn AuditSink,
    gate: EligibilityGate,
    builder: ResolutionBuilder,
    evidence: EvidenceWriter,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        collaborators: Collaborators<'a>,
        rules: &DisputeRules,
        evidence: EvidenceWriter,
    ) -> Self {
        Self {
            queue: collaborators.queue,
            warehouse: collaborators.warehouse,
            profiles: collaborators.profiles,
            audit: collaborators.audit,
            gate: EligibilityGate::from_rules(rules),
            builder: ResolutionBuilder::from_rules(rules),
            evidence,
        }
    }

    /// Process every candidate row once. Only failing to list the rows
    /// aborts the run.
    pub async fn run(&self, collector: &mut RunCollector) -> Result<(), SourceError> {
        let rows = self.queue.list_eligible_candidate_rows().await?;
        info!(rows = rows.len(), "Starting dispute run");

        for row in &rows {
            let outcome = self.process_row(row).await;
            collector.record(&outcome);
        }
        Ok(())
    }

    /// Process the candidate row matching `client_reference`, if any.
    pub async fn process_client_reference(
        &self,
        client_reference: &str,
        collector: &mut RunCollector,
    ) -> Result<SingleRunReport, SourceError> {
        let client_reference = client_reference.trim();
        let rows = self.queue.list_eligible_candidate_rows().await?;

        let Some(row) = rows.iter().find(|r| r.client_reference == client_reference) else {
            warn!(client_reference, "No candidate row for client reference");
            return Ok(SingleRunReport {
                success: false,
                client_reference: client_reference.to_string(),
                row_id: None,
                outcome: None,
                statistics: None,
                error: Some(format!(
                    "No dispute row found for client reference {client_reference}"
                )),
            });
        };

        let outcome = self.process_row(row).await;
        collector.record(&outcome);
        Ok(SingleRunReport {
            success: !matches!(outcome, RowOutcome::Errored { .. }),
            client_reference: client_reference.to_string(),
            row_id: Some(row.row_id),
            outcome: Some(outcome),
            statistics: Some(collector.stats()),
            error: None,
        })
    }

    /// Run one row to a terminal stage. Never fails; errors become
    /// [`RowOutcome::Errored`] and an audit record.
    pub async fn process_row(&self, row: &DisputeRow) -> RowOutcome {
        let mut machine = RowStateMachine::new();
        let span = info_span!(
            "row",
            row_id = row.row_id,
            client_reference = %row.client_reference
        );

        match self.drive_row(row, &mut machine).instrument(span).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let stage = machine.current();
                let message = e.to_string();
                if let Err(illegal) = machine.fail(&message) {
                    warn!(row_id = row.row_id, "{illegal}");
                }
                error!(
                    row_id = row.row_id,
                    row_number = row.row_number,
                    client_reference = %row.client_reference,
                    stage = %stage,
                    "Row processing failed: {message}"
                );
                self.audit.record(
                    AuditAction::RowProcessingError,
                    &row.client_reference,
                    json!({
                        "row_id": row.row_id,
                        "row_number": row.row_number,
                        "stage": stage,
                        "error": message,
                        "transitions": machine.transitions(),
                    }),
                );
                RowOutcome::Errored { error: message }
            }
        }
    }

    async fn drive_row(
        &self,
        row: &DisputeRow,
        machine: &mut RowStateMachine,
    ) -> Result<RowOutcome, RowError> {
        let eligibility = self.gate.check(row);
        if !eligibility.is_eligible() {
            let reason = eligibility.reason();
            machine.advance(RowStage::Skipped, Some(reason))?;
            info!(reason, "Row skipped");
            self.audit.record(
                AuditAction::RowSkipped,
                &row.client_reference,
                json!({
                    "row_id": row.row_id,
                    "row_number": row.row_number,
                    "reason": reason,
                }),
            );
            return Ok(RowOutcome::Skipped {
                reason: reason.to_string(),
            });
        }

        let client_reference = row.client_reference.trim();
        if client_reference.is_empty() {
            return Err(RowError::MissingClientReference);
        }

        machine.advance(RowStage::Gathering, Some(eligibility.reason()))?;
        let gathered = self.gather(client_reference).await;

        machine.advance(RowStage::Classifying, None)?;
        let verdict = ErrorClassifier::classify(&gathered.evidence)?;
        let code = verdict.classification.as_ref().map(ErrorClassification::code);

        machine.advance(RowStage::Resolving, code.as_deref())?;
        let attachment = self.write_evidence(client_reference, gathered.evidence.log_records());
        let has_logs = attachment.is_some();
        let rebooking = gathered
            .history
            .as_deref()
            .map(RebookingContext::from_events);
        let mut update = self.builder.build(
            client_reference,
            verdict.classification.as_ref(),
            has_logs,
            rebooking.as_ref(),
        );
        if let Some(path) = &attachment {
            update = update.with_attachment(path);
        }

        machine.advance(RowStage::WritingBack, None)?;
        let receipt = self
            .queue
            .update_row(row.row_id, &update)
            .await
            .map_err(RowError::WriteBack)?;
        if !receipt.applied {
            return Err(RowError::WriteRejected { row_id: row.row_id });
        }
        if let Some(attachment_error) = &receipt.attachment_error {
            self.audit.record(
                AuditAction::AttachmentFailed,
                client_reference,
                json!({
                    "row_id": row.row_id,
                    "path": attachment,
                    "error": attachment_error,
                }),
            );
        }

        machine.advance(RowStage::Updated, None)?;
        info!(
            classification = code.as_deref().unwrap_or("none"),
            has_logs,
            rebooking = rebooking.as_ref().is_some_and(|ctx| ctx.is_rebooking),
            "Row updated"
        );

        let related: Vec<&str> = gathered
            .related
            .iter()
            .map(|b| b.client_reference_id.as_str())
            .collect();
        self.audit.record(
            AuditAction::RowUpdated,
            client_reference,
            json!({
                "row_id": row.row_id,
                "row_number": row.row_number,
                "error_type": code,
                "basis": verdict.basis,
                "has_logs": has_logs,
                "updates_applied": update.fields.keys().collect::<Vec<_>>(),
                "attachment": attachment,
                "rebooking": rebooking,
                "related_bookings": related,
                "transitions": machine.transitions(),
            }),
        );

        Ok(RowOutcome::Updated {
            classification: verdict.classification,
            has_logs,
        })
    }

    /// Read barrier: both warehouse reads and the profile lookup complete
    /// (or fail) before this returns.
    async fn gather(&self, client_reference: &str) -> Gathered {
        let (events, history, profile) = tokio::join!(
            self.warehouse.fetch_events(client_reference),
            self.warehouse.fetch_history(client_reference),
            self.fetch_profile(client_reference),
        );

        let logs = match events {
            Ok(records) => SourceSignal::Available(records),
            Err(e) => SourceSignal::Unavailable(self.source_unavailable(client_reference, &e)),
        };

        let history = match history {
            Ok(history) => Some(history),
            Err(e) => {
                warn!(client_reference, "Booking history unavailable, no rebooking check: {e}");
                None
            }
        };

        let (profile, related) = match profile {
            Ok((profile, related)) => (SourceSignal::Available(profile), related),
            Err(e) => (
                SourceSignal::Unavailable(self.source_unavailable(client_reference, &e)),
                Vec::new(),
            ),
        };

        Gathered {
            evidence: Evidence::new(logs, profile),
            history,
            related,
        }
    }

    async fn fetch_profile(
        &self,
        client_reference: &str,
    ) -> Result<(Option<BookingProfile>, Vec<BookingProfile>), SourceError> {
        let Some(profile) = self.profiles.fetch_booking(client_reference).await? else {
            return Ok((None, Vec::new()));
        };
        let related = match self.profiles.fetch_related_bookings(&profile).await {
            Ok(related) => related,
            Err(e) => {
                warn!(client_reference, "Related booking search failed: {e}");
                Vec::new()
            }
        };
        Ok((Some(profile), related))
    }

    fn source_unavailable(&self, client_reference: &str, err: &SourceError) -> String {
        let message = err.to_string();
        warn!(client_reference, source = %err.service(), "Source unavailable: {message}");
        self.audit.record(
            AuditAction::SourceUnavailable,
            client_reference,
            json!({
                "source": err.service().to_string(),
                "error": message,
            }),
        );
        message
    }

    /// CSV of the log records; `None` when there are none or the write failed.
    fn write_evidence(&self, client_reference: &str, records: &[LogRecord]) -> Option<PathBuf> {
        if records.is_empty() {
            return None;
        }
        match self.evidence.write_logs(client_reference, records) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(client_reference, "Failed to write log evidence: {e}");
                None
            }
        }
    }
}
