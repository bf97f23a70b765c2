//! Resolution Builder: turns a classification into the row write-back.
//!
//! The business decision is always "will not pay"; only the justification
//! in the notes field varies.
//!
//! | has_logs | classification | notes                                  |
//! |----------|----------------|----------------------------------------|
//! | true     | some           | "... met with an <CLASSIFICATION> ERROR." |
//! | true     | none           | "... shows a provider error."          |
//! | false    | -              | "... No logs available ..."            |
//!
//! A rebooking context with at least one cancellation overrides the notes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classifier::ErrorClassification;
use crate::model::{WorkflowField, WorkflowTriple};
use crate::rebooking::RebookingContext;
use crate::rules::DisputeRules;

const NOT_CONFIRMED_PREFIX: &str =
    "The booking was not confirmed by the supplier, please find the logs attached.";
pub const NO_LOGS_NOTES: &str = "Technical review completed. No logs available for this booking.";
const MISSING_ORDER_ID: &str = "N/A";

/// Notes text for a classified failure with logs attached.
pub fn classified_notes(classification: &ErrorClassification) -> String {
    format!(
        "{NOT_CONFIRMED_PREFIX} Our request log was met with an {} ERROR.",
        classification.code().to_uppercase()
    )
}

/// Notes text when logs exist but nothing specific was detected.
pub fn provider_error_notes() -> String {
    format!("{NOT_CONFIRMED_PREFIX} Our request log shows a provider error.")
}

/// Notes text for a cancel-then-rebook chain.
pub fn rebooking_notes(new_booking: &str, old_booking: &str) -> String {
    format!(
        "We have attempted to cancel this booking before the last day for a full refund - \
         please find the attachments. We then immediately booked {new_booking} \
         after canceling {old_booking}."
    )
}

/// Field values to write back to one row, plus the optional evidence file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionUpdate {
    pub fields: BTreeMap<WorkflowField, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<PathBuf>,
}

impl ResolutionUpdate {
    pub fn with_attachment(mut self, path: impl AsRef<Path>) -> Self {
        self.attachment = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn field(&self, field: WorkflowField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn notes(&self) -> Option<&str> {
        self.field(WorkflowField::Notes)
    }
}

/// Pure builder; identical inputs always give identical updates.
#[derive(Debug, Clone)]
pub struct ResolutionBuilder {
    processed: WorkflowTriple,
}

impl ResolutionBuilder {
    pub fn new(processed: WorkflowTriple) -> Self {
        Self { processed }
    }

    pub fn from_rules(rules: &DisputeRules) -> Self {
        Self::new(rules.processed_state.clone())
    }

    pub fn build(
        &self,
        client_reference: &str,
        classification: Option<&ErrorClassification>,
        has_logs: bool,
        rebooking: Option<&RebookingContext>,
    ) -> ResolutionUpdate {
        let mut fields = BTreeMap::new();
        fields.insert(
            WorkflowField::SupplierComments,
            self.processed.supplier_comments.clone(),
        );
        fields.insert(WorkflowField::Status, self.processed.status.clone());
        fields.insert(WorkflowField::Completion, self.processed.completion.clone());

        let notes = match rebooking.filter(|ctx| ctx.requires_rebooking_narrative()) {
            Some(ctx) => rebooking_notes(
                client_reference,
                ctx.last_cancel_supplier_order_id
                    .as_deref()
                    .unwrap_or(MISSING_ORDER_ID),
            ),
            None => match (has_logs, classification) {
                (true, Some(classification)) => classified_notes(classification),
                (true, None) => provider_error_notes(),
                (false, _) => NO_LOGS_NOTES.to_string(),
            },
        };
        fields.insert(WorkflowField::Notes, notes);

        ResolutionUpdate {
            fields,
            attachment: None,
        }
    }
}

impl Default for ResolutionBuilder {
    fn default() -> Self {
        Self::from_rules(&DisputeRules::default())
    }
}
