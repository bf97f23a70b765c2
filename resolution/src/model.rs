//! Value objects shared by every stage of the dispute pipeline.
//!
//! All of these are constructed fresh for each row pass and never shared
//! across rows. Nothing here performs I/O.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// The four queue columns the automation is allowed to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowField {
    Notes,
    SupplierComments,
    Status,
    Completion,
}

impl WorkflowField {
    pub const ALL: [WorkflowField; 4] = [
        Self::Notes,
        Self::SupplierComments,
        Self::Status,
        Self::Completion,
    ];
}

impl fmt::Display for WorkflowField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notes => write!(f, "notes"),
            Self::SupplierComments => write!(f, "supplier_comments"),
            Self::Status => write!(f, "status"),
            Self::Completion => write!(f, "completion"),
        }
    }
}

/// The three workflow fields whose combined values gate processing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTriple {
    #[serde(default)]
    pub supplier_comments: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub completion: String,
}

impl WorkflowTriple {
    pub fn new(
        supplier_comments: impl Into<String>,
        status: impl Into<String>,
        completion: impl Into<String>,
    ) -> Self {
        Self {
            supplier_comments: supplier_comments.into(),
            status: status.into(),
            completion: completion.into(),
        }
    }

    /// Field-by-field comparison, ignoring case and surrounding whitespace.
    pub fn matches(&self, other: &WorkflowTriple) -> bool {
        same_value(&self.supplier_comments, &other.supplier_comments)
            && same_value(&self.status, &other.status)
            && same_value(&self.completion, &other.completion)
    }
}

fn same_value(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// One dispute entry read from the ticket queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeRow {
    /// Queue-store row identifier used for write-back.
    pub row_id: u64,
    /// Display number shown to humans in the queue.
    pub row_number: u32,
    /// Join key shared by the queue, the warehouse and the profile service.
    pub client_reference: String,
    /// Free-text notes column. Also carries the dispute trigger phrase.
    pub notes: String,
    /// Current workflow state.
    pub workflow: WorkflowTriple,
}

/// Provider call type recorded against a warehouse event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Book,
    Cancel,
}

impl CallType {
    /// Parse an explicit `call` column value.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("book") {
            Some(Self::Book)
        } else if raw.eq_ignore_ascii_case("cancel") {
            Some(Self::Cancel)
        } else {
            None
        }
    }

    /// Patch events carry no call column; a reason mentioning "cancel"
    /// marks a cancellation, everything else counts as a booking.
    pub fn from_reason(reason: &str) -> Self {
        if reason.to_lowercase().contains("cancel") {
            Self::Cancel
        } else {
            Self::Book
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Book => write!(f, "book"),
            Self::Cancel => write!(f, "cancel"),
        }
    }
}

/// Text columns of a log record that the classifier inspects, in scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogColumn {
    Reason,
    DetailedStatus,
    Response,
    Request,
}

impl LogColumn {
    pub const SCAN_ORDER: [LogColumn; 4] = [
        Self::Reason,
        Self::DetailedStatus,
        Self::Response,
        Self::Request,
    ];
}

impl fmt::Display for LogColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reason => write!(f, "reason"),
            Self::DetailedStatus => write!(f, "detailed_status"),
            Self::Response => write!(f, "response"),
            Self::Request => write!(f, "request"),
        }
    }
}

/// One event row from the log warehouse. Immutable once fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub created_at: Option<DateTime<Utc>>,
    pub supplier: Option<String>,
    pub client_reference: String,
    pub supplier_order_id: Option<String>,
    pub supplier_order_reference: Option<String>,
    pub call: Option<CallType>,
    pub status: Option<String>,
    pub detailed_status: Option<String>,
    pub reason: Option<String>,
    pub request: Option<String>,
    pub response: Option<String>,
    /// Link to the support ticket raised for this booking, if any.
    pub ops_ticket: Option<String>,
}

impl LogRecord {
    /// Text of the given column, empty when the value is missing.
    pub fn text(&self, column: LogColumn) -> &str {
        let value = match column {
            LogColumn::Reason => &self.reason,
            LogColumn::DetailedStatus => &self.detailed_status,
            LogColumn::Response => &self.response,
            LogColumn::Request => &self.request,
        };
        value.as_deref().unwrap_or("")
    }
}

/// An explicit error entry attached to a booking by the profile service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// A cancellation log line attached to a booking by the profile service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationLog {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Booking state as reported by the profile service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingProfile {
    #[serde(default, alias = "client_reference")]
    pub client_reference_id: String,
    #[serde(default)]
    pub status: String,
    /// Whether the profile service considers the booking valid.
    #[serde(default = "default_valid", alias = "valid")]
    pub is_valid: bool,
    #[serde(default)]
    pub errors: Vec<ProfileError>,
    #[serde(default)]
    pub cancellation_logs: Vec<CancellationLog>,
    #[serde(default)]
    pub guest_email: Option<String>,
    #[serde(default)]
    pub check_in_date: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub property_id: Option<String>,
}

fn default_valid() -> bool {
    true
}

impl BookingProfile {
    /// A valid booking with the given reference and status and no errors.
    pub fn new(client_reference_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            client_reference_id: client_reference_id.into(),
            status: status.into(),
            is_valid: true,
            errors: Vec::new(),
            cancellation_logs: Vec::new(),
            guest_email: None,
            check_in_date: None,
            property_id: None,
        }
    }
}

/// Property ids come back as either JSON strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}
