//! Collaborator contracts and their HTTP implementations.
//!
//! The orchestrator only sees the traits; `smartsheet`, `snowflake` and
//! `profile` are the production backends.

pub mod profile;
pub mod smartsheet;
pub mod snowflake;

use async_trait::async_trait;
use resolution::{BookingProfile, DisputeRow, LogRecord, ResolutionUpdate};
use serde::Serialize;

use crate::error::{Service, SourceError};

pub use profile::ProfileClient;
pub use smartsheet::SmartsheetClient;
pub use snowflake::SnowflakeClient;

/// Result of a write-back call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteReceipt {
    /// The queue store accepted the field update.
    pub applied: bool,
    /// Set when the fields were written but the attachment upload failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_error: Option<String>,
}

impl WriteReceipt {
    pub fn applied() -> Self {
        Self {
            applied: true,
            attachment_error: None,
        }
    }

    pub fn rejected() -> Self {
        Self::default()
    }
}

/// Ticket queue holding the dispute rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Rows whose notes carry a dispute trigger and whose client reference is set.
    async fn list_eligible_candidate_rows(&self) -> Result<Vec<DisputeRow>, SourceError>;

    /// Write the workflow fields of one row, then upload the update's
    /// attachment if it has one. The attachment is only attempted once the
    /// field update was accepted.
    async fn update_row(
        &self,
        row_id: u64,
        update: &ResolutionUpdate,
    ) -> Result<WriteReceipt, SourceError>;

    async fn ping(&self) -> Result<(), SourceError>;
}

/// Booking event warehouse.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LogWarehouse: Send + Sync {
    /// Provider-call log records around the booking, ordered by time.
    /// Returns an empty list when nothing was logged.
    async fn fetch_events(&self, client_reference: &str) -> Result<Vec<LogRecord>, SourceError>;

    /// Every booking patch event with its call type, ordered by time.
    async fn fetch_history(&self, client_reference: &str) -> Result<Vec<LogRecord>, SourceError>;

    async fn ping(&self) -> Result<(), SourceError>;
}

/// Booking profile lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileService: Send + Sync {
    /// `Ok(None)` when the service has no booking for the reference.
    async fn fetch_booking(
        &self,
        client_reference: &str,
    ) -> Result<Option<BookingProfile>, SourceError>;

    /// Other bookings by the same guest for the same stay.
    async fn fetch_related_bookings(
        &self,
        profile: &BookingProfile,
    ) -> Result<Vec<BookingProfile>, SourceError>;

    async fn ping(&self) -> Result<(), SourceError>;
}

/// Turn a non-2xx response into [`SourceError::Status`].
pub(crate) async fn ensure_success(
    service: Service,
    response: reqwest::Response,
) -> Result<reqwest::Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SourceError::Status {
        service,
        status: status.as_u16(),
        body: truncate(&body, 500),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
