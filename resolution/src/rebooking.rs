//! Rebooking Detector: spots cancel-then-rebook chains in event history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{CallType, LogRecord};

/// Aggregate view of a client reference's book/cancel history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebookingContext {
    pub book_count: u32,
    pub cancel_count: u32,
    pub first_booking_time: Option<DateTime<Utc>>,
    pub last_cancel_time: Option<DateTime<Utc>>,
    pub last_booking_time: Option<DateTime<Utc>>,
    /// Supplier order id of the most recent cancellation event.
    pub last_cancel_supplier_order_id: Option<String>,
    /// True iff more than one booking, or at least one cancel and one booking.
    pub is_rebooking: bool,
}

impl RebookingContext {
    /// Aggregate an ordered event history. Events without a call type are
    /// ignored. History is never modified.
    pub fn from_events(events: &[LogRecord]) -> Self {
        let mut ctx = Self::default();
        let mut last_cancel: Option<&LogRecord> = None;

        for event in events {
            match event.call {
                Some(CallType::Book) => {
                    ctx.book_count += 1;
                    ctx.first_booking_time = earliest(ctx.first_booking_time, event.created_at);
                    ctx.last_booking_time = latest(ctx.last_booking_time, event.created_at);
                }
                Some(CallType::Cancel) => {
                    ctx.cancel_count += 1;
                    ctx.last_cancel_time = latest(ctx.last_cancel_time, event.created_at);
                    // Ties and missing timestamps fall back to history order.
                    let newer = match last_cancel {
                        None => true,
                        Some(prev) => event.created_at >= prev.created_at,
                    };
                    if newer {
                        last_cancel = Some(event);
                    }
                }
                None => {}
            }
        }

        ctx.last_cancel_supplier_order_id =
            last_cancel.and_then(|e| e.supplier_order_id.clone());
        ctx.is_rebooking =
            ctx.book_count > 1 || (ctx.cancel_count > 0 && ctx.book_count > 0);
        ctx
    }

    /// Whether the rebooking narrative should replace the classification narrative.
    pub fn requires_rebooking_narrative(&self) -> bool {
        self.is_rebooking && self.cancel_count > 0
    }
}

fn earliest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
