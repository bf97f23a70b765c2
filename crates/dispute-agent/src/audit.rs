//! Append-only audit trail.
//!
//! Every row outcome is recorded once. Entries are mirrored to a JSON Lines
//! file (when configured) and kept in memory for the run summary. The trail is
//! never read back for decisions.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    RowUpdated,
    RowSkipped,
    RowProcessingError,
    AttachmentFailed,
    SourceUnavailable,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RowUpdated => "ROW_UPDATED",
            Self::RowSkipped => "ROW_SKIPPED",
            Self::RowProcessingError => "ROW_PROCESSING_ERROR",
            Self::AttachmentFailed => "ATTACHMENT_FAILED",
            Self::SourceUnavailable => "SOURCE_UNAVAILABLE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub client_reference: String,
    pub details: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub total_actions: usize,
    pub actions_by_type: BTreeMap<AuditAction, usize>,
    /// Distinct client references seen, sorted.
    pub processed_references: Vec<String>,
}

/// Observer for row outcomes.
pub trait AuditSink: Send + Sync {
    fn record(&self, action: AuditAction, client_reference: &str, details: Value);
}

/// In-memory trail with an optional JSONL mirror.
#[derive(Debug, Default)]
pub struct AuditTrail {
    entries: Mutex<Vec<AuditEntry>>,
    file: Option<PathBuf>,
}

impl AuditTrail {
    /// Memory-only trail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trail that also appends each entry to `path`.
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            file: Some(path.into()),
        }
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn summary(&self) -> AuditSummary {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut actions_by_type = BTreeMap::new();
        let mut references = BTreeSet::new();
        for entry in entries.iter() {
            *actions_by_type.entry(entry.action).or_insert(0) += 1;
            references.insert(entry.client_reference.clone());
        }

        AuditSummary {
            total_actions: entries.len(),
            actions_by_type,
            processed_references: references.into_iter().collect(),
        }
    }

    fn append_to_file(&self, path: &Path, entry: &AuditEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize audit entry: {e}");
                return;
            }
        };
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(e) = result {
            warn!(path = %path.display(), "Failed to append audit entry: {e}");
        }
    }
}

impl AuditSink for AuditTrail {
    fn record(&self, action: AuditAction, client_reference: &str, details: Value) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            action,
            client_reference: client_reference.to_string(),
            details,
        };

        info!(
            action = action.as_str(),
            client_reference,
            details = %entry.details,
            "AUDIT"
        );

        if let Some(path) = &self.file {
            self.append_to_file(path, &entry);
        }
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
    }
}
