//! Business rules: queue column titles, workflow triples and trigger phrases.
//!
//! Defaults mirror the production sheet. A TOML file can override any
//! subset of them; unspecified keys keep their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{WorkflowField, WorkflowTriple};

pub const INITIAL_SUPPLIER_COMMENTS: &str = "in escalation process";
pub const INITIAL_STATUS: &str = "escalation";
pub const INITIAL_COMPLETION: &str = "need help";

pub const PROCESSED_SUPPLIER_COMMENTS: &str = "reviewed by ST technical team";
pub const PROCESSED_STATUS: &str = "will not pay";
pub const PROCESSED_COMPLETION: &str = "ready to submit";

/// Notes phrases that mark a queue row as a booking dispute.
pub const DEFAULT_TRIGGERS: [&str; 5] = [
    "The booking was marked as invalid by the supplier, please provide the logs.",
    "The booking was marked by supplier as provider error. Please provide logs.",
    "booking was marked as invalid",
    "provider error",
    "supplier error",
];

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("Failed to read rules file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid rules TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Queue column titles for the fields the automation reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnTitles {
    pub notes: String,
    pub supplier_comments: String,
    pub status: String,
    pub completion: String,
    pub client_reference: String,
}

impl Default for ColumnTitles {
    fn default() -> Self {
        Self {
            notes: "Round 1: Super Additional Notes".into(),
            supplier_comments: "Round 1: Supplier comments".into(),
            status: "Round 1: Status".into(),
            completion: "Round 1: Completion".into(),
            client_reference: "Client Reference Number".into(),
        }
    }
}

impl ColumnTitles {
    /// Title of the column backing a writable workflow field.
    pub fn title_for(&self, field: WorkflowField) -> &str {
        match field {
            WorkflowField::Notes => &self.notes,
            WorkflowField::SupplierComments => &self.supplier_comments,
            WorkflowField::Status => &self.status,
            WorkflowField::Completion => &self.completion,
        }
    }

    /// Every title the queue must expose.
    pub fn required(&self) -> [&str; 5] {
        [
            &self.notes,
            &self.supplier_comments,
            &self.status,
            &self.completion,
            &self.client_reference,
        ]
    }
}

/// Full rule set used by the gate, the queue store and the resolution builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisputeRules {
    pub columns: ColumnTitles,
    pub initial_state: WorkflowTriple,
    pub processed_state: WorkflowTriple,
    pub triggers: Vec<String>,
}

impl Default for DisputeRules {
    fn default() -> Self {
        Self {
            columns: ColumnTitles::default(),
            initial_state: WorkflowTriple::new(
                INITIAL_SUPPLIER_COMMENTS,
                INITIAL_STATUS,
                INITIAL_COMPLETION,
            ),
            processed_state: WorkflowTriple::new(
                PROCESSED_SUPPLIER_COMMENTS,
                PROCESSED_STATUS,
                PROCESSED_COMPLETION,
            ),
            triggers: DEFAULT_TRIGGERS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl DisputeRules {
    pub fn from_toml_str(content: &str) -> Result<Self, RulesError> {
        Ok(toml::from_str(content)?)
    }

    /// Load rules from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RulesError> {
        let content = std::fs::read_to_string(path).map_err(|source| RulesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Whether a notes value contains one of the dispute trigger phrases.
    pub fn is_dispute_note(&self, notes: &str) -> bool {
        if notes.trim().is_empty() {
            return false;
        }
        let notes = notes.to_lowercase();
        self.triggers
            .iter()
            .any(|trigger| notes.contains(&trigger.to_lowercase()))
    }
}
