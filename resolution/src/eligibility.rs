//! Eligibility Gate: decides whether a queue row may be processed.
//!
//! The gate is a strict three-state machine over the workflow triple:
//!
//! ```text
//! INITIAL ──(automation)──▶ PROCESSED
//!    │
//!    └── any other combination: manual / unrecognized, never touched
//! ```
//!
//! Re-running the automation is safe because rows already in the processed
//! triple are rejected here; idempotence lives in the data, not in a lock.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{DisputeRow, WorkflowTriple};
use crate::rules::DisputeRules;

pub const REASON_ALREADY_PROCESSED: &str = "Already processed";
pub const REASON_NOT_INITIAL: &str = "Not in expected initial state";
pub const REASON_ELIGIBLE: &str = "Eligible for processing";

/// Gate verdict for a single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    /// Row is in the expected initial state.
    Eligible,
    /// Row already carries the processed triple.
    AlreadyProcessed,
    /// Row is in a manual or unrecognized state.
    NotInInitialState,
}

impl Eligibility {
    pub fn is_eligible(self) -> bool {
        matches!(self, Self::Eligible)
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Eligible => REASON_ELIGIBLE,
            Self::AlreadyProcessed => REASON_ALREADY_PROCESSED,
            Self::NotInInitialState => REASON_NOT_INITIAL,
        }
    }
}

impl fmt::Display for Eligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Compares a row's workflow triple against the initial and processed triples.
#[derive(Debug, Clone)]
pub struct EligibilityGate {
    initial: WorkflowTriple,
    processed: WorkflowTriple,
}

impl EligibilityGate {
    pub fn new(initial: WorkflowTriple, processed: WorkflowTriple) -> Self {
        Self { initial, processed }
    }

    pub fn from_rules(rules: &DisputeRules) -> Self {
        Self::new(rules.initial_state.clone(), rules.processed_state.clone())
    }

    /// Classify the row's workflow state. Never fails.
    pub fn check(&self, row: &DisputeRow) -> Eligibility {
        if row.workflow.matches(&self.processed) {
            Eligibility::AlreadyProcessed
        } else if !row.workflow.matches(&self.initial) {
            Eligibility::NotInInitialState
        } else {
            Eligibility::Eligible
        }
    }

    /// `(eligible, reason)` form of [`check`](Self::check).
    pub fn is_eligible(&self, row: &DisputeRow) -> (bool, &'static str) {
        let verdict = self.check(row);
        (verdict.is_eligible(), verdict.reason())
    }
}

impl Default for EligibilityGate {
    fn default() -> Self {
        Self::from_rules(&DisputeRules::default())
    }
}
