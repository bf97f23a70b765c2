//! Per-row pipeline state machine with legal transition guards.
//!
//! Every row walks the same stages, and the transition log is attached to
//! the row's audit record so a run can be replayed row by row.
//!
//! ```text
//! Gating → Gathering | Skipped
//! Gathering → Classifying
//! Classifying → Resolving
//! Resolving → WritingBack
//! WritingBack → Updated
//! (any non-terminal) → Errored
//! ```

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStage {
    /// Checking the workflow triple.
    Gating,
    /// Reading the warehouse and the profile service.
    Gathering,
    Classifying,
    /// Building the write-back and the evidence file.
    Resolving,
    WritingBack,
    /// Terminal: fields written.
    Updated,
    /// Terminal: gate refused the row.
    Skipped,
    /// Terminal: the pipeline failed for this row.
    Errored,
}

impl RowStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Updated | Self::Skipped | Self::Errored)
    }
}

impl fmt::Display for RowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gating => "Gating",
            Self::Gathering => "Gathering",
            Self::Classifying => "Classifying",
            Self::Resolving => "Resolving",
            Self::WritingBack => "WritingBack",
            Self::Updated => "Updated",
            Self::Skipped => "Skipped",
            Self::Errored => "Errored",
        };
        f.write_str(name)
    }
}

fn is_legal_transition(from: RowStage, to: RowStage) -> bool {
    use RowStage::*;

    if to == Errored && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Gating, Gathering)
            | (Gating, Skipped)
            | (Gathering, Classifying)
            | (Classifying, Resolving)
            | (Resolving, WritingBack)
            | (WritingBack, Updated)
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: RowStage,
    pub to: RowStage,
    /// Milliseconds since the row entered the pipeline.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: RowStage,
    pub to: RowStage,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal row transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Tracks one row's stage and records every transition.
pub struct RowStateMachine {
    current: RowStage,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl RowStateMachine {
    pub fn new() -> Self {
        Self {
            current: RowStage::Gating,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> RowStage {
        self.current
    }

    /// Move to `to`, rejecting edges outside the stage graph.
    pub fn advance(&mut self, to: RowStage, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::trace!(from = %self.current, to = %to, "row transition");

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(RowStage::Errored, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Compact path such as `Gating → Gathering → Errored (12ms)`.
    pub fn summary(&self) -> String {
        let mut path = vec![RowStage::Gating.to_string()];
        path.extend(self.transitions.iter().map(|t| t.to.to_string()));
        format!(
            "{} ({}ms)",
            path.join(" → "),
            self.created_at.elapsed().as_millis()
        )
    }
}

impl Default for RowStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
