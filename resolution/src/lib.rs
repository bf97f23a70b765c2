//! Deterministic decision core for booking-dispute triage.
//!
//! This crate provides:
//! - The dispute data model shared with the I/O layer
//! - Business rules (column titles, workflow triples, trigger phrases)
//! - The eligibility gate over the workflow triple
//! - The error classifier merging warehouse-log and profile signals
//! - The rebooking detector over booking event history
//! - The resolution builder producing the single row write-back
//!
//! Nothing here performs network or filesystem I/O apart from loading a
//! rules file; every function is a pure function of its inputs.

pub mod builder;
pub mod classifier;
pub mod eligibility;
pub mod model;
pub mod rebooking;
pub mod rules;

pub use builder::{ResolutionBuilder, ResolutionUpdate};
pub use classifier::{
    Basis, ClassificationError, ErrorClassification, ErrorClassifier, ErrorPattern, Evidence,
    FailureStatus, SourceSignal, Verdict,
};
pub use eligibility::{Eligibility, EligibilityGate};
pub use model::{
    BookingProfile, CallType, CancellationLog, DisputeRow, LogColumn, LogRecord, ProfileError,
    WorkflowField, WorkflowTriple,
};
pub use rebooking::RebookingContext;
pub use rules::{ColumnTitles, DisputeRules, RulesError};
