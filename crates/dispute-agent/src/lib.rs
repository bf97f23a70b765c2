//! Booking dispute agent: reads dispute rows from the ticket queue, gathers
//! warehouse logs and booking profiles, and writes the resolution back.
//!
//! The decisions themselves live in the `resolution` crate; this crate owns
//! configuration, the collaborator backends, the per-row pipeline and the
//! run-level reporting.

pub mod audit;
pub mod config;
pub mod error;
pub mod evidence;
pub mod orchestrator;
pub mod report;
pub mod sources;
pub mod state_machine;
pub mod telemetry;

pub use audit::{AuditAction, AuditEntry, AuditSink, AuditSummary, AuditTrail};
pub use config::AgentConfig;
pub use error::{ConfigError, RowError, Service, SourceError};
pub use evidence::EvidenceWriter;
pub use orchestrator::{Collaborators, Orchestrator, RowOutcome, SingleRunReport};
pub use sources::{LogWarehouse, ProfileService, QueueStore, WriteReceipt};
pub use telemetry::{RunCollector, RunStats, RunSummary};
