//! System report and connectivity check.

use chrono::{DateTime, Utc};
use resolution::ErrorPattern;
use serde::Serialize;
use tracing::warn;

use crate::audit::AuditSummary;
use crate::config::AgentConfig;
use crate::error::{Service, SourceError};
use crate::sources::{LogWarehouse, ProfileService, QueueStore};
use crate::telemetry::RunStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    fn from_ping(name: &str, result: Result<(), SourceError>) -> Self {
        match result {
            Ok(()) => Self::Connected,
            Err(e) => {
                warn!(collaborator = name, "Connectivity check failed: {e}");
                Self::Disconnected
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SystemStatus {
    pub queue_store: ConnectionStatus,
    pub log_warehouse: ConnectionStatus,
    pub profile_service: ConnectionStatus,
}

impl SystemStatus {
    /// Every collaborator disconnected, e.g. when the queue could not be opened.
    pub fn all_disconnected() -> Self {
        Self {
            queue_store: ConnectionStatus::Disconnected,
            log_warehouse: ConnectionStatus::Disconnected,
            profile_service: ConnectionStatus::Disconnected,
        }
    }

    pub fn all_connected(&self) -> bool {
        [self.queue_store, self.log_warehouse, self.profile_service]
            .iter()
            .all(|s| *s == ConnectionStatus::Connected)
    }
}

/// Ping the three collaborators concurrently. A missing queue store (it
/// failed to connect) counts as disconnected.
pub async fn check_connections(
    queue: Option<&dyn QueueStore>,
    warehouse: &dyn LogWarehouse,
    profiles: &dyn ProfileService,
) -> SystemStatus {
    let queue_ping = async {
        match queue {
            Some(queue) => queue.ping().await,
            None => Err(SourceError::Configuration {
                service: Service::QueueStore,
                message: "not connected".into(),
            }),
        }
    };
    let (queue_store, log_warehouse, profile_service) =
        tokio::join!(queue_ping, warehouse.ping(), profiles.ping());

    SystemStatus {
        queue_store: ConnectionStatus::from_ping("queue store", queue_store),
        log_warehouse: ConnectionStatus::from_ping("log warehouse", log_warehouse),
        profile_service: ConnectionStatus::from_ping("profile service", profile_service),
    }
}

/// Non-secret configuration values echoed in the report.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationEcho {
    pub sheet_id: String,
    pub warehouse_database: String,
    pub profile_base_url: String,
    pub log_level: String,
    pub error_patterns: Vec<&'static str>,
    pub dispute_triggers: Vec<String>,
}

impl ConfigurationEcho {
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            sheet_id: config.smartsheet.sheet_id.clone(),
            warehouse_database: config.warehouse.database.clone(),
            profile_base_url: config.profile.base_url.clone(),
            log_level: config.logging.level.clone(),
            error_patterns: ErrorPattern::TABLE.iter().map(|p| p.code()).collect(),
            dispute_triggers: config.rules.triggers.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemReport {
    pub timestamp: DateTime<Utc>,
    pub system_status: SystemStatus,
    pub configuration: ConfigurationEcho,
    pub processing_stats: RunStats,
    pub audit_summary: AuditSummary,
}

impl SystemReport {
    pub fn new(
        system_status: SystemStatus,
        configuration: ConfigurationEcho,
        processing_stats: RunStats,
        audit_summary: AuditSummary,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            system_status,
            configuration,
            processing_stats,
            audit_summary,
        }
    }
}
