//! Error types for the I/O layer.
//!
//! `SourceError` covers anything that goes wrong talking to a collaborator,
//! `ConfigError` is fatal at startup and `RowError` is caught per row by the
//! orchestrator and never aborts a run.

use std::fmt;

use resolution::{ClassificationError, RulesError};
use thiserror::Error;

use crate::state_machine::IllegalTransition;

/// Which collaborator an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    QueueStore,
    LogWarehouse,
    ProfileService,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueStore => write!(f, "queue store"),
            Self::LogWarehouse => write!(f, "log warehouse"),
            Self::ProfileService => write!(f, "profile service"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("{service} request failed: {source}")]
    Http {
        service: Service,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: Service,
        status: u16,
        body: String,
    },

    #[error("{service} response could not be decoded: {message}")]
    Decode { service: Service, message: String },

    #[error("{service} I/O failed: {source}")]
    Io {
        service: Service,
        #[source]
        source: std::io::Error,
    },

    /// Required schema (e.g. queue columns) is missing. Fatal at startup.
    #[error("{service} is misconfigured: {message}")]
    Configuration { service: Service, message: String },
}

impl SourceError {
    pub fn service(&self) -> Service {
        match self {
            Self::Http { service, .. }
            | Self::Status { service, .. }
            | Self::Decode { service, .. }
            | Self::Io { service, .. }
            | Self::Configuration { service, .. } => *service,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    pub(crate) fn http(service: Service) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| Self::Http { service, source }
    }

    pub(crate) fn decode(service: Service, message: impl fmt::Display) -> Self {
        Self::Decode {
            service,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {}", .0.join(", "))]
    MissingVars(Vec<String>),

    #[error("Invalid value for {name}: {message}")]
    Invalid { name: String, message: String },

    #[error(transparent)]
    Rules(#[from] RulesError),
}

/// Failure of a single row's pipeline.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("Row has no client reference")]
    MissingClientReference,

    #[error(transparent)]
    Classification(#[from] ClassificationError),

    #[error("Queue store rejected the update for row {row_id}")]
    WriteRejected { row_id: u64 },

    #[error("Write-back failed: {0}")]
    WriteBack(#[source] SourceError),

    #[error(transparent)]
    Pipeline(#[from] IllegalTransition),
}
