//! Logging setup and run statistics.

use std::fs::OpenOptions;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::audit::AuditSummary;
use crate::config::LoggingConfig;
use crate::orchestrator::RowOutcome;

/// Install the global subscriber: stderr always, plus a plain-text file
/// layer when `LOG_FILE` is configured. `RUST_LOG` overrides `LOG_LEVEL`.
pub fn init_tracing(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let level = if verbose {
        "debug".to_string()
    } else {
        config.level.to_lowercase()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},hyper=warn,reqwest=warn")));

    let file_layer = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

/// Exact per-run counts. Every row lands in exactly one of
/// `updated`, `skipped` or `errors`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub processed: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl RunStats {
    pub fn record(&mut self, outcome: &RowOutcome) {
        self.total += 1;
        match outcome {
            RowOutcome::Updated { .. } => {
                self.processed += 1;
                self.updated += 1;
            }
            RowOutcome::Skipped { .. } => self.skipped += 1,
            RowOutcome::Errored { .. } => self.errors += 1,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.total == self.updated + self.skipped + self.errors
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: f64,
    pub statistics: RunStats,
    pub audit_summary: AuditSummary,
}

impl RunSummary {
    /// One-line log of the counts.
    pub fn emit(&self) {
        info!(
            total = self.statistics.total,
            processed = self.statistics.processed,
            updated = self.statistics.updated,
            skipped = self.statistics.skipped,
            errors = self.statistics.errors,
            duration_seconds = self.duration_seconds,
            "Run complete"
        );
    }
}

/// Collects row outcomes over one run.
pub struct RunCollector {
    started: Instant,
    stats: RunStats,
}

impl RunCollector {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            stats: RunStats::default(),
        }
    }

    pub fn record(&mut self, outcome: &RowOutcome) {
        self.stats.record(outcome);
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn finalize(self, audit_summary: AuditSummary) -> RunSummary {
        let secs = self.started.elapsed().as_secs_f64();
        RunSummary {
            timestamp: Utc::now(),
            duration_seconds: (secs * 100.0).round() / 100.0,
            statistics: self.stats,
            audit_summary,
        }
    }
}

impl Default for RunCollector {
    fn default() -> Self {
        Self::new()
    }
}
