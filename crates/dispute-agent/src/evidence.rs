//! Writes warehouse log records to the CSV attached to a resolved row.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use resolution::LogRecord;
use tracing::debug;

/// Writes `booking_logs_<REF>_<YYYYMMDD_HHMMSS>.csv` files into one directory.
#[derive(Debug, Clone)]
pub struct EvidenceWriter {
    dir: PathBuf,
}

impl EvidenceWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_name(client_reference: &str, at: DateTime<Utc>) -> String {
        let safe: String = client_reference
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("booking_logs_{safe}_{}.csv", at.format("%Y%m%d_%H%M%S"))
    }

    /// Write `records` with a header row and return the file path.
    pub fn write_logs(
        &self,
        client_reference: &str,
        records: &[LogRecord],
    ) -> Result<PathBuf, csv::Error> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(Self::file_name(client_reference, Utc::now()));

        let mut writer = csv::Writer::from_path(&path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;

        debug!(
            client_reference,
            records = records.len(),
            path = %path.display(),
            "Wrote log evidence"
        );
        Ok(path)
    }
}
