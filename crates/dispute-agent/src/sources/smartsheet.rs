//! Smartsheet REST 2.0 backend for the ticket queue.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use resolution::{DisputeRow, DisputeRules, ResolutionUpdate, WorkflowField, WorkflowTriple};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{ensure_success, QueueStore, WriteReceipt};
use crate::config::SmartsheetConfig;
use crate::error::{Service, SourceError};

const SERVICE: Service = Service::QueueStore;

#[derive(Debug, Deserialize)]
struct Sheet {
    #[serde(default)]
    columns: Vec<SheetColumn>,
    #[serde(default)]
    rows: Vec<SheetRow>,
}

#[derive(Debug, Deserialize)]
struct SheetColumn {
    id: u64,
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetRow {
    id: u64,
    #[serde(default)]
    row_number: u32,
    #[serde(default)]
    cells: Vec<SheetCell>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetCell {
    column_id: u64,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    display_value: Option<String>,
}

impl SheetCell {
    fn text(&self) -> String {
        if let Some(display) = &self.display_value {
            return display.clone();
        }
        match &self.value {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CellUpdate<'a> {
    column_id: u64,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct RowUpdate<'a> {
    id: u64,
    cells: Vec<CellUpdate<'a>>,
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    #[serde(default)]
    message: String,
}

/// Column ids for every title the agent reads or writes.
#[derive(Debug, Clone)]
struct ColumnMap {
    notes: u64,
    supplier_comments: u64,
    status: u64,
    completion: u64,
    client_reference: u64,
}

impl ColumnMap {
    fn resolve(columns: &[SheetColumn], rules: &DisputeRules) -> Result<Self, SourceError> {
        let by_title: HashMap<&str, u64> = columns
            .iter()
            .map(|c| (c.title.as_str(), c.id))
            .collect();

        let missing: Vec<&str> = rules
            .columns
            .required()
            .into_iter()
            .filter(|title| !by_title.contains_key(title))
            .collect();
        if !missing.is_empty() {
            return Err(SourceError::Configuration {
                service: SERVICE,
                message: format!("missing required columns: {}", missing.join(", ")),
            });
        }

        let id = |title: &str| by_title.get(title).copied().unwrap_or_default();
        let titles = &rules.columns;
        Ok(Self {
            notes: id(titles.notes.as_str()),
            supplier_comments: id(titles.supplier_comments.as_str()),
            status: id(titles.status.as_str()),
            completion: id(titles.completion.as_str()),
            client_reference: id(titles.client_reference.as_str()),
        })
    }

    fn field(&self, field: WorkflowField) -> u64 {
        match field {
            WorkflowField::Notes => self.notes,
            WorkflowField::SupplierComments => self.supplier_comments,
            WorkflowField::Status => self.status,
            WorkflowField::Completion => self.completion,
        }
    }
}

/// Queue store backed by one Smartsheet sheet.
///
/// Column titles are resolved to ids once in [`SmartsheetClient::connect`].
pub struct SmartsheetClient {
    http: reqwest::Client,
    sheet_url: String,
    token: String,
    rules: DisputeRules,
    columns: ColumnMap,
}

impl SmartsheetClient {
    /// Fetch the sheet once and validate that every required column exists.
    pub async fn connect(
        config: &SmartsheetConfig,
        rules: DisputeRules,
    ) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(SourceError::http(SERVICE))?;
        let sheet_url = format!(
            "{}/sheets/{}",
            config.base_url.trim_end_matches('/'),
            config.sheet_id
        );

        let sheet = fetch_sheet(&http, &sheet_url, &config.access_token).await?;
        let columns = ColumnMap::resolve(&sheet.columns, &rules)?;
        info!(
            sheet_id = %config.sheet_id,
            columns = sheet.columns.len(),
            "Connected to queue store"
        );

        Ok(Self {
            http,
            sheet_url,
            token: config.access_token.clone(),
            rules,
            columns,
        })
    }

    fn to_dispute_row(&self, row: &SheetRow) -> DisputeRow {
        let mut cells: HashMap<u64, String> =
            row.cells.iter().map(|c| (c.column_id, c.text())).collect();
        let mut take = |column_id: u64| cells.remove(&column_id).unwrap_or_default();

        let notes = take(self.columns.notes);
        let supplier_comments = take(self.columns.supplier_comments);
        let status = take(self.columns.status);
        let completion = take(self.columns.completion);
        let client_reference = take(self.columns.client_reference).trim().to_string();

        DisputeRow {
            row_id: row.id,
            row_number: row.row_number,
            client_reference,
            notes,
            workflow: WorkflowTriple::new(supplier_comments, status, completion),
        }
    }

    async fn upload_attachment(&self, row_id: u64, path: &Path) -> Result<(), SourceError> {
        let body = tokio::fs::read(path).await.map_err(|source| SourceError::Io {
            service: SERVICE,
            source,
        })?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("booking_logs.csv");

        let response = self
            .http
            .post(format!("{}/rows/{row_id}/attachments", self.sheet_url))
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "text/csv")
            .header(
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            )
            .body(body)
            .send()
            .await
            .map_err(SourceError::http(SERVICE))?;
        ensure_success(SERVICE, response).await?;
        debug!(row_id, filename, "Attachment uploaded");
        Ok(())
    }
}

async fn fetch_sheet(
    http: &reqwest::Client,
    sheet_url: &str,
    token: &str,
) -> Result<Sheet, SourceError> {
    let response = http
        .get(sheet_url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(SourceError::http(SERVICE))?;
    ensure_success(SERVICE, response)
        .await?
        .json::<Sheet>()
        .await
        .map_err(|e| SourceError::decode(SERVICE, e))
}

#[async_trait]
impl QueueStore for SmartsheetClient {
    async fn list_eligible_candidate_rows(&self) -> Result<Vec<DisputeRow>, SourceError> {
        let sheet = fetch_sheet(&self.http, &self.sheet_url, &self.token).await?;
        let total = sheet.rows.len();
        let candidates: Vec<DisputeRow> = sheet
            .rows
            .iter()
            .map(|row| self.to_dispute_row(row))
            .filter(|row| !row.client_reference.is_empty() && self.rules.is_dispute_note(&row.notes))
            .collect();
        info!(
            total_rows = total,
            candidates = candidates.len(),
            "Loaded dispute candidates"
        );
        Ok(candidates)
    }

    async fn update_row(
        &self,
        row_id: u64,
        update: &ResolutionUpdate,
    ) -> Result<WriteReceipt, SourceError> {
        let cells = update
            .fields
            .iter()
            .map(|(field, value)| CellUpdate {
                column_id: self.columns.field(*field),
                value: value.as_str(),
            })
            .collect();
        let body = [RowUpdate { id: row_id, cells }];

        let response = self
            .http
            .put(format!("{}/rows", self.sheet_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(SourceError::http(SERVICE))?;
        let result: UpdateResponse = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::decode(SERVICE, e))?;

        if result.message != "SUCCESS" {
            warn!(row_id, message = %result.message, "Row update not accepted");
            return Ok(WriteReceipt::rejected());
        }

        let mut receipt = WriteReceipt::applied();
        if let Some(path) = &update.attachment {
            if let Err(e) = self.upload_attachment(row_id, path).await {
                warn!(row_id, path = %path.display(), "Failed to attach log file: {e}");
                receipt.attachment_error = Some(e.to_string());
            }
        }
        Ok(receipt)
    }

    async fn ping(&self) -> Result<(), SourceError> {
        let response = self
            .http
            .get(&self.sheet_url)
            .query(&[("pageSize", "1")])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(SourceError::http(SERVICE))?;
        ensure_success(SERVICE, response).await.map(|_| ())
    }
}
