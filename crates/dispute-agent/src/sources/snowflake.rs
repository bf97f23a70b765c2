//! Snowflake SQL API v2 backend for the log warehouse.
//!
//! Statements run synchronously (`timeout` is sent with each request) and
//! results come back as arrays of nullable strings, addressed by the column
//! names in `resultSetMetaData.rowType`.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use resolution::{CallType, LogRecord};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ensure_success, LogWarehouse};
use crate::config::WarehouseConfig;
use crate::error::{Service, SourceError};

const SERVICE: Service = Service::LogWarehouse;
const TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";

/// Provider request/response logs within a window around the first booking
/// and the first cancellation. Three positional bindings, all the client
/// reference.
const BOOKING_LOGS_SQL: &str = "\
with anchors as (
    select min(created_at) as booked_at
         , min(case when reason ilike '%cancel%' then created_at end) as cancelled_at
    from db_apps.public.booking_patch_events
    where client_reference_id = ?
)
select bpe.created_at
     , bpe.supplier
     , bpe.client_reference_id
     , bpe.supplier_order_id
     , bpe.supplier_order_reference
     , pe.call
     , bpe.status
     , bpe.detailed_status
     , bpe.reason
     , listagg(case when pe.type = 'request' then pe.body end) as request
     , listagg(case when pe.type = 'response' then pe.body end) as response
     , concat('https://snaptravel.freshdesk.com/a/tickets/', fdt.id) as ops_ticket
from db_apps.public.booking_patch_events bpe
cross join anchors a
left join db_apps.schema_unified_events.provider_event pe
    on bpe.client_reference_id = pe.client_reference_id and bpe.supplier = pe.supplier
left join db_apps.freshdesk.ticket fdt
    on (bpe.client_reference_id = fdt.custom_cf_client_reference_id
        or bpe.supplier_order_reference = fdt.custom_cf_supplier_reference_id
        or bpe.supplier_order_id = fdt.custom_cf_supplier_order_id)
    and fdt.type in ('T:ER', 'ER')
where bpe.client_reference_id = ?
    and pe.event_created_at between dateadd(min, -10, a.booked_at) and dateadd(min, 5, a.booked_at)
    and pe.call = 'book'
    and bpe.reason not ilike '%cancel%'
group by 1, 2, 3, 4, 5, 6, 7, 8, 9, 12
union
select bpe.created_at
     , bpe.supplier
     , bpe.client_reference_id
     , bpe.supplier_order_id
     , bpe.supplier_order_reference
     , pe.call
     , bpe.status
     , bpe.detailed_status
     , bpe.reason
     , listagg(case when pe.type = 'request' then pe.body end) as request
     , listagg(case when pe.type = 'response' then pe.body end) as response
     , concat('https://snaptravel.freshdesk.com/a/tickets/', fdt.id) as ops_ticket
from db_apps.public.booking_patch_events bpe
cross join anchors a
left join db_apps.schema_unified_events.provider_event pe
    on bpe.client_reference_id = pe.client_reference_id and bpe.supplier = pe.supplier
left join db_apps.freshdesk.ticket fdt
    on (bpe.client_reference_id = fdt.custom_cf_client_reference_id
        or bpe.supplier_order_reference = fdt.custom_cf_supplier_reference_id
        or bpe.supplier_order_id = fdt.custom_cf_supplier_order_id)
    and fdt.type in ('T:ERC', 'ERC')
where bpe.client_reference_id = ?
    and pe.event_created_at between dateadd(min, -10, a.cancelled_at) and dateadd(min, 5, a.cancelled_at)
    and pe.call = 'cancel'
    and bpe.reason ilike '%cancel%'
group by 1, 2, 3, 4, 5, 6, 7, 8, 9, 12
order by created_at";

const BOOKING_LOGS_BINDINGS: usize = 3;

/// Every booking patch event, with a derived call type.
const HISTORY_SQL: &str = "\
select created_at
     , supplier
     , client_reference_id
     , supplier_order_id
     , supplier_order_reference
     , case when reason ilike '%cancel%' then 'cancel' else 'book' end as call
     , status
     , detailed_status
     , reason
from db_apps.public.booking_patch_events
where client_reference_id = ?
order by created_at";

#[derive(Debug, Serialize)]
struct Binding<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    warehouse: &'a str,
    database: &'a str,
    schema: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    bindings: BTreeMap<String, Binding<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<ColumnType>,
}

#[derive(Debug, Deserialize)]
struct ColumnType {
    name: String,
}

/// Result rows keyed by lower-cased column name.
struct ResultSet {
    columns: HashMap<String, usize>,
    rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    fn from_response(response: StatementResponse) -> Self {
        let columns = response
            .result_set_meta_data
            .map(|meta| {
                meta.row_type
                    .into_iter()
                    .enumerate()
                    .map(|(idx, col)| (col.name.to_lowercase(), idx))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            columns,
            rows: response.data,
        }
    }

    fn value<'r>(&self, row: &'r [Option<String>], column: &str) -> Option<&'r str> {
        let idx = *self.columns.get(column)?;
        row.get(idx)?.as_deref()
    }

    fn owned(&self, row: &[Option<String>], column: &str) -> Option<String> {
        self.value(row, column).map(String::from)
    }

    fn log_records(&self) -> Vec<LogRecord> {
        self.rows
            .iter()
            .map(|row| {
                let reason = self.owned(row, "reason");
                let call = self
                    .value(row, "call")
                    .and_then(CallType::parse)
                    .or_else(|| reason.as_deref().map(CallType::from_reason));
                LogRecord {
                    created_at: self.value(row, "created_at").and_then(parse_timestamp),
                    supplier: self.owned(row, "supplier"),
                    client_reference: self
                        .owned(row, "client_reference_id")
                        .unwrap_or_default(),
                    supplier_order_id: self.owned(row, "supplier_order_id"),
                    supplier_order_reference: self.owned(row, "supplier_order_reference"),
                    call,
                    status: self.owned(row, "status"),
                    detailed_status: self.owned(row, "detailed_status"),
                    reason,
                    request: self.owned(row, "request"),
                    response: self.owned(row, "response"),
                    ops_ticket: self.owned(row, "ops_ticket"),
                }
            })
            .collect()
    }
}

/// Parse a SQL API timestamp: epoch seconds with an optional fraction,
/// optionally followed by a timezone offset in minutes (`TIMESTAMP_TZ`).
/// RFC 3339 strings are accepted too.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let epoch = raw.split_whitespace().next()?;
    let (secs, fraction) = epoch.split_once('.').unwrap_or((epoch, ""));
    if let Ok(secs) = secs.parse::<i64>() {
        let digits: String = fraction.chars().take(9).collect();
        let nanos = if digits.is_empty() {
            0
        } else {
            format!("{digits:0<9}").parse::<u32>().ok()?
        };
        return DateTime::from_timestamp(secs, nanos);
    }
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Log warehouse reached through the Snowflake SQL API.
pub struct SnowflakeClient {
    http: reqwest::Client,
    endpoint: String,
    config: WarehouseConfig,
}

impl SnowflakeClient {
    pub fn new(config: &WarehouseConfig) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs + 10))
            .build()
            .map_err(SourceError::http(SERVICE))?;
        Ok(Self {
            http,
            endpoint: format!(
                "{}/api/v2/statements",
                config.base_url.trim_end_matches('/')
            ),
            config: config.clone(),
        })
    }

    async fn execute(&self, statement: &str, bindings: &[&str]) -> Result<ResultSet, SourceError> {
        let request = StatementRequest {
            statement,
            timeout: self.config.timeout_secs,
            warehouse: &self.config.warehouse,
            database: &self.config.database,
            schema: &self.config.schema,
            role: self.config.role.as_deref(),
            bindings: bindings
                .iter()
                .enumerate()
                .map(|(idx, value)| {
                    (
                        (idx + 1).to_string(),
                        Binding {
                            kind: "TEXT",
                            value: *value,
                        },
                    )
                })
                .collect(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.config.token)
            .header(TOKEN_TYPE_HEADER, self.config.token_type.header_value())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("dispute-agent/", env!("CARGO_PKG_VERSION")))
            .json(&request)
            .send()
            .await
            .map_err(SourceError::http(SERVICE))?;

        // 202 means the statement outlived `timeout` and is still running.
        if response.status() == StatusCode::ACCEPTED {
            return Err(SourceError::Status {
                service: SERVICE,
                status: StatusCode::ACCEPTED.as_u16(),
                body: format!(
                    "statement did not finish within {}s",
                    self.config.timeout_secs
                ),
            });
        }

        let body: StatementResponse = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::decode(SERVICE, e))?;
        if let Some(message) = &body.message {
            debug!(message = %message, rows = body.data.len(), "Statement finished");
        }
        // TODO: read partitions beyond the first via `partitionInfo` for very large histories.
        Ok(ResultSet::from_response(body))
    }
}

#[async_trait]
impl LogWarehouse for SnowflakeClient {
    async fn fetch_events(&self, client_reference: &str) -> Result<Vec<LogRecord>, SourceError> {
        let bindings = [client_reference; BOOKING_LOGS_BINDINGS];
        let records = self.execute(BOOKING_LOGS_SQL, &bindings).await?.log_records();
        if records.is_empty() {
            warn!(client_reference, "No booking logs in warehouse");
        } else {
            debug!(client_reference, records = records.len(), "Fetched booking logs");
        }
        Ok(records)
    }

    async fn fetch_history(&self, client_reference: &str) -> Result<Vec<LogRecord>, SourceError> {
        let records = self
            .execute(HISTORY_SQL, &[client_reference])
            .await?
            .log_records();
        debug!(client_reference, events = records.len(), "Fetched booking history");
        Ok(records)
    }

    async fn ping(&self) -> Result<(), SourceError> {
        self.execute("select 1", &[]).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn epoch_timestamps_with_fraction() {
        assert_eq!(
            parse_timestamp("1714658400.250000000"),
            Some(
                Utc.with_ymd_and_hms(2024, 5, 2, 14, 0, 0).unwrap()
                    + chrono::Duration::milliseconds(250)
            )
        );
        assert_eq!(
            parse_timestamp("1714658400"),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 14, 0, 0).unwrap())
        );
    }

    #[test]
    fn timestamp_tz_offset_is_ignored() {
        assert_eq!(
            parse_timestamp("1714658400.000000000 1440"),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 14, 0, 0).unwrap())
        );
    }

    #[test]
    fn rfc3339_fallback_and_garbage() {
        assert_eq!(
            parse_timestamp("2024-05-02T16:00:00+02:00"),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 14, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn result_rows_map_by_column_name() {
        let response: StatementResponse = serde_json::from_value(json!({
            "resultSetMetaData": {"rowType": [
                {"name": "CREATED_AT"}, {"name": "CLIENT_REFERENCE_ID"},
                {"name": "SUPPLIER_ORDER_ID"}, {"name": "CALL"}, {"name": "REASON"}
            ]},
            "data": [
                ["1714658400.000000000", "CR1", "HB-1", null, "booking cancelled"],
                ["1714658460.000000000", "CR1", "HB-2", "book", null]
            ]
        }))
        .unwrap();
        let records = ResultSet::from_response(response).log_records();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].client_reference, "CR1");
        assert_eq!(records[0].call, Some(CallType::Cancel));
        assert_eq!(records[0].supplier, None);
        assert_eq!(records[1].call, Some(CallType::Book));
        assert_eq!(records[1].supplier_order_id.as_deref(), Some("HB-2"));
    }

    #[test]
    fn empty_result_has_no_records() {
        let response: StatementResponse =
            serde_json::from_value(json!({"resultSetMetaData": {"rowType": []}, "data": []}))
                .unwrap();
        assert!(ResultSet::from_response(response).log_records().is_empty());
    }

    #[test]
    fn bindings_are_positional_text() {
        let request = StatementRequest {
            statement: HISTORY_SQL,
            timeout: 60,
            warehouse: "COMPUTE_WH",
            database: "db_apps",
            schema: "public",
            role: None,
            bindings: BTreeMap::from([(
                "1".to_string(),
                Binding {
                    kind: "TEXT",
                    value: "CR1",
                },
            )]),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["bindings"]["1"], json!({"type": "TEXT", "value": "CR1"}));
        assert!(json.get("role").is_none());
    }

    #[test]
    fn booking_logs_query_binds_every_placeholder() {
        assert_eq!(BOOKING_LOGS_SQL.matches('?').count(), BOOKING_LOGS_BINDINGS);
        assert_eq!(HISTORY_SQL.matches('?').count(), 1);
    }
}
