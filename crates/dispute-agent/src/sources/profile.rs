//! Customer profile REST backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use resolution::{BookingProfile, CancellationLog};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ensure_success, ProfileService};
use crate::config::ProfileConfig;
use crate::error::{Service, SourceError};

const SERVICE: Service = Service::ProfileService;
const RELATED_LIMIT: &str = "10";

#[derive(Debug, Deserialize)]
struct SearchOne {
    #[serde(default)]
    data: Option<BookingProfile>,
}

#[derive(Debug, Deserialize)]
struct SearchMany {
    #[serde(default)]
    data: Vec<BookingProfile>,
}

#[derive(Debug, Deserialize)]
struct CancellationLogs {
    #[serde(default)]
    logs: Vec<CancellationLog>,
}

pub struct ProfileClient {
    http: reqwest::Client,
    base: Url,
}

impl ProfileClient {
    pub fn new(config: &ProfileConfig) -> Result<Self, SourceError> {
        let base = Url::parse(&config.base_url).map_err(|e| SourceError::Configuration {
            service: SERVICE,
            message: format!("invalid base URL {:?}: {e}", config.base_url),
        })?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key)).map_err(|_| {
            SourceError::Configuration {
                service: SERVICE,
                message: "API key contains characters not allowed in a header".into(),
            }
        })?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(SourceError::http(SERVICE))?;
        Ok(Self { http, base })
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::Configuration {
                service: SERVICE,
                message: format!("base URL {} cannot carry a path", self.base),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn search_booking(
        &self,
        client_reference: &str,
    ) -> Result<Option<BookingProfile>, SourceError> {
        let response = self
            .http
            .get(self.endpoint(&["bookings", "search"])?)
            .query(&[
                ("client_reference_id", client_reference),
                ("include_logs", "true"),
                ("include_errors", "true"),
            ])
            .send()
            .await
            .map_err(SourceError::http(SERVICE))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: SearchOne = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::decode(SERVICE, e))?;
        Ok(body.data)
    }

    async fn cancellation_logs(
        &self,
        client_reference: &str,
    ) -> Result<Vec<CancellationLog>, SourceError> {
        let response = self
            .http
            .get(self.endpoint(&["bookings", client_reference, "cancellation-logs"])?)
            .send()
            .await
            .map_err(SourceError::http(SERVICE))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body: CancellationLogs = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::decode(SERVICE, e))?;
        Ok(body.logs)
    }
}

#[async_trait]
impl ProfileService for ProfileClient {
    async fn fetch_booking(
        &self,
        client_reference: &str,
    ) -> Result<Option<BookingProfile>, SourceError> {
        let Some(mut profile) = self.search_booking(client_reference).await? else {
            warn!(client_reference, "Booking not found in profile service");
            return Ok(None);
        };

        // Missing cancellation logs do not invalidate the booking itself.
        match self.cancellation_logs(client_reference).await {
            Ok(logs) if !logs.is_empty() => profile.cancellation_logs = logs,
            Ok(_) => {}
            Err(e) => warn!(client_reference, "Cancellation logs unavailable: {e}"),
        }

        debug!(
            client_reference,
            status = %profile.status,
            valid = profile.is_valid,
            errors = profile.errors.len(),
            cancellation_logs = profile.cancellation_logs.len(),
            "Fetched booking profile"
        );
        Ok(Some(profile))
    }

    async fn fetch_related_bookings(
        &self,
        profile: &BookingProfile,
    ) -> Result<Vec<BookingProfile>, SourceError> {
        let Some(guest_email) = profile.guest_email.as_deref().filter(|e| !e.is_empty()) else {
            return Ok(Vec::new());
        };

        let mut query = vec![("guest_email", guest_email), ("limit", RELATED_LIMIT)];
        if let Some(check_in) = profile.check_in_date.as_deref() {
            query.push(("check_in_date", check_in));
        }
        if let Some(property_id) = profile.property_id.as_deref() {
            query.push(("property_id", property_id));
        }

        let response = self
            .http
            .get(self.endpoint(&["bookings", "search"])?)
            .query(&query)
            .send()
            .await
            .map_err(SourceError::http(SERVICE))?;
        let body: SearchMany = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| SourceError::decode(SERVICE, e))?;

        Ok(body
            .data
            .into_iter()
            .filter(|b| b.client_reference_id != profile.client_reference_id)
            .collect())
    }

    async fn ping(&self) -> Result<(), SourceError> {
        let response = self
            .http
            .get(self.endpoint(&["health"])?)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(SourceError::http(SERVICE))?;
        ensure_success(SERVICE, response).await.map(|_| ())
    }
}
