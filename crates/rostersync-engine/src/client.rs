//! HTTP client for the fleet management API.
//!
//! Implements [`DriverDirectory`] against the `/fleet/drivers` endpoints.
//! Responses are parsed into [`RemoteDriver`] here and HTTP statuses are
//! classified into [`SyncError`] here; nothing above this module knows it
//! is talking HTTP.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::directory::{DriverDirectory, DriverRef};
use crate::error::{SyncError, SyncResult};
use crate::external_id::ExternalId;
use crate::model::{ActivationStatus, DriverCreatePayload, DriverPatch, RemoteDriver};

/// Page size requested from the listing endpoint.
const PAGE_LIMIT: u32 = 512;

/// Hard cap on pages per scan, guarding against a cursor that never ends.
const MAX_PAGES: u32 = 200;

/// Connection settings for [`FleetClient`].
#[derive(Clone)]
pub struct FleetClientConfig {
    pub base_url: String,
    pub api_token: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for FleetClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FleetClientConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &"[redacted]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Result of a connectivity probe against the directory.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct FleetClient {
    base_url: String,
    api_token: String,
    http_client: Client,
}

impl fmt::Debug for FleetClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FleetClient")
            .field("base_url", &self.base_url)
            .field("api_token", &"[redacted]")
            .finish_non_exhaustive()
    }
}

impl FleetClient {
    pub fn new(config: FleetClientConfig) -> SyncResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("rostersync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(FleetClient {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token,
            http_client,
        })
    }

    /// Cheap connectivity probe: one driver from the listing endpoint.
    pub async fn health_check(&self) -> HealthCheck {
        let query = [
            ("driverActivationStatus", "active".to_string()),
            ("limit", "1".to_string()),
        ];
        match self.get::<DriversPage>(&self.drivers_url(), &query).await {
            Ok(_) => HealthCheck {
                healthy: true,
                error: None,
            },
            Err(e) => HealthCheck {
                healthy: false,
                error: Some(e.to_string()),
            },
        }
    }

    fn drivers_url(&self) -> String {
        format!("{}/fleet/drivers", self.base_url)
    }

    fn driver_url(&self, driver: &DriverRef) -> String {
        format!("{}/fleet/drivers/{}", self.base_url, driver.path_segment())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> SyncResult<T> {
        debug!("GET {url}");
        let mut builder = self.http_client.get(url).bearer_auth(&self.api_token);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        let response = builder.send().await?;
        self.handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> SyncResult<T> {
        debug!("POST {url}");
        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> SyncResult<T> {
        debug!("PATCH {url}");
        let response = self
            .http_client
            .patch(url)
            .bearer_auth(&self.api_token)
            .json(body)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> SyncResult<T> {
        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body)
                .map_err(|e| SyncError::parse(format!("unexpected response shape: {e}")))
        } else {
            self.handle_error_response(response).await
        }
    }

    async fn handle_error_response<T>(&self, response: Response) -> SyncResult<T> {
        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get("Retry-After")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());

        match status {
            StatusCode::NOT_FOUND => Err(SyncError::NotFound(body)),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(retry_after_secs, "rate limited by the directory");
                Err(SyncError::RateLimited { retry_after_secs })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::Auth(format!(
                "status {}: {body}",
                status.as_u16()
            ))),
            _ => Err(SyncError::Api {
                status: status.as_u16(),
                detail: if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    body
                },
            }),
        }
    }

    async fn list_by_status(&self, status: ActivationStatus) -> SyncResult<Vec<RemoteDriver>> {
        let url = self.drivers_url();
        let mut drivers = Vec::new();
        let mut after: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut query = vec![
                ("driverActivationStatus", status.as_str().to_string()),
                ("limit", PAGE_LIMIT.to_string()),
            ];
            if let Some(token) = &after {
                query.push(("after", token.clone()));
            }
            let page: DriversPage = self.get(&url, &query).await?;
            drivers.extend(page.drivers);
            after = page
                .pagination
                .and_then(|cursor| cursor.after)
                .filter(|token| !token.is_empty());
            if after.is_none() {
                return Ok(drivers);
            }
        }
        Err(SyncError::parse(format!(
            "driver listing did not terminate within {MAX_PAGES} pages"
        )))
    }
}

#[derive(Debug, Deserialize)]
struct DriversPage {
    #[serde(default)]
    drivers: Vec<RemoteDriver>,
    #[serde(default)]
    pagination: Option<PageCursor>,
}

#[derive(Debug, Deserialize)]
struct PageCursor {
    #[serde(default)]
    after: Option<String>,
}

#[async_trait]
impl DriverDirectory for FleetClient {
    async fn find_by_external_id(&self, id: &ExternalId) -> SyncResult<Option<RemoteDriver>> {
        let url = self.driver_url(&DriverRef::External(id.clone()));
        match self.get::<RemoteDriver>(&url, &[]).await {
            Ok(driver) => {
                debug!(external_id = %id, driver_id = %driver.id, "external id lookup hit");
                Ok(Some(driver))
            }
            Err(SyncError::NotFound(_)) => {
                debug!(external_id = %id, "external id unknown to the directory");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn find_by_name(
        &self,
        first_name: &str,
        last_name: &str,
    ) -> SyncResult<Vec<RemoteDriver>> {
        // The listing endpoint has no name filter, so scan and compare.
        let all = self.list_all().await?;
        Ok(all
            .into_iter()
            .filter(|driver| driver.matches_name(first_name, last_name))
            .collect())
    }

    async fn create(&self, payload: &DriverCreatePayload) -> SyncResult<RemoteDriver> {
        info!(name = %payload.name, username = %payload.username, "creating driver");
        self.post(&self.drivers_url(), payload).await
    }

    async fn update(&self, driver: &DriverRef, patch: &DriverPatch) -> SyncResult<RemoteDriver> {
        debug!(driver = %driver, "updating driver");
        self.patch(&self.driver_url(driver), patch).await
    }

    async fn deactivate(&self, driver: &DriverRef, reason: &str) -> SyncResult<RemoteDriver> {
        info!(driver = %driver, "deactivating driver");
        let patch = DriverPatch {
            driver_activation_status: Some(ActivationStatus::Deactivated),
            notes: Some(reason.to_string()),
            ..DriverPatch::default()
        };
        self.patch(&self.driver_url(driver), &patch).await
    }

    async fn add_external_id(
        &self,
        driver: &DriverRef,
        id: &ExternalId,
    ) -> SyncResult<RemoteDriver> {
        // The API replaces the whole externalIds map on patch, so read,
        // merge, then write the union back.
        let current: RemoteDriver = self.get(&self.driver_url(driver), &[]).await?;
        let mut external_ids = current.external_ids;
        external_ids.insert(id.key().to_string(), id.value().to_string());
        info!(driver_id = %current.id, external_id = %id, "adding external id");
        let patch = DriverPatch {
            external_ids: Some(external_ids),
            ..DriverPatch::default()
        };
        self.patch(&self.driver_url(&DriverRef::Id(current.id.clone())), &patch)
            .await
    }

    async fn list_all(&self) -> SyncResult<Vec<RemoteDriver>> {
        let active = self.list_by_status(ActivationStatus::Active).await?;
        let deactivated = self.list_by_status(ActivationStatus::Deactivated).await?;
        debug!(
            active = active.len(),
            deactivated = deactivated.len(),
            "fetched full driver listing"
        );
        Ok(active.into_iter().chain(deactivated).collect())
    }
}
