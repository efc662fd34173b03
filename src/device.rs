use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::attendance::RawPunch;
use crate::service::ports::{DeviceClient, DeviceError};

const PUNCH_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const MAX_PAGES: usize = 500;

#[derive(Debug, Deserialize)]
struct TransactionPage {
    next: Option<String>,
    #[serde(default)]
    data: Vec<Transaction>,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    emp_code: Option<String>,
    punch_time: Option<String>,
    punch_state: Option<String>,
    terminal_sn: Option<String>,
}

impl Transaction {
    /// Unparseable fields become `None` so the reconciler can report them.
    fn into_raw(self, device_id: &str) -> RawPunch {
        RawPunch {
            subject_id: self.emp_code,
            timestamp: self
                .punch_time
                .as_deref()
                .and_then(|t| NaiveDateTime::parse_from_str(t.trim(), PUNCH_TIME_FORMAT).ok()),
            direction: self.punch_state.as_deref().and_then(|s| s.trim().parse().ok()),
            device_id: self
                .terminal_sn
                .filter(|sn| !sn.is_empty())
                .or_else(|| Some(device_id.to_string())),
        }
    }
}

/// Client for the biometric gateway's transaction API (`/iclock/api/transactions/`).
#[derive(Clone)]
pub struct HttpDeviceClient {
    client: Client,
    base_url: Option<String>,
    token: Option<String>,
}

impl HttpDeviceClient {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.device_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config
                .device_gateway_url
                .as_ref()
                .map(|u| u.trim_end_matches('/').to_string()),
            token: config.device_api_token.clone(),
        })
    }

    /// Builds a page request. Only the first page carries the device filter;
    /// `next` links from the gateway already include it.
    fn page_request(
        &self,
        url: &str,
        device_id: Option<&str>,
    ) -> Result<reqwest::Request, DeviceError> {
        let mut request = self.client.get(url);
        if let Some(device_id) = device_id {
            request = request.query(&[("terminal_sn", device_id)]);
        }
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Token {}", token));
        }
        request
            .build()
            .map_err(|e| DeviceError::Request(e.to_string()))
    }

    async fn fetch_page(&self, request: reqwest::Request) -> Result<TransactionPage, DeviceError> {
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| DeviceError::Request(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DeviceError::Status {
                status: status.as_u16(),
            });
        }

        response
            .json::<TransactionPage>()
            .await
            .map_err(|e| DeviceError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DeviceClient for HttpDeviceClient {
    async fn fetch_punch_events(&self, device_id: &str) -> Result<Vec<RawPunch>, DeviceError> {
        let base = self.base_url.as_deref().ok_or(DeviceError::NotConfigured)?;

        let mut punches = Vec::new();
        let mut request = Some(self.page_request(
            &format!("{}/iclock/api/transactions/", base),
            Some(device_id),
        )?);
        let mut pages = 0;

        while let Some(current) = request.take() {
            if pages == MAX_PAGES {
                warn!(device_id, pages, "Stopped following device pages");
                break;
            }
            let page = self.fetch_page(current).await?;
            pages += 1;
            debug!(device_id, page = pages, rows = page.data.len(), "Fetched device page");

            punches.extend(page.data.into_iter().map(|t| t.into_raw(device_id)));
            if let Some(next) = page.next.filter(|n| !n.is_empty()) {
                request = Some(self.page_request(&next, None)?);
            }
        }

        Ok(punches)
    }
}
