//! HTTP client for the device's configuration endpoints.
//!
//! The board serves a small JSON API next to its dashboard: `/api/mqttinfo`
//! hands out the broker connection parameters, `/api/netcfg/*` and
//! `/api/rtc/*` are simple passthrough endpoints for network and clock
//! configuration. Only the mqttinfo fetch is part of the reconciliation
//! core's startup path; the rest is operator convenience.

use serde::Deserialize;
use serde_json::Value as Json;
use thiserror::Error;
use tracing::debug;

use crate::device::DeviceIdentity;

/// Errors from the device HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level failure reaching the device
    #[error("http request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Device answered with a non-2xx status
    #[error("device returned http {0}")]
    Status(reqwest::StatusCode),
}

/// Broker connection parameters as served by `/api/mqttinfo`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MqttInfo {
    pub client_id: String,
    pub full_base: String,
    pub broker_ws_host: String,
    pub broker_ws_port: u16,
    #[serde(default)]
    pub broker_ws_path: Option<String>,
    #[serde(default)]
    pub broker_ws_user: Option<String>,
    #[serde(default)]
    pub broker_ws_pass: Option<String>,
}

impl MqttInfo {
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(self.client_id.clone(), self.full_base.clone())
    }

    /// Websocket form of the broker address, for diagnostics display.
    ///
    /// Scheme follows the origin the dashboard itself was reached over.
    pub fn ws_url(&self, secure: bool) -> String {
        let scheme = if secure { "wss" } else { "ws" };
        let path = match self.broker_ws_path.as_deref() {
            None | Some("") => "/",
            Some(p) if p.starts_with('/') => p,
            Some(_) => return self.ws_url_with_slash(scheme),
        };
        format!("{scheme}://{}:{}{path}", self.broker_ws_host, self.broker_ws_port)
    }

    fn ws_url_with_slash(&self, scheme: &str) -> String {
        format!(
            "{scheme}://{}:{}/{}",
            self.broker_ws_host,
            self.broker_ws_port,
            self.broker_ws_path.as_deref().unwrap_or_default()
        )
    }
}

/// Client for one device's HTTP API.
pub struct DeviceApi {
    base_url: String,
    http: reqwest::Client,
}

impl DeviceApi {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Fetches the broker parameters; non-2xx is a fetch failure.
    pub async fn fetch_mqtt_info(&self) -> Result<MqttInfo, ApiError> {
        let info = self.get_json::<MqttInfo>("/api/mqttinfo").await?;
        debug!("mqttinfo: client {} base {}", info.client_id, info.full_base);
        Ok(info)
    }

    /// Current network configuration of the device.
    pub async fn net_config(&self) -> Result<Json, ApiError> {
        self.get_json("/api/netcfg/get").await
    }

    /// Writes network configuration, form-encoded as the firmware expects.
    pub async fn set_net_config(&self, form: &[(&str, String)]) -> Result<Json, ApiError> {
        self.post_form("/api/netcfg/set", form).await
    }

    /// Current RTC reading of the device.
    pub async fn rtc(&self) -> Result<Json, ApiError> {
        self.get_json("/api/rtc/get").await
    }

    /// Sets the device RTC from a unix timestamp (seconds).
    pub async fn set_rtc(&self, unix_seconds: i64) -> Result<Json, ApiError> {
        self.post_form("/api/rtc/set", &[("ts", unix_seconds.to_string())])
            .await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }
        Ok(response.json().await?)
    }

    async fn post_form(&self, path: &str, form: &[(&str, String)]) -> Result<Json, ApiError> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .form(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }
        Ok(response.json().await?)
    }
}
