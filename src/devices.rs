//! MDM device-inventory implementation of the [`DeviceInventory`] contract.
//!
//! A single authenticated GET against the devices endpoint. A non-success
//! status or transport error becomes a structured [`DeviceFetchError`], never
//! an empty list — the aggregator must be able to tell "no devices" from
//! "fetch failed".

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::sources::{DeviceFetchError, DeviceInventory};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct MdmInventoryClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MdmInventoryClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        MdmInventoryClient {
            http: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl DeviceInventory for MdmInventoryClient {
    async fn list_devices(&self) -> Result<Vec<Value>, DeviceFetchError> {
        let url = format!("{}/devices", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| DeviceFetchError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<failed to decode response body>"));
        if !status.is_success() {
            return Err(DeviceFetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let devices: Vec<Value> = serde_json::from_str(&body)
            .map_err(|e| DeviceFetchError::Payload(format!("device inventory unreadable: {e}")))?;
        info!(url = %url, count = devices.len(), "Fetched device inventory");
        Ok(devices)
    }
}
