use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{error, info};

use super::auth::AccessToken;

/// Body of a successful variable read.
#[derive(Debug, Deserialize)]
struct VariableResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
}

/// Per-variable fetch errors. None of these abort the run.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("device appears to be offline (HTTP 408)")]
    DeviceOffline,
    #[error(
        "HTTP {status}: does that device exist, is it yours, and does it publish that variable?"
    )]
    Rejected { status: StatusCode },
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unusable result: {0}")]
    InvalidResult(String),
}

/// HTTP client for reading device variables from the Particle Cloud API.
pub struct ParticleClient {
    http: Client,
    base_url: String,
}

impl ParticleClient {
    /// Create a client against `base_url` (e.g. `https://api.particle.io`).
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// URL of a variable on a device. Both names are encoded as path segments.
    pub fn variable_url(&self, device: &str, variable: &str) -> String {
        format!(
            "{}/v1/devices/{}/{}",
            self.base_url,
            urlencoding::encode(device),
            urlencoding::encode(variable)
        )
    }

    /// Fetch a variable, logging and swallowing any failure.
    ///
    /// Returns `None` when the device is offline, the request is rejected,
    /// the network call fails, or the result is not numeric.
    pub async fn fetch_variable(
        &self,
        device: &str,
        variable: &str,
        token: &AccessToken,
    ) -> Option<f64> {
        match self.try_fetch_variable(device, variable, token).await {
            Ok(value) => Some(value),
            Err(e) => {
                error!(
                    device = %device,
                    variable = %variable,
                    error = %e,
                    "Could not fetch variable"
                );
                None
            }
        }
    }

    /// Fetch a variable and classify the outcome.
    ///
    /// - 200 → numeric `result`
    /// - 408 → [`FetchError::DeviceOffline`]
    /// - other status → [`FetchError::Rejected`]
    pub async fn try_fetch_variable(
        &self,
        device: &str,
        variable: &str,
        token: &AccessToken,
    ) -> Result<f64, FetchError> {
        let url = self.variable_url(device, variable);

        info!(device = %device, variable = %variable, "Fetching variable");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(FetchError::Transport)?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::REQUEST_TIMEOUT => return Err(FetchError::DeviceOffline),
            status => return Err(FetchError::Rejected { status }),
        }

        let body: VariableResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                FetchError::InvalidResult(format!("malformed response body: {}", e))
            } else {
                FetchError::Transport(e)
            }
        })?;

        parse_result(body.result)
    }
}

fn parse_result(result: Option<serde_json::Value>) -> Result<f64, FetchError> {
    match result {
        None | Some(serde_json::Value::Null) => {
            Err(FetchError::InvalidResult("missing `result` field".to_string()))
        }
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| FetchError::InvalidResult(format!("{} is out of range", n))),
        Some(other) => Err(FetchError::InvalidResult(format!(
            "expected a number, got {}",
            other
        ))),
    }
}
