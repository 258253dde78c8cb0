//! OAuth token exchange against the Particle Cloud.
//!
//! Trades the long-lived refresh token for a short-lived access token with
//! the `refresh_token` grant. One exchange per run; the token is never cached.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::fmt;
use tracing::{debug, info};

use crate::config::ParticleSettings;

/// Short-lived bearer token for the device query endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Token exchange errors. All are fatal: without a token nothing else can run.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("failed to send token request: {0}")]
    Transport(#[source] reqwest::Error),
    #[error(
        "could not retrieve access token (HTTP {status}): {body}; \
         are the refresh token and client credentials correct?"
    )]
    Rejected { status: StatusCode, body: String },
    #[error("failed to parse token response: {0}")]
    InvalidBody(#[source] serde_json::Error),
    #[error("token response has no access_token field")]
    MissingToken,
}

/// OAuth token response. Only the access token is used.
#[derive(Deserialize, Debug)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Exchange the configured refresh token for an access token.
///
/// POSTs `grant_type=refresh_token&refresh_token=...` to the token endpoint,
/// authenticating with the client id and secret over HTTP basic auth.
pub async fn get_access_token(
    http: &Client,
    settings: &ParticleSettings,
) -> Result<AccessToken, AuthError> {
    let token_url = settings.token_url();
    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", settings.refresh_token.as_str()),
    ];

    info!(token_url = %token_url, "Fetching access token");

    let response = http
        .post(&token_url)
        .basic_auth(&settings.client_id, Some(&settings.client_secret))
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await
        .map_err(AuthError::Transport)?;

    let status = response.status();
    let body = response.text().await.map_err(AuthError::Transport)?;

    if status != StatusCode::OK {
        return Err(AuthError::Rejected { status, body });
    }

    let token_response: TokenResponse =
        serde_json::from_str(&body).map_err(AuthError::InvalidBody)?;

    debug!(expires_in = ?token_response.expires_in, "Token exchange successful");

    token_response
        .access_token
        .filter(|t| !t.is_empty())
        .map(AccessToken)
        .ok_or(AuthError::MissingToken)
}
