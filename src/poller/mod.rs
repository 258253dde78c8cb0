//! One polling run.
//!
//! A run moves through four states, strictly in order:
//!
//! ```text
//! LOAD_CONFIG ──▶ AUTHENTICATE ──▶ POLL_AND_FORWARD ──▶ DONE
//!     │                │
//!     └── fatal ───────┴──▶ FatalError (no device is queried)
//! ```
//!
//! Inside POLL_AND_FORWARD every failure is confined to one variable: it is
//! logged and the loop moves on to the next variable or device.

use tracing::{error, info, warn};

use crate::config::{load_config, ConfigError, DeviceConfig, Settings};
use crate::http::build_client;
use crate::metrics::{build_sink, MetricPoint, MetricSink};
use crate::particle::{get_access_token, AccessToken, AuthError, ParticleClient};

/// Errors that abort a run before any device is polled.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Counters for a completed run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Devices processed.
    pub devices: usize,
    /// Variable queries issued.
    pub queried: usize,
    /// Points accepted by the backend.
    pub forwarded: usize,
    /// Variables that produced no value.
    pub skipped: usize,
    /// Points the backend did not accept.
    pub failed: usize,
}

/// Run a full poll: load the device config, authenticate once, then poll
/// every variable of every device and forward the values.
///
/// Returns `Err` only when the run cannot start: a bad device config, a
/// failed token exchange, or an HTTP client that cannot be built.
pub async fn run(settings: &Settings) -> Result<RunSummary, FatalError> {
    let config = load_config(&settings.config_path)?;
    info!(
        path = %settings.config_path.display(),
        devices = config.devices().len(),
        variables = config.variable_count(),
        "Device config loaded"
    );

    let http = build_client(settings.timeout).map_err(FatalError::HttpClient)?;

    let token = get_access_token(&http, &settings.particle).await?;
    info!("Access token acquired");

    let client = ParticleClient::new(http.clone(), settings.particle.api_url.clone());
    let sink = build_sink(settings, http);

    let summary = poll_devices(&config, &client, &token, sink.as_ref()).await;

    info!(
        devices = summary.devices,
        queried = summary.queried,
        forwarded = summary.forwarded,
        skipped = summary.skipped,
        failed = summary.failed,
        "Run complete"
    );

    Ok(summary)
}

/// Poll every variable in `config` order and forward each value to `sink`.
///
/// Issues exactly one query per variable spec and at most one forward per
/// query. Never fails: fetch and forward errors are logged and counted.
pub async fn poll_devices(
    config: &DeviceConfig,
    client: &ParticleClient,
    token: &AccessToken,
    sink: &dyn MetricSink,
) -> RunSummary {
    let mut summary = RunSummary::default();

    for device in config.devices() {
        info!(device = %device.name, "Processing device");
        summary.devices += 1;

        for spec in &device.variables {
            summary.queried += 1;

            let Some(value) = client
                .fetch_variable(&device.name, &spec.variable, token)
                .await
            else {
                warn!(
                    device = %device.name,
                    variable = %spec.variable,
                    "Skipping variable with no value"
                );
                summary.skipped += 1;
                continue;
            };

            let point = MetricPoint::new(spec.metric_name(), spec.tags.clone(), value);

            match sink.send_metric(&point).await {
                Ok(()) => summary.forwarded += 1,
                Err(e) => {
                    error!(
                        device = %device.name,
                        variable = %spec.variable,
                        metric = %point.name,
                        backend = sink.name(),
                        error = %e,
                        "Could not forward metric"
                    );
                    summary.failed += 1;
                }
            }
        }
    }

    summary
}
