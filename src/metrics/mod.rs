//! Metric forwarding.
//!
//! A [`MetricSink`] writes one [`MetricPoint`] to a time-series backend per
//! call. Exactly one sink is chosen per deployment by [`build_sink`]; callers
//! only ever see the trait.
//!
//! ```text
//! MetricPoint ──▶ MetricSink ──┬─▶ GraphiteSink  (plaintext over TCP)
//!                              └─▶ InfluxSink    (HTTP /write API)
//! ```

pub mod graphite;
pub mod influx;

pub use graphite::GraphiteSink;
pub use influx::InfluxSink;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::{Backend, Settings};

/// One observation, built per successful fetch and dropped after forwarding.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    /// Metric name (Graphite) or measurement (InfluxDB).
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl MetricPoint {
    /// Point stamped with the current time.
    pub fn new(name: impl Into<String>, tags: BTreeMap<String, String>, value: f64) -> Self {
        Self::with_timestamp(name, tags, value, Utc::now())
    }

    pub fn with_timestamp(
        name: impl Into<String>,
        tags: BTreeMap<String, String>,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            tags,
            value,
            timestamp,
        }
    }
}

/// Forwarding errors. Scoped to one point; the run continues.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("{backend} is unreachable: {source}")]
    Io {
        backend: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{backend} did not answer within {timeout:?}")]
    Timeout {
        backend: &'static str,
        timeout: Duration,
    },
    #[error("request to {backend} failed: {source}")]
    Transport {
        backend: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{backend} rejected the point (HTTP {status}): {body}")]
    Rejected {
        backend: &'static str,
        status: StatusCode,
        body: String,
    },
    #[error("value {0} cannot be written")]
    NonFiniteValue(f64),
}

/// Destination for metric points.
///
/// Implementations perform one network write per call with no buffering,
/// batching, or retries.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Backend name used in logs (e.g. "graphite", "influxdb").
    fn name(&self) -> &'static str;

    /// Write a single point.
    async fn send_metric(&self, point: &MetricPoint) -> Result<(), ForwardError>;
}

/// Build the sink selected by `settings.backend`.
///
/// `http` is only used by HTTP-based backends.
pub fn build_sink(settings: &Settings, http: Client) -> Box<dyn MetricSink> {
    match &settings.backend {
        Backend::Influx(influx) => Box::new(InfluxSink::new(http, influx.clone())),
        Backend::Graphite(graphite) => Box::new(GraphiteSink::new(
            graphite.host.clone(),
            graphite.port,
            settings.timeout,
        )),
    }
}
