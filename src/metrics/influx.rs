//! InfluxDB v1 HTTP write API sink.
//!
//! Each point is POSTed to `/write?db=<database>&precision=s` as one line:
//! ```text
//! measurement,tag1=val1,tag2=val2 value=<v> <unix-seconds>
//! ```
//!
//! See: <https://docs.influxdata.com/influxdb/v1/guides/write_data/>

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::info;

use super::{ForwardError, MetricPoint, MetricSink};
use crate::config::InfluxSettings;

const BACKEND: &str = "influxdb";

/// Format a point as one line-protocol record with a single `value` field.
///
/// Tags are written in key order. The timestamp is in seconds, matching
/// `precision=s` on the write request.
pub fn to_line_protocol(point: &MetricPoint) -> String {
    let mut line = escape_measurement(&point.name);

    for (key, value) in &point.tags {
        line.push(',');
        line.push_str(&escape_tag(key));
        line.push('=');
        line.push_str(&escape_tag(value));
    }

    line.push_str(" value=");
    line.push_str(&point.value.to_string());
    line.push(' ');
    line.push_str(&point.timestamp.timestamp().to_string());
    line
}

/// Spaces and commas must be escaped in measurement names.
fn escape_measurement(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(' ', "\\ ")
}

/// Commas, equals signs, and spaces must be escaped in tag keys and values.
fn escape_tag(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

/// Writes points to an InfluxDB database.
pub struct InfluxSink {
    http: Client,
    settings: InfluxSettings,
    write_url: String,
}

impl InfluxSink {
    pub fn new(http: Client, settings: InfluxSettings) -> Self {
        let write_url = format!("{}/write", settings.base_url());
        Self {
            http,
            settings,
            write_url,
        }
    }
}

#[async_trait]
impl MetricSink for InfluxSink {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn send_metric(&self, point: &MetricPoint) -> Result<(), ForwardError> {
        if !point.value.is_finite() {
            return Err(ForwardError::NonFiniteValue(point.value));
        }

        let body = to_line_protocol(point);

        info!(
            measurement = %point.name,
            value = point.value,
            database = %self.settings.database,
            "Collecting measurement"
        );

        let response = self
            .http
            .post(&self.write_url)
            .query(&[("db", self.settings.database.as_str()), ("precision", "s")])
            .basic_auth(&self.settings.user, Some(&self.settings.password))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|source| ForwardError::Transport {
                backend: BACKEND,
                source,
            })?;

        // The write API acknowledges with 204 No Content; anything else,
        // including other 2xx codes, means the point was not stored.
        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(ForwardError::Rejected {
                backend: BACKEND,
                status,
                body,
            });
        }

        Ok(())
    }
}
