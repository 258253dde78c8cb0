//! Graphite plaintext protocol sink.
//!
//! Each point is sent on its own TCP connection as a single line:
//! ```text
//! <metric-name> <value> <unix-timestamp>\n
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::info;

use super::{ForwardError, MetricPoint, MetricSink};

const BACKEND: &str = "graphite";

/// Format a point as one Graphite plaintext line, trailing newline included.
///
/// Tags have no place in the plaintext line and are left out. The timestamp
/// is whole seconds since the Unix epoch.
pub fn format_line(point: &MetricPoint) -> String {
    format!(
        "{} {} {}\n",
        point.name,
        point.value,
        point.timestamp.timestamp()
    )
}

/// Writes points to a Graphite (carbon) plaintext listener.
pub struct GraphiteSink {
    host: String,
    port: u16,
    timeout: Duration,
}

impl GraphiteSink {
    pub fn new(host: String, port: u16, timeout: Duration) -> Self {
        Self {
            host,
            port,
            timeout,
        }
    }

    async fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.write_all(line.as_bytes()).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl MetricSink for GraphiteSink {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn send_metric(&self, point: &MetricPoint) -> Result<(), ForwardError> {
        if !point.value.is_finite() {
            return Err(ForwardError::NonFiniteValue(point.value));
        }

        let line = format_line(point);

        info!(
            metric = %point.name,
            value = point.value,
            host = %self.host,
            port = self.port,
            "Sending metric to Graphite"
        );

        match tokio::time::timeout(self.timeout, self.write_line(&line)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(ForwardError::Io {
                backend: BACKEND,
                source,
            }),
            Err(_) => Err(ForwardError::Timeout {
                backend: BACKEND,
                timeout: self.timeout,
            }),
        }
    }
}
