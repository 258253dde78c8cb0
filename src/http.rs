use reqwest::Client;
use std::time::Duration;

/// User agent sent with every HTTP request.
pub const USER_AGENT: &str = concat!("particle-logger/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by every request of a run.
///
/// `timeout` bounds each whole request (connect, send, and body read).
pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
}
