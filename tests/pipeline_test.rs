// End-to-end tests for a full polling run against mock Particle and
// metrics backends.

use mockito::{Matcher, Server, ServerGuard};
use particle_logger::config::{
    Backend, GraphiteSettings, InfluxSettings, ParticleSettings, Settings, SettingsError,
};
use particle_logger::poller::{self, FatalError, RunSummary};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

const CONFIG: &str =
    r#"{"device1": [{"variable": "temperature", "measurement": "temp", "tags": {"room": "server"}}]}"#;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".json")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn particle(server: &ServerGuard) -> ParticleSettings {
    ParticleSettings {
        api_url: server.url(),
        client_id: "particle".to_string(),
        client_secret: "s3cret".to_string(),
        refresh_token: "my_refresh".to_string(),
    }
}

fn influx(server: &ServerGuard) -> Backend {
    let url = server.url();
    let (host, port) = url.rsplit_once(':').unwrap();
    Backend::Influx(InfluxSettings {
        host: host.to_string(),
        port: port.parse().unwrap(),
        user: "admin".to_string(),
        password: "pw".to_string(),
        database: "sensors".to_string(),
    })
}

fn settings(particle: ParticleSettings, backend: Backend, config_path: &Path) -> Settings {
    Settings {
        particle,
        backend,
        config_path: config_path.to_path_buf(),
        timeout: Duration::from_secs(5),
    }
}

async fn token_mock(server: &mut ServerGuard, status: usize, hits: usize) -> mockito::Mock {
    let body = if status == 200 {
        r#"{"token_type":"bearer","access_token":"abc123","expires_in":7776000}"#
    } else {
        r#"{"error":"invalid_client","error_description":"Client authentication failed"}"#
    };
    server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::UrlEncoded(
            "grant_type".into(),
            "refresh_token".into(),
        ))
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body)
        .expect(hits)
        .create_async()
        .await
}

#[tokio::test]
async fn test_value_forwarded_to_influx() {
    let mut particle_server = Server::new_async().await;
    let mut influx_server = Server::new_async().await;

    let token = token_mock(&mut particle_server, 200, 1).await;
    let device = particle_server
        .mock("GET", "/v1/devices/device1/temperature")
        .match_header("authorization", "Bearer abc123")
        .with_status(200)
        .with_body(r#"{"name": "temperature", "result": 21.5}"#)
        .expect(1)
        .create_async()
        .await;
    let write = influx_server
        .mock("POST", "/write")
        .match_query(Matcher::UrlEncoded("db".into(), "sensors".into()))
        .match_body(Matcher::Regex(r"^temp,room=server value=21\.5 \d+$".to_string()))
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let config = write_config(CONFIG);
    let settings = settings(
        particle(&particle_server),
        influx(&influx_server),
        config.path(),
    );

    let summary = poller::run(&settings).await.unwrap();
    assert_eq!(
        summary,
        RunSummary {
            devices: 1,
            queried: 1,
            forwarded: 1,
            skipped: 0,
            failed: 0,
        }
    );

    token.assert_async().await;
    device.assert_async().await;
    write.assert_async().await;
}

#[tokio::test]
async fn test_value_forwarded_to_graphite() {
    let mut particle_server = Server::new_async().await;
    let _token = token_mock(&mut particle_server, 200, 1).await;
    let _device = particle_server
        .mock("GET", "/v1/devices/device1/temperature")
        .with_status(200)
        .with_body(r#"{"result": 21.5}"#)
        .create_async()
        .await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let carbon = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut line = String::new();
        socket.read_to_string(&mut line).await.unwrap();
        line
    });

    let config = write_config(CONFIG);
    let settings = settings(
        particle(&particle_server),
        Backend::Graphite(GraphiteSettings {
            host: "127.0.0.1".to_string(),
            port,
        }),
        config.path(),
    );

    let summary = poller::run(&settings).await.unwrap();
    assert_eq!(summary.forwarded, 1);

    let line = carbon.await.unwrap();
    let parts: Vec<&str> = line.trim_end_matches('\n').split(' ').collect();
    assert!(line.ends_with('\n'));
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "temp");
    assert_eq!(parts[1], "21.5");
    assert!(parts[2].parse::<i64>().unwrap() > 1_600_000_000);
}

#[tokio::test]
async fn test_offline_device_is_skipped_and_run_succeeds() {
    let mut particle_server = Server::new_async().await;
    let mut influx_server = Server::new_async().await;

    let _token = token_mock(&mut particle_server, 200, 1).await;
    let device = particle_server
        .mock("GET", "/v1/devices/device1/temperature")
        .with_status(408)
        .with_body(r#"{"error": "Timed out."}"#)
        .expect(1)
        .create_async()
        .await;
    let write = influx_server
        .mock("POST", "/write")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let config = write_config(CONFIG);
    let settings = settings(
        particle(&particle_server),
        influx(&influx_server),
        config.path(),
    );

    let summary = poller::run(&settings).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.forwarded, 0);

    device.assert_async().await;
    write.assert_async().await;
}

#[tokio::test]
async fn test_auth_failure_is_fatal_before_any_query() {
    let mut particle_server = Server::new_async().await;
    let influx_server = Server::new_async().await;

    let token = token_mock(&mut particle_server, 401, 1).await;
    let device = particle_server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let config = write_config(CONFIG);
    let settings = settings(
        particle(&particle_server),
        influx(&influx_server),
        config.path(),
    );

    let err = poller::run(&settings).await.unwrap_err();
    assert!(matches!(err, FatalError::Auth(_)));
    assert!(err.to_string().contains("401"));

    token.assert_async().await;
    device.assert_async().await;
}

#[tokio::test]
async fn test_malformed_config_is_fatal_before_any_network_call() {
    let mut particle_server = Server::new_async().await;
    let influx_server = Server::new_async().await;

    let token = particle_server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    let device = particle_server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let config = write_config(r#"{"device1": [{"variable": "temperature"}]}"#);
    let settings = settings(
        particle(&particle_server),
        influx(&influx_server),
        config.path(),
    );

    let err = poller::run(&settings).await.unwrap_err();
    assert!(matches!(err, FatalError::Config(_)));

    token.assert_async().await;
    device.assert_async().await;
}

#[test]
fn test_missing_env_is_fatal() {
    let err = Settings::from_lookup(|name| match name {
        "PARTICLE_CLIENT_ID" => Some("particle".to_string()),
        "PARTICLE_CLIENT_SECRET" => Some("s3cret".to_string()),
        _ => None,
    })
    .unwrap_err();
    assert_eq!(
        err,
        SettingsError::Missing("PARTICLE_REFRESH_TOKEN".to_string())
    );
}
