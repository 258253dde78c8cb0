use anyhow::{Context, Result};
use particle_logger::config::Settings;
use particle_logger::poller;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Optional .env in the working directory; real env vars take precedence.
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "particle_logger=info".into()),
        )
        .init();

    info!("Particle logger starting...");

    let settings = Settings::from_env().context("Invalid environment")?;

    info!(
        api_url = %settings.particle.api_url,
        backend = settings.backend.kind(),
        config_path = %settings.config_path.display(),
        timeout_secs = settings.timeout.as_secs(),
        "Configuration loaded"
    );

    let summary = poller::run(&settings)
        .await
        .context("Polling run aborted")?;

    info!(
        forwarded = summary.forwarded,
        skipped = summary.skipped,
        failed = summary.failed,
        "Particle logger finished"
    );

    Ok(())
}
