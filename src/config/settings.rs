//! Runtime settings read from the environment.
//!
//! Settings are built once at startup and passed by reference to every
//! component. Nothing else in the crate reads the environment.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::DEFAULT_CONFIG_PATH;

pub const DEFAULT_API_URL: &str = "https://api.particle.io";
pub const DEFAULT_INFLUXDB_PORT: u16 = 8086;
pub const DEFAULT_GRAPHITE_PORT: u16 = 2003;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Settings loading errors. All are fatal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SettingsError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: String, value: String },
}

/// Particle Cloud API credentials and endpoint.
#[derive(Clone)]
pub struct ParticleSettings {
    pub api_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

impl ParticleSettings {
    /// OAuth token endpoint under the configured API base URL.
    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.api_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for ParticleSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParticleSettings")
            .field("api_url", &self.api_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// InfluxDB (v1 HTTP write API) connection settings.
#[derive(Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl InfluxSettings {
    /// Base URL of the InfluxDB HTTP API.
    ///
    /// A host given with a scheme keeps it, otherwise `http://` is assumed.
    /// `port` is only appended when the host does not carry its own.
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        let (scheme, authority) = match host.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("http", host),
        };
        if has_port(authority) {
            format!("{}://{}", scheme, authority)
        } else {
            format!("{}://{}:{}", scheme, authority, self.port)
        }
    }
}

/// Whether `authority` (`host`, `host:port`, `[v6]`, `[v6]:port`) ends in a port.
fn has_port(authority: &str) -> bool {
    let Some((host, port)) = authority.rsplit_once(':') else {
        return false;
    };
    let bracketed_or_plain = host.ends_with(']') || !host.contains(':');
    bracketed_or_plain && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())
}

impl fmt::Debug for InfluxSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Graphite plaintext endpoint.
#[derive(Debug, Clone)]
pub struct GraphiteSettings {
    pub host: String,
    pub port: u16,
}

/// Metrics backend selected for this deployment.
#[derive(Debug, Clone)]
pub enum Backend {
    Influx(InfluxSettings),
    Graphite(GraphiteSettings),
}

impl Backend {
    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Influx(_) => "influxdb",
            Backend::Graphite(_) => "graphite",
        }
    }
}

/// Complete runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub particle: ParticleSettings,
    pub backend: Backend,
    /// Path of the device configuration file.
    pub config_path: PathBuf,
    /// Upper bound on every network call.
    pub timeout: Duration,
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, which returns the value of a variable
    /// if it is set. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let particle = ParticleSettings {
            api_url: env
                .optional("PARTICLE_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            client_id: env.required("PARTICLE_CLIENT_ID")?,
            client_secret: env.required("PARTICLE_CLIENT_SECRET")?,
            refresh_token: env.required("PARTICLE_REFRESH_TOKEN")?,
        };

        let backend_name = env
            .optional("METRICS_BACKEND")
            .unwrap_or_else(|| "influxdb".to_string());
        let backend = match backend_name.to_ascii_lowercase().as_str() {
            "influxdb" | "influx" => Backend::Influx(InfluxSettings {
                host: env.required("INFLUXDB_HOST")?,
                port: env.parse_or("INFLUXDB_PORT", DEFAULT_INFLUXDB_PORT)?,
                user: env.required("INFLUXDB_USER")?,
                password: env.required("INFLUXDB_PASSWORD")?,
                database: env.required("INFLUXDB_DATABASE")?,
            }),
            "graphite" => Backend::Graphite(GraphiteSettings {
                host: env.required("GRAPHITE_HOST")?,
                port: env.parse_or("GRAPHITE_PORT", DEFAULT_GRAPHITE_PORT)?,
            }),
            _ => {
                return Err(SettingsError::Invalid {
                    name: "METRICS_BACKEND".to_string(),
                    value: backend_name,
                })
            }
        };

        let config_path = env
            .optional("PARTICLE_LOGGER_CONFIG")
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
            .into();

        let timeout_secs: u64 =
            env.parse_or("PARTICLE_LOGGER_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(SettingsError::Invalid {
                name: "PARTICLE_LOGGER_TIMEOUT_SECS".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            particle,
            backend,
            config_path,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, name: &str) -> Result<String, SettingsError> {
        self.optional(name)
            .ok_or_else(|| SettingsError::Missing(name.to_string()))
    }

    fn parse_or<T: std::str::FromStr>(&self, name: &str, default: T) -> Result<T, SettingsError> {
        match self.optional(name) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|_| SettingsError::Invalid {
                name: name.to_string(),
                value,
            }),
        }
    }
}
