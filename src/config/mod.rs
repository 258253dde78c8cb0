//! Device configuration: which variables to poll on which device, and how to
//! label the resulting metrics.
//!
//! The file is a top-level mapping of device name to a list of variable
//! specs. JSON is the default format; files ending in `.toml` are read as TOML.
//!
//! ```json
//! {
//!   "device1": [
//!     {"variable": "temperature", "measurement": "temp", "tags": {"room": "server"}}
//!   ]
//! }
//! ```
//!
//! Device order in the file is preserved and is the order devices are polled in.

pub mod settings;

pub use settings::{
    Backend, GraphiteSettings, InfluxSettings, ParticleSettings, Settings, SettingsError,
};

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

/// Default device configuration path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// One variable to poll on a device.
///
/// The metric is identified either by a flat `name` or by a `measurement`
/// plus `tags`. Exactly one of `name` / `measurement` must be set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VariableSpec {
    /// Name of the cloud variable exposed by the device.
    pub variable: String,

    /// Flat metric name.
    #[serde(default)]
    pub name: Option<String>,

    /// Measurement name (used with `tags`).
    #[serde(default)]
    pub measurement: Option<String>,

    /// Tag set attached to every point for this variable.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl VariableSpec {
    /// Metric identifier: the measurement if set, otherwise the flat name.
    pub fn metric_name(&self) -> &str {
        self.measurement
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or_default()
    }

    fn validate(&self) -> Result<(), String> {
        if self.variable.trim().is_empty() {
            return Err("`variable` is empty".to_string());
        }

        let metric = match (&self.name, &self.measurement) {
            (None, None) => {
                return Err("missing metric identifier (`name` or `measurement`)".to_string())
            }
            (Some(_), Some(_)) => {
                return Err("`name` and `measurement` are mutually exclusive".to_string())
            }
            (Some(m), None) | (None, Some(m)) => m,
        };
        if metric.trim().is_empty() {
            return Err("metric identifier is empty".to_string());
        }
        // Graphite plaintext is space- and newline-delimited.
        if let Some(c) = metric.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(format!(
                "metric identifier `{}` contains forbidden character {:?}",
                metric.escape_debug(),
                c
            ));
        }

        for (key, value) in &self.tags {
            if key.is_empty() {
                return Err("tag key is empty".to_string());
            }
            if value.is_empty() {
                return Err(format!("tag `{}` has an empty value", key));
            }
        }

        Ok(())
    }
}

/// A device and the variables to poll on it, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub name: String,
    pub variables: Vec<VariableSpec>,
}

/// Complete device configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceConfig {
    devices: Vec<Device>,
}

impl DeviceConfig {
    /// Build a config directly. Entries are not validated.
    pub fn from_devices(devices: Vec<Device>) -> Self {
        Self { devices }
    }

    /// Devices in the order they appear in the file.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Total number of variable specs across all devices.
    pub fn variable_count(&self) -> usize {
        self.devices.iter().map(|d| d.variables.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for device in &self.devices {
            for (index, spec) in device.variables.iter().enumerate() {
                spec.validate().map_err(|reason| ConfigError::InvalidEntry {
                    device: device.name.clone(),
                    index,
                    reason,
                })?;
            }
        }
        Ok(())
    }
}

// Deserialized by hand so device order follows the document, and duplicate
// device keys are caught instead of silently overwritten.
impl<'de> Deserialize<'de> for DeviceConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DevicesVisitor;

        impl<'de> Visitor<'de> for DevicesVisitor {
            type Value = DeviceConfig;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of device name to a list of variable specs")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut devices = Vec::new();
                let mut seen = HashSet::new();
                while let Some((name, variables)) =
                    map.next_entry::<String, Vec<VariableSpec>>()?
                {
                    if !seen.insert(name.clone()) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate device `{}`",
                            name
                        )));
                    }
                    devices.push(Device { name, variables });
                }
                Ok(DeviceConfig { devices })
            }
        }

        deserializer.deserialize_map(DevicesVisitor)
    }
}

/// Device configuration errors. All are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid TOML in {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("device `{device}` entry {index}: {reason}")]
    InvalidEntry {
        device: String,
        index: usize,
        reason: String,
    },
}

/// Load and validate the device configuration at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<DeviceConfig, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;

    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    let config = if is_toml {
        parse_toml(&contents).map_err(|source| ConfigError::Toml {
            path: display,
            source,
        })?
    } else {
        parse_json(&contents).map_err(|source| ConfigError::Json {
            path: display,
            source,
        })?
    };

    config.validate()?;
    Ok(config)
}

fn parse_json(contents: &str) -> Result<DeviceConfig, serde_json::Error> {
    serde_json::from_str(contents)
}

fn parse_toml(contents: &str) -> Result<DeviceConfig, toml::de::Error> {
    toml::from_str(contents)
}
