// Local crates
use crate::transport::line_reader::DEFAULT_MAX_LINE_BYTES;

// External crates
use reqwest::Url;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::instrument;

/// Environment variable that overrides `[remote] token`, so the InfluxDB token
/// does not have to live in the configuration file.
pub const TOKEN_ENV_VAR: &str = "TIC_COLLECTOR_INFLUX_TOKEN";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top level collector configuration. Every section is optional and falls
/// back to the settings of a Linky meter in historic TIC mode.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub serial: SerialConfig,
    pub frame: FrameConfig,
    pub sampling: SamplingConfig,
    pub durable: DurableConfig,
    pub remote: RemoteConfig,
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load, parse and validate the configuration file
    #[instrument(
        name = "config_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Loading collector configuration file"
        );

        let config_str = fs::read_to_string(path_ref).map_err(|source| {
            tracing::error!(error = %source, "Failed to read configuration file");
            ConfigError::Read {
                path: path_ref.to_path_buf(),
                source,
            }
        })?;

        let mut config = Self::from_toml_str(&config_str)?;

        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            tracing::debug!("Using InfluxDB token from {TOKEN_ENV_VAR}");
            config.remote.token = Some(token);
        }

        tracing::trace!(
            configuration_file_path = %path_ref.display(),
            "Collector configuration file loaded successfully"
        );
        Ok(config)
    }

    /// Parse and validate configuration from a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse TOML configuration");
            ConfigError::Parse(e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the sampling loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.serial.port.trim().is_empty() {
            return invalid("serial.port must not be empty".into());
        }
        if self.serial.baud_rate == 0 {
            return invalid("serial.baud_rate must be greater than zero".into());
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            return invalid(format!(
                "serial.data_bits must be between 5 and 8, got {}",
                self.serial.data_bits
            ));
        }
        if !matches!(self.serial.stop_bits, 1 | 2) {
            return invalid(format!(
                "serial.stop_bits must be 1 or 2, got {}",
                self.serial.stop_bits
            ));
        }
        if self.serial.read_timeout_ms == 0 {
            return invalid("serial.read_timeout_ms must be greater than zero".into());
        }
        if self.frame.max_lines == 0 {
            return invalid("frame.max_lines must be greater than zero".into());
        }
        if self.frame.max_line_bytes == 0 {
            return invalid("frame.max_line_bytes must be greater than zero".into());
        }
        if self.frame.index_label.trim().is_empty() || self.frame.power_label.trim().is_empty() {
            return invalid("frame labels must not be empty".into());
        }
        if self.frame.index_label == self.frame.power_label {
            return invalid("frame.index_label and frame.power_label must differ".into());
        }
        if self.sampling.interval_secs == 0 {
            return invalid("sampling.interval_secs must be greater than zero".into());
        }
        if self.durable.path.as_os_str().is_empty() {
            return invalid("durable.path must not be empty".into());
        }
        if self.remote.enabled {
            let url = Url::parse(&self.remote.url)
                .map_err(|e| ConfigError::Invalid(format!("remote.url is not a valid URL: {e}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return invalid(format!(
                    "remote.url must use http or https, got {}",
                    self.remote.url
                ));
            }
            if self.remote.org.trim().is_empty() || self.remote.bucket.trim().is_empty() {
                return invalid("remote.org and remote.bucket are required".into());
            }
            if self.remote.measurement.trim().is_empty() {
                return invalid("remote.measurement must not be empty".into());
            }
            if self.remote.timeout_ms == 0 {
                return invalid("remote.timeout_ms must be greater than zero".into());
            }
        }
        if self.metrics.enabled && self.metrics.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return invalid(format!(
                "metrics.listen_addr is not a socket address: {}",
                self.metrics.listen_addr
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    None,
    Odd,
    Even,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub read_timeout_ms: u64,
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyAMA0".into(),
            baud_rate: 1200,
            parity: ParityConfig::Even,
            data_bits: 7,
            stop_bits: 1,
            read_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct FrameConfig {
    pub max_lines: usize,
    /// Longer lines are dropped as noise.
    pub max_line_bytes: usize,
    pub index_label: String,
    pub power_label: String,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_lines: 30,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            index_label: "BASE".into(),
            power_label: "PAPP".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct SamplingConfig {
    pub interval_secs: u64,
}

impl SamplingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

/// What the sampling loop does when the local log cannot be written.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DurableFailurePolicy {
    /// Stop the collector so the broken disk gets noticed.
    #[default]
    Fatal,
    /// Keep sampling and rely on the remote store alone.
    Degrade,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct DurableConfig {
    pub path: PathBuf,
    pub failure_policy: DurableFailurePolicy,
}

impl Default for DurableConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("conso_electrique.csv"),
            failure_policy: DurableFailurePolicy::Fatal,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteConfig {
    pub enabled: bool,
    pub url: String,
    pub token: Option<String>,
    pub org: String,
    pub bucket: String,
    pub measurement: String,
    pub device_tag: String,
    pub timeout_ms: u64,
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:8086".into(),
            token: None,
            org: "home".into(),
            bucket: "linky".into(),
            measurement: "consommation".into(),
            device_tag: "linky".into(),
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9000".into(),
        }
    }
}
