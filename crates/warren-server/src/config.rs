//! Server configuration.
//!
//! Configuration is layered:
//! - built-in defaults
//! - TOML configuration file (`$WARREN_CONFIG`, or the first of the search paths that exists)
//! - environment variables (`WARREN_PORT`, `WARREN_LIMITS__FRAME_MAX`, ...)

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use warren_protocol::frame::FRAME_MIN_SIZE;
use warren_protocol::{ProtocolVersion, SUPPORTED_VERSIONS};

/// Files searched, in order, when `WARREN_CONFIG` is unset.
const CONFIG_PATHS: [&str; 3] = [
    "warren.toml",
    "/etc/warren/warren.toml",
    "~/.config/warren/warren.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Heartbeat configuration.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Protocol negotiation.
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Virtual hosts created at startup.
    #[serde(default = "default_virtual_hosts")]
    pub virtual_hosts: Vec<String>,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Highest channel number offered in `connection.tune`.
    #[serde(default = "default_channel_max")]
    pub channel_max: u16,

    /// Largest frame offered in `connection.tune`, in bytes.
    #[serde(default = "default_frame_max")]
    pub frame_max: u32,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Heartbeat interval offered in `connection.tune`, in seconds. 0 disables.
    #[serde(default)]
    pub interval_secs: u16,
}

/// Protocol negotiation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Versions accepted, most preferred first. The first entry is the
    /// header sent back to a peer asking for anything else.
    #[serde(default = "default_supported")]
    pub supported: Vec<ProtocolVersion>,

    /// SASL mechanisms advertised in `connection.start`.
    #[serde(default = "default_mechanisms")]
    pub mechanisms: String,

    /// Product name advertised in `connection.start`.
    #[serde(default = "default_product")]
    pub product: String,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5672
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> usize {
    10_000
}

fn default_channel_max() -> u16 {
    2047
}

fn default_frame_max() -> u32 {
    131_072
}

fn default_supported() -> Vec<ProtocolVersion> {
    SUPPORTED_VERSIONS.to_vec()
}

fn default_mechanisms() -> String {
    "PLAIN AMQPLAIN".to_string()
}

fn default_product() -> String {
    "Warren".to_string()
}

fn default_virtual_hosts() -> Vec<String> {
    vec!["/".to_string(), "test".to_string()]
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            limits: LimitsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            protocol: ProtocolConfig::default(),
            virtual_hosts: default_virtual_hosts(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            channel_max: default_channel_max(),
            frame_max: default_frame_max(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            supported: default_supported(),
            mechanisms: default_mechanisms(),
            product: default_product(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, with
    /// `WARREN_*` environment overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or the
    /// result fails validation.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = Self::find_file() {
            tracing::info!("Loading configuration from {}", path.display());
            builder = builder.add_source(
                config::File::from(path.as_path()).format(config::FileFormat::Toml),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix("WARREN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn find_file() -> Option<PathBuf> {
        if let Ok(explicit) = std::env::var("WARREN_CONFIG") {
            return Some(PathBuf::from(shellexpand::tilde(&explicit).as_ref()));
        }
        CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    /// Load configuration from a specific file, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.protocol.supported.is_empty() {
            bail!("protocol.supported must name at least one version");
        }
        if let Some(v) = self.protocol.supported.iter().find(|v| !v.is_supported()) {
            bail!("protocol.supported contains unsupported version {v}");
        }
        if self.limits.frame_max < FRAME_MIN_SIZE {
            bail!(
                "limits.frame_max {} is below the protocol minimum {}",
                self.limits.frame_max,
                FRAME_MIN_SIZE
            );
        }
        if self.virtual_hosts.is_empty() {
            bail!("at least one virtual host is required");
        }
        Ok(())
    }

    /// Most preferred protocol version.
    #[must_use]
    pub fn preferred_version(&self) -> ProtocolVersion {
        self.protocol.supported.first().copied().unwrap_or_default()
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_protocol::{V0_8, V0_91};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 5672);
        assert_eq!(config.limits.channel_max, 2047);
        assert_eq!(config.limits.frame_max, 131_072);
        assert_eq!(config.heartbeat.interval_secs, 0);
        assert_eq!(config.virtual_hosts, vec!["/", "test"]);
        assert_eq!(config.preferred_version(), V0_91);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        assert_eq!(config.bind_addr().unwrap().port(), 5672);

        let bad = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(bad.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 5673
            virtual_hosts = ["/", "dev"]

            [limits]
            frame_max = 65536

            [protocol]
            supported = ["0-8"]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5673);
        assert_eq!(config.limits.frame_max, 65_536);
        assert_eq!(config.limits.channel_max, 2047);
        assert_eq!(config.protocol.supported, vec![V0_8]);
        assert_eq!(config.preferred_version(), V0_8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_small_frame_max() {
        let mut config = Config::default();
        config.limits.frame_max = 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_version_fails_to_parse() {
        let toml_str = r#"
            [protocol]
            supported = ["1-0"]
        "#;
        assert!(toml::from_str::<Config>(toml_str).is_err());
    }
}
