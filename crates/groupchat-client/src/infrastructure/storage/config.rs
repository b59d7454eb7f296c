//! TOML-based configuration for the chat client.
//!
//! Reads and writes [`AppConfig`] at the platform-appropriate location:
//! - Windows:  `%APPDATA%\groupchat\config.toml`
//! - Linux:    `~/.config/groupchat/config.toml`
//! - macOS:    `~/Library/Application Support/groupchat/config.toml`
//!
//! Example:
//!
//! ```toml
//! [chat]
//! member_name = "ANDROID"
//! cluster_name = "chat"
//!
//! [transport]
//! mcast_group = "228.8.8.8"
//! mcast_port = 45588
//! bind_address = "192.168.1.50"
//!
//! [watcher]
//! settle_delay_ms = 1000
//!
//! [logging]
//! log_level = "debug"
//! ```
//!
//! Every section and field is optional.  Missing values come from the
//! `#[serde(default = "…")]` helpers, so an empty file, an old file, or no
//! file at all yields a working configuration.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::channel_manager::ChannelSettings;
use crate::infrastructure::transport::udp::UdpTransportConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level application configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Group membership settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    /// Name this member joins under.
    #[serde(default = "default_member_name")]
    pub member_name: String,
    /// Cluster (group) to join.
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,
    /// Drop looped-back copies of our own messages.
    #[serde(default = "default_true")]
    pub discard_own_messages: bool,
    /// Capacity of each application event stream.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// Socket settings for the UDP multicast transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    #[serde(default = "default_mcast_group")]
    pub mcast_group: Ipv4Addr,
    #[serde(default = "default_mcast_port")]
    pub mcast_port: u16,
    /// Unicast port; 0 picks an ephemeral port.
    #[serde(default)]
    pub bind_port: u16,
    /// Pin the local address instead of resolving it by route probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<Ipv4Addr>,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default = "default_true")]
    pub loopback: bool,
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub enable_diagnostics: bool,
    #[serde(default = "default_diagnostics_group")]
    pub diagnostics_group: Ipv4Addr,
    #[serde(default = "default_diagnostics_port")]
    pub diagnostics_port: u16,
    /// Use the transport's one-call reconnect for hot-swaps.
    #[serde(default = "default_true")]
    pub native_reconnect: bool,
}

/// Network watcher timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatcherConfig {
    /// Delay between a usable link change and its re-check.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// How often the link monitor probes the route.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_member_name() -> String {
    "ANDROID".to_string()
}
fn default_cluster_name() -> String {
    "chat".to_string()
}
fn default_true() -> bool {
    true
}
fn default_event_capacity() -> usize {
    256
}
fn default_mcast_group() -> Ipv4Addr {
    Ipv4Addr::new(228, 8, 8, 8)
}
fn default_mcast_port() -> u16 {
    45588
}
fn default_ttl() -> u32 {
    8
}
fn default_recv_timeout_ms() -> u64 {
    500
}
fn default_stop_timeout_ms() -> u64 {
    2000
}
fn default_diagnostics_group() -> Ipv4Addr {
    Ipv4Addr::new(224, 0, 75, 75)
}
fn default_diagnostics_port() -> u16 {
    7500
}
fn default_settle_delay_ms() -> u64 {
    1000
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            member_name: default_member_name(),
            cluster_name: default_cluster_name(),
            discard_own_messages: default_true(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mcast_group: default_mcast_group(),
            mcast_port: default_mcast_port(),
            bind_port: 0,
            bind_address: None,
            ttl: default_ttl(),
            loopback: default_true(),
            recv_timeout_ms: default_recv_timeout_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            enable_diagnostics: default_true(),
            diagnostics_group: default_diagnostics_group(),
            diagnostics_port: default_diagnostics_port(),
            native_reconnect: default_true(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl ChatConfig {
    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            cluster_name: self.cluster_name.clone(),
            discard_own_messages: self.discard_own_messages,
        }
    }
}

impl TransportConfig {
    /// The multicast group address, also the route-probe target.
    pub fn group_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.mcast_group, self.mcast_port)
    }

    pub fn udp_config(&self) -> UdpTransportConfig {
        UdpTransportConfig {
            mcast_group: self.mcast_group,
            mcast_port: self.mcast_port,
            bind_port: self.bind_port,
            ttl: self.ttl,
            loopback: self.loopback,
            recv_timeout: Duration::from_millis(self.recv_timeout_ms.max(1)),
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
            enable_diagnostics: self.enable_diagnostics,
            diagnostics_group: self.diagnostics_group,
            diagnostics_port: self.diagnostics_port,
            native_reconnect: self.native_reconnect,
        }
    }
}

impl WatcherConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    let dir = platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)?;
    Ok(dir.join("config.toml"))
}

/// Loads [`AppConfig`] from the platform config file, returning defaults if
/// the file does not exist yet.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads [`AppConfig`] from `path`, returning defaults if it does not exist.
///
/// # Errors
///
/// Same as [`load_config`].
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(&config_file_path()?, config)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Same as [`save_config`].
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config directory including the `groupchat` leaf.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("groupchat"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("groupchat"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("groupchat")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
