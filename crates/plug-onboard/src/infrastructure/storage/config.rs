//! TOML-based configuration persistence for the onboarding host.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\PlugOnboard\config.toml`
//! - Linux:    `~/.config/plugonboard/config.toml`
//! - macOS:    `~/Library/Application Support/PlugOnboard/config.toml`
//!
//! The same document holds host settings and every committed plug:
//!
//! ```toml
//! [general]
//! log_level = "info"
//!
//! [discovery]
//! port = 6666
//! retry_budget = 20
//! poll_interval_ms = 250
//!
//! [device]
//! port = 6668
//! validate_timeout_ms = 5000
//!
//! [[devices]]
//! entry_id = "5f0c..."
//! title = "Smart Plug bf0123456789"
//! device_id = "bf0123456789abcd"
//! ip = "10.0.0.6"
//! local_key = "..."
//! version = "3.3"
//!
//! [devices.options]
//! scan_interval = 30
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent, so a first run without a file and
//! an older file missing newer fields both load cleanly.

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use plug_core::{DeviceId, DeviceRecord, ProtocolVersion};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::application::manage_devices::{DeviceEntry, DeviceOptions, DeviceStore, StoreError};
use crate::application::onboard_device::ScanSettings;
use crate::application::validate_credential::DEFAULT_VALIDATE_TIMEOUT;
use crate::infrastructure::network::discovery::DiscoverySettings;

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

    /// A value parsed but is not usable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub device: DeviceLinkConfig,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// LAN sweep settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    /// UDP port plugs broadcast announcements on.
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    /// IP address to bind the discovery socket to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Quiet listen windows allowed before the sweep ends.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    /// Length of one listen window in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Log every announcement at `info` level.
    #[serde(default)]
    pub verbose: bool,
}

/// Settings for talking to a single plug.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceLinkConfig {
    /// TCP port plugs accept status queries on.
    #[serde(default = "default_device_port")]
    pub port: u16,
    /// Bound on one validation round trip in milliseconds.
    #[serde(default = "default_validate_timeout_ms")]
    pub validate_timeout_ms: u64,
    /// Protocol version assumed when an announcement omits one.
    #[serde(default = "default_protocol_version")]
    pub default_version: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_discovery_port() -> u16 {
    6666
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_retry_budget() -> u32 {
    20
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_device_port() -> u16 {
    6668
}
fn default_validate_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_VALIDATE_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
}
fn default_protocol_version() -> String {
    plug_core::DEFAULT_PROTOCOL_VERSION.to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: default_discovery_port(),
            bind_address: default_bind_address(),
            retry_budget: default_retry_budget(),
            poll_interval_ms: default_poll_interval_ms(),
            verbose: false,
        }
    }
}

impl Default for DeviceLinkConfig {
    fn default() -> Self {
        Self {
            port: default_device_port(),
            validate_timeout_ms: default_validate_timeout_ms(),
            default_version: default_protocol_version(),
        }
    }
}

// ── Typed views ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Socket settings for the UDP probe.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unparsable bind address or
    /// default version, or a zero poll interval.
    pub fn discovery_settings(&self) -> Result<DiscoverySettings, ConfigError> {
        let bind_address: IpAddr =
            self.discovery
                .bind_address
                .parse()
                .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                    field: "discovery.bind_address",
                    reason: e.to_string(),
                })?;
        if self.discovery.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "discovery.poll_interval_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        let default_version =
            ProtocolVersion::parse(&self.device.default_version).map_err(|e| {
                ConfigError::Invalid {
                    field: "device.default_version",
                    reason: e.to_string(),
                }
            })?;

        Ok(DiscoverySettings {
            bind_address,
            port: self.discovery.port,
            poll_interval: Duration::from_millis(self.discovery.poll_interval_ms),
            default_version,
        })
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            verbose: self.discovery.verbose,
            retry_budget: self.discovery.retry_budget,
        }
    }

    pub fn validate_timeout(&self) -> Duration {
        Duration::from_millis(self.device.validate_timeout_ms)
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the config file in the platform directory.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no config at {}, using defaults", path.display());
            Ok(AppConfig::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// The document is written to a `.tmp` sibling of `path` and renamed
/// over it, so an interrupted write never leaves a truncated config behind.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    let staging = staging_path(path);
    std::fs::write(&staging, content).map_err(|source| ConfigError::Io {
        path: staging.clone(),
        source,
    })?;
    std::fs::rename(&staging, path).map_err(|source| {
        let _ = std::fs::remove_file(&staging);
        ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Sibling file the next config is staged in before it replaces `path`.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Resolves the platform config directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("PlugOnboard"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("plugonboard"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("PlugOnboard")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── File-backed device store ──────────────────────────────────────────────────

/// [`DeviceStore`] that keeps entries in the `[[devices]]` table of the
/// config file.
///
/// Every mutation runs under one lock: the change is applied to a copy,
/// written to disk, and only then made visible.  A failed write leaves both
/// the file and the in-memory view unchanged.
pub struct ConfigDeviceStore {
    path: PathBuf,
    config: Mutex<AppConfig>,
}

impl ConfigDeviceStore {
    /// Wraps an already loaded `config` that lives at `path`.
    pub fn with_config(path: impl Into<PathBuf>, config: AppConfig) -> Self {
        Self {
            path: path.into(),
            config: Mutex::new(config),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, AppConfig>, StoreError> {
        self.config
            .lock()
            .map_err(|_| StoreError::Unavailable("config lock poisoned".to_string()))
    }

    fn mutate<T>(
        &self,
        change: impl FnOnce(&mut AppConfig) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut current = self.lock()?;
        let mut next = current.clone();
        let value = change(&mut next)?;
        save_config_to(&self.path, &next).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        *current = next;
        Ok(value)
    }
}

impl DeviceStore for ConfigDeviceStore {
    fn list_committed_identifiers(&self) -> Result<HashSet<DeviceId>, StoreError> {
        Ok(self
            .lock()?
            .devices
            .iter()
            .map(|entry| entry.device_id.clone())
            .collect())
    }

    fn commit(&self, record: &DeviceRecord) -> Result<Uuid, StoreError> {
        self.mutate(|config| {
            if config
                .devices
                .iter()
                .any(|entry| entry.device_id == *record.device_id())
            {
                return Err(StoreError::DuplicateDevice(record.device_id().clone()));
            }
            let entry_id = Uuid::new_v4();
            config.devices.push(DeviceEntry::from_record(entry_id, record));
            Ok(entry_id)
        })
    }

    fn remove(&self, entry_id: Uuid) -> Result<(), StoreError> {
        self.mutate(|config| {
            let before = config.devices.len();
            config.devices.retain(|entry| entry.entry_id != entry_id);
            if config.devices.len() == before {
                return Err(StoreError::EntryNotFound(entry_id));
            }
            Ok(())
        })
    }

    fn entries(&self) -> Result<Vec<DeviceEntry>, StoreError> {
        Ok(self.lock()?.devices.clone())
    }

    fn update_options(&self, entry_id: Uuid, options: DeviceOptions) -> Result<(), StoreError> {
        self.mutate(|config| {
            let entry = config
                .devices
                .iter_mut()
                .find(|entry| entry.entry_id == entry_id)
                .ok_or(StoreError::EntryNotFound(entry_id))?;
            entry.options = options;
            Ok(())
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("plugonboard-test-{}", Uuid::new_v4()))
            .join("config.toml")
    }

    fn entry(id: &str) -> DeviceEntry {
        DeviceEntry {
            entry_id: Uuid::new_v4(),
            title: format!("Smart Plug {id}"),
            device_id: DeviceId::new(id).unwrap(),
            ip: "10.0.0.5".to_string(),
            local_key: "0123456789abcdef".to_string(),
            version: ProtocolVersion::default(),
            options: DeviceOptions::default(),
        }
    }

    // ── AppConfig defaults ────────────────────────────────────────────────────

    #[test]
    fn test_app_config_default_has_expected_ports() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.discovery.port, 6666);
        assert_eq!(cfg.device.port, 6668);
    }

    #[test]
    fn test_app_config_default_timing() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.discovery.retry_budget, 20);
        assert_eq!(cfg.discovery.poll_interval_ms, 250);
        assert_eq!(cfg.validate_timeout(), DEFAULT_VALIDATE_TIMEOUT);
    }

    #[test]
    fn test_general_config_default_log_level_is_info() {
        assert_eq!(GeneralConfig::default().log_level, "info");
    }

    #[test]
    fn test_empty_document_parses_to_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_section_fills_missing_fields() {
        // Arrange
        let text = "[discovery]\nretry_budget = 4\n";

        // Act
        let cfg: AppConfig = toml::from_str(text).unwrap();

        // Assert
        assert_eq!(cfg.discovery.retry_budget, 4);
        assert_eq!(cfg.discovery.port, 6666);
        assert_eq!(cfg.discovery.poll_interval_ms, 250);
    }

    #[test]
    fn test_device_entry_without_options_gets_default_scan_interval() {
        let text = r#"
            [[devices]]
            entry_id = "6f9619ff-8b86-d011-b42d-00c04fc964ff"
            title = "Smart Plug bf01"
            device_id = "bf01"
            ip = "10.0.0.6"
            local_key = "k"
        "#;

        let cfg: AppConfig = toml::from_str(text).unwrap();

        assert_eq!(cfg.devices.len(), 1);
        assert_eq!(cfg.devices[0].options.scan_interval(), 30);
        assert_eq!(cfg.devices[0].version.as_str(), "3.3");
    }

    // ── Typed views ───────────────────────────────────────────────────────────

    #[test]
    fn test_discovery_settings_from_defaults() {
        let settings = AppConfig::default().discovery_settings().unwrap();

        assert_eq!(settings.port, 6666);
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.default_version.as_str(), "3.3");
    }

    #[test]
    fn test_discovery_settings_rejects_bad_bind_address() {
        let mut cfg = AppConfig::default();
        cfg.discovery.bind_address = "not-an-ip".to_string();

        let result = cfg.discovery_settings();

        assert!(matches!(
            result,
            Err(ConfigError::Invalid { field: "discovery.bind_address", .. })
        ));
    }

    #[test]
    fn test_discovery_settings_rejects_zero_poll_interval() {
        let mut cfg = AppConfig::default();
        cfg.discovery.poll_interval_ms = 0;

        assert!(cfg.discovery_settings().is_err());
    }

    // ── File repository ───────────────────────────────────────────────────────

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let cfg = load_config_from(&temp_config_path()).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_then_load_preserves_devices() {
        // Arrange
        let path = temp_config_path();
        let mut cfg = AppConfig::default();
        cfg.devices.push(entry("bf01"));

        // Act
        save_config_to(&path, &cfg).unwrap();
        let restored = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(restored, cfg);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_save_replaces_existing_file_without_leaving_staging_file() {
        // Arrange
        let path = temp_config_path();
        let mut first = AppConfig::default();
        first.devices.push(entry("A"));
        save_config_to(&path, &first).unwrap();
        let mut second = first.clone();
        second.devices.push(entry("B"));

        // Act
        save_config_to(&path, &second).unwrap();

        // Assert
        assert_eq!(load_config_from(&path).unwrap().devices.len(), 2);
        assert!(!staging_path(&path).exists());
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_staging_path_is_sibling_of_config() {
        let path = Path::new("/tmp/plugonboard/config.toml");
        assert_eq!(
            staging_path(path),
            PathBuf::from("/tmp/plugonboard/config.toml.tmp")
        );
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let path = temp_config_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[discovery\nport = ").unwrap();

        let result = load_config_from(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    // ── ConfigDeviceStore ─────────────────────────────────────────────────────

    #[test]
    fn test_store_lists_identifiers_from_file() {
        let mut cfg = AppConfig::default();
        cfg.devices.push(entry("A"));
        cfg.devices.push(entry("B"));
        let store = ConfigDeviceStore::with_config(temp_config_path(), cfg);

        let ids = store.list_committed_identifiers().unwrap();

        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&DeviceId::new("A").unwrap()));
    }

    #[test]
    fn test_update_options_persists_to_disk() {
        // Arrange
        let path = temp_config_path();
        let stored = entry("bf01");
        let entry_id = stored.entry_id;
        let mut cfg = AppConfig::default();
        cfg.devices.push(stored);
        let store = ConfigDeviceStore::with_config(&path, cfg);

        // Act
        store
            .update_options(entry_id, DeviceOptions::new(120).unwrap())
            .unwrap();

        // Assert
        let reloaded = load_config_from(&path).unwrap();
        assert_eq!(reloaded.devices[0].options.scan_interval(), 120);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_remove_unknown_entry_leaves_store_unchanged() {
        let mut cfg = AppConfig::default();
        cfg.devices.push(entry("A"));
        let store = ConfigDeviceStore::with_config(temp_config_path(), cfg);

        let result = store.remove(Uuid::new_v4());

        assert!(matches!(result, Err(StoreError::EntryNotFound(_))));
        assert_eq!(store.entries().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_write_keeps_memory_unchanged() {
        // Arrange: a path whose parent is a regular file cannot be written.
        let blocker = std::env::temp_dir().join(format!("plugonboard-blocker-{}", Uuid::new_v4()));
        std::fs::write(&blocker, "x").unwrap();
        let stored = entry("A");
        let entry_id = stored.entry_id;
        let mut cfg = AppConfig::default();
        cfg.devices.push(stored);
        let store = ConfigDeviceStore::with_config(blocker.join("config.toml"), cfg);

        // Act
        let result = store.remove(entry_id);

        // Assert
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.entries().unwrap().len(), 1);
        let _ = std::fs::remove_file(&blocker);
    }
}
