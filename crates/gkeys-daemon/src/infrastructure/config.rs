//! TOML-based configuration for the daemon.
//!
//! Reads and writes `DaemonConfig` at the platform-appropriate location:
//! - Linux:    `$XDG_CONFIG_HOME/gkeys/config.toml` (or `~/.config/gkeys/`)
//! - macOS:    `~/Library/Application Support/GKeys/config.toml`
//! - Windows:  `%APPDATA%\GKeys\config.toml`
//!
//! Every field carries a serde default so the daemon works on first run,
//! before a config file exists, and keeps working when an older file lacks
//! newer fields.

use std::path::PathBuf;

use gkeys_core::BusSelector;
use serde::{Deserialize, Serialize};
use thiserror::Error;

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

/// Top-level daemon configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DaemonConfig {
    #[serde(default)]
    pub daemon: DaemonSection,
    #[serde(default)]
    pub bus: BusSection,
    #[serde(default)]
    pub profiles: ProfileSection,
}

/// General daemon behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Whether simulated recordings finish on their own (no hardware).
    #[serde(default = "default_true")]
    pub auto_complete_recordings: bool,
}

/// Where on the host bus the daemon's object lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusSection {
    /// `"system"` or `"session"`.
    #[serde(default = "default_bus")]
    pub bus: String,
    /// Object path every service registers under.
    #[serde(default = "default_object_path")]
    pub object_path: String,
}

impl BusSection {
    /// Parses the configured bus name, defaulting to the system bus on an
    /// unrecognised value.
    pub fn selector(&self) -> BusSelector {
        match self.bus.as_str() {
            "session" => BusSelector::Session,
            _ => BusSelector::System,
        }
    }
}

/// Profile names the daemon starts with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileSection {
    #[serde(default = "default_profiles")]
    pub available: Vec<String>,
    #[serde(default = "default_active_profile")]
    pub active: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_bus() -> String {
    "system".to_string()
}
fn default_object_path() -> String {
    "/com/gkeys/Keyboard".to_string()
}
fn default_profiles() -> Vec<String> {
    vec!["default".to_string()]
}
fn default_active_profile() -> String {
    "default".to_string()
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            auto_complete_recordings: default_true(),
        }
    }
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            bus: default_bus(),
            object_path: default_object_path(),
        }
    }
}

impl Default for ProfileSection {
    fn default() -> Self {
        Self {
            available: default_profiles(),
            active: default_active_profile(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the config file.
///
/// # Errors
///
/// [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined from the environment.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads `DaemonConfig` from disk, returning defaults if the file does not
/// yet exist.
pub fn load_config() -> Result<DaemonConfig, ConfigError> {
    let path = config_file_path()?;
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let cfg: DaemonConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DaemonConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to disk, creating the directory if needed.
pub fn save_config(config: &DaemonConfig) -> Result<(), ConfigError> {
    let path = config_file_path()?;
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("gkeys"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("GKeys")
        })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("GKeys"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
