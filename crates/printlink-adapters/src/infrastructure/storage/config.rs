//! TOML-based printer configuration.
//!
//! Reads and writes [`PrintLinkConfig`] to the platform-appropriate file:
//! - Windows:  `%APPDATA%\PrintLink\printers.toml`
//! - Linux:    `~/.config/printlink/printers.toml`
//! - macOS:    `~/Library/Application Support/PrintLink/printers.toml`
//!
//! # Example (for beginners)
//!
//! ```toml
//! [settings]
//! log_level = "debug"
//! http_timeout_secs = 15
//!
//! [[printers]]
//! kind = "octoprint"
//! name = "prusa"
//! host = "192.168.1.30"
//! api_key = "ABCDEF0123456789"
//!
//! [[printers]]
//! kind = "bambu"
//! name = "x1c"
//! host = "192.168.1.50"
//! access_code = "12345678"
//! serial = "01S00A000000000"
//! ```
//!
//! Each `[[printers]]` table is one entry of an array.  The `kind` key picks
//! the adapter and decides which other keys are allowed; serde's
//! *internally tagged* enums (`#[serde(tag = "kind")]`) do that dispatch.
//! Keys left out fall back to the `default_*` functions below, so ports only
//! need to be written when a printer listens somewhere unusual.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::adapter::AdapterKind;

/// File name of the configuration inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "printers.toml";

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

/// Top-level contents of `printers.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrintLinkConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub printers: Vec<PrinterEntry>,
}

/// Process-wide knobs shared by every printer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,
    #[serde(default = "default_bambu_connect_timeout_secs")]
    pub bambu_connect_timeout_secs: u64,
    #[serde(default = "default_bambu_status_timeout_secs")]
    pub bambu_status_timeout_secs: u64,
}

impl Settings {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn bambu_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.bambu_connect_timeout_secs)
    }

    pub fn bambu_status_timeout(&self) -> Duration {
        Duration::from_secs(self.bambu_status_timeout_secs)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            http_timeout_secs: default_http_timeout_secs(),
            discovery_timeout_secs: default_discovery_timeout_secs(),
            bambu_connect_timeout_secs: default_bambu_connect_timeout_secs(),
            bambu_status_timeout_secs: default_bambu_status_timeout_secs(),
        }
    }
}

/// One configured printer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PrinterEntry {
    Octoprint {
        name: String,
        host: String,
        #[serde(default = "default_octoprint_port")]
        port: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
    },
    Moonraker {
        name: String,
        host: String,
        #[serde(default = "default_moonraker_port")]
        port: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
    },
    Bambu {
        name: String,
        host: String,
        /// LAN access code from the printer's network settings screen.
        access_code: String,
        /// Empty means "learn it from the first report".
        #[serde(default)]
        serial: String,
        #[serde(default = "default_bambu_port")]
        port: u16,
        #[serde(default = "default_ftps_port")]
        ftps_port: u16,
    },
    Generic {
        name: String,
        #[serde(default = "default_output_dir")]
        output_dir: PathBuf,
    },
}

impl PrinterEntry {
    pub fn name(&self) -> &str {
        match self {
            PrinterEntry::Octoprint { name, .. }
            | PrinterEntry::Moonraker { name, .. }
            | PrinterEntry::Bambu { name, .. }
            | PrinterEntry::Generic { name, .. } => name,
        }
    }

    pub fn kind(&self) -> AdapterKind {
        match self {
            PrinterEntry::Octoprint { .. } => AdapterKind::Octoprint,
            PrinterEntry::Moonraker { .. } => AdapterKind::Moonraker,
            PrinterEntry::Bambu { .. } => AdapterKind::Bambu,
            PrinterEntry::Generic { .. } => AdapterKind::Generic,
        }
    }
}

impl PrintLinkConfig {
    /// Looks a printer up by its configured name (exact match).
    pub fn find_printer(&self, name: &str) -> Option<&PrinterEntry> {
        self.printers.iter().find(|p| p.name() == name)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_http_timeout_secs() -> u64 {
    30
}
fn default_discovery_timeout_secs() -> u64 {
    5
}
fn default_bambu_connect_timeout_secs() -> u64 {
    5
}
fn default_bambu_status_timeout_secs() -> u64 {
    10
}
fn default_octoprint_port() -> u16 {
    crate::infrastructure::octoprint::DEFAULT_PORT
}
fn default_moonraker_port() -> u16 {
    crate::infrastructure::moonraker::DEFAULT_PORT
}
fn default_bambu_port() -> u16 {
    crate::infrastructure::bambu::DEFAULT_PORT
}
fn default_ftps_port() -> u16 {
    crate::infrastructure::bambu::ftps::FTPS_PORT
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(crate::infrastructure::generic::DEFAULT_OUTPUT_DIR)
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to `printers.toml` in the platform config directory.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the configuration at `path`, returning defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<PrintLinkConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PrintLinkConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(path: &Path, config: &PrintLinkConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
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

/// Loads from the platform default location.
///
/// # Errors
///
/// As [`load_config_from`], plus [`ConfigError::NoPlatformConfigDir`].
pub fn load_config() -> Result<PrintLinkConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("PrintLink"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("printlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("PrintLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
