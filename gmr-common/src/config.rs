//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Registry service settings, read from the `[registry]` table of the
/// TOML config file with per-field defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Base URL of the object-storage service
    pub storage_url: String,
    /// Base URL of the external ID authority. Empty string selects the
    /// built-in deterministic deriver.
    pub id_authority_url: String,
    /// Reject payloads that pin an analysis-type version older than latest
    pub enforce_latest: bool,
    /// Retry attempts for transient storage/ID-authority failures
    pub retry_attempts: u32,
    /// Delay between retry attempts, in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5780,
            storage_url: "http://localhost:8087".to_string(),
            id_authority_url: String::new(),
            enforce_latest: false,
            retry_attempts: 3,
            retry_delay_ms: 250,
        }
    }
}

/// Top-level TOML config file shape
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub root_folder: Option<String>,
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl TomlConfig {
    /// Parse a TOML config file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load the platform config file if one exists, otherwise defaults
    pub fn load_default() -> Self {
        match find_config_file() {
            Some(path) => Self::load(&path).unwrap_or_default(),
            None => Self::default(),
        }
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&str>,
    env_var_name: &str,
    config: &TomlConfig,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Some(root_folder) = &config.root_folder {
        return PathBuf::from(root_folder);
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Locate the platform config file (~/.config/gmr/config.toml on Linux,
/// the OS config dir elsewhere), falling back to /etc/gmr/config.toml.
fn find_config_file() -> Option<PathBuf> {
    if let Some(path) = dirs::config_dir().map(|d| d.join("gmr").join("config.toml")) {
        if path.exists() {
            return Some(path);
        }
    }
    let system_config = PathBuf::from("/etc/gmr/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }
    None
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("gmr"))
        .unwrap_or_else(|| PathBuf::from("./gmr_data"))
}

/// Database file path inside the root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join("gmr.db")
}
