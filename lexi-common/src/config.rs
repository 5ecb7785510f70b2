//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `LEXI_ROOT_FOLDER` environment variable
//! 3. `root_folder` key of the service TOML file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "LEXI_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "lexi.db";

/// Logging section shared by every service TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing level when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolves the root folder for a service
pub struct RootFolderResolver {
    service_name: String,
    cli_arg: Option<PathBuf>,
}

impl RootFolderResolver {
    /// Create a resolver for `service_name` (used to locate `<service>.toml`)
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            cli_arg: None,
        }
    }

    /// Attach a command-line override
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Resolve the root folder following the priority order
    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!(path = %path.display(), "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                debug!(path = %path, "Root folder from {}", ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(config_path) = config_file_path(&self.service_name) {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match toml::from_str::<toml::Value>(&content) {
                    Ok(value) => {
                        if let Some(root) = value.get("root_folder").and_then(|v| v.as_str()) {
                            debug!(path = %root, "Root folder from {}", config_path.display());
                            return PathBuf::from(root);
                        }
                    }
                    Err(e) => warn!("Ignoring unparsable config {}: {}", config_path.display(), e),
                },
                Err(e) => warn!("Could not read config {}: {}", config_path.display(), e),
            }
        }

        default_root_folder()
    }
}

/// Creates the root folder and derives well-known paths inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Path of the shared SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    /// Directory holding cached search results
    pub fn cache_dir(&self) -> PathBuf {
        self.root_folder.join("cache")
    }

    /// Directory holding downloaded images and their sidecars
    pub fn library_dir(&self) -> PathBuf {
        self.root_folder.join("library")
    }
}

/// Locate `<service>.toml`, preferring the user config dir over `/etc/lexi`
pub fn config_file_path(service_name: &str) -> Option<PathBuf> {
    let file_name = format!("{}.toml", service_name);

    let user_config = dirs::config_dir().map(|d| d.join("lexi").join(&file_name));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/lexi").join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load a TOML file into `T`
///
/// A missing file yields `T::default()` with a warning; a malformed file is an error.
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        warn!("Config file not found: {} (using defaults)", path.display());
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Write a TOML config atomically (temp file + rename)
pub fn write_toml_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("lexi"))
        .unwrap_or_else(|| PathBuf::from("./lexi_data"))
}
