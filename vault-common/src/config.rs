//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable `VAULTESTIM_ROOT_FOLDER`
//! 3. TOML config file (`root_folder` key)
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file never terminates a service: it is logged
//! and compiled defaults are used instead.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "VAULTESTIM_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "vaultestim.db";

/// Compiled-in defaults used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    /// Defaults for the platform this binary was built for
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
        }
    }
}

/// Logging section of the TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing filter when RUST_LOG is not set
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

/// External catalog API section of the TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// API key for the hosted catalog (RapidAPI)
    pub api_key: Option<String>,
    /// Base URL override (defaults to the public RapidAPI host)
    pub base_url: Option<String>,
    /// Client-side request rate ceiling
    pub requests_per_second: Option<u32>,
}

/// Reconciliation run defaults; any field left out keeps the built-in default
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileDefaults {
    pub page_size: Option<usize>,
    pub batch_size: Option<usize>,
    pub batch_delay_ms: Option<u64>,
    pub checkpoint_every: Option<usize>,
    pub max_requests: Option<u64>,
    pub accept_threshold: Option<f64>,
    pub candidate_limit: Option<usize>,
}

/// TOML configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub reconcile: ReconcileDefaults,
    /// Extra expansion code → CardMarket slug mappings (e.g. `sv11 = "Some-Set"`)
    #[serde(default)]
    pub expansions: BTreeMap<String, String>,
}

/// Default path of a module's TOML file: `<config dir>/vaultestim/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("vaultestim").join(format!("{module_name}.toml")))
}

/// Load a TOML config file
///
/// A missing file is not an error: defaults are returned and a warning logged.
/// A file that exists but does not parse is a configuration error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using defaults");
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!(path = %path.display(), "Loaded TOML config");
    Ok(config)
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;

    // The file may hold the catalog API key
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;

    debug!(path = %path.display(), "Wrote TOML config");
    Ok(())
}

/// True when group or others can read the TOML file
///
/// Always false on platforms without Unix permission bits.
pub fn check_toml_permissions_loose(path: &Path) -> Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(path)?.permissions().mode();
        Ok(mode & 0o077 != 0)
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(false)
    }
}

/// Resolves the root folder for a module following the documented priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            config_path: default_config_path(module_name),
        }
    }

    /// Command-line override (priority 1)
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Use a specific TOML file instead of the per-user default
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        if path.is_some() {
            self.config_path = path;
        }
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!(module = %self.module_name, "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                debug!(module = %self.module_name, "Root folder from environment");
                return PathBuf::from(path);
            }
        }

        if let Some(config_path) = &self.config_path {
            match load_toml_config(config_path) {
                Ok(TomlConfig {
                    root_folder: Some(root),
                    ..
                }) => {
                    debug!(module = %self.module_name, "Root folder from TOML config");
                    return root;
                }
                Ok(_) => {}
                Err(e) => warn!(module = %self.module_name, error = %e, "Ignoring unreadable config file"),
            }
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates the database inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!(path = %self.root_folder.display(), "Created root folder");
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("vaultestim"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/vaultestim"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("vaultestim"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/vaultestim"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("vaultestim"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\vaultestim"))
    } else {
        PathBuf::from("./vaultestim_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_sections_default_when_absent() {
        let config: TomlConfig = toml::from_str("root_folder = \"/data/cards\"").unwrap();
        assert_eq!(config.root_folder, Some(PathBuf::from("/data/cards")));
        assert_eq!(config.logging.level, "info");
        assert!(config.catalog.api_key.is_none());
        assert!(config.expansions.is_empty());
    }

    #[test]
    fn test_toml_expansion_overrides_parse() {
        let config: TomlConfig = toml::from_str(
            r#"
            [expansions]
            sv11 = "Future-Set"

            [reconcile]
            batch_size = 6
            "#,
        )
        .unwrap();
        assert_eq!(config.expansions.get("sv11").map(String::as_str), Some("Future-Set"));
        assert_eq!(config.reconcile.batch_size, Some(6));
        assert_eq!(config.reconcile.max_requests, None);
    }
}
