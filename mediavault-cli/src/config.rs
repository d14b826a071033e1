//! CLI configuration handling.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Directory holding the preference document shared with the extension.
    pub shared_dir: PathBuf,

    /// Directory of the pre-sharing preference document, if one may still
    /// exist.
    pub legacy_dir: Option<PathBuf>,

    /// Keyring namespace for secrets.
    pub keyring_service: String,

    /// Use the OS keyring. When false, secrets stay in the shared preferences.
    pub prefer_keyring: bool,

    /// Logging level.
    pub log_level: String,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for CliConfig {
    fn default() -> Self {
        let dirs = project_dirs();
        let shared_dir = dirs
            .as_ref()
            .map(|d| d.data_dir().join("shared"))
            .unwrap_or_else(|| PathBuf::from(".mediavault/shared"));
        let legacy_dir = dirs.as_ref().map(|d| d.config_dir().to_path_buf());

        Self {
            shared_dir,
            legacy_dir,
            keyring_service: mediavault_core::store::DEFAULT_NAMESPACE.to_string(),
            prefer_keyring: true,
            log_level: "info".to_string(),
            config_path: PathBuf::new(),
        }
    }
}

impl CliConfig {
    pub fn shared_preferences_path(&self) -> PathBuf {
        self.shared_dir.join("preferences.json")
    }

    pub fn legacy_preferences_path(&self) -> Option<PathBuf> {
        self.legacy_dir.as_ref().map(|d| d.join("preferences.json"))
    }
}

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("mediavault.toml"))
}

/// Load configuration from `path`, or defaults if the file doesn't exist.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        CliConfig::default()
    };

    config.config_path = config_path;

    std::fs::create_dir_all(&config.shared_dir)
        .with_context(|| format!("Failed to create shared directory {:?}", config.shared_dir))?;

    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "raibid-labs", "mediavault")
}
