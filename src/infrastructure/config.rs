use crate::domain::{
    config::TermConfig,
    error::{TermError, TermResult},
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const APP_DIR: &str = "lineterm";
const PROJECT_DIR: &str = ".lineterm";
const CONFIG_FILE: &str = "config.toml";

/// Configuration manager
///
/// The global file holds the user's defaults; a project file found by
/// walking up from the working directory overrides individual keys.
pub struct ConfigManager {
    global_config_path: PathBuf,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create new configuration manager
    pub fn new() -> TermResult<Self> {
        let global_config_path = Self::get_global_config_path()?;
        let project_config_path = Self::find_project_config_path();

        Ok(Self {
            global_config_path,
            project_config_path,
        })
    }

    /// Manager with explicit locations
    pub fn with_paths(global_config_path: PathBuf, project_config_path: Option<PathBuf>) -> Self {
        Self {
            global_config_path,
            project_config_path,
        }
    }

    /// Load configuration, overlaying the project file on the global one
    pub fn load_config(&self) -> TermResult<TermConfig> {
        let mut merged = toml::Table::new();

        if self.global_config_path.exists() {
            merge_tables(&mut merged, Self::read_table(&self.global_config_path)?);
        }

        if let Some(project_path) = &self.project_config_path {
            if project_path.exists() {
                merge_tables(&mut merged, Self::read_table(project_path)?);
            }
        }

        let config: TermConfig = toml::Value::Table(merged)
            .try_into()
            .map_err(|e| TermError::config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the global file
    pub fn save_config(&self, config: &TermConfig) -> TermResult<()> {
        self.save_config_to_path(&self.global_config_path, config)
    }

    /// Get global configuration path
    fn get_global_config_path() -> TermResult<PathBuf> {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .ok_or_else(|| TermError::config("Could not determine configuration directory"))?;

        Ok(base.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Find project configuration path by walking up directory tree
    fn find_project_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        Self::find_project_config_from(&current_dir)
    }

    fn find_project_config_from(start: &Path) -> Option<PathBuf> {
        let mut path = start;

        loop {
            let config_path = path.join(PROJECT_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }

            path = path.parent()?;
        }
    }

    fn read_table(path: &Path) -> TermResult<toml::Table> {
        let content = fs::read_to_string(path).map_err(|e| {
            TermError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        debug!("Read configuration from {}", path.display());

        content.parse::<toml::Table>().map_err(|e| {
            TermError::config(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(&self, path: &Path) -> TermResult<TermConfig> {
        let content = fs::read_to_string(path).map_err(|e| {
            TermError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: TermConfig = toml::from_str(&content).map_err(|e| {
            TermError::config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to specific path
    pub fn save_config_to_path(&self, path: &Path, config: &TermConfig) -> TermResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                TermError::config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(config)
            .map_err(|e| TermError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, content).map_err(|e| {
            TermError::config(format!("Failed to write config file {}: {}", path.display(), e))
        })
    }

    /// Create default project configuration under `path`
    pub fn init_project_config(&self, path: &Path) -> TermResult<PathBuf> {
        let config_file = path.join(PROJECT_DIR).join(CONFIG_FILE);

        if config_file.exists() {
            return Err(TermError::config("Project configuration already exists"));
        }

        self.save_config_to_path(&config_file, &TermConfig::default())?;
        Ok(config_file)
    }

    /// Get the current project config path (if any)
    pub fn get_project_config_path(&self) -> Option<&PathBuf> {
        self.project_config_path.as_ref()
    }

    /// Get the global config path
    pub fn get_global_config_path_ref(&self) -> &PathBuf {
        &self.global_config_path
    }
}

/// Recursively overlay `overlay` onto `base`; nested tables merge key by key.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
