//! Loading the configuration document and constructing a ready-to-use
//! [`SprinklerCore`] from it. Every subcommand goes through `open_core`
//! so the load/validate/restore sequence stays in one place.

use std::path::{Path, PathBuf};

use housesprinkler_core::{ConfigError, ConfigSource, CoreError, SprinklerConfig, SprinklerCore};

/// File-backed [`ConfigSource`]: the CLI's implementation of the seam the
/// core crate leaves open for a future front end.
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ConfigSource for FileConfigSource {
    fn load(&self) -> Result<SprinklerConfig, ConfigError> {
        let content = std::fs::read_to_string(&self.path).map_err(|err| ConfigError::LoadFailed {
            path: self.path.display().to_string(),
            message: err.to_string(),
        })?;
        let mut config: SprinklerConfig = serde_json::from_str(&content).map_err(|err| ConfigError::LoadFailed {
            path: self.path.display().to_string(),
            message: err.to_string(),
        })?;
        config.validate_and_fill()?;
        Ok(config)
    }

    fn save(&self, config: &SprinklerConfig) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(config).map_err(|err| ConfigError::SaveFailed {
            path: self.path.display().to_string(),
            message: err.to_string(),
        })?;
        std::fs::write(&self.path, content).map_err(|err| ConfigError::SaveFailed {
            path: self.path.display().to_string(),
            message: err.to_string(),
        })
    }
}

pub fn load_config(path: &Path) -> Result<SprinklerConfig, Box<dyn std::error::Error>> {
    let config = FileConfigSource::new(path.to_path_buf()).load().map_err(CoreError::from)?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &SprinklerConfig) -> Result<(), Box<dyn std::error::Error>> {
    FileConfigSource::new(path.to_path_buf()).save(config).map_err(CoreError::from)?;
    Ok(())
}

fn state_path(config_path: &Path) -> PathBuf {
    let stem = config_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "sprinkler".to_string());
    config_path.with_file_name(format!("{stem}.state.json"))
}

/// Loads the configuration document and builds a [`SprinklerCore`] with
/// its persisted state restored.
pub fn open_core(
    config_path: &Path,
    no_local_storage: bool,
) -> Result<SprinklerCore, Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let mut core = SprinklerCore::new(config, reqwest::Client::new(), state_path(config_path));
    core.set_local_storage_enabled(!no_local_storage);
    core.load_state()?;
    Ok(core)
}
