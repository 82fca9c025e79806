//! Platform-specific configuration and data paths.

use crate::config::Config;
use crate::constants::{APP_NAME, storage::OUTPUT_DIR_NAME};
use crate::error::{Error, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME).ok_or(Error::ConfigDirNotFound)
}

/// Get the configuration directory for the current platform.
///
/// - Linux: `~/.config/reviver/`
/// - macOS: `~/Library/Application Support/reviver/`
/// - Windows: `%APPDATA%\reviver\`
pub fn config_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

/// Get the full path to the config file.
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Platform data directory (weights and local results live under it).
pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}

/// Weight cache root: configured directory or `<data dir>/weights`.
pub fn weights_dir(config: &Config) -> Result<PathBuf> {
    match &config.weights.dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(data_dir()?.join("weights")),
    }
}

/// Local result directory: configured directory or `<data dir>/output_images`.
pub fn output_dir(config: &Config) -> Result<PathBuf> {
    match &config.storage.output_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(data_dir()?.join(OUTPUT_DIR_NAME)),
    }
}
