//! XDG Base Directory locations for the record store and config file.

use crate::error::DbafsError;
use std::path::PathBuf;

/// Get XDG data home directory
///
/// Returns `$XDG_DATA_HOME` if set, otherwise defaults to `$HOME/.local/share`
pub fn data_home() -> Option<PathBuf> {
    if let Ok(xdg_data_home) = std::env::var("XDG_DATA_HOME") {
        return Some(PathBuf::from(xdg_data_home));
    }

    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".local").join("share"))
}

/// Get XDG config home directory
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise defaults to `$HOME/.config`
pub fn config_home() -> Option<PathBuf> {
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config_home));
    }

    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config"))
}

/// `$XDG_DATA_HOME/dbafs/store`
pub fn default_store_path() -> Result<PathBuf, DbafsError> {
    let data_home = data_home().ok_or_else(|| {
        DbafsError::Config("Could not determine XDG data home directory (HOME not set)".to_string())
    })?;
    Ok(data_home.join("dbafs").join("store"))
}

/// `$XDG_CONFIG_HOME/dbafs/config.toml`
pub fn global_config_path() -> Option<PathBuf> {
    config_home().map(|home| home.join("dbafs").join("config.toml"))
}
