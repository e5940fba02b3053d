use std::{fs, path::PathBuf};

use crate::{
    courier_err,
    utils::errors::{CourierError, CourierErrorKind},
};

fn get_xdg_dirs() -> xdg::BaseDirectories {
    xdg::BaseDirectories::with_prefix("courier")
}

/// Returns the configuration directory, `$XDG_CONFIG_HOME/courier`.
///
/// The directory is not created; a missing config directory simply means no
/// config file has been written yet.
pub fn get_config_dir() -> Result<PathBuf, CourierError> {
    get_xdg_dirs()
        .get_config_home()
        .ok_or_else(|| courier_err!(CourierErrorKind::DirRead, "Could not find config directory"))
}

/// Returns the cache directory.
///
/// This function returns the XDG standard cache path, `$XDG_CACHE_HOME/courier`.
/// If the directory does not exist, it will be created.
pub fn get_cache_dir() -> Result<PathBuf, CourierError> {
    let xdg_dirs = get_xdg_dirs();
    let dir = xdg_dirs
        .get_cache_home()
        .ok_or_else(|| courier_err!(CourierErrorKind::DirRead, "Could not find cache directory"))?;
    fs::create_dir_all(&dir)
        .map_err(|e| courier_err!(CourierErrorKind::DirCreate, e.to_string()))?;
    Ok(dir)
}
