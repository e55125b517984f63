// src/core/paths.rs

use crate::constants::{CONFIG_DIR_ENV, LAST_USED_FILENAME, SETTINGS_FILENAME};
use lazy_static::lazy_static;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

lazy_static! {
    static ref SUITERUN_CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Could not create config directory at '{path}'")]
    ConfigDirCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("An empty path was given.")]
    EmptyPath,
    #[error("Failed to expand path '{raw}': {reason}")]
    Expansion { raw: String, reason: String },
}

/// Returns the path to the launcher configuration directory (`~/.config/suiterun`, or
/// `$SUITERUN_CONFIG_DIR`). Creates it if it doesn't exist.
///
/// This function is memoized: the first call computes and caches the path,
/// subsequent calls return the cached value instantly.
pub fn get_config_dir() -> Result<PathBuf, PathError> {
    // The cached value survives lock poisoning.
    let mut cached_path_guard = SUITERUN_CONFIG_DIR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(path) = &*cached_path_guard {
        return Ok(path.clone());
    }

    let config_path = match std::env::var_os(CONFIG_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::config_dir()
            .ok_or(PathError::ConfigDirNotFound)?
            .join("suiterun"),
    };

    if !config_path.exists() {
        fs::create_dir_all(&config_path).map_err(|e| PathError::ConfigDirCreation {
            path: config_path.display().to_string(),
            source: e,
        })?;
    }

    *cached_path_guard = Some(config_path.clone());
    Ok(config_path)
}

/// Returns the path to `settings.toml`.
pub fn get_settings_path() -> Result<PathBuf, PathError> {
    get_config_dir().map(|dir| dir.join(SETTINGS_FILENAME))
}

/// Returns the path to the last-used work directory store.
pub fn get_last_used_path() -> Result<PathBuf, PathError> {
    get_config_dir().map(|dir| dir.join(LAST_USED_FILENAME))
}

/// Expands a user-supplied path, resolving the home directory (`~`) and environment
/// variables (`$VAR`). Does not touch the filesystem.
///
/// # Errors
/// Returns an error for an empty (or all-whitespace) path or an undefined variable.
pub fn expand_path(raw: &str) -> Result<PathBuf, PathError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(PathError::EmptyPath);
    }
    let expanded = shellexpand::full(trimmed).map_err(|e| PathError::Expansion {
        raw: raw.to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Canonicalizes a path when it exists, otherwise returns it unchanged.
/// `dunce` keeps Windows paths free of the `\\?\` prefix.
pub fn canonical_or_original(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Resolves `target` against the directory that contains `file` when it is relative.
pub fn resolve_relative_to_file(file: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        return target.to_path_buf();
    }
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(target),
        _ => target.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_path_rejects_empty() {
        assert!(matches!(expand_path("   "), Err(PathError::EmptyPath)));
    }

    #[test]
    fn test_expand_path_keeps_plain_paths() {
        assert_eq!(expand_path("/ts/root").unwrap(), PathBuf::from("/ts/root"));
        assert_eq!(expand_path(" rel/dir ").unwrap(), PathBuf::from("rel/dir"));
    }

    #[test]
    fn test_resolve_relative_to_file() {
        let file = Path::new("/configs/cfg.properties");
        assert_eq!(
            resolve_relative_to_file(file, Path::new("../ts")),
            PathBuf::from("/configs/../ts")
        );
        assert_eq!(
            resolve_relative_to_file(file, Path::new("/abs/ts")),
            PathBuf::from("/abs/ts")
        );
        assert_eq!(
            resolve_relative_to_file(Path::new("cfg.properties"), Path::new("ts")),
            PathBuf::from("ts")
        );
    }
}
