//! Locating and loading the configuration file.

use std::path::{Path, PathBuf};

use anyhow::Context;
use mixsend_common::{Config, internal};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "MIXSEND_CONFIG";

/// Searched in order when neither `--config` nor [`CONFIG_ENV`] is given.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] =
    ["./mixsend.config.ron", "/etc/mixsend/mixsend.config.ron"];

/// Find the configuration file using the following precedence:
/// 1. `explicit` (the `--config` argument)
/// 2. `MIXSEND_CONFIG` environment variable
/// 3. ./mixsend.config.ron (current working directory)
/// 4. /etc/mixsend/mixsend.config.ron (system-wide config)
///
/// # Errors
///
/// Returns an error if an explicitly requested file does not exist.
pub fn find_config_file(explicit: Option<PathBuf>) -> anyhow::Result<Option<PathBuf>> {
    let requested = explicit.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let defaults = DEFAULT_CONFIG_PATHS.map(PathBuf::from);
    locate(requested, &defaults)
}

fn locate(requested: Option<PathBuf>, defaults: &[PathBuf]) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = requested {
        if path.exists() {
            return Ok(Some(path));
        }
        anyhow::bail!("Configuration file {} does not exist", path.display());
    }

    Ok(defaults.iter().find(|path| path.exists()).cloned())
}

/// Loads the configuration, falling back to defaults when no file is found.
///
/// # Errors
///
/// Returns an error if a requested file is missing, or the file found cannot
/// be read or parsed.
pub fn load(explicit: Option<PathBuf>) -> anyhow::Result<Config> {
    match find_config_file(explicit)? {
        Some(path) => load_from(&path),
        None => {
            tracing::warn!("No configuration file found, using defaults");
            Ok(Config::default())
        }
    }
}

fn load_from(path: &Path) -> anyhow::Result<Config> {
    internal!(level = INFO, "Loading configuration from {}", path.display());
    Config::load(path).with_context(|| format!("Unable to use configuration {}", path.display()))
}
