//! Server Configuration
//!
//! Locates and loads the configuration file.

use kuba_namespace::config::Config;
use std::path::{Path, PathBuf};

/// Default config file looked up in the working directory
const DEFAULT_CONFIG_FILE: &str = "kuba-namespace.toml";

/// Load configuration from file or environment
///
/// Priority:
/// 1. `explicit` path (the `--config` flag)
/// 2. `KNS_CONFIG` environment variable
/// 3. `kuba-namespace.toml` in the working directory
/// 4. Default configuration
///
/// `KNS_*` overrides are applied in every case. A file that was asked for
/// explicitly and cannot be loaded is an error; the fallbacks are not.
pub fn load_config(explicit: Option<&Path>) -> Result<(Config, Option<PathBuf>), String> {
    if let Some(path) = explicit {
        let config = Config::from_file_with_env(&path.to_string_lossy())?;
        return Ok((config, Some(path.to_path_buf())));
    }

    if let Ok(path) = std::env::var("KNS_CONFIG") {
        let config = Config::from_file_with_env(&path)?;
        return Ok((config, Some(PathBuf::from(path))));
    }

    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        match Config::from_file_with_env(DEFAULT_CONFIG_FILE) {
            Ok(config) => return Ok((config, Some(default_path.to_path_buf()))),
            Err(e) => eprintln!("[config] {}. Using defaults.", e),
        }
    }

    Ok((Config::from_env(), None))
}
