//! Configuration loading.
//!
//! Defaults, then an optional TOML file, then `.env`, then the process
//! environment. The merged snapshot is validated before it is returned.

use std::fs;
use std::path::Path;

use crate::config::env::apply_overrides;
use crate::config::schema::Config;
use crate::config::validation::{render, validate_config, ValidationError};

/// Variable naming a TOML file to load when `--config` is not given.
pub const CONFIG_FILE_VAR: &str = "APP_CONFIG_FILE";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to load .env file: {0}")]
    EnvFile(#[source] dotenv::Error),

    #[error("invalid configuration: {}", render(.0))]
    Validation(Vec<ValidationError>),
}

/// A validated snapshot plus the non-fatal problems found while building it.
#[derive(Debug)]
pub struct Loaded {
    pub config: Config,
    pub warnings: Vec<String>,
}

/// Load configuration for the running process.
///
/// `path` takes precedence over `APP_CONFIG_FILE`. A missing `.env` file is
/// not an error.
pub fn load(path: Option<&Path>) -> Result<Loaded, ConfigError> {
    env_file_loaded(dotenv::dotenv())?;

    let from_env = std::env::var(CONFIG_FILE_VAR).ok().filter(|p| !p.is_empty());
    let path = path.map(Path::to_path_buf).or_else(|| from_env.map(Into::into));

    let base = match path {
        Some(path) => read_file(&path)?,
        None => Config::default(),
    };

    load_from(base, |key| std::env::var(key).ok())
}

/// Merge overrides from `lookup` onto `base` and validate the result.
pub fn load_from<F>(mut base: Config, lookup: F) -> Result<Loaded, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let warnings = apply_overrides(&mut base, lookup);
    validate_config(&base).map_err(ConfigError::Validation)?;

    Ok(Loaded {
        config: base,
        warnings,
    })
}

/// Load variables from a `.env`-style file into the process environment.
///
/// Returns `false` when the file does not exist. Unreadable or malformed
/// files are errors.
pub fn load_env_file(path: &Path) -> Result<bool, ConfigError> {
    env_file_loaded(dotenv::from_path(path))
}

fn env_file_loaded<T>(result: Result<T, dotenv::Error>) -> Result<bool, ConfigError> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(ConfigError::EnvFile(e)),
    }
}

/// Parse a TOML configuration file without validating it.
pub fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}
