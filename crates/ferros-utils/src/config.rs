//! # Configuration
//!
//! Settings shared by the server and the terminal, resolved from (lowest to
//! highest precedence):
//!
//! 1. built-in defaults
//! 2. a TOML file: `--config FILE`, or `~/.ferros/config.toml` when present
//! 3. `FERROS_LISTEN_ADDR` and `FERROS_RESYNC_MS`
//! 4. command-line flags ([`ConfigOverrides`])
//!
//! ```toml
//! listen_addr = "127.0.0.1:4040"
//! resync_interval_ms = 500
//! prompt = "(dbg) "
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const LISTEN_ADDR_VAR: &str = "FERROS_LISTEN_ADDR";
const RESYNC_VAR: &str = "FERROS_RESYNC_MS";

/// Directory holding the default config file and terminal logs
/// (`~/.ferros`). `None` only when no home directory can be determined.
#[must_use]
pub fn ferros_dir() -> Option<PathBuf>
{
    dirs::home_dir().map(|home| home.join(".ferros"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FerrosConfig
{
    /// Address the Transport Server binds.
    pub listen_addr: String,
    /// Period of the resync task. Must be positive.
    pub resync_interval_ms: u64,
    /// Events buffered per subscriber before the slowest one starts losing them.
    pub event_buffer: usize,
    pub prompt: String,
    pub history_file: PathBuf,
}

impl Default for FerrosConfig
{
    fn default() -> Self
    {
        Self {
            listen_addr: "127.0.0.1:0".to_string(),
            resync_interval_ms: 1000,
            event_buffer: 256,
            prompt: "(ferros) ".to_string(),
            history_file: PathBuf::from(".ferros_history"),
        }
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides
{
    pub config_file: Option<PathBuf>,
    pub listen_addr: Option<String>,
    pub resync_interval_ms: Option<u64>,
}

impl FerrosConfig
{
    /// Resolve the configuration from every source.
    ///
    /// ## Errors
    ///
    /// - `Read`/`Parse`: the config file is unreadable or invalid (a missing
    ///   default file is not an error; a missing `--config` file is)
    /// - `InvalidValue`: an environment variable does not parse
    /// - `ZeroResyncInterval`: the resolved interval is zero
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self, ConfigError>
    {
        let mut config = match &overrides.config_file {
            Some(path) => Self::load(path)?,
            None => match ferros_dir().map(|dir| dir.join("config.toml")) {
                Some(path) if path.is_file() => Self::load(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file. Keys it leaves out keep their defaults.
    ///
    /// ## Errors
    ///
    /// - `Read`: the file cannot be read
    /// - `Parse`: the file is not valid config TOML
    pub fn load(path: &Path) -> Result<Self, ConfigError>
    {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse config TOML.
    ///
    /// ## Errors
    ///
    /// Unknown keys and mistyped values are rejected.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error>
    {
        toml::from_str(text)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(LISTEN_ADDR_VAR) {
            self.listen_addr = addr;
        }
        if let Some(value) = lookup(RESYNC_VAR) {
            self.resync_interval_ms = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: RESYNC_VAR.to_string(),
                value,
            })?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides)
    {
        if let Some(addr) = &overrides.listen_addr {
            self.listen_addr.clone_from(addr);
        }
        if let Some(ms) = overrides.resync_interval_ms {
            self.resync_interval_ms = ms;
        }
    }

    /// ## Errors
    ///
    /// - `ZeroResyncInterval`: `resync_interval_ms` is zero
    pub fn validate(&self) -> Result<(), ConfigError>
    {
        if self.resync_interval_ms == 0 {
            return Err(ConfigError::ZeroResyncInterval);
        }
        Ok(())
    }

    #[must_use]
    pub const fn resync_interval(&self) -> Duration
    {
        Duration::from_millis(self.resync_interval_ms)
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError
{
    #[error("Failed to read config file {}: {source}", path.display())]
    Read
    {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Parse
    {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value {value:?} for {key}")]
    InvalidValue
    {
        key: String, value: String
    },

    #[error("Resync interval must be greater than zero")]
    ZeroResyncInterval,
}
