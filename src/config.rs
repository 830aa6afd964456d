//! Session configuration.
//!
//! Defaults are loadable from `~/.ttyform/config.toml`:
//!
//! ```toml
//! # Terminal emulation: dumb, vt, pc, xt
//! emulation = "xt"
//!
//! # Default idle timeout in seconds (0 = none) and warn-at-half flag
//! default_timeout = 0
//! default_warn = true
//!
//! # SGR code installed as the default foreground color
//! default_color = 37
//!
//! # Play the retro modem farewell on hangup
//! modem = false
//!
//! # Total session allowance in seconds (0 = unlimited)
//! session_allowed = 0
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::attr::WHITE;
use crate::core::emulation::Emulation;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Session defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Terminal emulation profile
    pub emulation: Emulation,
    /// Default idle timeout in seconds (0 = none)
    pub default_timeout: u64,
    /// Ring a warning bell at half the idle timeout
    pub default_warn: bool,
    /// SGR code used as the default foreground color
    pub default_color: u16,
    /// Play the modem farewell sequence on hangup
    pub modem: bool,
    /// Total session allowance in seconds (0 = unlimited)
    pub session_allowed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            emulation: Emulation::XT,
            default_timeout: 0,
            default_warn: true,
            default_color: WHITE,
            modem: false,
            session_allowed: 0,
        }
    }
}

impl Config {
    /// Load from the default location, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_default(),
            _ => Self::default(),
        }
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn config_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join(".ttyform").join("config.toml"))
    }
}
