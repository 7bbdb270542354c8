//! Configuration file handling for mic-cli
//!
//! The file holds a `[cli]` section for output preferences next to the
//! `[session]` and `[flasher]` sections understood by `mic_can`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use mic_can::MicConfig;
use serde::{Deserialize, Serialize};

use crate::output::OutputFormat;

/// Configuration for the CLI tool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cli: CliConfig,
    #[serde(flatten)]
    pub mic: MicConfig,
}

/// Output preferences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Default output format
    pub output: Option<OutputFormat>,
    /// Disable colored output
    pub no_color: Option<bool>,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("mic-cli");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(&self, output: Option<OutputFormat>, no_color: bool) -> MergedConfig {
        MergedConfig {
            output: output.or(self.cli.output).unwrap_or_default(),
            no_color: no_color || self.cli.no_color.unwrap_or(false),
        }
    }
}

/// Fully resolved output settings after merging CLI args
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedConfig {
    pub output: OutputFormat,
    pub no_color: bool,
}
