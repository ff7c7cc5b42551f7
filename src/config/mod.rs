// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Configuration for certificate request completion.
//!
//! Configuration is read from a TOML file. Every section is optional and
//! falls back to platform defaults, so an empty file is a valid configuration.
//!
//! # Example Configuration
//!
//! ```toml
//! [keys]
//! directory = "${LOCALAPPDATA}/cert-completion/requests"
//!
//! [bundle]
//! passphrase_bytes = 24
//!
//! [installer]
//! helper = "cert-installer"
//! elevation = "launcher"
//! launcher = "pkexec"
//! declined_exit_codes = [126, 127]
//!
//! [logging]
//! level = "info"
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use cert_completion::config::ConfigLoader;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from default locations
//! let config = ConfigLoader::new().load()?;
//!
//! // Or load from a specific path
//! let config = ConfigLoader::new()
//!     .with_path("/path/to/cert-completion.toml")
//!     .load()?;
//! # Ok(())
//! # }
//! ```

mod expand;
mod loader;

pub use expand::expand_variables;
pub use loader::{ConfigLoader, write_default_config};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CompletionError;
use crate::keys::DEFAULT_KEY_EXTENSION;
use crate::types::MIN_PASSPHRASE_BYTES;

/// Application directory name used under platform data directories.
pub const APP_DIR_NAME: &str = "cert-completion";

/// Complete configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompletionConfig {
    /// Where request private keys are kept.
    #[serde(default)]
    pub keys: KeyStoreConfig,

    /// Credential bundle settings.
    #[serde(default)]
    pub bundle: BundleConfig,

    /// Elevated helper settings.
    #[serde(default)]
    pub installer: InstallerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CompletionConfig {
    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or contains unknown fields.
    pub fn from_toml(toml_str: &str) -> Result<Self, CompletionError> {
        toml::from_str(toml_str)
            .map_err(|e| CompletionError::config(format!("Invalid TOML: {e}")))
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, CompletionError> {
        toml::to_string_pretty(self)
            .map_err(|e| CompletionError::config(format!("TOML serialize: {e}")))
    }

    /// Expand `${VAR}` references in all path values.
    pub fn expand_variables(&mut self) -> Result<(), CompletionError> {
        self.keys.directory = expand_path(&self.keys.directory)?;

        if let Some(ref mut dir) = self.bundle.directory {
            *dir = expand_path(dir)?;
        }

        self.installer.helper = expand_path(&self.installer.helper)?;
        self.installer.launcher = expand_variables(&self.installer.launcher)?;

        if let Some(ref mut path) = self.logging.path {
            *path = expand_path(path)?;
        }

        Ok(())
    }

    /// Validate the configuration for completeness and consistency.
    ///
    /// All problems are reported together.
    pub fn validate(&self) -> Result<(), CompletionError> {
        let mut errors = Vec::new();

        if self.keys.directory.as_os_str().is_empty() {
            errors.push("keys.directory is required".to_string());
        }
        if self.keys.extension.trim_start_matches('.').is_empty() {
            errors.push("keys.extension must not be empty".to_string());
        }

        if self.bundle.passphrase_bytes < MIN_PASSPHRASE_BYTES {
            errors.push(format!(
                "bundle.passphrase_bytes must be at least {}",
                MIN_PASSPHRASE_BYTES
            ));
        }

        if self.installer.helper.as_os_str().is_empty() {
            errors.push("installer.helper is required".to_string());
        }
        match self.installer.elevation {
            ElevationMode::Launcher if self.installer.launcher.trim().is_empty() => {
                errors.push(
                    "installer.launcher is required when installer.elevation is 'launcher'"
                        .to_string(),
                );
            }
            ElevationMode::RunAs if !cfg!(windows) => {
                errors.push("installer.elevation 'runas' is only available on Windows".to_string());
            }
            _ => {}
        }

        if tracing_subscriber::EnvFilter::try_new(&self.logging.level).is_err() {
            errors.push(format!("logging.level '{}' is not valid", self.logging.level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CompletionError::config(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

fn expand_path(path: &std::path::Path) -> Result<PathBuf, CompletionError> {
    Ok(PathBuf::from(expand_variables(&path.to_string_lossy())?))
}

/// Request key storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyStoreConfig {
    /// Directory holding private keys of pending requests.
    #[serde(default = "default_key_directory")]
    pub directory: PathBuf,

    /// Key file extension.
    #[serde(default = "default_key_extension")]
    pub extension: String,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            directory: default_key_directory(),
            extension: default_key_extension(),
        }
    }
}

fn default_key_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
        .join("requests")
}

fn default_key_extension() -> String {
    DEFAULT_KEY_EXTENSION.to_string()
}

/// Credential bundle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BundleConfig {
    /// Directory for bundle files (default: the OS temporary directory).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Random bytes used for each bundle passphrase.
    #[serde(default = "default_passphrase_bytes")]
    pub passphrase_bytes: usize,

    /// Encrypt bundles with 3DES so older importers can read them.
    #[serde(default)]
    pub legacy_encryption: bool,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            directory: None,
            passphrase_bytes: default_passphrase_bytes(),
            legacy_encryption: false,
        }
    }
}

fn default_passphrase_bytes() -> usize {
    24
}

/// How the helper process acquires elevated privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElevationMode {
    /// Run the helper directly (the caller is already privileged).
    None,
    /// Run the helper through a launcher program such as `pkexec` or `sudo`.
    Launcher,
    /// Windows "runas" verb, which shows the consent prompt.
    RunAs,
}

impl Default for ElevationMode {
    fn default() -> Self {
        if cfg!(windows) {
            Self::RunAs
        } else {
            Self::Launcher
        }
    }
}

/// Elevated helper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstallerConfig {
    /// Helper executable, resolved against the working directory when relative.
    #[serde(default = "default_helper")]
    pub helper: PathBuf,

    /// Elevation strategy.
    #[serde(default)]
    pub elevation: ElevationMode,

    /// Launcher program used with `elevation = "launcher"`.
    #[serde(default = "default_launcher")]
    pub launcher: String,

    /// Arguments placed between the launcher and the helper path.
    #[serde(default)]
    pub launcher_args: Vec<String>,

    /// Launcher exit codes meaning authorization was refused.
    #[serde(default = "default_declined_exit_codes")]
    pub declined_exit_codes: Vec<i32>,

    /// Extra arguments appended after the standard helper arguments.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            helper: default_helper(),
            elevation: ElevationMode::default(),
            launcher: default_launcher(),
            launcher_args: Vec::new(),
            declined_exit_codes: default_declined_exit_codes(),
            extra_args: Vec::new(),
        }
    }
}

fn default_helper() -> PathBuf {
    PathBuf::from(format!("cert-installer{}", std::env::consts::EXE_SUFFIX))
}

fn default_launcher() -> String {
    "pkexec".to_string()
}

// pkexec: 126 when the dialog is dismissed, 127 when not authorized.
fn default_declined_exit_codes() -> Vec<i32> {
    vec![126, 127]
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `cert_completion=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Append to this file instead of writing to stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            path: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
