// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Configuration file discovery and loading.
//!
//! This module handles finding and loading configuration files from
//! standard locations with proper precedence rules.

use std::path::{Path, PathBuf};

use crate::error::CompletionError;

use super::{APP_DIR_NAME, CompletionConfig};

/// Environment variable that points at a configuration file.
pub const CONFIG_ENV_VAR: &str = "CERT_COMPLETION_CONFIG";

/// Configuration file loader with discovery and precedence rules.
///
/// # Search Order
///
/// Configuration files are searched in the following order (first found wins):
///
/// 1. Explicit path (if set via `with_path()`)
/// 2. Environment variable `CERT_COMPLETION_CONFIG`
/// 3. Windows: `%PROGRAMDATA%\cert-completion\config.toml`
/// 4. Unix: `/etc/cert-completion/config.toml`
/// 5. User config directory: `<config dir>/cert-completion/config.toml`
/// 6. Current directory: `./cert-completion.toml`
///
/// An explicit path or environment variable naming a missing file is an
/// error. When discovery finds nothing, the built-in defaults are used.
///
/// # Example
///
/// ```no_run
/// use cert_completion::config::ConfigLoader;
///
/// // Load from default locations
/// let config = ConfigLoader::new().load().unwrap();
///
/// // Load from specific path
/// let config = ConfigLoader::new()
///     .with_path("/etc/cert-completion/config.toml")
///     .load()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Explicit configuration file path.
    explicit_path: Option<PathBuf>,

    /// Whether to expand variables after loading.
    expand_variables: bool,

    /// Whether to validate after loading.
    validate: bool,

    /// Environment variable name for config path override.
    env_var_name: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            explicit_path: None,
            expand_variables: true,
            validate: true,
            env_var_name: CONFIG_ENV_VAR.to_string(),
        }
    }

    /// Set an explicit configuration file path.
    ///
    /// When set, only this path will be checked (no discovery).
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        self.explicit_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enable or disable variable expansion.
    ///
    /// Default: `true`
    pub fn with_expand_variables(mut self, expand: bool) -> Self {
        self.expand_variables = expand;
        self
    }

    /// Enable or disable validation after loading.
    ///
    /// Default: `true`
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Set the environment variable name for path override.
    ///
    /// Default: `CERT_COMPLETION_CONFIG`
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var_name = name.into();
        self
    }

    /// Load the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - An explicitly named file does not exist
    /// - The file cannot be read
    /// - The TOML is invalid
    /// - Validation fails (if enabled)
    pub fn load(&self) -> Result<CompletionConfig, CompletionError> {
        match self.find_config_file()? {
            Some(config_path) => {
                tracing::debug!(path = %config_path.display(), "Loading configuration");
                let toml_content = std::fs::read_to_string(&config_path).map_err(|e| {
                    CompletionError::config(format!(
                        "Failed to read {}: {e}",
                        config_path.display()
                    ))
                })?;
                self.load_from_str(&toml_content)
            }
            None => {
                tracing::debug!("No configuration file found, using defaults");
                self.finish(CompletionConfig::default())
            }
        }
    }

    /// Load configuration from a TOML string.
    ///
    /// Useful for testing or when config is provided programmatically.
    pub fn load_from_str(&self, toml_content: &str) -> Result<CompletionConfig, CompletionError> {
        self.finish(CompletionConfig::from_toml(toml_content)?)
    }

    fn finish(&self, mut config: CompletionConfig) -> Result<CompletionConfig, CompletionError> {
        if self.expand_variables {
            config.expand_variables()?;
        }

        if self.validate {
            config.validate()?;
        }

        Ok(config)
    }

    /// Find the configuration file path.
    ///
    /// Returns `None` when discovery finds no file.
    pub fn find_config_file(&self) -> Result<Option<PathBuf>, CompletionError> {
        if let Some(ref path) = self.explicit_path {
            if path.exists() {
                return Ok(Some(path.clone()));
            }
            return Err(CompletionError::config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        if let Ok(env_path) = std::env::var(&self.env_var_name) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(CompletionError::config(format!(
                "Configuration file from {} not found: {}",
                self.env_var_name, env_path
            )));
        }

        Ok(self.get_search_paths().into_iter().find(|p| p.exists()))
    }

    /// Get the list of paths to search for configuration files.
    pub fn get_search_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(windows)]
        {
            if let Some(program_data) = std::env::var_os("PROGRAMDATA") {
                paths.push(
                    PathBuf::from(program_data)
                        .join(APP_DIR_NAME)
                        .join("config.toml"),
                );
            }
        }

        #[cfg(unix)]
        {
            paths.push(PathBuf::from("/etc").join(APP_DIR_NAME).join("config.toml"));
        }

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join(APP_DIR_NAME).join("config.toml"));
        }

        paths.push(PathBuf::from(format!("{}.toml", APP_DIR_NAME)));

        paths
    }
}

/// Write a default configuration file to a path.
///
/// This creates a commented example configuration that can be customized
/// for the target environment.
pub fn write_default_config(path: impl AsRef<Path>) -> Result<(), CompletionError> {
    let default_config = r#"# Certificate request completion configuration

[keys]
# Directory holding the private keys of pending certificate requests.
# Each key is named after a hash of the request subject.
directory = "${LOCALAPPDATA}/cert-completion/requests"
extension = "key"

[bundle]
# Directory for the short-lived PKCS#12 bundle (default: OS temp directory)
# directory = "/run/cert-completion"

# Random bytes used to derive each bundle passphrase (minimum 16)
passphrase_bytes = 24

# Use 3DES encryption for importers that do not support AES in PKCS#12
legacy_encryption = false

[installer]
# Helper executable; relative paths are resolved against the working directory
helper = "${EXE_DIR}/cert-installer"

# Elevation strategy: "launcher", "runas" (Windows), or "none"
elevation = "launcher"

# Launcher program and arguments for elevation = "launcher"
launcher = "pkexec"
launcher_args = []

# Launcher exit codes that mean the user refused authorization
declined_exit_codes = [126, 127]

# Extra helper arguments, e.g. ["--store-root", "/var/lib/cert-completion/stores"]
extra_args = []

[logging]
# Filter directive: "error", "warn", "info", "debug", "trace"
level = "info"

# Output format: "text" or "json"
format = "text"

# Log file path (default: stderr)
# path = "/var/log/cert-completion.log"
"#;

    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CompletionError::config(format!("Failed to create directory: {e}")))?;
    }

    std::fs::write(path, default_config)
        .map_err(|e| CompletionError::config(format!("Failed to write config file: {e}")))?;

    Ok(())
}
