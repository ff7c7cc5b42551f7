// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Privileged installation of credential bundles.
//!
//! Importing into a machine-wide store needs elevated rights, which the
//! completing process does not hold. The [`Installer`] trait hides how those
//! rights are obtained; [`HelperInstaller`] runs the `cert-installer` helper
//! through one of three strategies:
//!
//! | Mode | Behaviour |
//! |------|-----------|
//! | `none` | Run the helper directly (already privileged, or a user store) |
//! | `launcher` | Run `<launcher> <launcher_args> <helper> <args>`, e.g. `pkexec` |
//! | `runas` | Windows UAC consent prompt via `ShellExecuteExW` |
//!
//! The helper receives its inputs as discrete arguments, never through a
//! shell:
//!
//! ```text
//! cert-installer --file <bundle> --passphrase <secret> --name <label> --store <MY|WebHosting>
//! ```
//!
//! # Outcomes
//!
//! Exactly one [`InstallOutcome`] is produced per call. A helper that never
//! started is reported as [`InstallOutcome::NotStarted`], with
//! [`NotStarted::Declined`] kept apart from other launch problems so the
//! caller can treat a refused consent prompt as a neutral event.

mod runas;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{ElevationMode, InstallerConfig};
use crate::types::{InstallTarget, Passphrase};

pub use runas::{join_arguments, quote_argument};

/// Inputs for one installation.
#[derive(Debug, Clone, Copy)]
pub struct InstallRequest<'a> {
    /// Bundle file to import.
    pub bundle_path: &'a Path,
    /// Passphrase protecting the bundle.
    pub passphrase: &'a Passphrase,
    /// Label to give the installed certificate.
    pub friendly_name: &'a str,
    /// Destination store.
    pub target: InstallTarget,
}

/// Why the helper never ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotStarted {
    /// The user refused the elevation prompt.
    Declined,
    /// Elevation or process creation failed.
    LaunchFailed(String),
}

/// Result of an installation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The helper exited with code 0.
    Installed,
    /// The helper ran and exited with a non-zero code.
    Failed {
        /// Exit code, unmodified.
        exit_code: i32,
    },
    /// The helper never ran.
    NotStarted(NotStarted),
}

/// Installs a credential bundle with elevated rights.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Install the bundle described by `request` and wait for completion.
    ///
    /// Implementations must not delete or modify the bundle file.
    async fn install(&self, request: &InstallRequest<'_>) -> InstallOutcome;
}

/// Runs the bundled `cert-installer` helper.
#[derive(Debug, Clone)]
pub struct HelperInstaller {
    helper: PathBuf,
    elevation: ElevationMode,
    launcher: String,
    launcher_args: Vec<String>,
    declined_exit_codes: Vec<i32>,
    extra_args: Vec<String>,
}

impl HelperInstaller {
    /// Create an installer from configuration.
    pub fn from_config(config: &InstallerConfig) -> Self {
        Self {
            helper: config.helper.clone(),
            elevation: config.elevation,
            launcher: config.launcher.clone(),
            launcher_args: config.launcher_args.clone(),
            declined_exit_codes: config.declined_exit_codes.clone(),
            extra_args: config.extra_args.clone(),
        }
    }

    /// Resolve the helper executable.
    ///
    /// Relative paths are resolved against the working directory.
    pub fn resolve_helper(&self) -> Result<PathBuf, String> {
        let helper = if self.helper.is_absolute() {
            self.helper.clone()
        } else {
            std::env::current_dir()
                .map_err(|e| format!("cannot determine working directory: {}", e))?
                .join(&self.helper)
        };

        if helper.is_file() {
            Ok(helper)
        } else {
            Err(format!(
                "certificate installer not found at '{}'",
                helper.display()
            ))
        }
    }

    /// Arguments passed to the helper for `request`.
    pub fn helper_arguments(&self, request: &InstallRequest<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--file".into(),
            request.bundle_path.as_os_str().to_owned(),
            "--passphrase".into(),
            request.passphrase.expose().into(),
            "--name".into(),
            request.friendly_name.into(),
            "--store".into(),
            request.target.store_name().into(),
        ];
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }

    fn outcome_from_status(&self, status: ExitStatus, via_launcher: bool) -> InstallOutcome {
        let exit_code = exit_code(status);
        if exit_code == 0 {
            InstallOutcome::Installed
        } else if via_launcher && self.declined_exit_codes.contains(&exit_code) {
            InstallOutcome::NotStarted(NotStarted::Declined)
        } else {
            InstallOutcome::Failed { exit_code }
        }
    }

    async fn run_direct(&self, helper: &Path, args: Vec<OsString>) -> InstallOutcome {
        let status = Command::new(helper)
            .args(&args)
            .stdin(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) => self.outcome_from_status(status, false),
            Err(e) => InstallOutcome::NotStarted(NotStarted::LaunchFailed(format!(
                "cannot start '{}': {}",
                helper.display(),
                e
            ))),
        }
    }

    async fn run_with_launcher(&self, helper: &Path, args: Vec<OsString>) -> InstallOutcome {
        let status = Command::new(&self.launcher)
            .args(&self.launcher_args)
            .arg(helper)
            .args(&args)
            .stdin(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) => self.outcome_from_status(status, true),
            Err(e) => InstallOutcome::NotStarted(NotStarted::LaunchFailed(format!(
                "cannot start launcher '{}': {}",
                self.launcher, e
            ))),
        }
    }

    #[cfg(windows)]
    async fn run_as(&self, helper: &Path, args: Vec<OsString>) -> InstallOutcome {
        let helper = helper.to_path_buf();
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        match tokio::task::spawn_blocking(move || runas::run_elevated(&helper, &args)).await {
            Ok(Ok(0)) => InstallOutcome::Installed,
            Ok(Ok(exit_code)) => InstallOutcome::Failed { exit_code },
            Ok(Err(reason)) => InstallOutcome::NotStarted(reason),
            Err(e) => InstallOutcome::NotStarted(NotStarted::LaunchFailed(e.to_string())),
        }
    }

    #[cfg(not(windows))]
    async fn run_as(&self, _helper: &Path, _args: Vec<OsString>) -> InstallOutcome {
        InstallOutcome::NotStarted(NotStarted::LaunchFailed(
            "runas elevation is only available on Windows".to_string(),
        ))
    }
}

#[async_trait]
impl Installer for HelperInstaller {
    async fn install(&self, request: &InstallRequest<'_>) -> InstallOutcome {
        let helper = match self.resolve_helper() {
            Ok(helper) => helper,
            Err(reason) => {
                tracing::warn!(%reason, "Certificate installer unavailable");
                return InstallOutcome::NotStarted(NotStarted::LaunchFailed(reason));
            }
        };

        tracing::info!(
            helper = %helper.display(),
            elevation = ?self.elevation,
            target = %request.target,
            friendly_name = request.friendly_name,
            "Launching certificate installer"
        );

        let args = self.helper_arguments(request);
        let outcome = match self.elevation {
            ElevationMode::None => self.run_direct(&helper, args).await,
            ElevationMode::Launcher => self.run_with_launcher(&helper, args).await,
            ElevationMode::RunAs => self.run_as(&helper, args).await,
        };

        tracing::info!(?outcome, "Certificate installer finished");
        outcome
    }
}

/// Exit code of a finished process; termination by signal `n` maps to `128 + n`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
