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

//! Certificate request completion workflow.
//!
//! [`WorkflowCoordinator::complete`] runs one completion attempt:
//!
//! ```text
//! Idle -> Validating -> KeyLookup -> Bundling -> Elevating -> Installing
//!      -> Completed | Failed -> CleanedUp
//! ```
//!
//! Failures before `Bundling` return immediately; nothing sensitive exists
//! yet. From `Bundling` on, the bundle file is owned by a
//! [`CredentialBundle`] whose drop removes the file, and the attempt closes
//! it explicitly before returning on every path, so no run leaves the
//! bundle on disk.
//!
//! Each attempt runs on a spawned task that owns the bundle and the target
//! lock. Once started it cannot be cancelled; dropping the caller's future
//! only detaches it.
//!
//! Only one attempt per target store may be in flight. A concurrent call for
//! the same target is rejected with [`CompletionError::InstallInProgress`].

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::bundle::{BundleBuilder, CredentialBundle, RequestArtifact};
use crate::config::CompletionConfig;
use crate::error::{CompletionError, Result};
use crate::installer::{HelperInstaller, InstallOutcome, InstallRequest, Installer, NotStarted};
use crate::keys::KeyStore;
use crate::types::{InstallTarget, Installed};

/// Stages of a completion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStage {
    /// Nothing started.
    Idle,
    /// Checking inputs and loading the certificate.
    Validating,
    /// Locating the private key.
    KeyLookup,
    /// Writing the credential bundle.
    Bundling,
    /// Requesting elevated rights.
    Elevating,
    /// Helper is importing the bundle.
    Installing,
    /// Helper reported success.
    Completed,
    /// The attempt failed.
    Failed,
    /// The bundle has been removed.
    CleanedUp,
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::KeyLookup => "key-lookup",
            Self::Bundling => "bundling",
            Self::Elevating => "elevating",
            Self::Installing => "installing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::CleanedUp => "cleaned-up",
        };
        f.write_str(name)
    }
}

fn enter(stage: WorkflowStage, target: InstallTarget) {
    tracing::info!(%stage, %target, "Completion stage");
}

/// Releases the per-target lock when dropped.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<InstallTarget>>>,
    target: InstallTarget,
}

impl InFlightGuard {
    fn acquire(in_flight: &Arc<Mutex<HashSet<InstallTarget>>>, target: InstallTarget) -> Result<Self> {
        let mut set = in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(target) {
            return Err(CompletionError::InstallInProgress { target });
        }
        Ok(Self {
            in_flight: Arc::clone(in_flight),
            target,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.target);
    }
}

/// Sequences key lookup, bundling, and installation.
#[derive(Clone)]
pub struct WorkflowCoordinator {
    keys: KeyStore,
    bundler: BundleBuilder,
    installer: Arc<dyn Installer>,
    in_flight: Arc<Mutex<HashSet<InstallTarget>>>,
}

impl fmt::Debug for WorkflowCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowCoordinator")
            .field("keys", &self.keys)
            .field("bundler", &self.bundler)
            .finish_non_exhaustive()
    }
}

impl WorkflowCoordinator {
    /// Create a coordinator from its collaborators.
    pub fn new(keys: KeyStore, bundler: BundleBuilder, installer: Arc<dyn Installer>) -> Self {
        Self {
            keys,
            bundler,
            installer,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Create a coordinator that runs the configured helper.
    pub fn from_config(config: &CompletionConfig) -> Self {
        Self::new(
            KeyStore::from_config(&config.keys),
            BundleBuilder::from_config(&config.bundle),
            Arc::new(HelperInstaller::from_config(&config.installer)),
        )
    }

    /// The key store used for lookups.
    pub fn key_store(&self) -> &KeyStore {
        &self.keys
    }

    /// Complete a certificate request and install the credential.
    ///
    /// `request_path` is the certificate returned by the CA. Its private key
    /// must be in the key store under the certificate's subject.
    ///
    /// The attempt runs on its own task. Dropping the returned future does
    /// not stop it: the helper runs to completion, the bundle is removed
    /// afterwards, and the target stays locked until then.
    pub async fn complete(
        &self,
        request_path: impl AsRef<Path>,
        friendly_name: &str,
        target: InstallTarget,
    ) -> Result<Installed> {
        let guard = InFlightGuard::acquire(&self.in_flight, target)?;

        let attempt = Attempt {
            keys: self.keys.clone(),
            bundler: self.bundler.clone(),
            installer: Arc::clone(&self.installer),
            request_path: request_path.as_ref().to_path_buf(),
            friendly_name: friendly_name.to_string(),
            target,
            _guard: guard,
        };

        tokio::spawn(attempt.run())
            .await
            .map_err(|e| CompletionError::platform(format!("completion task failed: {}", e)))?
    }
}

/// One completion attempt, owning the target lock until it finishes.
struct Attempt {
    keys: KeyStore,
    bundler: BundleBuilder,
    installer: Arc<dyn Installer>,
    request_path: PathBuf,
    friendly_name: String,
    target: InstallTarget,
    _guard: InFlightGuard,
}

impl Attempt {
    async fn run(self) -> Result<Installed> {
        let target = self.target;

        let keys = self.keys.clone();
        let bundler = self.bundler.clone();
        let request_path = self.request_path.clone();
        let friendly_name = self.friendly_name.clone();
        let prepared = tokio::task::spawn_blocking(move || {
            prepare(&keys, &bundler, &request_path, &friendly_name, target)
        })
        .await
        .map_err(|e| CompletionError::platform(format!("bundle preparation failed: {}", e)))
        .and_then(|r| r);

        let bundle = match prepared {
            Ok(bundle) => bundle,
            Err(e) => {
                enter(WorkflowStage::Failed, target);
                tracing::warn!(error = %e, "Completion failed");
                return Err(e);
            }
        };

        let outcome = install(self.installer.as_ref(), &bundle, target).await;
        let result = match outcome {
            InstallOutcome::Installed => {
                enter(WorkflowStage::Completed, target);
                Ok(Installed {
                    friendly_name: bundle.friendly_name().to_string(),
                    target,
                    subject: bundle.subject().to_string(),
                    thumbprint: bundle.thumbprint().to_string(),
                })
            }
            InstallOutcome::Failed { exit_code } => {
                enter(WorkflowStage::Failed, target);
                Err(CompletionError::InstallerFailure { exit_code })
            }
            InstallOutcome::NotStarted(NotStarted::Declined) => {
                enter(WorkflowStage::Failed, target);
                Err(CompletionError::ElevationCancelled)
            }
            InstallOutcome::NotStarted(NotStarted::LaunchFailed(reason)) => {
                enter(WorkflowStage::Failed, target);
                Err(CompletionError::helper_launch(reason))
            }
        };

        finish(bundle, result, target)
    }
}

/// Remove the bundle. A cleanup failure replaces `result`.
fn finish(
    bundle: CredentialBundle,
    result: Result<Installed>,
    target: InstallTarget,
) -> Result<Installed> {
    let path = bundle.path().to_path_buf();
    if let Err(source) = bundle.close() {
        if let Err(e) = &result {
            tracing::error!(error = %e, "Installation failed before cleanup error");
        }
        return Err(CompletionError::BundleCleanupFailed {
            path,
            source,
            installed: result.is_ok(),
        });
    }
    enter(WorkflowStage::CleanedUp, target);
    result
}

fn prepare(
    keys: &KeyStore,
    bundler: &BundleBuilder,
    request_path: &Path,
    friendly_name: &str,
    target: InstallTarget,
) -> Result<CredentialBundle> {
    enter(WorkflowStage::Validating, target);
    if friendly_name.trim().is_empty() {
        return Err(CompletionError::missing_input("friendly name"));
    }
    let artifact = RequestArtifact::load(request_path)?;

    enter(WorkflowStage::KeyLookup, target);
    let key_path = keys.find_private_key(artifact.subject()).ok_or_else(|| {
        CompletionError::PrivateKeyNotFound {
            request: request_path.to_path_buf(),
            subject: artifact.subject().to_string(),
            expected: keys.key_path(artifact.subject()),
        }
    })?;

    enter(WorkflowStage::Bundling, target);
    bundler.build_from_artifact(&artifact, &key_path, friendly_name)
}

async fn install(
    installer: &dyn Installer,
    bundle: &CredentialBundle,
    target: InstallTarget,
) -> InstallOutcome {
    enter(WorkflowStage::Elevating, target);
    let request = InstallRequest {
        bundle_path: bundle.path(),
        passphrase: bundle.passphrase(),
        friendly_name: bundle.friendly_name(),
        target,
    };
    let outcome = installer.install(&request).await;
    if !matches!(outcome, InstallOutcome::NotStarted(_)) {
        enter(WorkflowStage::Installing, target);
    }
    outcome
}

/// How a diagnostic should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Something went wrong.
    Error,
    /// Nothing was done, but nothing went wrong either.
    Notice,
}

/// A single user-facing message describing a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Presentation severity.
    pub severity: Severity,
    /// Message text.
    pub message: String,
}

const ERROR_PREAMBLE: &str = "There was an error while performing this operation.";

impl Diagnostic {
    fn error(details: impl fmt::Display) -> Self {
        Self {
            severity: Severity::Error,
            message: format!("{}\n\nDetails:\n\n{}.", ERROR_PREAMBLE, details),
        }
    }

    /// The message shown for `error`.
    pub fn from_error(error: &CompletionError) -> Self {
        match error {
            CompletionError::InstallerFailure { exit_code } => Self {
                severity: Severity::Error,
                message: exit_code.to_string(),
            },
            CompletionError::ElevationCancelled => Self {
                severity: Severity::Notice,
                message: "The operation was not completed. The certificate was not installed."
                    .to_string(),
            },
            CompletionError::PrivateKeyNotFound { request, .. } => Self::error(format_args!(
                "Could not find private key for '{}'",
                request.display()
            )),
            other => Self::error(other),
        }
    }
}

impl From<&CompletionError> for Diagnostic {
    fn from(error: &CompletionError) -> Self {
        Self::from_error(error)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rcgen::{CertificateParams, DnType, KeyPair};

    /// Removes the bundle out from under the coordinator, then reports `outcome`.
    struct RemovingInstaller {
        outcome: InstallOutcome,
    }

    #[async_trait]
    impl Installer for RemovingInstaller {
        async fn install(&self, request: &InstallRequest<'_>) -> InstallOutcome {
            std::fs::remove_file(request.bundle_path).unwrap();
            self.outcome.clone()
        }
    }

    fn coordinator(dir: &Path, outcome: InstallOutcome) -> (WorkflowCoordinator, PathBuf) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, "cleanup");
        let cert = params.self_signed(&key).unwrap();
        let request = dir.join("req.cer");
        std::fs::write(&request, cert.pem()).unwrap();

        let keys = KeyStore::new(dir.join("keys"));
        keys.store_private_key("CN=cleanup", key.serialize_pem().as_bytes())
            .unwrap();

        let coordinator = WorkflowCoordinator::new(
            keys,
            BundleBuilder::default().with_directory(dir),
            Arc::new(RemovingInstaller { outcome }),
        );
        (coordinator, request)
    }

    #[tokio::test]
    async fn test_cleanup_failure_after_install() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, request) = coordinator(dir.path(), InstallOutcome::Installed);

        let err = coordinator
            .complete(&request, "Site", InstallTarget::Personal)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CompletionError::BundleCleanupFailed {
                installed: true,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cleanup_failure_after_failed_install() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, request) =
            coordinator(dir.path(), InstallOutcome::Failed { exit_code: 5 });

        let err = coordinator
            .complete(&request, "Site", InstallTarget::Personal)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CompletionError::BundleCleanupFailed {
                installed: false,
                ..
            }
        ));

        // The target is released after a cleanup failure
        let err = coordinator
            .complete(&request, "Site", InstallTarget::Personal)
            .await
            .unwrap_err();
        assert!(matches!(err, CompletionError::BundleCleanupFailed { .. }));
    }

    #[test]
    fn test_diagnostic_request_not_found() {
        let d = Diagnostic::from_error(&CompletionError::request_not_found("missing.cer"));
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(
            d.message,
            "There was an error while performing this operation.\n\nDetails:\n\nCould not find file 'missing.cer'."
        );
    }

    #[test]
    fn test_diagnostic_private_key_not_found() {
        let d = Diagnostic::from_error(&CompletionError::PrivateKeyNotFound {
            request: PathBuf::from("req.cer"),
            subject: "CN=test".to_string(),
            expected: PathBuf::from("/keys/x.key"),
        });
        assert!(d.message.ends_with("Could not find private key for 'req.cer'."));
    }

    #[test]
    fn test_diagnostic_exit_code_is_raw() {
        let d = Diagnostic::from_error(&CompletionError::InstallerFailure { exit_code: 5 });
        assert_eq!(d.message, "5");
    }

    #[test]
    fn test_diagnostic_declined_is_notice() {
        let d = Diagnostic::from_error(&CompletionError::ElevationCancelled);
        assert_eq!(d.severity, Severity::Notice);
    }

    #[test]
    fn test_in_flight_guard() {
        let set = Arc::new(Mutex::new(HashSet::new()));
        let guard = InFlightGuard::acquire(&set, InstallTarget::Personal).unwrap();
        assert!(matches!(
            InFlightGuard::acquire(&set, InstallTarget::Personal),
            Err(CompletionError::InstallInProgress { .. })
        ));
        let other = InFlightGuard::acquire(&set, InstallTarget::WebHosting);
        assert!(other.is_ok());
        drop(guard);
        assert!(InFlightGuard::acquire(&set, InstallTarget::Personal).is_ok());
    }
}
