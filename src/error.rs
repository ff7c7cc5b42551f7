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

//! Error types for certificate request completion.
//!
//! Every failure of a completion attempt is terminal for that attempt; nothing
//! is retried automatically. The variants are grouped by the stage that
//! produces them so callers can tell whether sensitive material had been
//! written to disk when the failure happened.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::InstallTarget;

/// Result type alias using [`CompletionError`].
pub type Result<T> = std::result::Result<T, CompletionError>;

/// Errors that can occur while completing a certificate request.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// A required input field was blank.
    #[error("Missing required input: {field}")]
    MissingInput {
        /// Name of the blank field.
        field: &'static str,
    },

    /// The signed request response file does not exist.
    #[error("Could not find file '{}'", path.display())]
    RequestArtifactNotFound {
        /// Path supplied by the caller.
        path: PathBuf,
    },

    /// The request response file exists but is not a certificate.
    #[error("Could not read certificate from '{}': {reason}", path.display())]
    InvalidRequestArtifact {
        /// Path supplied by the caller.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },

    /// No private key exists at the location derived from the subject.
    #[error("Could not find private key for '{}'", request.display())]
    PrivateKeyNotFound {
        /// The request response file whose key was looked up.
        request: PathBuf,
        /// Subject identity extracted from the certificate.
        subject: String,
        /// Where the key was expected.
        expected: PathBuf,
    },

    /// The private key file exists but could not be parsed.
    #[error("Could not read private key '{}': {reason}", path.display())]
    PrivateKeyUnreadable {
        /// Key file path.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },

    /// The located private key does not belong to the certificate.
    #[error("The private key does not match the certificate in '{}'", request.display())]
    PrivateKeyMismatch {
        /// The request response file.
        request: PathBuf,
    },

    /// The credential bundle could not be encoded.
    #[error("Failed to encode credential bundle: {0}")]
    BundleEncoding(String),

    /// The credential bundle could not be written to disk.
    #[error("Failed to write credential bundle: {source}")]
    BundleWriteFailed {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The user declined the elevation prompt; the helper never ran.
    #[error("Elevation was cancelled; the certificate was not installed")]
    ElevationCancelled,

    /// The elevated helper could not be started.
    #[error("Failed to start the certificate installer: {reason}")]
    HelperLaunchFailed {
        /// Why the launch failed.
        reason: String,
    },

    /// The helper ran and exited with a non-zero status.
    #[error("Certificate installer exited with code {exit_code}")]
    InstallerFailure {
        /// Exit code reported by the helper, unmodified.
        exit_code: i32,
    },

    /// Another completion for the same target store is still running.
    #[error("An installation into the {target} store is already in progress")]
    InstallInProgress {
        /// Target store that is busy.
        target: InstallTarget,
    },

    /// The bundle file could not be removed after the attempt.
    #[error("Failed to remove credential bundle '{}': {source}", path.display())]
    BundleCleanupFailed {
        /// Bundle path left on disk.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
        /// Whether the helper reported a successful installation.
        installed: bool,
    },

    /// A certificate request could not be generated.
    #[error("Failed to generate certificate request: {0}")]
    RequestGeneration(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Platform-specific operation failed or is unavailable.
    #[error("Platform error: {0}")]
    Platform(String),

    /// OpenSSL error.
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] openssl::error::ErrorStack),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompletionError {
    /// Create a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a platform error with the given message.
    pub fn platform(msg: impl Into<String>) -> Self {
        Self::Platform(msg.into())
    }

    /// Create a request generation error with the given message.
    pub fn request_generation(msg: impl Into<String>) -> Self {
        Self::RequestGeneration(msg.into())
    }

    /// Create a missing input error.
    pub fn missing_input(field: &'static str) -> Self {
        Self::MissingInput { field }
    }

    /// Create a request-not-found error.
    pub fn request_not_found(path: impl Into<PathBuf>) -> Self {
        Self::RequestArtifactNotFound { path: path.into() }
    }

    /// Create an invalid request artifact error.
    pub fn invalid_request(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidRequestArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a helper launch error.
    pub fn helper_launch(reason: impl Into<String>) -> Self {
        Self::HelperLaunchFailed {
            reason: reason.into(),
        }
    }

    /// Returns true if this failure happens before any bundle is written.
    ///
    /// These failures need no cleanup: nothing sensitive was created.
    pub fn is_before_bundle(&self) -> bool {
        matches!(
            self,
            Self::MissingInput { .. }
                | Self::RequestArtifactNotFound { .. }
                | Self::InvalidRequestArtifact { .. }
                | Self::PrivateKeyNotFound { .. }
                | Self::PrivateKeyUnreadable { .. }
                | Self::PrivateKeyMismatch { .. }
                | Self::InstallInProgress { .. }
        )
    }

    /// Returns true if the helper process never started.
    pub fn helper_not_started(&self) -> bool {
        matches!(
            self,
            Self::ElevationCancelled | Self::HelperLaunchFailed { .. }
        )
    }

    /// Returns the helper exit code if this is an installer failure.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::InstallerFailure { exit_code } => Some(*exit_code),
            _ => None,
        }
    }
}
