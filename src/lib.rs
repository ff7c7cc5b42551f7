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

//! # cert-completion
//!
//! Completes a pending certificate request and installs the resulting
//! credential into a machine trust store through an elevated helper process.
//!
//! A certificate request is created in two steps. First a key pair and a
//! PKCS#10 request are generated and the private key is saved locally
//! ([`request`]). Later the certificate authority returns a signed
//! certificate, and this crate:
//!
//! 1. finds the private key stored for the certificate's subject ([`keys`])
//! 2. combines certificate and key into a PKCS#12 bundle protected by a fresh
//!    random passphrase, in a temporary file ([`bundle`])
//! 3. runs the `cert-installer` helper with elevated rights to import the
//!    bundle into the selected store ([`installer`], [`store`])
//! 4. deletes the bundle, whatever the outcome ([`workflow`])
//!
//! ## Quick Start
//!
//! ```no_run
//! use cert_completion::{CompletionConfig, InstallTarget, WorkflowCoordinator};
//! use cert_completion::workflow::Diagnostic;
//!
//! #[tokio::main]
//! async fn main() {
//!     let coordinator = WorkflowCoordinator::from_config(&CompletionConfig::default());
//!
//!     match coordinator
//!         .complete("www.example.com.cer", "www.example.com", InstallTarget::WebHosting)
//!         .await
//!     {
//!         Ok(installed) => println!("Installed {}", installed.thumbprint),
//!         Err(e) => eprintln!("{}", Diagnostic::from_error(&e)),
//!     }
//! }
//! ```
//!
//! ## Cargo Features
//!
//! - `csr-gen` (default): Enables certificate request generation using `rcgen`

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bundle;
pub mod config;
pub mod error;
pub mod form;
pub mod installer;
pub mod keys;
pub mod logging;
pub mod store;
pub mod types;
pub mod workflow;

#[cfg(feature = "csr-gen")]
pub mod request;

// Re-export main types at crate root for convenience
pub use bundle::{BundleBuilder, CredentialBundle, RequestArtifact};
pub use config::{CompletionConfig, ConfigLoader};
pub use error::{CompletionError, Result};
pub use installer::{HelperInstaller, InstallOutcome, InstallRequest, Installer, NotStarted};
pub use keys::KeyStore;
pub use types::{InstallTarget, Installed, Passphrase};
pub use workflow::{Diagnostic, WorkflowCoordinator};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
