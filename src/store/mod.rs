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

//! Trust stores that receive a completed credential.
//!
//! These types run inside the elevated `cert-installer` helper. The helper
//! opens the bundle with the passphrase it was given, then hands the decoded
//! credential to a [`TrustStore`]:
//!
//! - [`DirectoryStore`] keeps one PEM file per credential under a root
//!   directory, one sub-directory per target store. Works everywhere.
//! - `SystemStore` (Windows only) imports into the local machine
//!   certificate store named by the target.
//!
//! Failures map onto the helper's exit code protocol through
//! [`StoreError::exit_code`].

mod directory;
#[cfg(windows)]
mod system;

use std::fs;
use std::path::Path;

use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::bundle::thumbprint;
use crate::keys::subject_identity;
use crate::types::{InstallTarget, Passphrase};

pub use directory::{DEFAULT_STORE_ROOT, DirectoryStore};
#[cfg(windows)]
pub use system::SystemStore;

/// Helper exit code: credential installed.
pub const EXIT_OK: i32 = 0;
/// Helper exit code: invalid command line.
pub const EXIT_USAGE: i32 = 2;
/// Helper exit code: bundle missing, corrupt, or wrong passphrase.
pub const EXIT_BUNDLE_UNREADABLE: i32 = 3;
/// Helper exit code: the target store could not be opened.
pub const EXIT_STORE_UNAVAILABLE: i32 = 4;
/// Helper exit code: the store refused the credential.
pub const EXIT_IMPORT_FAILED: i32 = 5;

/// Errors raised while importing a bundle into a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The bundle could not be read or decrypted.
    #[error("Cannot open credential bundle: {0}")]
    BundleUnreadable(String),

    /// The target store could not be opened.
    #[error("Certificate store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store rejected the credential.
    #[error("Import failed: {0}")]
    ImportFailed(String),
}

impl StoreError {
    /// Exit code the helper reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BundleUnreadable(_) => EXIT_BUNDLE_UNREADABLE,
            Self::StoreUnavailable(_) => EXIT_STORE_UNAVAILABLE,
            Self::ImportFailed(_) => EXIT_IMPORT_FAILED,
        }
    }
}

/// A decrypted credential bundle.
pub struct DecodedBundle {
    der: Zeroizing<Vec<u8>>,
    passphrase: Passphrase,
    certificate: X509,
    private_key: PKey<Private>,
    chain: Vec<X509>,
    subject: String,
    thumbprint: String,
}

impl DecodedBundle {
    /// Read and decrypt a PKCS#12 bundle.
    pub fn open(path: &Path, passphrase: Passphrase) -> Result<Self, StoreError> {
        let unreadable = |e: &dyn std::fmt::Display| StoreError::BundleUnreadable(e.to_string());

        let der = Zeroizing::new(fs::read(path).map_err(|e| unreadable(&e))?);
        let parsed = Pkcs12::from_der(&der)
            .and_then(|p12| p12.parse2(passphrase.expose()))
            .map_err(|e| unreadable(&e))?;

        let certificate = parsed
            .cert
            .ok_or_else(|| unreadable(&"bundle has no certificate"))?;
        let private_key = parsed
            .pkey
            .ok_or_else(|| unreadable(&"bundle has no private key"))?;
        let chain = parsed
            .ca
            .map(|stack| stack.into_iter().collect())
            .unwrap_or_default();

        let subject = subject_identity(certificate.subject_name());
        let thumbprint = thumbprint(&certificate).map_err(|e| unreadable(&e))?;

        Ok(Self {
            der,
            passphrase,
            certificate,
            private_key,
            chain,
            subject,
            thumbprint,
        })
    }

    /// Encoded PKCS#12 bytes as read from disk.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Passphrase the bundle was opened with.
    pub fn passphrase(&self) -> &Passphrase {
        &self.passphrase
    }

    /// The end-entity certificate.
    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }

    /// The certificate's private key.
    pub fn private_key(&self) -> &PKey<Private> {
        &self.private_key
    }

    /// Additional certificates carried in the bundle.
    pub fn chain(&self) -> &[X509] {
        &self.chain
    }

    /// Subject identity of the certificate.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// SHA-1 thumbprint of the certificate.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }
}

impl std::fmt::Debug for DecodedBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedBundle")
            .field("subject", &self.subject)
            .field("thumbprint", &self.thumbprint)
            .finish_non_exhaustive()
    }
}

/// Where an imported credential ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    /// Store-specific location, e.g. a file path or `LocalMachine\MY`.
    pub location: String,
    /// Thumbprint of the imported certificate.
    pub thumbprint: String,
}

/// A destination for completed credentials.
pub trait TrustStore {
    /// Short description used in log messages.
    fn describe(&self) -> String;

    /// Import `bundle` into the store for `target`, labelled `friendly_name`.
    ///
    /// An existing credential with the same thumbprint is replaced.
    fn import(
        &self,
        bundle: &DecodedBundle,
        friendly_name: &str,
        target: InstallTarget,
    ) -> Result<StoredCredential, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair};

    pub(crate) fn write_bundle(dir: &Path, passphrase: &str) -> std::path::PathBuf {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, "store-test");
        let cert = params.self_signed(&key).unwrap();

        let x509 = X509::from_der(cert.der()).unwrap();
        let pkey = PKey::private_key_from_pem(key.serialize_pem().as_bytes()).unwrap();
        let p12 = Pkcs12::builder()
            .name("store-test")
            .pkey(&pkey)
            .cert(&x509)
            .build2(passphrase)
            .unwrap();

        let path = dir.join("bundle.pfx");
        fs::write(&path, p12.to_der().unwrap()).unwrap();
        path
    }

    #[test]
    fn test_open_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bundle(dir.path(), "secret");
        let bundle = DecodedBundle::open(&path, Passphrase::from("secret")).unwrap();
        assert_eq!(bundle.subject(), "CN=store-test");
        assert!(bundle.chain().is_empty());
        assert!(!format!("{:?}", bundle).contains("secret"));
    }

    #[test]
    fn test_open_bundle_wrong_passphrase() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_bundle(dir.path(), "secret");
        let err = DecodedBundle::open(&path, Passphrase::from("nope")).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_BUNDLE_UNREADABLE);
    }

    #[test]
    fn test_open_missing_bundle() {
        let err =
            DecodedBundle::open(Path::new("/nonexistent/b.pfx"), Passphrase::from("x")).unwrap_err();
        assert!(matches!(err, StoreError::BundleUnreadable(_)));
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            EXIT_OK,
            EXIT_USAGE,
            StoreError::BundleUnreadable(String::new()).exit_code(),
            StoreError::StoreUnavailable(String::new()).exit_code(),
            StoreError::ImportFailed(String::new()).exit_code(),
        ];
        let unique: std::collections::HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }
}
