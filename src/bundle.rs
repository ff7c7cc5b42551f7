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

//! Credential bundle creation.
//!
//! The signed certificate and its private key are combined into a
//! password-protected PKCS#12 file that the elevated helper imports. The file
//! is the only place the private key leaves the key store, so its lifetime is
//! tied to a [`CredentialBundle`] value:
//!
//! - the temporary file is created before anything is written to it, so a
//!   failed write never leaves a stray file behind
//! - every bundle gets a fresh random passphrase
//! - dropping the bundle deletes the file; [`CredentialBundle::close`] does the
//!   same and reports the error

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use tempfile::TempPath;
use zeroize::Zeroizing;

use crate::config::BundleConfig;
use crate::error::{CompletionError, Result};
use crate::keys::subject_identity;
use crate::types::{MIN_PASSPHRASE_BYTES, Passphrase};

/// A signed certificate returned by the certificate authority.
#[derive(Debug, Clone)]
pub struct RequestArtifact {
    path: PathBuf,
    certificate: X509,
    subject: String,
    thumbprint: String,
}

impl RequestArtifact {
    /// Load a certificate from a PEM or DER file.
    ///
    /// A blank or non-existent path yields
    /// [`CompletionError::RequestArtifactNotFound`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() || !path.is_file() {
            return Err(CompletionError::request_not_found(path));
        }

        let data = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CompletionError::request_not_found(path),
            _ => CompletionError::invalid_request(path, e.to_string()),
        })?;

        let certificate = parse_certificate(&data)
            .map_err(|e| CompletionError::invalid_request(path, e.to_string()))?;

        Self::from_certificate(path, certificate)
    }

    /// Wrap an already parsed certificate.
    pub fn from_certificate(path: impl Into<PathBuf>, certificate: X509) -> Result<Self> {
        let subject = subject_identity(certificate.subject_name());
        let thumbprint = thumbprint(&certificate)?;
        Ok(Self {
            path: path.into(),
            certificate,
            subject,
            thumbprint,
        })
    }

    /// Path the certificate was read from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The parsed certificate.
    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }

    /// Subject identity used to locate the private key.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// SHA-1 thumbprint, colon separated upper-case hex.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }
}

fn parse_certificate(data: &[u8]) -> std::result::Result<X509, openssl::error::ErrorStack> {
    if data.windows(11).any(|w| w == b"-----BEGIN ") {
        X509::from_pem(data)
    } else {
        X509::from_der(data)
    }
}

/// SHA-1 thumbprint of a certificate, colon separated upper-case hex.
pub fn thumbprint(certificate: &X509) -> Result<String> {
    let digest = certificate.digest(MessageDigest::sha1())?;
    Ok(digest
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":"))
}

/// Load a PEM or DER private key.
pub fn load_private_key(path: &Path) -> Result<PKey<Private>> {
    let unreadable = |reason: String| CompletionError::PrivateKeyUnreadable {
        path: path.to_path_buf(),
        reason,
    };

    let data = Zeroizing::new(fs::read(path).map_err(|e| unreadable(e.to_string()))?);
    PKey::private_key_from_pem(&data)
        .or_else(|_| PKey::private_key_from_der(&data))
        .map_err(|e| unreadable(e.to_string()))
}

/// A PKCS#12 file on disk, deleted when this value is dropped or closed.
#[derive(Debug)]
pub struct CredentialBundle {
    path: TempPath,
    passphrase: Passphrase,
    friendly_name: String,
    subject: String,
    thumbprint: String,
}

impl CredentialBundle {
    /// Location of the bundle file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Passphrase protecting the bundle.
    pub fn passphrase(&self) -> &Passphrase {
        &self.passphrase
    }

    /// Friendly name embedded in the bundle.
    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    /// Subject identity of the bundled certificate.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Thumbprint of the bundled certificate.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Delete the bundle file now.
    pub fn close(self) -> io::Result<()> {
        let path = self.path.to_path_buf();
        let result = self.path.close();
        match &result {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed credential bundle"),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Failed to remove credential bundle")
            }
        }
        result
    }
}

/// Encodes certificates and keys into password-protected PKCS#12 files.
#[derive(Debug, Clone)]
pub struct BundleBuilder {
    directory: Option<PathBuf>,
    passphrase_bytes: usize,
    legacy_encryption: bool,
}

impl Default for BundleBuilder {
    fn default() -> Self {
        Self::from_config(&BundleConfig::default())
    }
}

impl BundleBuilder {
    /// Create a builder from configuration.
    pub fn from_config(config: &BundleConfig) -> Self {
        Self {
            directory: config.directory.clone(),
            passphrase_bytes: config.passphrase_bytes.max(MIN_PASSPHRASE_BYTES),
            legacy_encryption: config.legacy_encryption,
        }
    }

    /// Write bundles into `directory` instead of the system temp directory.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    /// Use SHA-1/3DES encryption for importers that predate AES PKCS#12.
    pub fn with_legacy_encryption(mut self, legacy: bool) -> Self {
        self.legacy_encryption = legacy;
        self
    }

    /// Build a bundle from a certificate file and a private key file.
    pub fn build(
        &self,
        certificate_path: &Path,
        key_path: &Path,
        friendly_name: &str,
    ) -> Result<CredentialBundle> {
        let artifact = RequestArtifact::load(certificate_path)?;
        self.build_from_artifact(&artifact, key_path, friendly_name)
    }

    /// Build a bundle from a loaded certificate and a private key file.
    ///
    /// Fails with [`CompletionError::PrivateKeyMismatch`] if the key does not
    /// belong to the certificate.
    pub fn build_from_artifact(
        &self,
        artifact: &RequestArtifact,
        key_path: &Path,
        friendly_name: &str,
    ) -> Result<CredentialBundle> {
        let pkey = load_private_key(key_path)?;

        if !artifact.certificate().public_key()?.public_eq(&pkey) {
            return Err(CompletionError::PrivateKeyMismatch {
                request: artifact.path().to_path_buf(),
            });
        }

        let passphrase = Passphrase::generate(self.passphrase_bytes)?;

        let mut builder = Pkcs12::builder();
        builder
            .name(friendly_name)
            .pkey(&pkey)
            .cert(artifact.certificate());
        if self.legacy_encryption {
            builder
                .key_algorithm(Nid::PBE_WITHSHA1AND3_KEY_TRIPLEDES_CBC)
                .cert_algorithm(Nid::PBE_WITHSHA1AND3_KEY_TRIPLEDES_CBC)
                .mac_md(MessageDigest::sha1());
        }
        let der = Zeroizing::new(
            builder
                .build2(passphrase.expose())
                .and_then(|p12| p12.to_der())
                .map_err(|e| CompletionError::BundleEncoding(e.to_string()))?,
        );

        let path = self.write(&der)?;
        tracing::info!(
            path = %path.display(),
            subject = artifact.subject(),
            "Wrote credential bundle"
        );

        Ok(CredentialBundle {
            path,
            passphrase,
            friendly_name: friendly_name.to_string(),
            subject: artifact.subject().to_string(),
            thumbprint: artifact.thumbprint().to_string(),
        })
    }

    fn write(&self, der: &[u8]) -> Result<TempPath> {
        let write_failed = |source| CompletionError::BundleWriteFailed { source };

        let mut builder = tempfile::Builder::new();
        builder.prefix("cert-completion-").suffix(".pfx");
        let mut file = match &self.directory {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(write_failed)?;

        // The file is removed when `file` drops, so an error here leaves nothing behind.
        file.write_all(der).map_err(write_failed)?;
        file.as_file().sync_all().map_err(write_failed)?;

        Ok(file.into_temp_path())
    }
}
