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

//! File-based trust store.
//!
//! Layout: `<root>/<store>/<friendly-name>-<thumbprint>.pem`, where `<store>`
//! is the helper store identifier (`MY`, `WebHosting`). Each file holds the
//! PKCS#8 private key, the certificate, and any chain certificates.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use zeroize::Zeroizing;

use super::{DecodedBundle, StoreError, StoredCredential, TrustStore};
use crate::types::InstallTarget;

/// Default root on Unix systems.
pub const DEFAULT_STORE_ROOT: &str = "/var/lib/cert-completion/stores";

/// Trust store kept in a directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    /// Create a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path a credential with this name and thumbprint is written to.
    pub fn credential_path(
        &self,
        target: InstallTarget,
        friendly_name: &str,
        thumbprint: &str,
    ) -> PathBuf {
        let label: String = friendly_name
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(target.store_name()).join(format!(
            "{}-{}.pem",
            label,
            thumbprint.replace(':', "")
        ))
    }
}

impl TrustStore for DirectoryStore {
    fn describe(&self) -> String {
        format!("directory store at {}", self.root.display())
    }

    fn import(
        &self,
        bundle: &DecodedBundle,
        friendly_name: &str,
        target: InstallTarget,
    ) -> Result<StoredCredential, StoreError> {
        let store_dir = self.root.join(target.store_name());
        fs::create_dir_all(&store_dir).map_err(|e| {
            StoreError::StoreUnavailable(format!("{}: {}", store_dir.display(), e))
        })?;

        let failed = |e: &dyn std::fmt::Display| StoreError::ImportFailed(e.to_string());

        let mut contents = Zeroizing::new(
            bundle
                .private_key()
                .private_key_to_pem_pkcs8()
                .map_err(|e| failed(&e))?,
        );
        contents.extend(bundle.certificate().to_pem().map_err(|e| failed(&e))?);
        for ca in bundle.chain() {
            contents.extend(ca.to_pem().map_err(|e| failed(&e))?);
        }

        let path = self.credential_path(target, friendly_name, bundle.thumbprint());

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path).map_err(|e| failed(&e))?;
        file.write_all(&contents).map_err(|e| failed(&e))?;
        file.sync_all().map_err(|e| failed(&e))?;

        tracing::info!(
            path = %path.display(),
            subject = bundle.subject(),
            "Imported credential"
        );

        Ok(StoredCredential {
            location: path.display().to_string(),
            thumbprint: bundle.thumbprint().to_string(),
        })
    }
}
