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

//! Private key location for pending certificate requests.
//!
//! When a certificate request is created its private key is saved under a
//! file name derived from the request's subject. Completing the request later
//! recomputes that name from the subject of the signed certificate. There is
//! exactly one candidate location per subject; no directory scanning or fuzzy
//! matching is performed.
//!
//! # Subject Identity
//!
//! The subject identity is the distinguished name rendered as
//! `CN=host, O=Org, C=US` in encoding order, with RFC 4514 escaping of special
//! characters. Both the request and the issued certificate are rendered with
//! [`subject_identity`], so the mapping only depends on the CA preserving the
//! requested subject.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use openssl::x509::X509NameRef;
use sha2::{Digest, Sha256};

use crate::config::KeyStoreConfig;
use crate::error::Result;

/// Default file extension of stored request keys.
pub const DEFAULT_KEY_EXTENSION: &str = "key";

/// Render a distinguished name as a subject identity string.
pub fn subject_identity(name: &X509NameRef) -> String {
    name.entries()
        .map(|entry| {
            let object = entry.object();
            let attr = object
                .nid()
                .short_name()
                .map(str::to_string)
                .unwrap_or_else(|_| object.to_string());
            let value = entry
                .data()
                .as_utf8()
                .map(|s| escape_value(&s))
                .unwrap_or_default();
            format!("{}={}", attr, value)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len());
    for (i, &c) in chars.iter().enumerate() {
        let leading = i == 0 && (c == ' ' || c == '#');
        let trailing = i + 1 == chars.len() && c == ' ';
        if leading || trailing || matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// On-disk store of private keys belonging to pending requests.
#[derive(Debug, Clone)]
pub struct KeyStore {
    directory: PathBuf,
    extension: String,
}

impl KeyStore {
    /// Create a key store rooted at `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            extension: DEFAULT_KEY_EXTENSION.to_string(),
        }
    }

    /// Create a key store from configuration.
    pub fn from_config(config: &KeyStoreConfig) -> Self {
        Self::new(&config.directory).with_extension(&config.extension)
    }

    /// Use a different key file extension.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Directory holding the keys.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The one location a key for `subject` may live at.
    pub fn key_path(&self, subject: &str) -> PathBuf {
        let digest = Sha256::digest(subject.as_bytes());
        let stem: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        self.directory.join(format!("{}.{}", stem, self.extension))
    }

    /// Find the private key generated for `subject`.
    ///
    /// Returns `None` when the derived path does not exist. This is a
    /// read-only existence check.
    pub fn find_private_key(&self, subject: &str) -> Option<PathBuf> {
        let path = self.key_path(subject);
        if path.is_file() {
            tracing::debug!(subject, path = %path.display(), "Found private key");
            Some(path)
        } else {
            tracing::debug!(subject, path = %path.display(), "No private key at derived path");
            None
        }
    }

    /// Save the PEM-encoded private key generated for `subject`.
    ///
    /// An existing key for the same subject is replaced. On Unix the file is
    /// created readable by the owner only.
    pub fn store_private_key(&self, subject: &str, key_pem: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.directory)?;
        let path = self.key_path(subject);

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&path)?;
        file.write_all(key_pem)?;
        file.sync_all()?;

        tracing::info!(subject, path = %path.display(), "Stored request private key");
        Ok(path)
    }
}
