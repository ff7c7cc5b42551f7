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

//! Shared value types for the completion workflow.

use std::fmt;
use std::str::FromStr;

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CompletionError, Result};

/// Smallest accepted passphrase entropy, in bytes.
pub const MIN_PASSPHRASE_BYTES: usize = 16;

/// Trust store that receives the completed certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallTarget {
    /// The machine's personal certificate store.
    #[default]
    Personal,
    /// The web hosting store, intended for server certificates.
    WebHosting,
}

impl InstallTarget {
    /// All selectable targets, in presentation order.
    pub const ALL: [InstallTarget; 2] = [Self::Personal, Self::WebHosting];

    /// Store identifier passed to the installer helper.
    pub fn store_name(self) -> &'static str {
        match self {
            Self::Personal => "MY",
            Self::WebHosting => "WebHosting",
        }
    }

    /// Parse a helper store identifier (`MY`, `WebHosting`).
    pub fn from_store_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.store_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for InstallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Personal => write!(f, "Personal"),
            Self::WebHosting => write!(f, "Web Hosting"),
        }
    }
}

impl FromStr for InstallTarget {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "personal" | "my" => Ok(Self::Personal),
            "webhosting" => Ok(Self::WebHosting),
            other => Err(format!(
                "unknown store '{}': expected 'personal' or 'web-hosting'",
                other
            )),
        }
    }
}

/// Passphrase protecting a credential bundle in transit to the helper.
///
/// The value is wiped from memory when dropped and is never printed.
#[derive(Clone)]
pub struct Passphrase(Zeroizing<String>);

impl Passphrase {
    /// Generate a fresh passphrase from `bytes` bytes of CSPRNG output.
    pub fn generate(bytes: usize) -> Result<Self> {
        if bytes < MIN_PASSPHRASE_BYTES {
            return Err(CompletionError::config(format!(
                "passphrase must use at least {} random bytes, got {}",
                MIN_PASSPHRASE_BYTES, bytes
            )));
        }

        let mut raw = vec![0u8; bytes];
        openssl::rand::rand_bytes(&mut raw)?;
        let encoded = BASE64_URL_SAFE_NO_PAD.encode(&raw);
        raw.zeroize();

        Ok(Self(Zeroizing::new(encoded)))
    }

    /// Get the value. Use with care.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Get the length without exposing the value.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty without exposing the value.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Passphrase {
    fn from(s: &str) -> Self {
        Self(Zeroizing::new(s.to_string()))
    }
}

impl From<String> for Passphrase {
    fn from(s: String) -> Self {
        Self(Zeroizing::new(s))
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// A credential that the helper reported as installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Installed {
    /// Display label given to the certificate.
    pub friendly_name: String,
    /// Store that received the credential.
    pub target: InstallTarget,
    /// Subject identity of the certificate.
    pub subject: String,
    /// SHA-1 thumbprint, colon separated upper-case hex.
    pub thumbprint: String,
}
