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

//! Certificate request creation.
//!
//! This is the step that precedes completion: a key pair and a PKCS#10
//! request are generated, the request is handed to a certificate authority,
//! and the private key is kept in the [`KeyStore`] under the name derived from
//! the request subject. It is feature-gated behind the `csr-gen` feature.

use std::net::IpAddr;
use std::path::PathBuf;

use openssl::x509::X509Req;
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose, SanType,
};
use zeroize::Zeroizing;

use crate::error::{CompletionError, Result};
use crate::keys::{KeyStore, subject_identity};

/// Builder for certificate signing requests.
///
/// # Example
///
/// ```no_run
/// use cert_completion::keys::KeyStore;
/// use cert_completion::request::{CsrBuilder, create_request};
///
/// let store = KeyStore::new("/var/lib/cert-completion/requests");
/// let pending = create_request(
///     CsrBuilder::new()
///         .common_name("www.example.com")
///         .organization("Example Corp")
///         .country("US")
///         .san_dns("www.example.com")
///         .extended_key_usage_server_auth(),
///     &store,
/// )
/// .unwrap();
/// println!("{}", pending.csr_pem);
/// ```
pub struct CsrBuilder {
    params: CertificateParams,
    dns_names: Vec<String>,
    key_pair: Option<KeyPair>,
}

impl Default for CsrBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CsrBuilder {
    /// Create a new CSR builder with default parameters.
    pub fn new() -> Self {
        let mut params = CertificateParams::default();
        // rcgen seeds a placeholder common name
        params.distinguished_name = DistinguishedName::new();
        Self {
            params,
            dns_names: Vec::new(),
            key_pair: None,
        }
    }

    /// Set the Common Name (CN) for the subject.
    pub fn common_name(mut self, cn: impl Into<String>) -> Self {
        self.params
            .distinguished_name
            .push(DnType::CommonName, cn.into());
        self
    }

    /// Set the Organization (O) for the subject.
    pub fn organization(mut self, org: impl Into<String>) -> Self {
        self.params
            .distinguished_name
            .push(DnType::OrganizationName, org.into());
        self
    }

    /// Set the Organizational Unit (OU) for the subject.
    pub fn organizational_unit(mut self, ou: impl Into<String>) -> Self {
        self.params
            .distinguished_name
            .push(DnType::OrganizationalUnitName, ou.into());
        self
    }

    /// Set the Locality (L) for the subject.
    pub fn locality(mut self, locality: impl Into<String>) -> Self {
        self.params
            .distinguished_name
            .push(DnType::LocalityName, locality.into());
        self
    }

    /// Set the State/Province (ST) for the subject.
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.params
            .distinguished_name
            .push(DnType::StateOrProvinceName, state.into());
        self
    }

    /// Set the Country (C) for the subject.
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.params
            .distinguished_name
            .push(DnType::CountryName, country.into());
        self
    }

    /// Add a DNS Subject Alternative Name.
    pub fn san_dns(mut self, dns: impl Into<String>) -> Self {
        self.dns_names.push(dns.into());
        self
    }

    /// Add an IP address Subject Alternative Name.
    pub fn san_ip(mut self, ip: IpAddr) -> Self {
        self.params.subject_alt_names.push(SanType::IpAddress(ip));
        self
    }

    /// Enable digital signature and key encipherment key usages.
    pub fn key_usage_tls(mut self) -> Self {
        self.params
            .key_usages
            .extend([KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment]);
        self
    }

    /// Add TLS server authentication extended key usage.
    pub fn extended_key_usage_server_auth(mut self) -> Self {
        self.params
            .extended_key_usages
            .push(ExtendedKeyUsagePurpose::ServerAuth);
        self
    }

    /// Add TLS client authentication extended key usage.
    pub fn extended_key_usage_client_auth(mut self) -> Self {
        self.params
            .extended_key_usages
            .push(ExtendedKeyUsagePurpose::ClientAuth);
        self
    }

    /// Use an existing key pair instead of generating a new one.
    pub fn with_key_pair(mut self, key_pair: KeyPair) -> Self {
        self.key_pair = Some(key_pair);
        self
    }

    /// Build the CSR, generating an ECDSA P-256 key pair unless one was given.
    ///
    /// Returns the DER-encoded CSR and the key pair.
    pub fn build(mut self) -> Result<(Vec<u8>, KeyPair)> {
        for dns in self.dns_names.drain(..) {
            let name = dns.clone().try_into().map_err(|e| {
                CompletionError::request_generation(format!("Invalid DNS name '{}': {}", dns, e))
            })?;
            self.params.subject_alt_names.push(SanType::DnsName(name));
        }

        let key_pair = match self.key_pair.take() {
            Some(kp) => kp,
            None => KeyPair::generate().map_err(|e| {
                CompletionError::request_generation(format!("Failed to generate key pair: {}", e))
            })?,
        };

        let csr = self.params.serialize_request(&key_pair).map_err(|e| {
            CompletionError::request_generation(format!("Failed to serialize CSR: {}", e))
        })?;

        Ok((csr.der().to_vec(), key_pair))
    }
}

/// A request waiting to be signed.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    /// DER-encoded PKCS#10 request.
    pub csr_der: Vec<u8>,
    /// PEM-encoded PKCS#10 request, ready to submit to a CA.
    pub csr_pem: String,
    /// Subject identity the private key is filed under.
    pub subject: String,
    /// Where the private key was saved.
    pub key_path: PathBuf,
}

/// Generate a request and save its private key in `keys`.
///
/// The subject identity is read back from the encoded request, so the key is
/// filed under exactly the name that the issued certificate will produce.
pub fn create_request(builder: CsrBuilder, keys: &KeyStore) -> Result<PendingRequest> {
    let (csr_der, key_pair) = builder.build()?;

    let req = X509Req::from_der(&csr_der)?;
    let subject = subject_identity(req.subject_name());
    if subject.is_empty() {
        return Err(CompletionError::request_generation(
            "request subject is empty",
        ));
    }

    let csr_pem = String::from_utf8(req.to_pem()?)
        .map_err(|e| CompletionError::request_generation(e.to_string()))?;

    let key_pem = Zeroizing::new(key_pair.serialize_pem());
    let key_path = keys.store_private_key(&subject, key_pem.as_bytes())?;

    tracing::info!(subject = %subject, "Created certificate request");

    Ok(PendingRequest {
        csr_der,
        csr_pem,
        subject,
        key_path,
    })
}
