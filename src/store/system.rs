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

//! Windows system certificate store import.
//!
//! The bundle is loaded with `PFXImportCertStore` into a temporary in-memory
//! store, which persists the private key into the machine key set. Each
//! certificate is then labelled with the friendly name and copied into
//! `LocalMachine\<store>`. Writing to the local machine stores requires
//! administrator privileges, which is why this runs in the elevated helper.

use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;

use windows::Win32::Foundation::GetLastError;
use windows::Win32::Security::Cryptography::{
    CERT_CONTEXT, CERT_FRIENDLY_NAME_PROP_ID, CERT_OPEN_STORE_FLAGS, CERT_QUERY_ENCODING_TYPE,
    CERT_STORE_ADD_REPLACE_EXISTING, CERT_STORE_PROV_SYSTEM_W, CERT_SYSTEM_STORE_LOCAL_MACHINE,
    CRYPT_INTEGER_BLOB, CRYPT_MACHINE_KEYSET, CertAddCertificateContextToStore, CertCloseStore,
    CertEnumCertificatesInStore, CertFreeCertificateContext, CertOpenStore,
    CertSetCertificateContextProperty, HCERTSTORE, PFXImportCertStore,
};
use windows::core::PCWSTR;
use zeroize::Zeroizing;

use super::{DecodedBundle, StoreError, StoredCredential, TrustStore};
use crate::types::InstallTarget;

fn wide(value: &str) -> Vec<u16> {
    OsStr::new(value)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect()
}

fn last_error() -> String {
    let code = unsafe { GetLastError() };
    format!("Windows error 0x{:08X}", code.0)
}

/// Closes a store handle on drop.
struct StoreHandle(HCERTSTORE);

impl Drop for StoreHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CertCloseStore(self.0, 0);
        }
    }
}

/// The local machine certificate stores.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemStore;

impl SystemStore {
    /// Create a handle to the local machine stores.
    pub fn new() -> Self {
        Self
    }

    fn open(target: InstallTarget) -> Result<StoreHandle, StoreError> {
        let name = wide(target.store_name());
        let handle = unsafe {
            CertOpenStore(
                CERT_STORE_PROV_SYSTEM_W,
                CERT_QUERY_ENCODING_TYPE(0),
                None,
                CERT_OPEN_STORE_FLAGS(CERT_SYSTEM_STORE_LOCAL_MACHINE),
                Some(name.as_ptr() as *const _),
            )
        };

        match handle {
            Ok(h) if !h.is_invalid() => Ok(StoreHandle(h)),
            _ => Err(StoreError::StoreUnavailable(format!(
                "LocalMachine\\{}: {}",
                target.store_name(),
                last_error()
            ))),
        }
    }

    fn import_pfx(bundle: &DecodedBundle) -> Result<StoreHandle, StoreError> {
        let password = Zeroizing::new(wide(bundle.passphrase().expose()));
        let blob = CRYPT_INTEGER_BLOB {
            cbData: bundle.der().len() as u32,
            pbData: bundle.der().as_ptr() as *mut _,
        };

        let handle = unsafe {
            PFXImportCertStore(&blob, PCWSTR(password.as_ptr()), CRYPT_MACHINE_KEYSET)
        };

        match handle {
            Ok(h) if !h.is_invalid() => Ok(StoreHandle(h)),
            _ => Err(StoreError::BundleUnreadable(last_error())),
        }
    }

    fn set_friendly_name(
        context: *const CERT_CONTEXT,
        friendly_name: &str,
    ) -> Result<(), StoreError> {
        let value = wide(friendly_name);
        let blob = CRYPT_INTEGER_BLOB {
            cbData: (value.len() * 2) as u32,
            pbData: value.as_ptr() as *mut _,
        };

        unsafe {
            CertSetCertificateContextProperty(
                context,
                CERT_FRIENDLY_NAME_PROP_ID,
                0,
                Some(&blob as *const _ as *const _),
            )
        }
        .map_err(|_| StoreError::ImportFailed(format!("set friendly name: {}", last_error())))
    }
}

impl TrustStore for SystemStore {
    fn describe(&self) -> String {
        "Windows local machine certificate store".to_string()
    }

    fn import(
        &self,
        bundle: &DecodedBundle,
        friendly_name: &str,
        target: InstallTarget,
    ) -> Result<StoredCredential, StoreError> {
        let destination = Self::open(target)?;
        let source = Self::import_pfx(bundle)?;

        let mut imported = 0usize;
        let mut context: *mut CERT_CONTEXT = std::ptr::null_mut();
        loop {
            context = unsafe {
                CertEnumCertificatesInStore(
                    source.0,
                    if context.is_null() {
                        None
                    } else {
                        Some(context as *const _)
                    },
                )
            };
            if context.is_null() {
                break;
            }

            let added = Self::set_friendly_name(context, friendly_name).and_then(|_| {
                unsafe {
                    CertAddCertificateContextToStore(
                        destination.0,
                        context,
                        CERT_STORE_ADD_REPLACE_EXISTING,
                        None,
                    )
                }
                .map_err(|_| StoreError::ImportFailed(last_error()))
            });

            if let Err(e) = added {
                unsafe {
                    let _ = CertFreeCertificateContext(Some(context));
                }
                return Err(e);
            }
            imported += 1;
        }

        if imported == 0 {
            return Err(StoreError::ImportFailed(
                "bundle contained no certificates".to_string(),
            ));
        }

        let location = format!("LocalMachine\\{}", target.store_name());
        tracing::info!(
            store = %location,
            subject = bundle.subject(),
            "Imported credential"
        );

        Ok(StoredCredential {
            location,
            thumbprint: bundle.thumbprint().to_string(),
        })
    }
}
