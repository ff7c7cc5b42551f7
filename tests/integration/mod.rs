//! Integration test utilities and helpers
//!
//! Provides a temporary request fixture (key in a key store plus the signed
//! certificate on disk) and an [`Installer`] that records what it was asked
//! to do.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cert_completion::store::DecodedBundle;
use cert_completion::{
    BundleBuilder, InstallOutcome, InstallRequest, InstallTarget, Installer, KeyStore,
    WorkflowCoordinator,
};
use rcgen::{CertificateParams, DnType, KeyPair};
use tempfile::TempDir;

/// Subject of the fixture certificate.
pub const SUBJECT: &str = "CN=test";

/// A pending request whose certificate has been issued.
pub struct RequestFixture {
    pub dir: TempDir,
    pub keys: KeyStore,
    pub request_path: PathBuf,
    pub bundle_dir: PathBuf,
}

impl RequestFixture {
    /// Certificate on disk with its private key in the key store.
    pub fn new() -> Self {
        let fixture = Self::without_key();
        let key = fixture.generate_certificate();
        fixture
            .keys
            .store_private_key(SUBJECT, key.serialize_pem().as_bytes())
            .expect("store key");
        fixture
    }

    /// Certificate on disk; the key store is empty.
    pub fn without_key() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let keys = KeyStore::new(dir.path().join("keys"));
        let bundle_dir = dir.path().join("bundles");
        std::fs::create_dir_all(&bundle_dir).expect("bundle dir");
        let request_path = dir.path().join("req.cer");

        let fixture = Self {
            dir,
            keys,
            request_path,
            bundle_dir,
        };
        fixture.generate_certificate();
        fixture
    }

    fn generate_certificate(&self) -> KeyPair {
        let key = KeyPair::generate().expect("key pair");
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, "test");
        let cert = params.self_signed(&key).expect("self-signed");
        std::fs::write(&self.request_path, cert.pem()).expect("write certificate");
        key
    }

    /// Coordinator writing bundles into the fixture's bundle directory.
    pub fn coordinator(&self, installer: Arc<dyn Installer>) -> WorkflowCoordinator {
        WorkflowCoordinator::new(
            self.keys.clone(),
            BundleBuilder::default().with_directory(&self.bundle_dir),
            installer,
        )
    }

    /// Files currently in the bundle directory.
    pub fn bundle_files(&self) -> Vec<PathBuf> {
        std::fs::read_dir(&self.bundle_dir)
            .expect("read bundle dir")
            .map(|e| e.expect("dir entry").path())
            .collect()
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// What an installer saw when it was called.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub bundle_path: PathBuf,
    pub bundle_existed: bool,
    pub bundle_existed_at_exit: bool,
    pub bundle_subject: Option<String>,
    pub friendly_name: String,
    pub target: InstallTarget,
}

/// Installer returning a fixed outcome and recording each call.
pub struct RecordingInstaller {
    outcome: InstallOutcome,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingInstaller {
    pub fn new(outcome: InstallOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            delay: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn with_delay(outcome: InstallOutcome, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            delay: Some(delay),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Installer for RecordingInstaller {
    async fn install(&self, request: &InstallRequest<'_>) -> InstallOutcome {
        // Opening the bundle proves the passphrase handed over is the right one
        let bundle_subject = DecodedBundle::open(request.bundle_path, request.passphrase.clone())
            .ok()
            .map(|b| b.subject().to_string());

        let bundle_existed = request.bundle_path.is_file();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.calls.lock().unwrap().push(RecordedCall {
            bundle_path: request.bundle_path.to_path_buf(),
            bundle_existed,
            bundle_existed_at_exit: request.bundle_path.is_file(),
            bundle_subject,
            friendly_name: request.friendly_name.to_string(),
            target: request.target,
        });
        self.outcome.clone()
    }
}
