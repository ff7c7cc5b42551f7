//! Integration tests running the installer helper as a child process

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::integration::RequestFixture;
use cert_completion::config::{ElevationMode, InstallerConfig};
use cert_completion::workflow::{Diagnostic, Severity};
use cert_completion::{CompletionError, HelperInstaller, InstallTarget, Installer};

const HELPER: &str = env!("CARGO_BIN_EXE_cert-installer");

/// Launcher mode with `/bin/sh -c <script> sh <helper> <args...>`.
///
/// Inside the script `$1` is the helper path and `$3` the bundle path.
fn shell_launcher(helper: &Path, script: &str) -> Arc<dyn Installer> {
    Arc::new(HelperInstaller::from_config(&InstallerConfig {
        helper: helper.to_path_buf(),
        elevation: ElevationMode::Launcher,
        launcher: "/bin/sh".to_string(),
        launcher_args: vec!["-c".to_string(), script.to_string(), "sh".to_string()],
        ..Default::default()
    }))
}

fn direct(store_root: &Path) -> Arc<dyn Installer> {
    Arc::new(HelperInstaller::from_config(&InstallerConfig {
        helper: PathBuf::from(HELPER),
        elevation: ElevationMode::None,
        extra_args: vec![
            "--store-root".to_string(),
            store_root.display().to_string(),
        ],
        ..Default::default()
    }))
}

fn stored_files(root: &Path, target: InstallTarget) -> Vec<PathBuf> {
    match std::fs::read_dir(root.join(target.store_name())) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_real_helper_installs_into_directory_store() {
    let fixture = RequestFixture::new();
    let store_root = fixture.path().join("stores");
    let coordinator = fixture.coordinator(direct(&store_root));

    let installed = coordinator
        .complete(&fixture.request_path, "Intranet Site", InstallTarget::WebHosting)
        .await
        .expect("helper should install the credential");

    let files = stored_files(&store_root, InstallTarget::WebHosting);
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("Intranet_Site-"));
    assert!(name.contains(&installed.thumbprint.replace(':', "")));

    let content = std::fs::read_to_string(&files[0]).unwrap();
    assert!(content.contains("BEGIN PRIVATE KEY"));
    assert!(content.contains("BEGIN CERTIFICATE"));

    assert!(fixture.bundle_files().is_empty());
}

#[tokio::test]
async fn test_real_helper_store_unavailable() {
    let fixture = RequestFixture::new();
    let blocker = fixture.path().join("not-a-directory");
    std::fs::write(&blocker, b"x").unwrap();
    let coordinator = fixture.coordinator(direct(&blocker));

    let err = coordinator
        .complete(&fixture.request_path, "Site", InstallTarget::Personal)
        .await
        .unwrap_err();

    assert!(matches!(err, CompletionError::InstallerFailure { exit_code: 4 }));
    assert_eq!(Diagnostic::from_error(&err).message, "4");
    assert!(fixture.bundle_files().is_empty());
}

#[tokio::test]
async fn test_launcher_passes_through_to_helper() {
    let fixture = RequestFixture::new();
    let store_root = fixture.path().join("stores");
    let installer = Arc::new(HelperInstaller::from_config(&InstallerConfig {
        helper: PathBuf::from(HELPER),
        elevation: ElevationMode::Launcher,
        launcher: "/bin/sh".to_string(),
        launcher_args: vec!["-c".to_string(), "exec \"$@\"".to_string(), "sh".to_string()],
        extra_args: vec![
            "--store-root".to_string(),
            store_root.display().to_string(),
        ],
        ..Default::default()
    }));
    let coordinator = fixture.coordinator(installer);

    coordinator
        .complete(&fixture.request_path, "Site", InstallTarget::Personal)
        .await
        .expect("launcher should run the helper");

    assert_eq!(stored_files(&store_root, InstallTarget::Personal).len(), 1);
}

#[tokio::test]
async fn test_bundle_exists_while_helper_runs() {
    let fixture = RequestFixture::new();
    let coordinator = fixture.coordinator(shell_launcher(
        Path::new(HELPER),
        "test \"$2\" = --file && test -s \"$3\"",
    ));

    coordinator
        .complete(&fixture.request_path, "Site", InstallTarget::Personal)
        .await
        .expect("bundle should be present during installation");
    assert!(fixture.bundle_files().is_empty());
}

#[tokio::test]
async fn test_helper_exit_code_is_reported() {
    let fixture = RequestFixture::new();
    let coordinator = fixture.coordinator(shell_launcher(Path::new(HELPER), "exit 3"));

    let err = coordinator
        .complete(&fixture.request_path, "Site", InstallTarget::Personal)
        .await
        .unwrap_err();

    assert!(matches!(err, CompletionError::InstallerFailure { exit_code: 3 }));
    assert!(fixture.bundle_files().is_empty());
}

#[tokio::test]
async fn test_launcher_declined() {
    let fixture = RequestFixture::new();
    let coordinator = fixture.coordinator(shell_launcher(Path::new(HELPER), "exit 126"));

    let err = coordinator
        .complete(&fixture.request_path, "Site", InstallTarget::Personal)
        .await
        .unwrap_err();

    assert!(matches!(err, CompletionError::ElevationCancelled));
    assert_eq!(Diagnostic::from_error(&err).severity, Severity::Notice);
    assert!(fixture.bundle_files().is_empty());
}

#[tokio::test]
async fn test_missing_helper() {
    let fixture = RequestFixture::new();
    let missing = fixture.path().join("no-such-helper");
    let coordinator = fixture.coordinator(shell_launcher(&missing, "exit 0"));

    let err = coordinator
        .complete(&fixture.request_path, "Site", InstallTarget::Personal)
        .await
        .unwrap_err();

    assert!(matches!(err, CompletionError::HelperLaunchFailed { .. }));
    assert!(fixture.bundle_files().is_empty());
}

#[tokio::test]
async fn test_missing_launcher() {
    let fixture = RequestFixture::new();
    let installer = Arc::new(HelperInstaller::from_config(&InstallerConfig {
        helper: PathBuf::from(HELPER),
        elevation: ElevationMode::Launcher,
        launcher: fixture.path().join("no-such-launcher").display().to_string(),
        ..Default::default()
    }));
    let coordinator = fixture.coordinator(installer);

    let err = coordinator
        .complete(&fixture.request_path, "Site", InstallTarget::Personal)
        .await
        .unwrap_err();

    assert!(matches!(err, CompletionError::HelperLaunchFailed { .. }));
    assert!(fixture.bundle_files().is_empty());
}

#[tokio::test]
async fn test_dropped_caller_does_not_orphan_helper() {
    let fixture = RequestFixture::new();
    let marker = fixture.path().join("helper-saw-bundle");
    let script = format!("sleep 1; test -s \"$3\" && touch '{}'", marker.display());
    let coordinator = fixture.coordinator(shell_launcher(Path::new(HELPER), &script));

    let abandoned = tokio::time::timeout(
        std::time::Duration::from_millis(200),
        coordinator.complete(&fixture.request_path, "Site", InstallTarget::Personal),
    )
    .await;
    assert!(abandoned.is_err());

    let second = coordinator
        .complete(&fixture.request_path, "Site", InstallTarget::Personal)
        .await;
    assert!(matches!(
        second,
        Err(CompletionError::InstallInProgress { .. })
    ));

    // Wait for the helper and the cleanup that follows it
    for _ in 0..50 {
        if marker.exists() && fixture.bundle_files().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    assert!(marker.exists(), "helper should still find the bundle");
    assert!(fixture.bundle_files().is_empty());
}
