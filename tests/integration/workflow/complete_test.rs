//! Integration tests for completing a request

use std::path::Path;
use std::time::Duration;

use crate::integration::{RecordingInstaller, RequestFixture, SUBJECT};
use cert_completion::workflow::{Diagnostic, Severity};
use cert_completion::{CompletionError, InstallOutcome, InstallTarget, NotStarted};

#[tokio::test]
async fn test_complete_installs_and_removes_bundle() {
    let fixture = RequestFixture::new();
    let installer = RecordingInstaller::new(InstallOutcome::Installed);
    let coordinator = fixture.coordinator(installer.clone());

    let installed = coordinator
        .complete(&fixture.request_path, "Example Site", InstallTarget::WebHosting)
        .await
        .expect("completion should succeed");

    assert_eq!(installed.friendly_name, "Example Site");
    assert_eq!(installed.target, InstallTarget::WebHosting);
    assert_eq!(installed.subject, SUBJECT);
    assert!(!installed.thumbprint.is_empty());

    let calls = installer.calls();
    assert_eq!(calls.len(), 1, "installer should run exactly once");
    let call = &calls[0];
    assert!(call.bundle_existed, "bundle must exist while the helper runs");
    assert_eq!(call.bundle_subject.as_deref(), Some(SUBJECT));
    assert_eq!(call.friendly_name, "Example Site");
    assert_eq!(call.target, InstallTarget::WebHosting);
    assert!(call.bundle_path.starts_with(&fixture.bundle_dir));

    assert!(!call.bundle_path.exists(), "bundle should be removed");
    assert!(fixture.bundle_files().is_empty());
}

#[tokio::test]
async fn test_missing_request_file() {
    let fixture = RequestFixture::new();
    let installer = RecordingInstaller::new(InstallOutcome::Installed);
    let coordinator = fixture.coordinator(installer.clone());

    let missing = fixture.path().join("missing.cer");
    let err = coordinator
        .complete(&missing, "Site", InstallTarget::Personal)
        .await
        .unwrap_err();

    assert!(matches!(err, CompletionError::RequestArtifactNotFound { .. }));
    assert!(installer.calls().is_empty());
    assert!(fixture.bundle_files().is_empty());

    let diagnostic = Diagnostic::from_error(&err);
    assert_eq!(diagnostic.severity, Severity::Error);
    assert!(
        diagnostic
            .message
            .ends_with(&format!("Could not find file '{}'.", missing.display()))
    );
}

#[tokio::test]
async fn test_blank_request_path() {
    let fixture = RequestFixture::new();
    let installer = RecordingInstaller::new(InstallOutcome::Installed);
    let coordinator = fixture.coordinator(installer.clone());

    let err = coordinator
        .complete(Path::new(""), "Site", InstallTarget::Personal)
        .await
        .unwrap_err();

    assert!(matches!(err, CompletionError::RequestArtifactNotFound { .. }));
    assert!(installer.calls().is_empty());
}

#[tokio::test]
async fn test_blank_friendly_name() {
    let fixture = RequestFixture::new();
    let installer = RecordingInstaller::new(InstallOutcome::Installed);
    let coordinator = fixture.coordinator(installer.clone());

    let err = coordinator
        .complete(&fixture.request_path, "  ", InstallTarget::Personal)
        .await
        .unwrap_err();

    assert!(matches!(err, CompletionError::MissingInput { .. }));
    assert!(installer.calls().is_empty());
}

#[tokio::test]
async fn test_missing_private_key() {
    let fixture = RequestFixture::without_key();
    let installer = RecordingInstaller::new(InstallOutcome::Installed);
    let coordinator = fixture.coordinator(installer.clone());

    let err = coordinator
        .complete(&fixture.request_path, "Site", InstallTarget::Personal)
        .await
        .unwrap_err();

    match &err {
        CompletionError::PrivateKeyNotFound {
            subject, expected, ..
        } => {
            assert_eq!(subject, SUBJECT);
            assert_eq!(expected, &fixture.keys.key_path(SUBJECT));
        }
        other => panic!("expected PrivateKeyNotFound, got {:?}", other),
    }
    assert!(installer.calls().is_empty());
    assert!(fixture.bundle_files().is_empty(), "no bundle may be created");

    let diagnostic = Diagnostic::from_error(&err);
    assert!(diagnostic.message.ends_with(&format!(
        "Could not find private key for '{}'.",
        fixture.request_path.display()
    )));
}

#[tokio::test]
async fn test_mismatched_private_key() {
    let fixture = RequestFixture::new();
    // Replace the stored key with one that does not belong to the certificate
    let other = rcgen::KeyPair::generate().unwrap();
    fixture
        .keys
        .store_private_key(SUBJECT, other.serialize_pem().as_bytes())
        .unwrap();

    let installer = RecordingInstaller::new(InstallOutcome::Installed);
    let coordinator = fixture.coordinator(installer.clone());
    let err = coordinator
        .complete(&fixture.request_path, "Site", InstallTarget::Personal)
        .await
        .unwrap_err();

    assert!(matches!(err, CompletionError::PrivateKeyMismatch { .. }));
    assert!(installer.calls().is_empty());
    assert!(fixture.bundle_files().is_empty());
}

#[tokio::test]
async fn test_installer_failure_reports_exit_code() {
    for exit_code in [1, 5, 1223] {
        let fixture = RequestFixture::new();
        let installer = RecordingInstaller::new(InstallOutcome::Failed { exit_code });
        let coordinator = fixture.coordinator(installer.clone());

        let err = coordinator
            .complete(&fixture.request_path, "Site", InstallTarget::Personal)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CompletionError::InstallerFailure { exit_code: c } if c == exit_code
        ));
        assert_eq!(Diagnostic::from_error(&err).message, exit_code.to_string());
        assert_eq!(installer.calls().len(), 1);
        assert!(fixture.bundle_files().is_empty());
    }
}

#[tokio::test]
async fn test_declined_elevation() {
    let fixture = RequestFixture::new();
    let installer = RecordingInstaller::new(InstallOutcome::NotStarted(NotStarted::Declined));
    let coordinator = fixture.coordinator(installer.clone());

    let err = coordinator
        .complete(&fixture.request_path, "Site", InstallTarget::Personal)
        .await
        .unwrap_err();

    assert!(matches!(err, CompletionError::ElevationCancelled));
    assert_eq!(Diagnostic::from_error(&err).severity, Severity::Notice);
    assert!(fixture.bundle_files().is_empty());
}

#[tokio::test]
async fn test_launch_failure() {
    let fixture = RequestFixture::new();
    let installer = RecordingInstaller::new(InstallOutcome::NotStarted(
        NotStarted::LaunchFailed("no such file".to_string()),
    ));
    let coordinator = fixture.coordinator(installer.clone());

    let err = coordinator
        .complete(&fixture.request_path, "Site", InstallTarget::Personal)
        .await
        .unwrap_err();

    assert!(matches!(err, CompletionError::HelperLaunchFailed { .. }));
    assert_eq!(Diagnostic::from_error(&err).severity, Severity::Error);
    assert!(fixture.bundle_files().is_empty());
}

#[tokio::test]
async fn test_concurrent_completion_same_target() {
    let fixture = RequestFixture::new();
    let installer =
        RecordingInstaller::with_delay(InstallOutcome::Installed, Duration::from_millis(200));
    let coordinator = fixture.coordinator(installer.clone());

    let (first, second) = tokio::join!(
        coordinator.complete(&fixture.request_path, "First", InstallTarget::Personal),
        coordinator.complete(&fixture.request_path, "Second", InstallTarget::Personal),
    );

    assert!(first.is_ok());
    assert!(matches!(
        second,
        Err(CompletionError::InstallInProgress {
            target: InstallTarget::Personal
        })
    ));
    assert_eq!(installer.calls().len(), 1);

    // The target is released once the first attempt finishes
    let third = coordinator
        .complete(&fixture.request_path, "Third", InstallTarget::Personal)
        .await;
    assert!(third.is_ok());
}

#[tokio::test]
async fn test_concurrent_completion_different_targets() {
    let fixture = RequestFixture::new();
    let installer =
        RecordingInstaller::with_delay(InstallOutcome::Installed, Duration::from_millis(50));
    let coordinator = fixture.coordinator(installer.clone());

    let (a, b) = tokio::join!(
        coordinator.complete(&fixture.request_path, "A", InstallTarget::Personal),
        coordinator.complete(&fixture.request_path, "B", InstallTarget::WebHosting),
    );

    assert!(a.is_ok());
    assert!(b.is_ok());
    assert_eq!(installer.calls().len(), 2);
    assert!(fixture.bundle_files().is_empty());
}

#[tokio::test]
async fn test_dropped_caller_keeps_target_locked() {
    let fixture = RequestFixture::new();
    let installer =
        RecordingInstaller::with_delay(InstallOutcome::Installed, Duration::from_millis(400));
    let coordinator = fixture.coordinator(installer.clone());

    let abandoned = tokio::time::timeout(
        Duration::from_millis(100),
        coordinator.complete(&fixture.request_path, "First", InstallTarget::Personal),
    )
    .await;
    assert!(abandoned.is_err(), "caller should give up before the installer exits");

    // The first attempt is still running with its bundle in place
    assert_eq!(fixture.bundle_files().len(), 1);
    let second = coordinator
        .complete(&fixture.request_path, "Second", InstallTarget::Personal)
        .await;
    assert!(matches!(
        second,
        Err(CompletionError::InstallInProgress {
            target: InstallTarget::Personal
        })
    ));

    tokio::time::sleep(Duration::from_millis(600)).await;

    let calls = installer.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].bundle_existed_at_exit, "bundle must outlive the installer");
    assert!(fixture.bundle_files().is_empty(), "bundle removed after the installer exits");

    let third = coordinator
        .complete(&fixture.request_path, "Third", InstallTarget::Personal)
        .await;
    assert!(third.is_ok());
}
