//! Integration tests for the completion form

use std::sync::{Arc, Mutex};

use crate::integration::{RecordingInstaller, RequestFixture};
use cert_completion::form::{CompleteRequestForm, FormEvent};
use cert_completion::workflow::Severity;
use cert_completion::{InstallOutcome, InstallTarget};

fn record(form: &CompleteRequestForm) -> (cert_completion::form::Subscription, Arc<Mutex<Vec<FormEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let sub = form.subscribe(move |e| sink.lock().unwrap().push(e.clone()));
    (sub, events)
}

#[tokio::test]
async fn test_confirm_publishes_completed() {
    let fixture = RequestFixture::new();
    let installer = RecordingInstaller::new(InstallOutcome::Installed);
    let coordinator = fixture.coordinator(installer.clone());

    let mut form = CompleteRequestForm::new();
    let (_sub, events) = record(&form);

    form.set_request_path(fixture.request_path.display().to_string());
    form.set_friendly_name("Intranet");
    assert!(form.set_target(InstallTarget::WebHosting));
    assert!(form.can_confirm());

    let installed = form.confirm(&coordinator).await.expect("confirm");
    assert_eq!(installed.friendly_name, "Intranet");
    assert_eq!(form.installed(), Some(&installed));

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[1], FormEvent::InputChanged { can_confirm: true });
    assert_eq!(events[2], FormEvent::Completed(installed));
    assert_eq!(installer.calls()[0].target, InstallTarget::WebHosting);
}

#[tokio::test]
async fn test_confirm_publishes_failure() {
    let fixture = RequestFixture::without_key();
    let installer = RecordingInstaller::new(InstallOutcome::Installed);
    let coordinator = fixture.coordinator(installer.clone());

    let mut form = CompleteRequestForm::new();
    form.set_request_path(fixture.request_path.display().to_string());
    form.set_friendly_name("Intranet");
    let (_sub, events) = record(&form);

    let diagnostic = form.confirm(&coordinator).await.unwrap_err();
    assert_eq!(diagnostic.severity, Severity::Error);
    assert!(diagnostic.message.contains("Could not find private key"));
    assert!(form.installed().is_none());

    let events = events.lock().unwrap();
    assert_eq!(events.as_slice(), &[FormEvent::Failed(diagnostic)]);
    assert!(installer.calls().is_empty());
}
