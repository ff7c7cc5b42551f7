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

//! Headless model of the "Complete Certificate Request" form.
//!
//! A front end binds its widgets to [`CompleteRequestForm`] and listens for
//! [`FormEvent`]s. Listeners are registered with
//! [`CompleteRequestForm::subscribe`], which returns a [`Subscription`] that
//! unregisters on drop. A view collects its subscriptions in a
//! [`SubscriptionGroup`] and drops the group when it closes.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use cert_completion::form::{CompleteRequestForm, FormEvent, SubscriptionGroup};
//!
//! let mut form = CompleteRequestForm::new();
//! let enabled = Arc::new(Mutex::new(false));
//!
//! let mut group = SubscriptionGroup::new();
//! let flag = Arc::clone(&enabled);
//! group.add(form.subscribe(move |event| {
//!     if let FormEvent::InputChanged { can_confirm } = event {
//!         *flag.lock().unwrap() = *can_confirm;
//!     }
//! }));
//!
//! form.set_request_path("site.cer");
//! form.set_friendly_name("Site");
//! assert!(*enabled.lock().unwrap());
//! ```

use std::sync::{Arc, Mutex, Weak};

use crate::types::{InstallTarget, Installed};
use crate::workflow::{Diagnostic, WorkflowCoordinator};

/// Something the form wants its view to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
    /// An input changed; `can_confirm` tells whether the confirm action is enabled.
    InputChanged {
        /// Both required inputs are non-blank.
        can_confirm: bool,
    },
    /// The credential was installed.
    Completed(Installed),
    /// The attempt failed; show the diagnostic.
    Failed(Diagnostic),
}

type Handler = Arc<dyn Fn(&FormEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

/// A registered listener. Dropping it unregisters the listener.
#[must_use = "dropping a Subscription unregisters the listener"]
pub struct Subscription {
    listeners: Weak<Mutex<Listeners>>,
    id: u64,
}

impl Subscription {
    /// Unregister now.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .handlers
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Subscriptions released together.
#[derive(Debug, Default)]
pub struct SubscriptionGroup {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription to the group.
    pub fn add(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Number of live subscriptions held.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Whether the group holds no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Release every subscription in the group.
    pub fn dispose(&mut self) {
        self.subscriptions.clear();
    }
}

/// Inputs and state of the completion form.
pub struct CompleteRequestForm {
    request_path: String,
    friendly_name: String,
    target: InstallTarget,
    web_hosting_available: bool,
    installed: Option<Installed>,
    listeners: Arc<Mutex<Listeners>>,
}

impl Default for CompleteRequestForm {
    fn default() -> Self {
        Self::new()
    }
}

impl CompleteRequestForm {
    /// Create an empty form targeting the personal store.
    pub fn new() -> Self {
        Self {
            request_path: String::new(),
            friendly_name: String::new(),
            target: InstallTarget::Personal,
            web_hosting_available: true,
            installed: None,
            listeners: Arc::new(Mutex::new(Listeners::default())),
        }
    }

    /// Disable the web hosting store, for hosts that do not provide it.
    pub fn with_web_hosting_available(mut self, available: bool) -> Self {
        self.web_hosting_available = available;
        if !available {
            self.target = InstallTarget::Personal;
        }
        self
    }

    /// Register a listener.
    pub fn subscribe(&self, handler: impl Fn(&FormEvent) + Send + Sync + 'static) -> Subscription {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.handlers.push((id, Arc::new(handler)));
        Subscription {
            listeners: Arc::downgrade(&self.listeners),
            id,
        }
    }

    fn emit(&self, event: FormEvent) {
        // Handlers run without the lock held so they may subscribe or unsubscribe.
        let handlers: Vec<Handler> = self
            .listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .handlers
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(&event);
        }
    }

    /// Path of the CA response file.
    pub fn request_path(&self) -> &str {
        &self.request_path
    }

    /// Set the path of the CA response file.
    pub fn set_request_path(&mut self, path: impl Into<String>) {
        self.request_path = path.into();
        self.emit(FormEvent::InputChanged {
            can_confirm: self.can_confirm(),
        });
    }

    /// Label for the installed certificate.
    pub fn friendly_name(&self) -> &str {
        &self.friendly_name
    }

    /// Set the label for the installed certificate.
    pub fn set_friendly_name(&mut self, name: impl Into<String>) {
        self.friendly_name = name.into();
        self.emit(FormEvent::InputChanged {
            can_confirm: self.can_confirm(),
        });
    }

    /// Selected store.
    pub fn target(&self) -> InstallTarget {
        self.target
    }

    /// Whether the web hosting store can be selected.
    pub fn web_hosting_available(&self) -> bool {
        self.web_hosting_available
    }

    /// Select a store. Returns `false` if the store is not available.
    pub fn set_target(&mut self, target: InstallTarget) -> bool {
        if target == InstallTarget::WebHosting && !self.web_hosting_available {
            return false;
        }
        self.target = target;
        true
    }

    /// Whether the confirm action is enabled.
    pub fn can_confirm(&self) -> bool {
        !self.request_path.trim().is_empty() && !self.friendly_name.trim().is_empty()
    }

    /// The credential installed by the last successful confirm.
    pub fn installed(&self) -> Option<&Installed> {
        self.installed.as_ref()
    }

    /// Run the completion workflow with the current inputs.
    ///
    /// Publishes [`FormEvent::Completed`] or [`FormEvent::Failed`].
    pub async fn confirm(
        &mut self,
        coordinator: &WorkflowCoordinator,
    ) -> Result<Installed, Diagnostic> {
        let result = coordinator
            .complete(self.request_path.trim(), &self.friendly_name, self.target)
            .await;

        match result {
            Ok(installed) => {
                self.installed = Some(installed.clone());
                self.emit(FormEvent::Completed(installed.clone()));
                Ok(installed)
            }
            Err(e) => {
                let diagnostic = Diagnostic::from_error(&e);
                self.emit(FormEvent::Failed(diagnostic.clone()));
                Err(diagnostic)
            }
        }
    }
}

impl std::fmt::Debug for CompleteRequestForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompleteRequestForm")
            .field("request_path", &self.request_path)
            .field("friendly_name", &self.friendly_name)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
