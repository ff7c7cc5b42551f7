//! Integration tests for cert-completion
//!
//! These tests complete real certificate requests against temporary key
//! stores, using recording installers and the `cert-installer` helper.

mod integration;

#[path = "integration/workflow/mod.rs"]
mod workflow;
