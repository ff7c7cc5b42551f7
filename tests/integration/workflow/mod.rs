//! Completion workflow integration tests

mod complete_test;
mod form_test;
#[cfg(unix)]
mod helper_process_test;
