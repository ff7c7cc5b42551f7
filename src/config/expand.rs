// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Variable expansion for configuration paths.
//!
//! Path values in the configuration file may reference variables such as
//! `${LOCALAPPDATA}` or `${EXE_DIR}` so that one file can be deployed to many
//! machines.

use crate::error::CompletionError;

/// Expand variables in a string.
///
/// Variables are in the format `${VARIABLE_NAME}`. Supported variables:
///
/// - `${EXE_DIR}` - Directory containing the running executable
/// - `${HOME}` / `${USERPROFILE}` - Home directory
/// - `${PROGRAMDATA}` - ProgramData directory (Windows) or `/var/lib`
/// - `${LOCALAPPDATA}` - Local app data directory
/// - `${APPDATA}` - Roaming app data / user config directory
/// - `${TEMP}` / `${TMP}` - Temporary directory
/// - `${USERNAME}` - Current username
///
/// Any other name is looked up in the environment. Unknown variables are
/// left unchanged.
///
/// # Examples
///
/// ```
/// use cert_completion::config::expand_variables;
///
/// // Helper installed next to the application
/// let helper = expand_variables("${EXE_DIR}/cert-installer").unwrap();
/// assert!(!helper.starts_with("${"));
/// ```
pub fn expand_variables(input: &str) -> Result<String, CompletionError> {
    let mut result = input.to_string();
    let mut start = 0;

    while let Some(var_start) = result[start..].find("${") {
        let absolute_start = start + var_start;

        let Some(var_end) = result[absolute_start..].find('}') else {
            // No closing brace, nothing more to expand
            break;
        };
        let absolute_end = absolute_start + var_end;
        let var_name = &result[absolute_start + 2..absolute_end];

        match variable_value(var_name) {
            Some(value) => {
                result.replace_range(absolute_start..=absolute_end, &value);
                start = absolute_start + value.len();
            }
            None => start = absolute_end + 1,
        }
    }

    Ok(result)
}

fn variable_value(name: &str) -> Option<String> {
    let dir = |p: Option<std::path::PathBuf>| p.map(|p| p.to_string_lossy().into_owned());

    match name {
        "EXE_DIR" => dir(std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))),
        "HOME" | "USERPROFILE" => dir(dirs::home_dir()),
        "PROGRAMDATA" => std::env::var("PROGRAMDATA").ok().or_else(|| {
            if cfg!(unix) {
                Some("/var/lib".to_string())
            } else {
                None
            }
        }),
        "LOCALAPPDATA" => std::env::var("LOCALAPPDATA")
            .ok()
            .or_else(|| dir(dirs::data_local_dir())),
        "APPDATA" => std::env::var("APPDATA")
            .ok()
            .or_else(|| dir(dirs::config_dir())),
        "TEMP" | "TMP" => dir(Some(std::env::temp_dir())),
        "USERNAME" => std::env::var("USERNAME")
            .or_else(|_| std::env::var("USER"))
            .ok(),
        _ => std::env::var(name).ok(),
    }
}
