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

//! UAC elevation through `ShellExecuteExW`.
//!
//! `ShellExecuteExW` takes a single parameter string, so the helper arguments
//! are quoted with the rules the Microsoft C runtime uses to split a command
//! line back into `argv`. The quoting functions are platform independent.

/// Quote one argument for a Windows command line.
///
/// Backslashes are literal unless they precede a double quote, in which case
/// they are doubled.
pub fn quote_argument(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '\n', '\u{b}', '"']) {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat_n('\\', backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.extend(std::iter::repeat_n('\\', backslashes));
                quoted.push(c);
                backslashes = 0;
            }
        }
    }
    quoted.extend(std::iter::repeat_n('\\', backslashes * 2));
    quoted.push('"');
    quoted
}

/// Join arguments into a Windows command line.
pub fn join_arguments<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|a| quote_argument(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `helper` elevated and wait for it to exit.
#[cfg(windows)]
pub(crate) fn run_elevated(
    helper: &std::path::Path,
    args: &[String],
) -> Result<i32, super::NotStarted> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;

    use windows::Win32::Foundation::{CloseHandle, ERROR_CANCELLED};
    use windows::Win32::System::Threading::{GetExitCodeProcess, INFINITE, WaitForSingleObject};
    use windows::Win32::UI::Shell::{SEE_MASK_NOCLOSEPROCESS, SHELLEXECUTEINFOW, ShellExecuteExW};
    use windows::Win32::UI::WindowsAndMessaging::SW_HIDE;
    use windows::core::{HRESULT, PCWSTR};
    use zeroize::Zeroizing;

    use super::NotStarted;

    fn wide(value: &OsStr) -> Vec<u16> {
        value.encode_wide().chain(std::iter::once(0)).collect()
    }

    let verb = wide(OsStr::new("runas"));
    let file = wide(helper.as_os_str());
    // The parameter string carries the bundle passphrase.
    let parameters = Zeroizing::new(wide(OsStr::new(&join_arguments(args))));

    let mut info = SHELLEXECUTEINFOW {
        cbSize: std::mem::size_of::<SHELLEXECUTEINFOW>() as u32,
        fMask: SEE_MASK_NOCLOSEPROCESS,
        lpVerb: PCWSTR(verb.as_ptr()),
        lpFile: PCWSTR(file.as_ptr()),
        lpParameters: PCWSTR(parameters.as_ptr()),
        nShow: SW_HIDE.0,
        ..Default::default()
    };

    if let Err(e) = unsafe { ShellExecuteExW(&mut info) } {
        if e.code() == HRESULT::from_win32(ERROR_CANCELLED.0) {
            return Err(NotStarted::Declined);
        }
        return Err(NotStarted::LaunchFailed(e.message().to_string()));
    }

    if info.hProcess.is_invalid() {
        return Err(NotStarted::LaunchFailed(
            "elevated process handle unavailable".to_string(),
        ));
    }

    let mut exit_code = 0u32;
    let result = unsafe {
        WaitForSingleObject(info.hProcess, INFINITE);
        GetExitCodeProcess(info.hProcess, &mut exit_code)
    };
    unsafe {
        let _ = CloseHandle(info.hProcess);
    }

    match result {
        Ok(()) => Ok(exit_code as i32),
        Err(e) => Err(NotStarted::LaunchFailed(format!(
            "cannot read installer exit code: {}",
            e.message()
        ))),
    }
}
