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

//! Privileged certificate installer helper.
//!
//! Launched by `cert-complete` with elevated rights. Opens a PKCS#12 bundle
//! and imports it into the requested store.
//!
//! # Usage
//!
//! ```text
//! cert-installer --file <PATH> --passphrase <SECRET> --name <LABEL> --store <MY|WebHosting>
//!                [--store-root <DIR>]
//! ```
//!
//! # Exit Status
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | Installed |
//! | 2 | Invalid command line |
//! | 3 | Bundle missing, corrupt, or wrong passphrase |
//! | 4 | Target store could not be opened |
//! | 5 | Store refused the credential |
//!
//! The helper never deletes the bundle; the caller owns it.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use cert_completion::config::LoggingConfig;
use cert_completion::store::{
    DecodedBundle, DirectoryStore, EXIT_OK, EXIT_USAGE, StoreError, TrustStore,
};
use cert_completion::{InstallTarget, Passphrase};

/// Import a credential bundle into a certificate store
#[derive(Parser)]
#[command(name = "cert-installer")]
#[command(author = "U.S. Federal Government")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Import a PKCS#12 credential bundle into a certificate store", long_about = None)]
struct Args {
    /// PKCS#12 bundle to import
    #[arg(short, long, value_name = "PATH")]
    file: PathBuf,

    /// Passphrase protecting the bundle
    #[arg(short, long, value_name = "SECRET")]
    passphrase: String,

    /// Friendly name for the installed certificate
    #[arg(short, long, value_name = "LABEL")]
    name: String,

    /// Target store (MY, WebHosting)
    #[arg(short, long, value_parser = parse_store)]
    store: InstallTarget,

    /// Use a directory store rooted here instead of the system store
    #[arg(long, value_name = "DIR")]
    store_root: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_store(value: &str) -> Result<InstallTarget, String> {
    InstallTarget::from_store_name(value).ok_or_else(|| {
        format!("unknown store '{}': expected 'MY' or 'WebHosting'", value)
    })
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    if let Err(e) = cert_completion::logging::init_logging(&LoggingConfig::default(), Some(level))
    {
        eprintln!("Warning: {}", e);
    }

    if args.name.trim().is_empty() {
        eprintln!("Error: --name must not be blank");
        return exit(EXIT_USAGE);
    }

    match run(args) {
        Ok(()) => exit(EXIT_OK),
        Err(e) => {
            tracing::error!(error = %e, exit_code = e.exit_code(), "Installation failed");
            eprintln!("Error: {}", e);
            exit(e.exit_code())
        }
    }
}

fn run(args: Args) -> Result<(), StoreError> {
    let bundle = DecodedBundle::open(&args.file, Passphrase::from(args.passphrase))?;
    tracing::debug!(
        subject = bundle.subject(),
        thumbprint = bundle.thumbprint(),
        chain = bundle.chain().len(),
        "Opened credential bundle"
    );

    let store = select_store(args.store_root);
    tracing::info!(store = %store.describe(), target = %args.store, "Importing credential");

    let stored = store.import(&bundle, args.name.trim(), args.store)?;
    tracing::info!(
        location = %stored.location,
        thumbprint = %stored.thumbprint,
        "Credential installed"
    );
    Ok(())
}

#[cfg(windows)]
fn select_store(root: Option<PathBuf>) -> Box<dyn TrustStore> {
    match root {
        Some(root) => Box::new(DirectoryStore::new(root)),
        None => Box::new(cert_completion::store::SystemStore::new()),
    }
}

#[cfg(not(windows))]
fn select_store(root: Option<PathBuf>) -> Box<dyn TrustStore> {
    let root = root.unwrap_or_else(|| PathBuf::from(cert_completion::store::DEFAULT_STORE_ROOT));
    Box::new(DirectoryStore::new(root))
}

fn exit(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
