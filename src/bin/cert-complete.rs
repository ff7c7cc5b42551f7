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

//! Certificate request completion command-line tool.
//!
//! # Usage
//!
//! ```text
//! cert-complete [OPTIONS] <COMMAND>
//!
//! Commands:
//!   request   Create a certificate request and store its private key
//!   complete  Complete a request with the CA response and install it
//!   key-path  Show where the private key for a subject is stored
//!   config    Configuration management
//!
//! Options:
//!   -c, --config <PATH>   Path to configuration file
//!   -v, --verbose         Enable verbose output
//!   -q, --quiet           Suppress non-error output
//!   -h, --help            Print help
//!   -V, --version         Print version
//! ```
//!
//! # Examples
//!
//! ```bash
//! # Create a request for a web server certificate
//! cert-complete request --common-name www.example.com --san-dns www.example.com -o www.csr
//!
//! # Install the certificate returned by the CA
//! cert-complete complete --request www.cer --name "www.example.com" --store web-hosting
//!
//! # Write a default configuration file
//! cert-complete config init --output /etc/cert-completion/config.toml
//! ```
//!
//! # Exit Status
//!
//! 0 on success, 1 on failure, 3 when elevation was declined and nothing
//! was installed.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cert_completion::config::{CompletionConfig, ConfigLoader, write_default_config};
use cert_completion::workflow::{Diagnostic, Severity};
use cert_completion::{CompletionError, InstallTarget, RequestArtifact, WorkflowCoordinator};

/// Exit status when the user declined elevation.
const EXIT_NOT_COMPLETED: u8 = 3;

/// Certificate Request Completion Tool
#[derive(Parser)]
#[command(name = "cert-complete")]
#[command(author = "U.S. Federal Government")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Complete certificate requests and install the issued certificate", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a certificate request and store its private key
    #[cfg(feature = "csr-gen")]
    Request {
        /// Subject Common Name
        #[arg(long, value_name = "CN")]
        common_name: String,

        /// Subject Organization
        #[arg(long, value_name = "O")]
        organization: Option<String>,

        /// Subject Organizational Unit
        #[arg(long, value_name = "OU")]
        organizational_unit: Option<String>,

        /// Subject Locality (city)
        #[arg(long, value_name = "L")]
        locality: Option<String>,

        /// Subject State or Province
        #[arg(long, value_name = "ST")]
        state: Option<String>,

        /// Subject Country
        #[arg(long, value_name = "C")]
        country: Option<String>,

        /// Subject Alternative Names (DNS)
        #[arg(long = "san-dns", value_name = "DNS")]
        san_dns: Vec<String>,

        /// Output file for the PEM request (default: stdout)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Complete a request with the CA response and install it
    Complete {
        /// Certificate returned by the CA (PEM or DER)
        #[arg(short, long, value_name = "PATH")]
        request: PathBuf,

        /// Friendly name for the installed certificate
        #[arg(short, long)]
        name: String,

        /// Target store (personal, web-hosting)
        #[arg(short, long, default_value = "personal")]
        store: InstallTarget,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show where the private key for a subject is stored
    KeyPath {
        /// Read the subject from this certificate
        #[arg(long, value_name = "PATH", conflicts_with = "subject", required_unless_present = "subject")]
        request: Option<PathBuf>,

        /// Subject identity, e.g. "CN=www.example.com, O=Example Corp"
        #[arg(long)]
        subject: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate configuration file
    Validate,

    /// Display effective configuration
    Show {
        /// Output format (json, toml)
        #[arg(long, default_value = "toml")]
        format: ConfigFormat,
    },

    /// Generate default configuration file
    Init {
        /// Output file path
        #[arg(short, long, default_value = "cert-completion.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum ConfigFormat {
    Json,
    #[default]
    Toml,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Configuration commands run before the configuration is loaded
    if let Commands::Config { action } = &cli.command {
        return match cmd_config(&cli, action) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let config = match loader(&cli).load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let level_override = if cli.quiet {
        Some("error")
    } else if cli.verbose {
        Some("debug")
    } else {
        None
    };
    if let Err(e) = cert_completion::logging::init_logging(&config.logging, level_override) {
        eprintln!("Warning: {}", e);
    }

    // Create runtime for async operations
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_command(&cli, &config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let diagnostic = Diagnostic::from_error(&e);
            eprintln!("{}", diagnostic);
            match diagnostic.severity {
                Severity::Notice => ExitCode::from(EXIT_NOT_COMPLETED),
                Severity::Error => ExitCode::FAILURE,
            }
        }
    }
}

fn loader(cli: &Cli) -> ConfigLoader {
    let mut loader = ConfigLoader::new();
    if let Some(ref path) = cli.config {
        loader = loader.with_path(path);
    }
    loader
}

async fn run_command(cli: &Cli, config: &CompletionConfig) -> Result<(), CompletionError> {
    match &cli.command {
        #[cfg(feature = "csr-gen")]
        Commands::Request {
            common_name,
            organization,
            organizational_unit,
            locality,
            state,
            country,
            san_dns,
            output,
        } => {
            use cert_completion::request::{CsrBuilder, create_request};

            let mut builder = CsrBuilder::new().common_name(common_name).key_usage_tls();
            if let Some(o) = organization {
                builder = builder.organization(o);
            }
            if let Some(ou) = organizational_unit {
                builder = builder.organizational_unit(ou);
            }
            if let Some(l) = locality {
                builder = builder.locality(l);
            }
            if let Some(st) = state {
                builder = builder.state(st);
            }
            if let Some(c) = country {
                builder = builder.country(c);
            }
            for dns in san_dns {
                builder = builder.san_dns(dns);
            }

            let keys = cert_completion::KeyStore::from_config(&config.keys);
            let pending = create_request(builder, &keys)?;

            match output {
                Some(path) => {
                    std::fs::write(path, &pending.csr_pem)?;
                    if !cli.quiet {
                        println!("Request written to {}", path.display());
                    }
                }
                None => print!("{}", pending.csr_pem),
            }
            if !cli.quiet {
                eprintln!("Subject: {}", pending.subject);
                eprintln!("Private key: {}", pending.key_path.display());
            }
            Ok(())
        }

        Commands::Complete {
            request,
            name,
            store,
            format,
        } => {
            let coordinator = WorkflowCoordinator::from_config(config);
            let installed = coordinator.complete(request, name, *store).await?;

            match format {
                OutputFormat::Text => {
                    if !cli.quiet {
                        println!("Certificate installed.");
                        println!("  Friendly name: {}", installed.friendly_name);
                        println!("  Store:         {}", installed.target);
                        println!("  Subject:       {}", installed.subject);
                        println!("  Thumbprint:    {}", installed.thumbprint);
                    }
                }
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(&installed)
                        .map_err(|e| CompletionError::config(e.to_string()))?;
                    println!("{}", json);
                }
            }
            Ok(())
        }

        Commands::KeyPath { request, subject } => {
            let keys = cert_completion::KeyStore::from_config(&config.keys);
            let subject = match (request, subject) {
                (Some(path), _) => RequestArtifact::load(path)?.subject().to_string(),
                (None, Some(subject)) => subject.clone(),
                (None, None) => return Err(CompletionError::missing_input("subject")),
            };

            let path = keys.key_path(&subject);
            println!("{}", path.display());
            if !cli.quiet {
                let state = if keys.find_private_key(&subject).is_some() {
                    "present"
                } else {
                    "missing"
                };
                eprintln!("Subject: {} ({})", subject, state);
            }
            Ok(())
        }

        Commands::Config { .. } => Ok(()),
    }
}

fn cmd_config(cli: &Cli, action: &ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Validate => {
            let loader = loader(cli).with_validate(false);
            if let Ok(Some(path)) = loader.find_config_file() {
                println!("Validating {}...", path.display());
            } else {
                println!("No configuration file found; validating defaults...");
            }

            let config = loader.load()?;
            match config.validate() {
                Ok(()) => {
                    println!("Configuration is valid.");
                    println!();
                    println!("Summary:");
                    println!("  Key directory:  {}", config.keys.directory.display());
                    println!("  Helper:         {}", config.installer.helper.display());
                    println!("  Elevation:      {:?}", config.installer.elevation);
                    println!("  Legacy PKCS#12: {}", config.bundle.legacy_encryption);
                    Ok(())
                }
                Err(e) => {
                    println!("Configuration validation failed:");
                    println!("  {}", e);
                    Err("Validation failed".into())
                }
            }
        }
        ConfigAction::Show { format } => {
            let config = loader(cli).load()?;
            match format {
                ConfigFormat::Toml => println!("{}", config.to_toml()?),
                ConfigFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
            }
            Ok(())
        }
        ConfigAction::Init { output, force } => {
            if output.exists() && !force {
                return Err(format!(
                    "{} already exists (use --force to overwrite)",
                    output.display()
                )
                .into());
            }
            write_default_config(output)?;
            println!("Wrote {}", output.display());
            Ok(())
        }
    }
}
