// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface
//!
//! Bootstrap-layer CLI handling with security-first validation.
//!
//! ```text
//! 1. parse_cli()        parse argv with clap
//! 2. validate_cli()     reject path traversal / out-of-range values
//! 3. ValidatedCli        safe, validated configuration handed to main
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// DRM-protected audio library server.
#[derive(Parser, Debug)]
#[command(name = "audio-drm-server", version, about = "Chunked-ingest, envelope-encrypted audio streaming server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML configuration file overlaying environment variables.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Raise the tracing filter to `debug`.
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server: upload ingest, chapter materialization, signed streaming.
    Serve {
        /// Address to bind the HTTP listener to.
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind_addr: String,

        /// Number of chapter-materialization worker permits requested at
        /// startup; the Memory Governor may admit fewer.
        #[arg(long)]
        max_concurrent_chapters: Option<usize>,
    },
    /// Apply pending sqlx migrations and exit.
    Migrate,
    /// Run one Janitor sweep (§4.7) and exit, without starting the server.
    Janitor,
}

/// CLI parsing/validation failure.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid value for --{arg}: {reason}")]
    InvalidValue { arg: String, reason: String },
    #[error("path traversal rejected for {0}")]
    PathTraversal(String),
    #[error("path does not exist: {0}")]
    PathNotFound(String),
}

/// Validated CLI configuration. All paths have been checked for traversal;
/// all numeric values are range-checked.
#[derive(Debug, Clone)]
pub struct ValidatedCli {
    pub command: ValidatedCommand,
    pub verbose: bool,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum ValidatedCommand {
    Serve { bind_addr: String, max_concurrent_chapters: Option<usize> },
    Migrate,
    Janitor,
}

/// Rejects `..` path segments and validates a config path actually exists.
/// The bootstrap layer only ever receives a handful of operator-supplied
/// paths (the config file), so this is deliberately narrow compared to a
/// general-purpose path sanitizer.
struct SecureArgParser;

impl SecureArgParser {
    fn validate_existing_path(raw: &str) -> Result<PathBuf, ParseError> {
        let path = Self::validate_argument(raw)?;
        if !path.exists() {
            return Err(ParseError::PathNotFound(raw.to_string()));
        }
        Ok(path)
    }

    fn validate_argument(raw: &str) -> Result<PathBuf, ParseError> {
        if raw.split(std::path::MAIN_SEPARATOR).any(|segment| segment == "..") {
            return Err(ParseError::PathTraversal(raw.to_string()));
        }
        Ok(Path::new(raw).to_path_buf())
    }
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

pub fn parse_and_validate() -> Result<ValidatedCli, ParseError> {
    let cli = parse_cli();
    validate_cli(cli)
}

fn validate_cli(cli: Cli) -> Result<ValidatedCli, ParseError> {
    let config = match cli.config {
        Some(path) => Some(SecureArgParser::validate_existing_path(&path.to_string_lossy())?),
        None => None,
    };

    let command = match cli.command {
        Commands::Serve { bind_addr, max_concurrent_chapters } => {
            if bind_addr.parse::<std::net::SocketAddr>().is_err() {
                return Err(ParseError::InvalidValue {
                    arg: "bind-addr".to_string(),
                    reason: "must be a valid host:port socket address".to_string(),
                });
            }
            if let Some(n) = max_concurrent_chapters {
                if n == 0 || n > 64 {
                    return Err(ParseError::InvalidValue {
                        arg: "max-concurrent-chapters".to_string(),
                        reason: "must be between 1 and 64".to_string(),
                    });
                }
            }
            ValidatedCommand::Serve { bind_addr, max_concurrent_chapters }
        }
        Commands::Migrate => ValidatedCommand::Migrate,
        Commands::Janitor => ValidatedCommand::Janitor,
    };

    Ok(ValidatedCli { command, verbose: cli.verbose, config })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_in_config_path() {
        let result = SecureArgParser::validate_argument("../../etc/passwd");
        assert!(matches!(result, Err(ParseError::PathTraversal(_))));
    }

    #[test]
    fn accepts_a_plain_relative_path() {
        let result = SecureArgParser::validate_argument("config/audio-drm.toml");
        assert!(result.is_ok());
    }

    #[test]
    fn validate_cli_rejects_malformed_bind_addr() {
        let cli = Cli {
            command: Commands::Serve { bind_addr: "not-an-addr".to_string(), max_concurrent_chapters: None },
            config: None,
            verbose: false,
        };
        let result = validate_cli(cli);
        assert!(matches!(result, Err(ParseError::InvalidValue { .. })));
    }

    #[test]
    fn validate_cli_accepts_a_well_formed_serve_command() {
        let cli = Cli {
            command: Commands::Serve { bind_addr: "127.0.0.1:8080".to_string(), max_concurrent_chapters: Some(3) },
            config: None,
            verbose: true,
        };
        let validated = validate_cli(cli).unwrap();
        assert!(validated.verbose);
        assert!(matches!(validated.command, ValidatedCommand::Serve { max_concurrent_chapters: Some(3), .. }));
    }

    #[test]
    fn validate_cli_rejects_zero_concurrency() {
        let cli = Cli {
            command: Commands::Serve { bind_addr: "127.0.0.1:8080".to_string(), max_concurrent_chapters: Some(0) },
            config: None,
            verbose: false,
        };
        assert!(validate_cli(cli).is_err());
    }
}
