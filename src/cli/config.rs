//! CLI configuration module
//!
//! Turns parsed arguments into the runtime configuration of one command.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::cli::args::{CliArgs, Command};
use crate::transfer::TransferConfig;

/// What the binary was asked to do
#[derive(Debug, Clone)]
pub enum Mode {
    Serve {
        bind: SocketAddr,
        object_root: PathBuf,
        stale_after: Duration,
        sweep_interval: Duration,
    },
    Upload {
        file: PathBuf,
        bucket: String,
        server: Url,
    },
    Download {
        bucket: String,
        key: String,
        output_dir: PathBuf,
        server: Url,
    },
}

/// Configuration for one run of the binary
#[derive(Debug, Clone)]
pub struct Config {
    /// Library-level transfer settings
    pub transfer: TransferConfig,
    /// Selected command
    pub mode: Mode,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Result<Self> {
        let (mode, default_staging, strict) = match &args.command {
            Command::Serve {
                bind,
                object_root,
                stale_after,
                sweep_interval,
            } => {
                let bind = bind
                    .parse::<SocketAddr>()
                    .with_context(|| format!("Invalid bind address: {}", bind))?;
                let mode = Mode::Serve {
                    bind,
                    object_root: object_root.clone(),
                    stale_after: Duration::from_secs(*stale_after),
                    sweep_interval: Duration::from_secs(*sweep_interval),
                };
                (mode, "./staging/uploads", false)
            }
            Command::Upload { file, bucket, server } => {
                let mode = Mode::Upload {
                    file: file.clone(),
                    bucket: bucket.clone(),
                    server: parse_server(server)?,
                };
                (mode, "./staging/uploads", false)
            }
            Command::Download {
                key,
                bucket,
                output_dir,
                server,
                strict,
            } => {
                let mode = Mode::Download {
                    bucket: bucket.clone(),
                    key: key.clone(),
                    output_dir: output_dir.clone().unwrap_or_else(|| PathBuf::from("./downloads")),
                    server: parse_server(server)?,
                };
                (mode, "./staging/downloads", *strict)
            }
        };

        let staging_root = args
            .staging_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_staging));

        let transfer = TransferConfig::new(staging_root)
            .with_chunk_size(args.chunk_size)
            .with_max_retries(args.max_retries)
            .with_strict_checksum(strict);

        Ok(Self {
            transfer,
            mode,
            verbose: args.verbose,
            quiet: args.quiet,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.transfer.validate()?;

        match &self.mode {
            Mode::Serve {
                object_root,
                sweep_interval,
                ..
            } => {
                if object_root.as_os_str().is_empty() {
                    return Err(anyhow::anyhow!("object_root cannot be empty"));
                }
                if sweep_interval.is_zero() {
                    return Err(anyhow::anyhow!("sweep_interval must be at least 1 second"));
                }
            }
            Mode::Upload { file, bucket, .. } => {
                if file.as_os_str().is_empty() {
                    return Err(anyhow::anyhow!("file cannot be empty"));
                }
                if bucket.is_empty() {
                    return Err(anyhow::anyhow!("bucket cannot be empty"));
                }
            }
            Mode::Download {
                bucket,
                key,
                output_dir,
                ..
            } => {
                if bucket.is_empty() || key.is_empty() {
                    return Err(anyhow::anyhow!("bucket and key cannot be empty"));
                }
                if output_dir.as_os_str().is_empty() {
                    return Err(anyhow::anyhow!("output_dir cannot be empty"));
                }
            }
        }

        Ok(())
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

fn parse_server(server: &str) -> Result<Url> {
    let url = Url::parse(server).with_context(|| format!("Invalid server URL: {}", server))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow::anyhow!("Server URL must use http or https: {}", server));
    }
    Ok(url)
}
