//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::transfer::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES};

/// Default server address used by the client commands
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8080/";

/// CLI arguments for the chunked transfer tool
#[derive(Debug, Parser)]
#[command(name = "chunked-transfer")]
#[command(about = "Resumable, checksum-verified chunked file transfer", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Chunk size in bytes (client and server must agree)
    #[arg(long, global = true, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u64,

    /// Attempts per chunk before giving up
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Staging directory for chunk artifacts
    #[arg(long, global = true, value_name = "DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the transfer server
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,

        /// Directory holding published objects as <bucket>/<key>
        #[arg(long, value_name = "DIR", default_value = "./objects")]
        object_root: PathBuf,

        /// Remove upload sessions idle for this many seconds
        #[arg(long, default_value_t = 86_400)]
        stale_after: u64,

        /// Seconds between sweeps of abandoned sessions
        #[arg(long, default_value_t = 3_600)]
        sweep_interval: u64,
    },

    /// Upload a file in chunks
    Upload {
        /// File to upload
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Destination bucket
        #[arg(short, long)]
        bucket: String,

        /// Server base URL
        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        server: String,
    },

    /// Download a stored file in chunks, resuming an interrupted run
    Download {
        /// Object key
        #[arg(value_name = "KEY")]
        key: String,

        /// Source bucket
        #[arg(short, long)]
        bucket: String,

        /// Directory receiving downloaded_<name>
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Server base URL
        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        server: String,

        /// Fail and delete the output on checksum mismatch
        #[arg(long)]
        strict: bool,
    },
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_defaults() {
        let args = CliArgs::try_parse_from(["chunked-transfer", "upload", "report.pdf", "--bucket", "docs"]).unwrap();
        assert_eq!(args.chunk_size, 5 * 1024 * 1024);
        assert_eq!(args.max_retries, 3);
        assert!(!args.is_verbose());
        match args.command {
            Command::Upload { file, bucket, server } => {
                assert_eq!(file, PathBuf::from("report.pdf"));
                assert_eq!(bucket, "docs");
                assert_eq!(server, DEFAULT_SERVER_URL);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = CliArgs::try_parse_from([
            "chunked-transfer",
            "download",
            "report.pdf",
            "-b",
            "docs",
            "--strict",
            "--chunk-size",
            "1024",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.chunk_size, 1024);
        assert_eq!(args.log_level(), tracing::Level::DEBUG);
        assert!(matches!(args.command, Command::Download { strict: true, .. }));
    }

    #[test]
    fn test_serve_defaults() {
        let args = CliArgs::try_parse_from(["chunked-transfer", "serve", "-q"]).unwrap();
        assert_eq!(args.log_level(), tracing::Level::ERROR);
        match args.command {
            Command::Serve { bind, stale_after, .. } => {
                assert_eq!(bind, "0.0.0.0:8080");
                assert_eq!(stale_after, 86_400);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_upload_requires_bucket() {
        assert!(CliArgs::try_parse_from(["chunked-transfer", "upload", "report.pdf"]).is_err());
    }
}
