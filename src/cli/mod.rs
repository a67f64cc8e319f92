//! CLI module
//!
//! Command-line interface for the chunked transfer tool.

pub mod args;
pub mod config;
pub mod progress;

pub use args::{CliArgs, Command};
pub use config::{Config, Mode};
pub use progress::{ProgressDisplay, TransferStats};
