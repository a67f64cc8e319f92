//! chunked-transfer - Main entry point
//!
//! Runs the transfer server or drives one chunked upload or download.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chunked_transfer::cli::Mode;
use chunked_transfer::server::http;
use chunked_transfer::{
    CliArgs, Completion, Config, DownloadClient, HttpTransport, ProgressDisplay, ServerState, TransferStats,
    UploadClient, Verification,
};
use tracing::{debug, error, info, warn};
use url::Url;

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        match panic_info.location() {
            Some(location) => error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            ),
            None => error!("PANIC occurred at unknown location"),
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic handler
    setup_panic_handler();

    // Parse CLI arguments
    let args = CliArgs::parse_args();

    // Initialize logging
    init_logging(&args);
    info!("chunked-transfer starting");
    debug!("CLI arguments: {:?}", args);

    // Create configuration
    let config = Config::from_args(&args).context("Invalid arguments")?;

    // Validate configuration
    config.validate().context("Invalid configuration")?;

    match config.mode.clone() {
        Mode::Serve {
            bind,
            object_root,
            stale_after,
            sweep_interval,
        } => run_server(&config, bind, object_root, stale_after, sweep_interval).await,
        Mode::Upload { file, bucket, server } => run_upload(&config, &file, &bucket, server).await,
        Mode::Download {
            bucket,
            key,
            output_dir,
            server,
        } => run_download(&config, &bucket, &key, &output_dir, server).await,
    }
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let level = args.log_level();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
        debug!("Using pretty log format (verbose mode)");
    } else {
        subscriber.compact().init();
    }

    debug!("Logging initialized with level: {:?}", level);
}

/// Run the HTTP server until interrupted
async fn run_server(
    config: &Config,
    bind: std::net::SocketAddr,
    object_root: PathBuf,
    stale_after: Duration,
    sweep_interval: Duration,
) -> Result<()> {
    tokio::fs::create_dir_all(&object_root)
        .await
        .with_context(|| format!("Failed to create object root {}", object_root.display()))?;
    tokio::fs::create_dir_all(&config.transfer.staging_root)
        .await
        .with_context(|| format!("Failed to create staging root {}", config.transfer.staging_root.display()))?;

    let state = Arc::new(ServerState::new(&config.transfer, &object_root).context("Failed to initialize server")?);

    info!(
        "Serving objects from {} (staging in {}, chunk size {})",
        object_root.display(),
        config.transfer.staging_root.display(),
        TransferStats::format_bytes(config.transfer.chunk_size)
    );

    let sweeper = {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            loop {
                interval.tick().await;
                if let Err(e) = state.upload.sweep_stale(stale_after).await {
                    warn!("Sweep of abandoned sessions failed: {}", e);
                }
            }
        })
    };

    let app = http::router(state, config.transfer.chunk_size);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.abort();
    info!("chunked-transfer server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Upload one file and report the server's verdict
async fn run_upload(config: &Config, file: &Path, bucket: &str, server: Url) -> Result<()> {
    let transport = Arc::new(HttpTransport::new(server.clone()));
    let (display, callback) = ProgressDisplay::new(config.is_quiet()).into_callback();
    let client = UploadClient::new(transport, config.transfer.clone()).with_progress(callback);

    info!("Uploading {} to {} (bucket {})", file.display(), server, bucket);
    let receipt = client
        .start_upload(file, bucket)
        .await
        .with_context(|| format!("Upload of {} failed", file.display()))?;

    let display = display.lock().map_err(|_| anyhow::anyhow!("progress display poisoned"))?;
    match receipt.completion {
        Completion::Accepted { message } => {
            display.print_complete("Upload Complete!")?;
            display.print_status(&format!("  Checksum: {}", receipt.checksum))?;
            info!("{}", message);
            Ok(())
        }
        Completion::Rejected { status, message } => {
            display.print_error(&format!("Server rejected upload ({}): {}", status, message))?;
            bail!("Upload {} was rejected by the server", receipt.session_id)
        }
        Completion::Unreachable { reason } => {
            display.print_error(&format!("Completion request failed: {}", reason))?;
            bail!("Upload {} could not be completed", receipt.session_id)
        }
    }
}

/// Download one object, resuming an earlier interrupted run
async fn run_download(config: &Config, bucket: &str, key: &str, output_dir: &Path, server: Url) -> Result<()> {
    let transport = Arc::new(HttpTransport::new(server.clone()));
    let (display, callback) = ProgressDisplay::new(config.is_quiet()).into_callback();
    let client = DownloadClient::new(transport, config.transfer.clone()).with_progress(callback);

    info!("Downloading {}/{} from {}", bucket, key, server);
    let receipt = client
        .download(bucket, key, output_dir)
        .await
        .with_context(|| format!("Download of {}/{} failed", bucket, key))?;

    let display = display.lock().map_err(|_| anyhow::anyhow!("progress display poisoned"))?;
    match receipt.verification {
        Verification::Verified { checksum } => {
            display.print_complete("Download Complete!")?;
            display.print_status(&format!("  Saved to: {}", receipt.path.display()))?;
            display.print_status(&format!("  Checksum: {}", checksum))?;
            Ok(())
        }
        Verification::Mismatch { expected, actual } => {
            display.print_error(&format!(
                "Checksum mismatch for {} (expected {}, got {}); file kept",
                receipt.path.display(),
                expected,
                actual
            ))?;
            bail!("Downloaded file failed verification")
        }
    }
}
