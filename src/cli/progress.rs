//! Progress display module
//!
//! Handles displaying transfer progress in the CLI.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::client::{ChunkProgress, ProgressCallback};

/// Transfer statistics for progress display
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    /// Bytes covered by finished chunks
    pub bytes_done: u64,
    /// Total file size
    pub total_bytes: u64,
    /// Chunks finished so far
    pub chunks_done: u32,
    /// Total chunk count
    pub total_chunks: u32,
    /// Chunks reused from an earlier run
    pub chunks_resumed: u32,
    /// Transfer speed in bytes per second
    pub speed: f64,
    /// Progress (0.0 to 1.0)
    pub progress: f64,
}

impl TransferStats {
    /// Create new transfer stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Render a byte count with binary units, e.g. `5.0 MiB`
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
        if bytes < 1024 {
            return format!("{} B", bytes);
        }
        let mut value = bytes as f64 / 1024.0;
        let mut unit = UNITS[0];
        for next in &UNITS[1..] {
            if value < 1024.0 {
                break;
            }
            value /= 1024.0;
            unit = next;
        }
        format!("{:.1} {}", value, unit)
    }

    pub fn format_speed(bytes_per_sec: f64) -> String {
        format!("{}/s", Self::format_bytes(bytes_per_sec.max(0.0) as u64))
    }

    /// Render a duration as `mm:ss`, or `h:mm:ss` past the hour
    pub fn format_duration(duration: Duration) -> String {
        let secs = duration.as_secs();
        match secs / 3600 {
            0 => format!("{:02}:{:02}", secs / 60, secs % 60),
            hours => format!("{}:{:02}:{:02}", hours, secs % 3600 / 60, secs % 60),
        }
    }

    /// Time left at the current speed; `None` when finished or stalled
    pub fn calculate_eta(done: u64, total: u64, speed: f64) -> Option<Duration> {
        let remaining = total.checked_sub(done).filter(|r| *r > 0)?;
        (speed > 0.0).then(|| Duration::from_secs_f64(remaining as f64 / speed))
    }
}

/// Progress display for CLI
pub struct ProgressDisplay {
    /// Start time of the transfer
    start_time: Instant,
    /// Last update time
    last_update: Instant,
    /// Update interval
    update_interval: Duration,
    /// Quiet mode (no progress output)
    quiet: bool,
    /// Running totals
    stats: TransferStats,
    /// Bytes skipped because they were already on disk
    resumed_bytes: u64,
}

impl ProgressDisplay {
    /// Create a new progress display
    pub fn new(quiet: bool) -> Self {
        Self::with_interval(quiet, Duration::from_millis(500))
    }

    /// Create a progress display with custom update interval
    pub fn with_interval(quiet: bool, interval: Duration) -> Self {
        Self {
            start_time: Instant::now(),
            last_update: Instant::now(),
            update_interval: interval,
            quiet,
            stats: TransferStats::new(),
            resumed_bytes: 0,
        }
    }

    /// Wrap the display in a callback for the client sessions
    pub fn into_callback(self) -> (Arc<Mutex<ProgressDisplay>>, ProgressCallback) {
        let display = Arc::new(Mutex::new(self));
        let sink = Arc::clone(&display);
        let callback: ProgressCallback = Arc::new(move |progress: ChunkProgress| {
            if let Ok(mut display) = sink.lock() {
                let _ = display.record(progress);
            }
        });
        (display, callback)
    }

    /// Fold one chunk report into the running totals and redraw
    pub fn record(&mut self, progress: ChunkProgress) -> io::Result<()> {
        let previous_end = self.stats.bytes_done;
        self.stats.bytes_done = progress.bytes_done;
        self.stats.total_bytes = progress.total_bytes;
        self.stats.chunks_done = progress.index + 1;
        self.stats.total_chunks = progress.total_chunks;
        self.stats.progress = progress.fraction();
        if progress.resumed {
            self.stats.chunks_resumed += 1;
            self.resumed_bytes += progress.bytes_done.saturating_sub(previous_end);
        }

        let elapsed = self.start_time.elapsed().as_secs_f64();
        let transferred = self.stats.bytes_done.saturating_sub(self.resumed_bytes);
        self.stats.speed = if elapsed > 0.0 { transferred as f64 / elapsed } else { 0.0 };

        let finished = self.stats.chunks_done >= self.stats.total_chunks;
        self.update(finished)
    }

    /// Current totals
    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    /// Redraw at most once per interval unless `force` is set
    pub fn update(&mut self, force: bool) -> io::Result<()> {
        if self.quiet || (!force && self.last_update.elapsed() < self.update_interval) {
            return Ok(());
        }
        self.last_update = Instant::now();
        self.print_progress()?;
        io::stdout().flush()
    }

    /// Redraw the single-line chunk progress bar
    pub fn print_progress(&self) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        const WIDTH: usize = 32;
        let stats = &self.stats;
        let filled = ((stats.progress.clamp(0.0, 1.0)) * WIDTH as f64).round() as usize;
        let bar = format!("{}{}", "#".repeat(filled), "-".repeat(WIDTH - filled));
        let eta = TransferStats::calculate_eta(stats.bytes_done, stats.total_bytes, stats.speed)
            .map(TransferStats::format_duration)
            .unwrap_or_else(|| "--:--".to_string());

        let mut out = io::stdout().lock();
        write!(
            out,
            "\r\x1b[2K{} {:>5.1}% chunk {}/{} {} of {} at {} eta {}",
            bar,
            stats.progress * 100.0,
            stats.chunks_done,
            stats.total_chunks,
            TransferStats::format_bytes(stats.bytes_done),
            TransferStats::format_bytes(stats.total_bytes),
            TransferStats::format_speed(stats.speed),
            eta,
        )
    }

    /// Replace the progress line with a short summary under `title`
    pub fn print_complete(&self, title: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        let stats = &self.stats;
        let mut out = io::stdout().lock();
        writeln!(out, "\r\x1b[2K{}", title)?;
        writeln!(
            out,
            "  {} in {} chunk(s), {} reused from an earlier run",
            TransferStats::format_bytes(stats.total_bytes),
            stats.total_chunks,
            stats.chunks_resumed
        )?;
        writeln!(out, "  Took {}", TransferStats::format_duration(self.start_time.elapsed()))?;
        out.flush()
    }

    /// Print a status message
    pub fn print_status(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        println!("\r\x1b[2K{}", message);
        Ok(())
    }

    /// Print an error message
    pub fn print_error(&self, message: &str) -> io::Result<()> {
        eprintln!("\r\x1b[2KError: {}", message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u32, bytes_done: u64, resumed: bool) -> ChunkProgress {
        ChunkProgress {
            index,
            total_chunks: 3,
            bytes_done,
            total_bytes: 12,
            resumed,
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(TransferStats::format_bytes(0), "0 B");
        assert_eq!(TransferStats::format_bytes(1023), "1023 B");
        assert_eq!(TransferStats::format_bytes(1536), "1.5 KiB");
        assert_eq!(TransferStats::format_bytes(5 * 1024 * 1024), "5.0 MiB");
        assert_eq!(TransferStats::format_bytes(3 * 1024 * 1024 * 1024), "3.0 GiB");
        assert_eq!(TransferStats::format_speed(2048.0), "2.0 KiB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(TransferStats::format_duration(Duration::from_secs(7)), "00:07");
        assert_eq!(TransferStats::format_duration(Duration::from_secs(90)), "01:30");
        assert_eq!(TransferStats::format_duration(Duration::from_secs(3661)), "1:01:01");
    }

    #[test]
    fn test_calculate_eta() {
        assert_eq!(TransferStats::calculate_eta(50, 100, 10.0), Some(Duration::from_secs(5)));
        assert_eq!(TransferStats::calculate_eta(100, 100, 10.0), None);
        assert_eq!(TransferStats::calculate_eta(120, 100, 10.0), None);
        assert_eq!(TransferStats::calculate_eta(50, 100, 0.0), None);
    }

    #[test]
    fn test_record_tracks_totals() {
        let mut display = ProgressDisplay::new(true);
        display.record(chunk(0, 5, true)).unwrap();
        display.record(chunk(1, 10, false)).unwrap();

        let stats = display.stats();
        assert_eq!(stats.chunks_done, 2);
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.chunks_resumed, 1);
        assert_eq!(stats.bytes_done, 10);
    }

    #[test]
    fn test_callback_feeds_display() {
        let (display, callback) = ProgressDisplay::new(true).into_callback();
        callback(chunk(0, 5, false));
        callback(chunk(2, 12, false));

        let display = display.lock().unwrap();
        assert_eq!(display.stats().chunks_done, 3);
        assert_eq!(display.stats().progress, 1.0);
    }
}
