//! Progress reporter implementation
//!
//! Uses indicatif for the interactive display:
//! - Ticker count progress with ETA
//! - Status line naming the current symbol
//! - Succeeded/failed counters shared by concurrent workers
//!
//! Batch jobs have no terminal, so indicatif draws nothing there and the
//! per-symbol log lines are the record of progress.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Progress reporter for per-ticker passes
pub struct ProgressReporter {
    /// Multi-progress container
    multi: MultiProgress,
    /// Ticker count bar
    tickers_bar: ProgressBar,
    /// Current status message
    status: ProgressBar,
    /// Start time
    start_time: Instant,
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    /// Bytes written to disk
    bytes: AtomicU64,
    /// Is progress enabled
    enabled: AtomicBool,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let status = multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            status.set_style(style);
        }

        let tickers_bar = multi.add(ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} tickers ({percent}%, ETA {eta})")
        {
            tickers_bar.set_style(style.progress_chars("=> "));
        }
        tickers_bar.set_prefix("Tickers");

        Self {
            multi,
            tickers_bar,
            status,
            start_time: Instant::now(),
            total: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            enabled: AtomicBool::new(true),
        }
    }

    /// Create a disabled progress reporter (for quiet mode)
    pub fn disabled() -> Self {
        let reporter = Self::new();
        reporter.enabled.store(false, Ordering::SeqCst);
        reporter.multi.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    /// Set the number of tickers in this pass
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.tickers_bar.set_length(total);
    }

    /// Show the symbol being worked on
    pub fn set_current(&self, symbol: &str) {
        self.status.set_message(symbol.to_string());
        self.status.tick();
    }

    /// Set current status message
    pub fn set_status(&self, msg: &str) {
        self.status.set_message(msg.to_string());
    }

    /// Record a finished ticker and the bytes it wrote
    pub fn record_success(&self, bytes: u64) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.tickers_bar.inc(1);
    }

    /// Record a ticker that ran out of attempts
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.tickers_bar.inc(1);
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Finish progress with success message
    pub fn finish_success(&self, message: &str) {
        self.status.finish_with_message(format!("✓ {}", message));
        self.tickers_bar.finish();
    }

    /// Finish progress with error message
    pub fn finish_error(&self, message: &str) {
        self.status.finish_with_message(format!("✗ {}", message));
        self.tickers_bar.abandon();
    }

    /// Check if progress is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Get progress summary
    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary {
            total: self.total.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress summary
#[derive(Debug, Clone)]
pub struct ProgressSummary {
    /// Tickers in the pass
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Bytes written
    pub bytes: u64,
    /// Elapsed time
    pub elapsed: Duration,
}

impl ProgressSummary {
    /// Get completion percentage
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            ((self.succeeded + self.failed) as f64 / self.total as f64) * 100.0
        }
    }

    /// Print summary to console
    pub fn print(&self) {
        println!("Progress:  {:.1}%", self.percentage());
        println!("Tickers:   {}/{}", self.succeeded, self.total);
        println!("Failed:    {}", self.failed);
        println!("Written:   {}", humansize::format_size(self.bytes, humansize::BINARY));
        println!("Elapsed:   {}", humantime::format_duration(Duration::from_secs(self.elapsed.as_secs())));
    }
}
