//! Raw history refresh
//!
//! A ticker is refreshed when its raw CSV is missing or was last written
//! more than `max_days` days ago. Each refresh gets a fixed number of
//! attempts, each through a freshly drawn proxy; a ticker that runs out
//! of attempts is reported and skipped, never fatal to the run.

use crate::data::{days_since_modified, write_history_csv, DataLayout};
use crate::error::Result;
use crate::net::{ProxyPool, RequestPacer, Transport};
use crate::progress::ProgressReporter;
use crate::source::HistoryClient;
use chrono::{DateTime, Local};
use futures::stream::{self, StreamExt};

/// Tickers whose raw file is missing or older than `max_days` days
pub fn stale_tickers<S: AsRef<str>>(
    layout: &DataLayout,
    symbols: &[S],
    now: DateTime<Local>,
    max_days: i64,
) -> Result<Vec<String>> {
    let mut stale = Vec::new();
    for symbol in symbols {
        let symbol = symbol.as_ref();
        let path = layout.raw_path(symbol);
        if !path.exists() || days_since_modified(&path, now)? > max_days {
            stale.push(symbol.to_string());
        }
    }
    Ok(stale)
}

/// Download settings
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Attempts per ticker
    pub failure_limit: u32,
    /// Tickers downloaded at once
    pub jobs: usize,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            failure_limit: 5,
            jobs: 1,
        }
    }
}

/// Outcome of a download pass
#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    /// Tickers written, in completion order
    pub succeeded: Vec<String>,
    /// Tickers that ran out of attempts, with the last error
    pub failed: Vec<(String, String)>,
    /// Bytes written to the raw directory
    pub bytes: u64,
}

impl DownloadReport {
    /// True when every requested ticker was written
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of tickers attempted
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Fetches histories and writes them to the raw directory
pub struct Downloader<'a> {
    transport: &'a dyn Transport,
    proxies: &'a ProxyPool,
    pacer: RequestPacer,
    layout: &'a DataLayout,
    options: DownloadOptions,
    progress: &'a ProgressReporter,
}

impl<'a> Downloader<'a> {
    /// Create a downloader
    pub fn new(
        transport: &'a dyn Transport,
        proxies: &'a ProxyPool,
        pacer: RequestPacer,
        layout: &'a DataLayout,
        options: DownloadOptions,
        progress: &'a ProgressReporter,
    ) -> Self {
        Self {
            transport,
            proxies,
            pacer,
            layout,
            options,
            progress,
        }
    }

    /// Fetch and write one ticker, returning the bytes written
    async fn attempt(&self, symbol: &str) -> Result<u64> {
        let bars = HistoryClient::new(self.transport)
            .history(symbol, self.proxies.random_proxy())
            .await?;
        write_history_csv(&self.layout.raw_path(symbol), &bars)
    }

    async fn download_one(&self, index: usize, total: usize, symbol: &str) -> std::result::Result<u64, String> {
        tracing::info!("{} / {} - {}", index, total, symbol);
        self.progress.set_current(symbol);

        let mut last_error = String::from("no attempts made");
        for attempt in 1..=self.options.failure_limit {
            self.pacer.wait().await;
            match self.attempt(symbol).await {
                Ok(bytes) => {
                    self.progress.record_success(bytes);
                    return Ok(bytes);
                }
                Err(e) => {
                    tracing::debug!(
                        "{} failed (attempt {}/{}): {}",
                        symbol,
                        attempt,
                        self.options.failure_limit,
                        e
                    );
                    last_error = e.to_string();
                }
            }
        }

        tracing::warn!(
            "Giving up on {} after {} attempts: {}",
            symbol,
            self.options.failure_limit,
            last_error
        );
        self.progress.record_failure();
        Err(last_error)
    }

    /// Download every ticker in `symbols`
    pub async fn download_stock_data<S: AsRef<str>>(&self, symbols: &[S]) -> DownloadReport {
        let total = symbols.len();
        self.progress.set_total(total as u64);

        let results: Vec<(String, std::result::Result<u64, String>)> = stream::iter(symbols.iter().enumerate())
            .map(|(i, symbol)| async move {
                let symbol = symbol.as_ref();
                (symbol.to_string(), self.download_one(i + 1, total, symbol).await)
            })
            .buffer_unordered(self.options.jobs.max(1))
            .collect()
            .await;

        let mut report = DownloadReport::default();
        for (symbol, result) in results {
            match result {
                Ok(bytes) => {
                    report.bytes += bytes;
                    report.succeeded.push(symbol);
                }
                Err(e) => report.failed.push((symbol, e)),
            }
        }

        tracing::info!(
            "Downloaded {} / {} tickers ({})",
            report.succeeded.len(),
            report.attempted(),
            humansize::format_size(report.bytes, humansize::BINARY)
        );
        report
    }

    /// Refresh every stale ticker of the latest ticker list
    pub async fn update_stock_data(&self, now: DateTime<Local>, max_days: i64) -> Result<DownloadReport> {
        let symbols = self.layout.load_latest_tickers()?;
        let stale = stale_tickers(self.layout, &symbols, now, max_days)?;
        tracing::info!(
            "{} of {} tickers are missing or older than {} days",
            stale.len(),
            symbols.len(),
            max_days
        );
        Ok(self.download_stock_data(&stale).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{read_history_csv, save_list};
    use crate::error::StockPullError;
    use crate::net::testing::ScriptedTransport;
    use chrono::NaiveDate;
    use filetime::FileTime;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    const CHART: &str = r#"{"chart":{"result":[{"meta":{"gmtoffset":-18000},
        "timestamp":[1704205800,1704292200],
        "indicators":{"quote":[{"open":[187.15,184.22],"high":[188.44,185.88],"low":[183.89,183.43],
        "close":[185.64,184.25],"volume":[82488700,58414500]}]}}],"error":null}}"#;

    fn setup() -> (TempDir, DataLayout) {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path());
        layout.create_folders().unwrap();
        (tmp, layout)
    }

    fn age(path: &std::path::Path, days: u64) {
        let then = SystemTime::now() - Duration::from_secs(days * 86_400 + 60);
        filetime::set_file_mtime(path, FileTime::from_system_time(then)).unwrap();
    }

    #[test]
    fn test_stale_tickers() {
        let (_tmp, layout) = setup();
        for symbol in ["OLD", "EDGE", "NEW"] {
            std::fs::write(layout.raw_path(symbol), "Date,Close\n").unwrap();
        }
        age(&layout.raw_path("OLD"), 8);
        age(&layout.raw_path("EDGE"), 7);

        let stale = stale_tickers(&layout, &["OLD", "EDGE", "NEW", "MISSING"], Local::now(), 7).unwrap();

        assert_eq!(stale, vec!["OLD", "MISSING"]);
    }

    #[tokio::test]
    async fn test_concurrent_workers_share_pacing() {
        let (_tmp, layout) = setup();
        let symbols = ["AAA", "BBB", "CCC", "DDD", "EEE"];
        let transport = symbols
            .iter()
            .fold(ScriptedTransport::new(), |t, _| t.ok(200, CHART));
        let proxies = ProxyPool::default();
        let progress = ProgressReporter::disabled();
        let interval = Duration::from_millis(40);
        let downloader = Downloader::new(
            &transport,
            &proxies,
            RequestPacer::new(interval),
            &layout,
            DownloadOptions {
                failure_limit: 1,
                jobs: 3,
            },
            &progress,
        );

        let start = std::time::Instant::now();
        let report = downloader.download_stock_data(&symbols).await;
        let elapsed = start.elapsed();

        assert!(report.is_complete());
        let mut succeeded = report.succeeded.clone();
        succeeded.sort();
        assert_eq!(succeeded, symbols);
        assert_eq!(transport.request_count(), symbols.len());
        for symbol in symbols {
            assert!(layout.raw_path(symbol).exists());
        }
        // Five request starts need four gaps even with three workers
        assert!(elapsed >= interval * 4 - Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let (_tmp, layout) = setup();
        let transport = ScriptedTransport::new().fail().ok(503, "").ok(200, CHART);
        let proxies = ProxyPool::default();
        let progress = ProgressReporter::disabled();
        let downloader = Downloader::new(
            &transport,
            &proxies,
            RequestPacer::unpaced(),
            &layout,
            DownloadOptions {
                failure_limit: 3,
                jobs: 1,
            },
            &progress,
        );

        let report = downloader.download_stock_data(&["AAPL"]).await;

        assert!(report.is_complete());
        assert_eq!(report.succeeded, vec!["AAPL"]);
        assert!(report.bytes > 0);
        assert_eq!(transport.request_count(), 3);

        let bars = read_history_csv(&layout.raw_path("AAPL")).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    }

    #[tokio::test]
    async fn test_failed_ticker_does_not_stop_run() {
        let (_tmp, layout) = setup();
        let transport = ScriptedTransport::new().fail().fail().ok(200, CHART);
        let proxies = ProxyPool::default();
        let progress = ProgressReporter::disabled();
        let downloader = Downloader::new(
            &transport,
            &proxies,
            RequestPacer::unpaced(),
            &layout,
            DownloadOptions {
                failure_limit: 2,
                jobs: 1,
            },
            &progress,
        );

        let report = downloader.download_stock_data(&["DEAD", "MSFT"]).await;

        assert!(!report.is_complete());
        assert_eq!(report.attempted(), 2);
        assert_eq!(report.failed[0].0, "DEAD");
        assert_eq!(report.succeeded, vec!["MSFT"]);
        assert!(!layout.raw_path("DEAD").exists());
        assert_eq!(progress.summary().failed, 1);
    }

    #[tokio::test]
    async fn test_update_only_fetches_stale() {
        let (_tmp, layout) = setup();
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        save_list(&layout.ticker_list_path(date), &["AAPL", "MSFT"]).unwrap();
        std::fs::write(layout.raw_path("MSFT"), "Date,Close\n").unwrap();

        let transport = ScriptedTransport::new().ok(200, CHART);
        let proxies = ProxyPool::default();
        let progress = ProgressReporter::disabled();
        let downloader = Downloader::new(
            &transport,
            &proxies,
            RequestPacer::unpaced(),
            &layout,
            DownloadOptions::default(),
            &progress,
        );

        let report = downloader.update_stock_data(Local::now(), 7).await.unwrap();

        assert_eq!(report.succeeded, vec!["AAPL"]);
        assert_eq!(transport.request_count(), 1);
        assert!(transport.requests.lock().unwrap()[0].url.ends_with("/AAPL"));
    }

    #[tokio::test]
    async fn test_update_without_list_is_an_error() {
        let (_tmp, layout) = setup();
        let transport = ScriptedTransport::new();
        let proxies = ProxyPool::default();
        let progress = ProgressReporter::disabled();
        let downloader = Downloader::new(
            &transport,
            &proxies,
            RequestPacer::unpaced(),
            &layout,
            DownloadOptions::default(),
            &progress,
        );

        assert!(matches!(
            downloader.update_stock_data(Local::now(), 7).await,
            Err(StockPullError::NoTickerList(_))
        ));
    }
}
