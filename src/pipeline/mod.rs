//! Collection pipeline
//!
//! Wires the sources, the proxy pool and the data layout into the stages
//! of a run:
//! 1. Create the data folders
//! 2. Load the proxy list and drop proxies that do not respond
//! 3. Screen for liquid U.S. stocks and save today's ticker list
//! 4. Refresh every ticker whose raw history is missing or stale

mod clean;
mod update;

pub use clean::{clean_stock_data, monthly_panel, CleanReport, MonthlyRow};
pub use update::{stale_tickers, DownloadOptions, DownloadReport, Downloader};

use crate::config::PullConfig;
use crate::data::DataLayout;
use crate::error::{Result, StockPullError};
use crate::net::{ProxyPool, RequestPacer, Transport};
use crate::progress::ProgressReporter;
use crate::source::{ScreenerClient, ScreenerConfig};
use chrono::{DateTime, Local};

/// Outcome of a full run
#[derive(Debug, Clone)]
pub struct PullReport {
    /// Proxies left after pruning (0 means direct connections)
    pub proxies: usize,
    /// Symbols in today's ticker list
    pub screened: usize,
    /// Refresh of stale tickers
    pub download: DownloadReport,
}

/// Stages of a collection run sharing one config and transport
pub struct Pipeline<'a> {
    config: &'a PullConfig,
    transport: &'a dyn Transport,
    layout: DataLayout,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline over the configured data directory
    pub fn new(config: &'a PullConfig, transport: &'a dyn Transport) -> Self {
        Self {
            config,
            transport,
            layout: DataLayout::new(&config.data_dir),
        }
    }

    /// Data directory layout
    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Load the proxy list and, if `prune` is set, drop unresponsive proxies.
    ///
    /// A missing list means direct connections. A list with no usable
    /// entries, or whose proxies all fail the health check, is an error.
    pub async fn load_proxies(&self, prune: bool) -> Result<ProxyPool> {
        let mut pool = ProxyPool::from_file_or_direct(&self.config.proxy_list)?;
        if pool.is_empty() && self.config.proxy_list.exists() {
            tracing::error!("Proxy list {:?} holds no usable proxies", self.config.proxy_list);
            return Err(StockPullError::EmptyProxyPool);
        }
        if prune && !pool.is_empty() {
            let pacer = RequestPacer::new(self.config.proxy_check_sleep);
            pool.remove_bad_proxies(self.transport, &pacer).await;
            if pool.is_empty() {
                return Err(StockPullError::EmptyProxyPool);
            }
        }
        Ok(pool)
    }

    /// Screen for liquid stocks and save the list dated `now`
    pub async fn screen(&self, proxies: &ProxyPool, now: DateTime<Local>, page_size: u32) -> Result<Vec<String>> {
        let client = ScreenerClient::new(
            self.transport,
            proxies,
            RequestPacer::new(self.config.screen_sleep),
            ScreenerConfig {
                screener_id: self.config.screener_id.clone(),
                count: page_size,
                failure_limit: self.config.failure_limit,
            },
        );
        client.get_liquid_us_stocks(&self.layout, now.date_naive()).await
    }

    /// History downloader using the configured attempts, pacing and concurrency
    pub fn downloader<'p>(&'p self, proxies: &'p ProxyPool, progress: &'p ProgressReporter) -> Downloader<'p> {
        Downloader::new(
            self.transport,
            proxies,
            RequestPacer::new(self.config.download_sleep),
            &self.layout,
            DownloadOptions {
                failure_limit: self.config.failure_limit,
                jobs: self.config.jobs,
            },
            progress,
        )
    }

    /// Full run: folders, proxies, screener, refresh of stale tickers
    pub async fn pull(&self, now: DateTime<Local>, progress: &ProgressReporter) -> Result<PullReport> {
        self.layout.create_folders()?;

        progress.set_status("Checking proxies");
        let proxies = self.load_proxies(true).await?;

        progress.set_status("Screening for liquid U.S. stocks");
        let symbols = self.screen(&proxies, now, self.config.page_size).await?;

        let download = self
            .downloader(&proxies, progress)
            .update_stock_data(now, self.config.max_days_since_update)
            .await?;

        Ok(PullReport {
            proxies: proxies.len(),
            screened: symbols.len(),
            download,
        })
    }
}
