//! # StockPull - Daily Price Collector for Liquid U.S. Equities
//!
//! StockPull maintains a flat-file dataset of daily price histories for
//! NYSE/NASDAQ stocks with an average volume above one million shares and
//! a price above $10. It is built to run unattended as a Slurm batch job.
//!
//! ## Features
//!
//! - **Screener Walk**: Pages through a saved Yahoo Finance screener and
//!   saves a dated, de-duplicated ticker list
//! - **Proxy Rotation**: Webshare proxy lists, pruned by a health check,
//!   with a random proxy per request
//! - **Incremental Refresh**: Only tickers whose raw file is missing or
//!   older than a week are downloaded again
//! - **Polite Pacing**: One shared rate limiter across concurrent workers
//! - **Monthly Panel**: Month-end prices, volumes and log returns in one CSV
//! - **Risk-Free Rate**: 1-year Treasury yield from FRED, gaps interpolated
//! - **Slurm Jobs**: Render, submit and inspect the batch jobs
//!
//! ## Quick Start
//!
//! ```no_run
//! use stockpull::config::PullConfig;
//! use stockpull::net::HttpTransport;
//! use stockpull::pipeline::Pipeline;
//! use stockpull::progress::ProgressReporter;
//!
//! # async fn run() -> stockpull::Result<()> {
//! let config = PullConfig::default();
//! let transport = HttpTransport::new(config.request_timeout)?;
//! let pipeline = Pipeline::new(&config, &transport);
//!
//! let report = pipeline
//!     .pull(chrono::Local::now(), &ProgressReporter::new())
//!     .await?;
//! println!("{} tickers screened, {} refreshed", report.screened, report.download.succeeded.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Monthly Panel
//!
//! ```no_run
//! use stockpull::data::DataLayout;
//! use stockpull::pipeline::clean_stock_data;
//! use stockpull::progress::ProgressReporter;
//!
//! let layout = DataLayout::new("data");
//! let today = chrono::Local::now().date_naive();
//! let report = clean_stock_data(&layout, today, &ProgressReporter::disabled()).unwrap();
//! println!("{} rows written to {:?}", report.rows, report.path);
//! ```
//!
//! ## Job Scripts
//!
//! ```
//! use stockpull::system::JobProfile;
//!
//! let script = JobProfile::long().render();
//! assert!(script.contains("#SBATCH --time=2-00:00:00"));
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod data;
pub mod error;
pub mod net;
pub mod pipeline;
pub mod progress;
pub mod source;
pub mod system;

// Re-export commonly used types
pub use config::PullConfig;
pub use error::{Result, StockPullError};
pub use pipeline::{DownloadReport, Pipeline};
pub use progress::ProgressReporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use stockpull::prelude::*;
    //! ```

    pub use crate::config::PullConfig;
    pub use crate::data::{DataLayout, PriceBar};
    pub use crate::error::{Result, StockPullError};
    pub use crate::net::{HttpTransport, ProxyPool, RequestPacer, Transport};
    pub use crate::pipeline::{clean_stock_data, DownloadReport, Downloader, Pipeline};
    pub use crate::progress::ProgressReporter;
    pub use crate::source::{risk_free_rate, HistoryClient, ScreenerClient};
    pub use crate::system::{JobProfile, SlurmJob};
}
