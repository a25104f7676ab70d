//! Remote data sources
//!
//! - [`screener`]: saved Yahoo Finance screener pages (HTML)
//! - [`yahoo`]: daily price history from the chart API (JSON)
//! - [`fred`]: 1-year Treasury yield from FRED (JSON)

pub mod fred;
pub mod screener;
pub mod yahoo;

pub use fred::{risk_free_rate, write_risk_free_csv, RiskFreePoint};
pub use screener::{parse_symbols, ScreenerClient, ScreenerConfig};
pub use yahoo::HistoryClient;
