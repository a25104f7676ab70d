//! Daily price bars and their raw CSV form

use crate::error::{IoResultExt, Result, StockPullError};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Timestamp format of the `Date` column, exchange-local with offset
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// One trading day
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    /// Session start in exchange-local time
    pub timestamp: DateTime<FixedOffset>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<u64>,
    /// Cash dividend paid on this day
    pub dividends: f64,
    /// Split ratio effective on this day (0 when none)
    pub stock_splits: f64,
}

impl PriceBar {
    /// Exchange-local calendar date
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

#[derive(Debug, Deserialize)]
struct RawRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: Option<f64>,
    #[serde(rename = "High")]
    high: Option<f64>,
    #[serde(rename = "Low")]
    low: Option<f64>,
    #[serde(rename = "Close")]
    close: Option<f64>,
    #[serde(rename = "Volume")]
    volume: Option<f64>,
    #[serde(rename = "Dividends", default)]
    dividends: Option<f64>,
    #[serde(rename = "Stock Splits", default)]
    stock_splits: Option<f64>,
}

#[derive(Debug, Serialize)]
struct RawRowOut {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Open")]
    open: Option<f64>,
    #[serde(rename = "High")]
    high: Option<f64>,
    #[serde(rename = "Low")]
    low: Option<f64>,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: Option<u64>,
    #[serde(rename = "Dividends")]
    dividends: f64,
    #[serde(rename = "Stock Splits")]
    stock_splits: f64,
}

/// Write bars as `Date,Open,High,Low,Close,Volume,Dividends,Stock Splits`.
///
/// Returns the number of bytes written.
pub fn write_history_csv(path: &Path, bars: &[PriceBar]) -> Result<u64> {
    let tmp = path.with_extension("csv.part");
    {
        let mut writer = csv::Writer::from_path(&tmp).map_err(|e| StockPullError::csv(&tmp, e))?;
        for bar in bars {
            writer
                .serialize(RawRowOut {
                    date: bar.timestamp.format(DATE_FORMAT).to_string(),
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume,
                    dividends: bar.dividends,
                    stock_splits: bar.stock_splits,
                })
                .map_err(|e| StockPullError::csv(&tmp, e))?;
        }
        writer.flush().with_path(&tmp)?;
    }
    // Rename so a killed job never leaves a truncated file with a fresh mtime
    std::fs::rename(&tmp, path).with_path(path)?;
    Ok(std::fs::metadata(path).with_path(path)?.len())
}

/// Read a raw history CSV. Rows without a close are skipped.
pub fn read_history_csv(path: &Path) -> Result<Vec<PriceBar>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| StockPullError::csv(path, e))?;
    let mut bars = Vec::new();

    for row in reader.deserialize::<RawRow>() {
        let row = row.map_err(|e| StockPullError::csv(path, e))?;
        let Some(close) = row.close else {
            continue;
        };
        bars.push(PriceBar {
            timestamp: parse_timestamp(&row.date)?,
            open: row.open,
            high: row.high,
            low: row.low,
            close,
            volume: row.volume.map(|v| v.round() as u64),
            dividends: row.dividends.unwrap_or(0.0),
            stock_splits: row.stock_splits.unwrap_or(0.0),
        });
    }

    Ok(bars)
}

/// Parse a `Date` cell. Bare dates are taken as midnight UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_str(value, DATE_FORMAT) {
        return Ok(ts);
    }
    let day = value.split(' ').next().unwrap_or(value);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().fixed_offset())
        .ok_or_else(|| StockPullError::parse("date", format!("unrecognised value '{}'", value)))
}
