//! Monthly panel consolidation
//!
//! Raw daily histories are collapsed to one row per calendar month (last
//! price and last volume of the month), the still-open final month is
//! dropped, and monthly log returns are attached. All tickers of the
//! latest list go into a single CSV.

use crate::data::{read_history_csv, DataLayout, PriceBar};
use crate::error::{IoResultExt, Result, StockPullError};
use crate::progress::ProgressReporter;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::path::PathBuf;

/// One ticker-month of the clean panel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRow {
    #[serde(rename = "Symbol")]
    pub symbol: String,
    /// `YYYY-MM`
    #[serde(rename = "Period")]
    pub period: String,
    /// Last calendar day of the month
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    /// Last close of the month; empty for months without trading
    #[serde(rename = "Price")]
    pub price: Option<f64>,
    #[serde(rename = "Volume")]
    pub volume: Option<u64>,
    #[serde(rename = "Monthly Log Return")]
    pub monthly_log_return: Option<f64>,
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let (year, month) = next_month(year, month);
    NaiveDate::from_ymd_opt(year, month, 1).and_then(|d| d.pred_opt())
}

/// Collapse daily bars into the monthly rows of one ticker.
///
/// Bars must be in date order. Months between the first and last bar
/// that have no trading days are kept with an empty price. The final
/// month is omitted.
pub fn monthly_panel(symbol: &str, bars: &[PriceBar]) -> Vec<MonthlyRow> {
    let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
        return Vec::new();
    };
    let start = (first.date().year(), first.date().month());
    let end = (last.date().year(), last.date().month());

    // ((year, month), last close, last volume)
    let mut months: Vec<((i32, u32), Option<f64>, Option<u64>)> = Vec::new();
    let mut cursor = start;
    let mut bars = bars.iter().peekable();
    while cursor < end {
        let mut price = None;
        let mut volume = None;
        while let Some(bar) = bars.peek() {
            let key = (bar.date().year(), bar.date().month());
            if key != cursor {
                break;
            }
            price = Some(bar.close);
            volume = bar.volume.or(volume);
            bars.next();
        }
        months.push((cursor, price, volume));
        cursor = next_month(cursor.0, cursor.1);
    }

    let mut rows = Vec::with_capacity(months.len());
    let mut previous: Option<f64> = None;
    for ((year, month), price, volume) in months {
        let Some(date) = month_end(year, month) else {
            continue;
        };
        let monthly_log_return = match (previous, price) {
            (Some(p0), Some(p1)) if p0 > 0.0 && p1 > 0.0 => Some((p1 / p0).ln()),
            _ => None,
        };
        previous = price;
        rows.push(MonthlyRow {
            symbol: symbol.to_string(),
            period: format!("{:04}-{:02}", year, month),
            date,
            price,
            volume,
            monthly_log_return,
        });
    }
    rows
}

/// Result of a clean pass
#[derive(Debug, Clone)]
pub struct CleanReport {
    /// Output CSV
    pub path: PathBuf,
    /// Tickers with a raw file
    pub tickers: usize,
    /// Tickers in the list without a raw file
    pub missing: usize,
    /// Rows written
    pub rows: usize,
}

/// Build the monthly panel of the latest ticker list and write it for `date`
pub fn clean_stock_data(
    layout: &DataLayout,
    date: NaiveDate,
    progress: &ProgressReporter,
) -> Result<CleanReport> {
    let symbols = layout.load_latest_tickers()?;
    let total = symbols.len();
    progress.set_total(total as u64);

    let path = layout.clean_path(date);
    std::fs::create_dir_all(layout.clean_dir()).with_path(layout.clean_dir())?;
    let mut writer = csv::Writer::from_path(&path).map_err(|e| StockPullError::csv(&path, e))?;

    let mut report = CleanReport {
        path: path.clone(),
        tickers: 0,
        missing: 0,
        rows: 0,
    };

    for (i, symbol) in symbols.iter().enumerate() {
        tracing::info!("{} / {} - {}", i + 1, total, symbol);
        progress.set_current(symbol);

        let raw = layout.raw_path(symbol);
        if !raw.exists() {
            report.missing += 1;
            progress.record_failure();
            continue;
        }

        let bars = read_history_csv(&raw)
            .map_err(|e| e.with_context(format!("reading history of {}", symbol)))?;
        for row in monthly_panel(symbol, &bars) {
            writer
                .serialize(&row)
                .map_err(|e| StockPullError::csv(&path, e))?;
            report.rows += 1;
        }
        report.tickers += 1;
        progress.record_success(0);
    }
    writer.flush().with_path(&path)?;

    if report.tickers == 0 {
        std::fs::remove_file(&path).with_path(&path)?;
        return Err(StockPullError::NoData(
            "no raw histories for the latest ticker list".to_string(),
        ));
    }
    if report.missing > 0 {
        tracing::warn!("{} tickers have no raw history yet", report.missing);
    }
    tracing::info!("Wrote {} rows for {} tickers to {:?}", report.rows, report.tickers, path);
    Ok(report)
}
