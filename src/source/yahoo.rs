//! Yahoo Finance daily history
//!
//! Decodes the v8 chart API into [`PriceBar`]s. Prices are split- and
//! dividend-adjusted by default, so `Close` is the adjusted close and
//! open/high/low are scaled by the same factor.

use crate::data::PriceBar;
use crate::error::{Result, StockPullError};
use crate::net::{HttpRequest, Proxy, Transport};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Deserialize;
use std::collections::HashMap;

/// Chart API base URL
pub const CHART_BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    #[serde(default)]
    events: ChartEvents,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    gmtoffset: i32,
}

#[derive(Debug, Default, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: HashMap<String, DividendEvent>,
    #[serde(default)]
    splits: HashMap<String, SplitEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct SplitEvent {
    date: i64,
    numerator: f64,
    denominator: f64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

fn local_date(ts: i64, offset: FixedOffset) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.with_timezone(&offset).date_naive())
}

fn at(values: &[Option<f64>], i: usize) -> Option<f64> {
    values.get(i).copied().flatten().filter(|v| v.is_finite())
}

/// Decode a chart API response body into daily bars, oldest first
pub fn parse_chart(symbol: &str, body: &str, adjust: bool) -> Result<Vec<PriceBar>> {
    let envelope: ChartEnvelope = serde_json::from_str(body)
        .map_err(|e| StockPullError::parse(format!("chart for {}", symbol), e))?;

    if let Some(err) = envelope.chart.error {
        return Err(StockPullError::NoData(format!(
            "{}: {} ({})",
            symbol, err.description, err.code
        )));
    }
    let result = envelope
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .ok_or_else(|| StockPullError::NoData(format!("{}: empty chart result", symbol)))?;

    let offset = FixedOffset::east_opt(result.meta.gmtoffset)
        .ok_or_else(|| StockPullError::parse("gmtoffset", result.meta.gmtoffset))?;

    let dividends: HashMap<NaiveDate, f64> = result
        .events
        .dividends
        .values()
        .filter_map(|d| local_date(d.date, offset).map(|day| (day, d.amount)))
        .collect();
    let splits: HashMap<NaiveDate, f64> = result
        .events
        .splits
        .values()
        .filter(|s| s.denominator != 0.0)
        .filter_map(|s| local_date(s.date, offset).map(|day| (day, s.numerator / s.denominator)))
        .collect();

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adjclose = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|a| a.adjclose)
        .unwrap_or_default();

    let mut bars = Vec::with_capacity(result.timestamp.len());
    for (i, &ts) in result.timestamp.iter().enumerate() {
        let Some(close) = at(&quote.close, i) else {
            continue;
        };
        let Some(day) = local_date(ts, offset) else {
            continue;
        };
        let Some(timestamp) = day
            .and_hms_opt(0, 0, 0)
            .and_then(|midnight| midnight.and_local_timezone(offset).single())
        else {
            continue;
        };

        let factor = match at(&adjclose, i) {
            Some(adj) if adjust && close != 0.0 => adj / close,
            _ => 1.0,
        };

        bars.push(PriceBar {
            timestamp,
            open: at(&quote.open, i).map(|v| v * factor),
            high: at(&quote.high, i).map(|v| v * factor),
            low: at(&quote.low, i).map(|v| v * factor),
            close: close * factor,
            volume: quote.volume.get(i).copied().flatten(),
            dividends: dividends.get(&day).copied().unwrap_or(0.0),
            stock_splits: splits.get(&day).copied().unwrap_or(0.0),
        });
    }

    // The live session can repeat the last date
    bars.dedup_by(|later, earlier| later.date() == earlier.date());
    Ok(bars)
}

/// Downloads full daily histories
pub struct HistoryClient<'a> {
    transport: &'a dyn Transport,
    adjust: bool,
}

impl<'a> HistoryClient<'a> {
    /// Create a client returning adjusted prices
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self {
            transport,
            adjust: true,
        }
    }

    /// Return raw instead of adjusted prices
    pub fn unadjusted(mut self) -> Self {
        self.adjust = false;
        self
    }

    /// Full daily history of `symbol`
    pub async fn history(&self, symbol: &str, proxy: Option<Proxy>) -> Result<Vec<PriceBar>> {
        let url = format!("{}/{}", CHART_BASE_URL, symbol);
        let request = HttpRequest::get(&url)
            .query("range", "max")
            .query("interval", "1d")
            .query("events", "div,splits")
            .query("includeAdjustedClose", "true")
            .with_browser_headers()
            .via(proxy);

        let response = self.transport.get(request).await?;
        // 404 bodies still carry the chart error payload
        let response = if response.status == 404 {
            response
        } else {
            response.error_for_status(&url)?
        };
        let bars = parse_chart(symbol, &response.body, self.adjust)?;
        if bars.is_empty() {
            return Err(StockPullError::NoData(format!("{}: no price rows", symbol)));
        }
        Ok(bars)
    }
}
