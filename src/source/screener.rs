//! Yahoo Finance equity screener
//!
//! The screener is paged through with `offset`/`count` until it stops
//! returning rows. Individual pages fail often (blocked proxies, empty
//! tables under load), so the walk only ends after `failure_limit`
//! consecutive failed pages; any good page resets the count.

use crate::data::{save_list, DataLayout};
use crate::error::{Result, StockPullError};
use crate::net::{HttpRequest, ProxyPool, RequestPacer, Transport};
use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;

/// Base URL of saved screeners
pub const SCREENER_BASE_URL: &str = "https://finance.yahoo.com/screener";

/// Screener walk settings
#[derive(Debug, Clone)]
pub struct ScreenerConfig {
    /// Saved screener identifier
    pub screener_id: String,
    /// Rows requested per page
    pub count: u32,
    /// Consecutive failed pages before stopping
    pub failure_limit: u32,
}

/// Outcome of a single page request
#[derive(Debug, Clone, PartialEq, Eq)]
enum PageOutcome {
    Rows(Vec<String>),
    Failed(String),
}

/// Pages through a screener and collects ticker symbols
pub struct ScreenerClient<'a> {
    transport: &'a dyn Transport,
    proxies: &'a ProxyPool,
    pacer: RequestPacer,
    config: ScreenerConfig,
}

impl<'a> ScreenerClient<'a> {
    /// Create a client
    pub fn new(
        transport: &'a dyn Transport,
        proxies: &'a ProxyPool,
        pacer: RequestPacer,
        config: ScreenerConfig,
    ) -> Self {
        Self {
            transport,
            proxies,
            pacer,
            config,
        }
    }

    fn page_url(&self) -> String {
        format!("{}/{}", SCREENER_BASE_URL, self.config.screener_id)
    }

    async fn fetch_page(&self, offset: u64) -> PageOutcome {
        let url = self.page_url();
        let request = HttpRequest::get(&url)
            .query("offset", offset)
            .query("count", self.config.count)
            .with_browser_headers()
            .via(self.proxies.random_proxy());

        let response = match self.transport.get(request).await {
            Ok(response) => response,
            Err(e) => return PageOutcome::Failed(e.to_string()),
        };
        if response.status != 200 {
            return PageOutcome::Failed(format!("HTTP {}", response.status));
        }
        match parse_symbols(&response.body) {
            Some(symbols) if !symbols.is_empty() => PageOutcome::Rows(symbols),
            Some(_) => PageOutcome::Failed("empty table".to_string()),
            None => PageOutcome::Failed("no screener table".to_string()),
        }
    }

    /// Walk the screener and return the unique symbols, sorted
    pub async fn collect_symbols(&self) -> Result<Vec<String>> {
        if self.config.count == 0 {
            return Err(StockPullError::config("screener page size must be at least 1"));
        }
        let mut offset: u64 = 0;
        let mut failures: u32 = 0;
        let mut pages = 0usize;
        let mut symbols = BTreeSet::new();

        while failures < self.config.failure_limit {
            self.pacer.wait().await;
            match self.fetch_page(offset).await {
                PageOutcome::Rows(rows) => {
                    tracing::debug!("Screener offset {}: {} rows", offset, rows.len());
                    symbols.extend(rows);
                    offset += u64::from(self.config.count);
                    failures = 0;
                    pages += 1;
                }
                PageOutcome::Failed(reason) => {
                    failures += 1;
                    tracing::debug!(
                        "Screener offset {} failed ({}/{}): {}",
                        offset,
                        failures,
                        self.config.failure_limit,
                        reason
                    );
                }
            }
        }

        if pages == 0 {
            return Err(StockPullError::NoData(format!(
                "screener {} returned no rows",
                self.config.screener_id
            )));
        }

        tracing::info!("Screener returned {} symbols over {} pages", symbols.len(), pages);
        Ok(symbols.into_iter().collect())
    }

    /// Collect symbols and save them as the ticker list for `date`
    pub async fn get_liquid_us_stocks(
        &self,
        layout: &DataLayout,
        date: NaiveDate,
    ) -> Result<Vec<String>> {
        let symbols = self.collect_symbols().await?;
        let path = layout.ticker_list_path(date);
        save_list(&path, &symbols)?;
        tracing::info!("Saved ticker list to {:?}", path);
        Ok(symbols)
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Symbols from the `Symbol` column of the first table on the page.
///
/// Returns `None` when the page has no table or the table has no
/// `Symbol` column.
pub fn parse_symbols(html: &str) -> Option<Vec<String>> {
    let document = Html::parse_document(html);
    let table_sel = Selector::parse("table").ok()?;
    let row_sel = Selector::parse("tr").ok()?;
    let header_sel = Selector::parse("th").ok()?;
    let cell_sel = Selector::parse("td").ok()?;

    let table = document.select(&table_sel).next()?;

    let column = table
        .select(&row_sel)
        .find_map(|row| {
            let headers: Vec<String> = row.select(&header_sel).map(cell_text).collect();
            if headers.is_empty() {
                None
            } else {
                Some(headers)
            }
        })?
        .iter()
        .position(|h| h == "Symbol")?;

    let symbols = table
        .select(&row_sel)
        .filter_map(|row| row.select(&cell_sel).nth(column).map(cell_text))
        .filter(|symbol| !symbol.is_empty())
        .collect();

    Some(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::testing::ScriptedTransport;
    use tempfile::TempDir;

    fn page(symbols: &[&str]) -> String {
        let rows: String = symbols
            .iter()
            .map(|s| format!("<tr><td><a href=\"/quote/{s}\">{s}</a></td><td>{s} Inc.</td><td>10.00</td></tr>"))
            .collect();
        format!(
            "<html><body><table><thead><tr><th>Symbol</th><th>Name</th><th>Price (Intraday)</th></tr></thead>\
             <tbody>{}</tbody></table></body></html>",
            rows
        )
    }

    fn config(limit: u32) -> ScreenerConfig {
        ScreenerConfig {
            screener_id: "abc".to_string(),
            count: 2,
            failure_limit: limit,
        }
    }

    #[test]
    fn test_parse_symbols() {
        assert_eq!(parse_symbols(&page(&["MSFT", "AAPL"])).unwrap(), vec!["MSFT", "AAPL"]);
        assert_eq!(parse_symbols(&page(&[])).unwrap(), Vec::<String>::new());
        assert!(parse_symbols("<html><body>blocked</body></html>").is_none());
        assert!(parse_symbols("<table><tr><th>Name</th></tr><tr><td>x</td></tr></table>").is_none());
    }

    #[tokio::test]
    async fn test_failures_reset_after_good_page() {
        // fail, rows, fail, fail, rows, then three failures end the walk
        let transport = ScriptedTransport::new()
            .fail()
            .ok(200, page(&["MSFT", "AAPL"]))
            .ok(503, "busy")
            .ok(200, page(&[]))
            .ok(200, page(&["IBM", "AAPL"]))
            .fail()
            .ok(404, "")
            .ok(200, "<html></html>");
        let proxies = ProxyPool::default();
        let client = ScreenerClient::new(&transport, &proxies, RequestPacer::unpaced(), config(3));

        let symbols = client.collect_symbols().await.unwrap();

        assert_eq!(symbols, vec!["AAPL", "IBM", "MSFT"]);
        assert_eq!(transport.request_count(), 8);

        let offsets: Vec<String> = transport
            .requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.query[0].1.clone())
            .collect();
        assert_eq!(offsets, vec!["0", "0", "2", "2", "2", "4", "4", "4"]);
    }

    #[tokio::test]
    async fn test_zero_page_size_is_rejected() {
        let transport = ScriptedTransport::new();
        let proxies = ProxyPool::default();
        let client = ScreenerClient::new(
            &transport,
            &proxies,
            RequestPacer::unpaced(),
            ScreenerConfig {
                count: 0,
                ..config(3)
            },
        );

        assert!(matches!(
            client.collect_symbols().await,
            Err(StockPullError::ConfigError(_))
        ));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_no_pages_is_an_error() {
        let transport = ScriptedTransport::new().fail().fail();
        let proxies = ProxyPool::default();
        let client = ScreenerClient::new(&transport, &proxies, RequestPacer::unpaced(), config(2));

        assert!(matches!(
            client.collect_symbols().await,
            Err(StockPullError::NoData(_))
        ));
    }

    #[tokio::test]
    async fn test_get_liquid_us_stocks_saves_list() {
        let tmp = TempDir::new().unwrap();
        let layout = DataLayout::new(tmp.path());
        layout.create_folders().unwrap();

        let transport = ScriptedTransport::new().ok(200, page(&["TSLA", "AMD"]));
        let proxies = ProxyPool::default();
        let client = ScreenerClient::new(&transport, &proxies, RequestPacer::unpaced(), config(1));
        let date = NaiveDate::from_ymd_opt(2023, 8, 12).unwrap();

        let symbols = client.get_liquid_us_stocks(&layout, date).await.unwrap();

        assert_eq!(symbols, vec!["AMD", "TSLA"]);
        let saved = std::fs::read_to_string(layout.ticker_list_path(date)).unwrap();
        assert_eq!(saved, "AMD\nTSLA\n");
    }
}
