//! HTTP transport
//!
//! Every outbound request goes through the [`Transport`] trait so the
//! collectors can be driven by a canned transport in tests. The reqwest
//! implementation keeps one client per proxy to reuse connections.

use crate::error::{Result, StockPullError};
use crate::net::Proxy;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Desktop browser identity sent with scraping requests
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

/// An outbound GET request
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Route through this proxy; `None` connects directly
    pub proxy: Option<Proxy>,
}

impl HttpRequest {
    /// GET `url` with no query, headers or proxy
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Append a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Append a header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Route through a proxy
    pub fn via(mut self, proxy: Option<Proxy>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Headers of a browser page load on finance.yahoo.com
    pub fn with_browser_headers(self) -> Self {
        self.header("Accept", "*/*")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Origin", "https://finance.yahoo.com")
            .header("Referer", "https://finance.yahoo.com/")
            .header("Sec-Fetch-Dest", "empty")
            .header("Sec-Fetch-Mode", "cors")
            .header("Sec-Fetch-Site", "same-site")
    }
}

/// A completed response; non-2xx statuses are not errors at this layer
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx status into an error
    pub fn error_for_status(self, url: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(StockPullError::Status {
                url: url.to_string(),
                status: self.status,
            })
        }
    }
}

/// Something that can perform GET requests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the request. Errors mean no response was received.
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    timeout: Duration,
    direct: reqwest::Client,
    proxied: Mutex<HashMap<String, reqwest::Client>>,
}

impl HttpTransport {
    /// Create a transport with a per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            timeout,
            direct: Self::build_client(timeout, None)?,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    fn build_client(timeout: Duration, proxy: Option<&Proxy>) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT);

        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy.url())
                .map_err(|e| StockPullError::config(format!("Invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| StockPullError::config(format!("Failed to build HTTP client: {}", e)))
    }

    fn client_for(&self, proxy: Option<&Proxy>) -> Result<reqwest::Client> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut cache = self
            .proxied
            .lock()
            .map_err(|_| StockPullError::config("HTTP client cache poisoned"))?;
        if let Some(client) = cache.get(proxy.url()) {
            return Ok(client.clone());
        }
        let client = Self::build_client(self.timeout, Some(proxy))?;
        cache.insert(proxy.url().to_string(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse> {
        let client = self.client_for(request.proxy.as_ref())?;

        let mut builder = client.get(&request.url).query(&request.query);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                StockPullError::Timeout(self.timeout.as_secs())
            } else {
                StockPullError::http(&request.url, e)
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| StockPullError::http(&request.url, e))?;

        tracing::trace!("GET {} -> {} ({} bytes)", request.url, status, body.len());
        Ok(HttpResponse { status, body })
    }
}
