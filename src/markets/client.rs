// src/markets/client.rs
use crate::edinet::client::classify_status;
use crate::markets::models::{DailyQuote, MinkabuQuote, NikkeiQuote};
use crate::resilience::UpstreamRegistry;
use crate::utils::clock::Clock;
use crate::utils::error::{AppError, ClientError};
use std::sync::Arc;
use std::time::Duration;

const NIKKEI: &str = "nikkei";
const MINKABU: &str = "minkabu";
const YAHOO_FINANCE: &str = "yahoo-finance";

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0 Safari/537.36";

/// Per-host base URLs for the stock-price pages.
#[derive(Debug, Clone)]
pub struct MarketEndpoints {
    pub nikkei_base: String,
    pub minkabu_base: String,
    pub yahoo_base: String,
    /// History pages fetched per company, newest first.
    pub yahoo_pages: u32,
}

impl Default for MarketEndpoints {
    fn default() -> Self {
        Self {
            nikkei_base: "https://www.nikkei.com".to_string(),
            minkabu_base: "https://minkabu.jp".to_string(),
            yahoo_base: "https://finance.yahoo.co.jp".to_string(),
            yahoo_pages: 13,
        }
    }
}

/// Scraping client for the three stock-price hosts. Each host has its own
/// breaker and token bucket, so a sick host cannot starve the others. HTML
/// is fetched as a string and parsed synchronously afterwards.
pub struct MarketClient {
    http: reqwest::Client,
    endpoints: MarketEndpoints,
    registry: Arc<UpstreamRegistry>,
    clock: Arc<dyn Clock>,
}

impl MarketClient {
    pub fn new(
        endpoints: MarketEndpoints,
        registry: Arc<UpstreamRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoints,
            registry,
            clock,
        })
    }

    /// Current quote from the Nikkei company page.
    pub async fn nikkei(&self, code: &str) -> Result<NikkeiQuote, ClientError> {
        let url = format!(
            "{}/nkd/company/?scode={}",
            self.endpoints.nikkei_base,
            short_code(NIKKEI, code)?
        );
        let body = self.fetch_html(NIKKEI, &url).await?;
        Ok(NikkeiQuote::from_html(&body))
    }

    /// Quote and analyst forecast from the Minkabu stock page.
    pub async fn minkabu(&self, code: &str) -> Result<MinkabuQuote, ClientError> {
        let url = format!(
            "{}/stock/{}",
            self.endpoints.minkabu_base,
            short_code(MINKABU, code)?
        );
        let body = self.fetch_html(MINKABU, &url).await?;
        Ok(MinkabuQuote::from_html(&body))
    }

    /// Daily price history from Yahoo Finance, covering roughly the last
    /// year across the configured number of pages.
    pub async fn yahoo_daily(&self, code: &str) -> Result<Vec<DailyQuote>, ClientError> {
        let to = self.clock.now_utc().date_naive();
        let from = to - chrono::Duration::days(365);
        let short = short_code(YAHOO_FINANCE, code)?;

        let mut rows = Vec::new();
        for page in 1..=self.endpoints.yahoo_pages {
            let url = format!(
                "{}/quote/{}.T/history?from={}&to={}&timeFrame=d&page={}",
                self.endpoints.yahoo_base,
                short,
                from.format("%Y%m%d"),
                to.format("%Y%m%d"),
                page
            );
            let body = self.fetch_html(YAHOO_FINANCE, &url).await?;
            let page_rows = DailyQuote::rows_from_html(&body);
            if page_rows.is_empty() {
                break;
            }
            rows.extend(page_rows);
        }
        Ok(rows)
    }

    async fn fetch_html(&self, upstream: &str, url: &str) -> Result<String, ClientError> {
        tracing::debug!("fetching page from {}: {}", upstream, url);
        self.registry
            .upstream(upstream)
            .call(|| async {
                let response = self.http.get(url).send().await.map_err(|e| {
                    ClientError::TransientNetwork {
                        upstream: upstream.to_string(),
                        message: e.to_string(),
                    }
                })?;
                classify_status(upstream, response.status())?;
                response.text().await.map_err(|e| ClientError::TransientNetwork {
                    upstream: upstream.to_string(),
                    message: format!("body read failed: {}", e),
                })
            })
            .await
    }
}

/// These hosts key pages on the 4-digit securities code, not the 5-digit
/// company code.
fn short_code(upstream: &str, code: &str) -> Result<String, ClientError> {
    code.get(0..4)
        .map(|c| c.to_string())
        .ok_or_else(|| ClientError::Parse {
            upstream: upstream.to_string(),
            message: format!("company code '{}' is too short", code),
        })
}
