use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{Config, USER_AGENT};
use crate::error::{AppError, Result};
use crate::feed::normalize::{extract_markets, normalize_market, select_markets};
use crate::feed::{FeedMarket, MarketFeed};
use crate::types::now_ms;

/// Endpoint paths tried in order. The first one that yields any market wins.
const ENDPOINTS: &[&str] = &[
    "/events?active=true&closed=false",
    "/markets?active=true&closed=false",
    "/markets?status=open",
    "/markets",
];

/// Over-fetch factor applied to the market limit, since the relevance
/// filter drops part of every page.
const OVERFETCH: usize = 3;

/// Polymarket Gamma REST feed.
pub struct GammaFeed {
    client: reqwest::Client,
    base_url: String,
    limit: usize,
}

impl GammaFeed {
    pub fn new(cfg: &Config) -> Result<Self> {
        Self::with_base_url(
            cfg.gamma_api_url.clone(),
            cfg.market_limit,
            Duration::from_secs(cfg.feed_timeout_secs),
        )
    }

    pub fn with_base_url(base_url: String, limit: usize, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limit,
        })
    }

    async fn fetch_endpoint(&self, path: &str) -> Result<Vec<FeedMarket>> {
        let sep = if path.contains('?') { '&' } else { '?' };
        let url = format!("{}{}{}limit={}", self.base_url, path, sep, self.limit * OVERFETCH);

        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Feed(format!("{path} returned {status}: {body}")));
        }
        let payload: serde_json::Value = resp.json().await?;

        let raw = extract_markets(&payload);
        let markets: Vec<FeedMarket> = raw.iter().filter_map(normalize_market).collect();
        debug!(
            endpoint = path,
            raw = raw.len(),
            normalized = markets.len(),
            "Gamma endpoint returned {} markets",
            markets.len()
        );
        Ok(markets)
    }
}

#[async_trait]
impl MarketFeed for GammaFeed {
    async fn fetch_batch(&self) -> Result<Vec<FeedMarket>> {
        for path in ENDPOINTS {
            match self.fetch_endpoint(path).await {
                Ok(markets) if !markets.is_empty() => {
                    let fetched = markets.len();
                    let selected = select_markets(markets, now_ms(), self.limit);
                    info!(
                        endpoint = path,
                        fetched,
                        selected = selected.len(),
                        "Fetched {fetched} markets, {} pass the relevance filter",
                        selected.len()
                    );
                    return Ok(selected);
                }
                Ok(_) => debug!(endpoint = path, "Gamma endpoint returned no markets"),
                Err(e) => warn!(endpoint = path, "Gamma endpoint failed: {e}"),
            }
        }
        warn!("All Polymarket endpoints failed or were empty; returning an empty batch");
        Ok(Vec::new())
    }
}
