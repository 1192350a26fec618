pub mod category;
pub mod gamma;
pub mod normalize;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Category;

pub use gamma::GammaFeed;
pub use normalize::normalize_market;

/// One upstream market after normalization. Every field downstream code
/// reads is typed here; raw payload shapes never leave the feed module.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMarket {
    pub market_id: String,
    pub question: String,
    pub category: Category,
    /// Probability in [0, 1].
    pub price: f64,
    /// `volume24hr` as reported, if positive.
    pub volume_24hr: Option<f64>,
    /// `volumeNum`, else `volume`.
    pub total_volume: Option<f64>,
    pub liquidity: f64,
    pub active: bool,
    pub archived: bool,
    pub end_date_ms: Option<i64>,
    pub created_at_ms: Option<i64>,
}

impl FeedMarket {
    /// 24h volume used for detection: `volume24hr`, else total volume.
    pub fn volume_24h(&self) -> f64 {
        self.volume_24hr.or(self.total_volume).unwrap_or(0.0)
    }
}

/// Source of market batches.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    /// Normalized, relevance-filtered markets, best first. An unreachable
    /// upstream yields an empty batch rather than an error.
    async fn fetch_batch(&self) -> Result<Vec<FeedMarket>>;
}
