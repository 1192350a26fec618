/// Database row types matching migrations/0001_init.sql.
/// Used by sqlx for typed queries; converted into domain types at the edge.
use crate::error::Result;
use crate::types::{Category, HistoryPoint, MarketSnapshot, Report};

#[derive(Debug, sqlx::FromRow)]
pub struct SnapshotRow {
    pub market_id: String,
    pub question: String,
    pub category: String,
    pub current_price: f64,
    pub previous_price_1h: Option<f64>,
    pub previous_price_24h: Option<f64>,
    pub volume_24h: f64,
    pub volume_average: f64,
    pub liquidity: f64,
    pub observed_at: i64,
}

impl From<SnapshotRow> for MarketSnapshot {
    fn from(r: SnapshotRow) -> Self {
        MarketSnapshot {
            market_id: r.market_id,
            question: r.question,
            category: Category::from_label(&r.category),
            current_price: r.current_price,
            previous_price_1h: r.previous_price_1h,
            previous_price_24h: r.previous_price_24h,
            volume_24h: r.volume_24h,
            volume_average: r.volume_average,
            liquidity: r.liquidity,
            observed_at_ms: r.observed_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct HistoryRow {
    pub market_id: String,
    pub price: f64,
    pub volume: f64,
    pub timestamp: i64,
}

impl From<HistoryRow> for HistoryPoint {
    fn from(r: HistoryRow) -> Self {
        HistoryPoint {
            market_id: r.market_id,
            price: r.price,
            volume: r.volume,
            timestamp_ms: r.timestamp,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ReportRow {
    pub id: i64,
    pub market_id: String,
    pub headline: String,
    pub summary: String,
    pub analysis: String,
    pub key_takeaways: String,
    pub reasons: String,
    pub confidence: f64,
    pub price_change: f64,
    pub volume_change: f64,
    pub created_at: i64,
    pub event_at: i64,
}

impl ReportRow {
    pub fn into_report(self) -> Result<Report> {
        let reasons: Vec<String> = serde_json::from_str(&self.reasons)?;
        Ok(Report {
            id: Some(self.id),
            market_id: self.market_id,
            headline: self.headline,
            summary: self.summary,
            analysis: self.analysis,
            key_takeaways: self.key_takeaways,
            reasons,
            confidence: self.confidence,
            price_change: self.price_change,
            volume_change: self.volume_change,
            created_at_ms: self.created_at,
            event_at_ms: self.event_at,
        })
    }
}
