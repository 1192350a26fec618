use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Politics,
    Economics,
    Technology,
    Sports,
    #[serde(rename = "World Events")]
    WorldEvents,
    Entertainment,
    #[serde(rename = "Health & Science")]
    HealthScience,
    Business,
    Legal,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Politics => "Politics",
            Category::Economics => "Economics",
            Category::Technology => "Technology",
            Category::Sports => "Sports",
            Category::WorldEvents => "World Events",
            Category::Entertainment => "Entertainment",
            Category::HealthScience => "Health & Science",
            Category::Business => "Business",
            Category::Legal => "Legal",
            Category::Other => "Other",
        }
    }

    /// Inverse of `as_str`. Unknown labels map to `Other`.
    pub fn from_label(s: &str) -> Self {
        match s {
            "Politics" => Category::Politics,
            "Economics" => Category::Economics,
            "Technology" => Category::Technology,
            "Sports" => Category::Sports,
            "World Events" => Category::WorldEvents,
            "Entertainment" => Category::Entertainment,
            "Health & Science" => Category::HealthScience,
            "Business" => Category::Business,
            "Legal" => Category::Legal,
            _ => Category::Other,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Snapshots and history
// ---------------------------------------------------------------------------

/// Latest known state of one market. Overwritten once per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub market_id: String,
    pub question: String,
    pub category: Category,
    /// Probability in [0, 1].
    pub current_price: f64,
    pub previous_price_1h: Option<f64>,
    pub previous_price_24h: Option<f64>,
    pub volume_24h: f64,
    pub volume_average: f64,
    pub liquidity: f64,
    /// Millisecond UTC epoch.
    pub observed_at_ms: i64,
}

impl MarketSnapshot {
    /// Signed relative change against the 1h reference, if one exists.
    pub fn price_change_1h(&self) -> Option<f64> {
        relative_change(self.current_price, self.previous_price_1h)
    }

    /// Signed relative change against the 24h reference, if one exists.
    pub fn price_change_24h(&self) -> Option<f64> {
        relative_change(self.current_price, self.previous_price_24h)
    }

    /// `(volume24h - average) / average`, None without a usable average.
    pub fn volume_change(&self) -> Option<f64> {
        if self.volume_average > 0.0 {
            Some((self.volume_24h - self.volume_average) / self.volume_average)
        } else {
            None
        }
    }
}

fn relative_change(current: f64, reference: Option<f64>) -> Option<f64> {
    match reference {
        Some(prev) if prev > 0.0 => Some((current - prev) / prev),
        _ => None,
    }
}

/// One immutable observation. Never updated; removed only by a bulk purge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub market_id: String,
    pub price: f64,
    pub volume: f64,
    pub timestamp_ms: i64,
}

// ---------------------------------------------------------------------------
// Anomalies
// ---------------------------------------------------------------------------

/// Declaration order is detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    PriceSpike,
    VolumeSpike,
    Volatility,
    NewTrend,
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AnomalyKind::PriceSpike => "price_spike",
            AnomalyKind::VolumeSpike => "volume_spike",
            AnomalyKind::Volatility => "volatility",
            AnomalyKind::NewTrend => "new_trend",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub market_id: String,
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: Severity,
    /// Signed.
    pub price_change: f64,
    pub volume_change: f64,
    pub confidence: f64,
    pub description: String,
}

/// First high-severity anomaly, else the first one detected.
pub fn primary_anomaly(anomalies: &[Anomaly]) -> Option<&Anomaly> {
    anomalies
        .iter()
        .find(|a| a.severity == Severity::High)
        .or_else(|| anomalies.first())
}

// ---------------------------------------------------------------------------
// Noise score
// ---------------------------------------------------------------------------

/// Aggregated newsworthiness of one market for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseScore {
    pub snapshot: MarketSnapshot,
    pub score: f64,
    pub anomalies: Vec<Anomaly>,
    /// In the order the bonuses were applied.
    pub reasons: Vec<String>,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Assigned by the store on insert.
    pub id: Option<i64>,
    pub market_id: String,
    pub headline: String,
    pub summary: String,
    pub analysis: String,
    pub key_takeaways: String,
    pub reasons: Vec<String>,
    pub confidence: f64,
    pub price_change: f64,
    pub volume_change: f64,
    pub created_at_ms: i64,
    pub event_at_ms: i64,
}

// ---------------------------------------------------------------------------
// Time helpers
// ---------------------------------------------------------------------------

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Milliseconds in `d`, saturating at `i64::MAX`.
pub fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Start of a lookback window ending now. Saturates for absurd windows.
pub fn cutoff_ms(since: Duration) -> i64 {
    now_ms().saturating_sub(duration_ms(since))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anomaly(kind: AnomalyKind, severity: Severity) -> Anomaly {
        Anomaly {
            market_id: "m1".to_string(),
            kind,
            severity,
            price_change: 0.0,
            volume_change: 0.0,
            confidence: 0.5,
            description: String::new(),
        }
    }

    #[test]
    fn primary_prefers_first_high_severity() {
        let list = vec![
            anomaly(AnomalyKind::PriceSpike, Severity::Medium),
            anomaly(AnomalyKind::Volatility, Severity::High),
            anomaly(AnomalyKind::NewTrend, Severity::High),
        ];
        assert_eq!(primary_anomaly(&list).unwrap().kind, AnomalyKind::Volatility);
    }

    #[test]
    fn primary_falls_back_to_detection_order() {
        let list = vec![
            anomaly(AnomalyKind::VolumeSpike, Severity::Low),
            anomaly(AnomalyKind::NewTrend, Severity::Medium),
        ];
        assert_eq!(primary_anomaly(&list).unwrap().kind, AnomalyKind::VolumeSpike);
        assert!(primary_anomaly(&[]).is_none());
    }

    #[test]
    fn oversized_durations_saturate() {
        assert_eq!(duration_ms(Duration::from_millis(1_500)), 1_500);
        assert_eq!(duration_ms(Duration::MAX), i64::MAX);
        assert!(cutoff_ms(Duration::MAX) < 0);
        assert!(cutoff_ms(Duration::ZERO) > 0);
    }

    #[test]
    fn category_labels_round_trip() {
        for c in [Category::WorldEvents, Category::HealthScience, Category::Other] {
            assert_eq!(Category::from_label(c.as_str()), c);
        }
        assert_eq!(Category::from_label("Crypto"), Category::Other);
    }

    #[test]
    fn zero_reference_price_has_no_change() {
        let snap = MarketSnapshot {
            market_id: "m".into(),
            question: "q".into(),
            category: Category::Other,
            current_price: 0.4,
            previous_price_1h: Some(0.0),
            previous_price_24h: None,
            volume_24h: 100.0,
            volume_average: 0.0,
            liquidity: 0.0,
            observed_at_ms: 0,
        };
        assert!(snap.price_change_1h().is_none());
        assert!(snap.price_change_24h().is_none());
        assert!(snap.volume_change().is_none());
    }
}
