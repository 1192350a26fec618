use crate::config::detector_thresholds::*;
use crate::types::{Anomaly, AnomalyKind, MarketSnapshot, Severity};

/// Classify one enriched snapshot. Pure: the only inputs are the current
/// price, both reference prices, 24h volume and the rolling volume average.
///
/// Rules run independently in a fixed order (price spike, volume spike,
/// volatility, new trend); each fires at most once.
pub fn detect(snap: &MarketSnapshot) -> Vec<Anomaly> {
    if snap.volume_24h < NOISE_FLOOR_VOLUME {
        return Vec::new();
    }

    let mut anomalies = Vec::with_capacity(4);
    let volume_change = snap.volume_change().unwrap_or(0.0);
    let price_change_1h = snap.price_change_1h();
    let reaches = |value: f64, threshold: f64| value + THRESHOLD_EPSILON >= threshold;

    if let Some(change) = price_change_1h {
        let delta = change.abs();
        if reaches(delta, PRICE_SPIKE_RATIO) {
            anomalies.push(Anomaly {
                market_id: snap.market_id.clone(),
                kind: AnomalyKind::PriceSpike,
                severity: Severity::High,
                price_change: change,
                volume_change,
                confidence: (0.7 + delta * 0.5).min(CONFIDENCE_CAP),
                description: format!("Price moved {:.1}% in the last hour", delta * 100.0),
            });
        }
    }

    if snap.volume_average > 0.0 {
        let ratio = snap.volume_24h / snap.volume_average;
        if reaches(ratio, VOLUME_SPIKE_RATIO) {
            anomalies.push(Anomaly {
                market_id: snap.market_id.clone(),
                kind: AnomalyKind::VolumeSpike,
                severity: Severity::High,
                price_change: price_change_1h.unwrap_or(0.0),
                volume_change: ratio - 1.0,
                confidence: (0.7 + (ratio - VOLUME_SPIKE_RATIO) * 0.02).min(CONFIDENCE_CAP),
                description: format!("Volume is {ratio:.1}x the rolling average"),
            });
        }
    }

    if let (Some(prev_1h), Some(prev_24h)) = (snap.previous_price_1h, snap.previous_price_24h) {
        let move_1h = (snap.current_price - prev_1h).abs();
        let move_24h = (snap.current_price - prev_24h).abs();
        // The day's move is mostly explained by the last hour.
        if reaches(move_1h, VOLATILITY_MIN_MOVE) && move_24h < VOLATILITY_SPAN_FACTOR * move_1h {
            anomalies.push(Anomaly {
                market_id: snap.market_id.clone(),
                kind: AnomalyKind::Volatility,
                severity: Severity::High,
                price_change: price_change_1h.unwrap_or(0.0),
                volume_change,
                confidence: VOLATILITY_CONFIDENCE,
                description: format!(
                    "Rapid swing of {:.1} points in the last hour",
                    move_1h * 100.0
                ),
            });
        }
    }

    if snap.previous_price_24h.is_none() && snap.volume_24h > NEW_TREND_MIN_VOLUME {
        anomalies.push(Anomaly {
            market_id: snap.market_id.clone(),
            kind: AnomalyKind::NewTrend,
            severity: Severity::High,
            price_change: 0.0,
            volume_change: 0.0,
            confidence: NEW_TREND_CONFIDENCE,
            description: "New market gaining traction".to_string(),
        });
    }

    anomalies
}
