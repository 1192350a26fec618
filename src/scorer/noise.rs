use std::cmp::Ordering;

use crate::config::scoring::*;
use crate::detector;
use crate::types::{Anomaly, AnomalyKind, MarketSnapshot, NoiseScore};

/// Aggregate a market's anomalies into one noise score.
///
/// Bonuses are applied in a fixed order and each appends its reason:
/// per anomaly (type bonus + confidence bonus), then the combined
/// price/volume multiplier, then the high absolute volume bonus.
pub fn score(snapshot: &MarketSnapshot, anomalies: Vec<Anomaly>) -> NoiseScore {
    let mut total = 0.0;
    let mut reasons = Vec::with_capacity(anomalies.len() + 2);

    for anomaly in &anomalies {
        total += type_bonus(anomaly);
        total += anomaly.confidence * CONFIDENCE_WEIGHT;
        reasons.push(anomaly.description.clone());
    }

    let has = |kind: AnomalyKind| anomalies.iter().any(|a| a.kind == kind);
    if has(AnomalyKind::PriceSpike) && has(AnomalyKind::VolumeSpike) {
        total *= COMBINED_SIGNAL_MULTIPLIER;
        reasons.push("Combined price and volume signal".to_string());
    }

    if snapshot.volume_24h > HIGH_VOLUME_THRESHOLD {
        total += HIGH_VOLUME_BONUS;
        reasons.push(format!(
            "High absolute volume (${:.0}k in 24h)",
            snapshot.volume_24h / 1000.0
        ));
    }

    NoiseScore {
        snapshot: snapshot.clone(),
        score: total.max(0.0),
        anomalies,
        reasons,
    }
}

fn type_bonus(anomaly: &Anomaly) -> f64 {
    match anomaly.kind {
        AnomalyKind::PriceSpike => anomaly.price_change.abs() * PRICE_SPIKE_WEIGHT,
        AnomalyKind::VolumeSpike => (anomaly.volume_change * VOLUME_SPIKE_WEIGHT).min(VOLUME_SPIKE_CAP),
        AnomalyKind::Volatility => VOLATILITY_BONUS,
        AnomalyKind::NewTrend => NEW_TREND_BONUS,
    }
}

/// Detect and score every snapshot in batch order. Markets without
/// anomalies are dropped here since they can never rank.
pub fn score_batch(snapshots: &[MarketSnapshot]) -> Vec<NoiseScore> {
    snapshots
        .iter()
        .filter_map(|snap| {
            let anomalies = detector::detect(snap);
            if anomalies.is_empty() {
                None
            } else {
                Some(score(snap, anomalies))
            }
        })
        .collect()
}

/// Keep significant scores, noisiest first, at most `max` of them.
/// The sort is stable, so ties keep their batch order.
pub fn filter_noisiest(scores: Vec<NoiseScore>, max: usize) -> Vec<NoiseScore> {
    let mut kept: Vec<NoiseScore> = scores
        .into_iter()
        .filter(|s| !s.anomalies.is_empty() && s.score >= MIN_SIGNIFICANCE)
        .collect();
    kept.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    kept.truncate(max);
    kept
}
