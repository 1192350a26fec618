use std::cmp::Ordering;

use serde_json::Value;

use crate::config::relevance::{MAX_DAYS_SINCE_CREATION, MAX_DAYS_SINCE_END};
use crate::feed::category::categorize;
use crate::feed::FeedMarket;

const DAY_MS: f64 = 86_400_000.0;

// ---------------------------------------------------------------------------
// Payload shapes
// ---------------------------------------------------------------------------

/// Pull the list of market objects out of any accepted response shape:
/// a bare array, or an object wrapping one under `data`, `markets` or
/// `results`. Items that carry their own `markets` array (events) are
/// flattened into those markets.
pub fn extract_markets(payload: &Value) -> Vec<Value> {
    let items = payload.as_array().or_else(|| {
        ["data", "markets", "results"]
            .iter()
            .find_map(|key| payload.get(*key).and_then(Value::as_array))
    });
    let Some(items) = items else {
        return Vec::new();
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item.get("markets").and_then(Value::as_array) {
            Some(nested) => out.extend(nested.iter().cloned()),
            None => out.push(item.clone()),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// Numeric field that may arrive as a JSON number or a numeric string.
fn num(v: &Value, key: &str) -> Option<f64> {
    let field = v.get(key)?;
    field
        .as_f64()
        .or_else(|| field.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|x: &f64| x.is_finite())
}

fn positive(v: &Value, key: &str) -> Option<f64> {
    num(v, key).filter(|x| *x > 0.0)
}

/// Array field that may arrive as a JSON array or a JSON-encoded string.
fn list(v: &Value, key: &str) -> Vec<Value> {
    match v.get(key) {
        Some(Value::Array(a)) => a.clone(),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(a)) => a,
            _ => vec![Value::String(s.clone())],
        },
        _ => Vec::new(),
    }
}

fn id_string(v: &Value) -> Option<String> {
    match v.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn tags(v: &Value) -> Vec<String> {
    let mut out: Vec<String> = list(v, "tags")
        .iter()
        .filter_map(|t| match t {
            Value::String(s) => Some(s.clone()),
            Value::Object(_) => t.get("label").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect();
    if out.is_empty() {
        if let Some(c) = v.get("category").and_then(Value::as_str) {
            out.push(c.to_string());
        }
    }
    out
}

/// Current YES probability.
///
/// First outcome price, then bid, ask and last trade. A missing or zero
/// result falls back to the bid/ask midpoint and finally 0.5.
pub fn resolve_price(v: &Value) -> f64 {
    let outcome = list(v, "outcomePrices")
        .first()
        .and_then(|p| p.as_f64().or_else(|| p.as_str().and_then(|s| s.trim().parse().ok())))
        .filter(|p| *p > 0.0)
        .map(|p| if p > 1.0 { p / 100.0 } else { p });

    let best_bid = num(v, "bestBid");
    let best_ask = num(v, "bestAsk");

    let candidate = outcome
        .or_else(|| best_bid.filter(|b| *b > 0.0))
        .or_else(|| best_ask.filter(|a| *a < 1.0))
        .or_else(|| positive(v, "lastTradePrice"));

    let price = match candidate {
        Some(p) if p > 0.0 => p,
        _ => match (best_ask, best_bid) {
            (Some(a), Some(b)) => (a + b) / 2.0,
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => 0.5,
        },
    };

    let price = if price > 1.0 { price / 100.0 } else { price };
    price.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Turn one raw upstream market into a typed record. None when the payload
/// has no usable id or question.
pub fn normalize_market(v: &Value) -> Option<FeedMarket> {
    let market_id = id_string(v)?;
    let question = v.get("question").and_then(Value::as_str)?.trim().to_string();
    if question.is_empty() {
        return None;
    }

    let category = categorize(&tags(v), &question);

    Some(FeedMarket {
        market_id,
        category,
        price: resolve_price(v),
        volume_24hr: positive(v, "volume24hr"),
        total_volume: positive(v, "volumeNum").or_else(|| positive(v, "volume")),
        liquidity: positive(v, "liquidityNum")
            .or_else(|| positive(v, "liquidity"))
            .unwrap_or(0.0),
        active: v.get("active").and_then(Value::as_bool).unwrap_or(false),
        archived: v.get("archived").and_then(Value::as_bool).unwrap_or(false),
        end_date_ms: date_ms(v, "endDate").or_else(|| date_ms(v, "endDateIso")),
        created_at_ms: date_ms(v, "createdAt"),
        question,
    })
}

fn date_ms(v: &Value, key: &str) -> Option<i64> {
    v.get(key)
        .and_then(Value::as_str)
        .and_then(parse_iso_to_unix_secs)
        .map(|secs| (secs * 1000.0) as i64)
}

/// Parse an RFC 3339 / ISO 8601 UTC timestamp string to Unix seconds.
/// Fractional seconds and offsets are ignored.
pub fn parse_iso_to_unix_secs(s: &str) -> Option<f64> {
    let s = s.trim();
    let s = s.strip_suffix('Z').unwrap_or(s);
    let s = match s.find('.') {
        Some(dot) => &s[..dot],
        None => s,
    };
    let s = match s.as_bytes().get(19) {
        Some(b'+') | Some(b'-') => &s[..19],
        _ => s,
    };
    if !s.is_ascii() {
        return None;
    }
    let (year, month, day, hour, minute, second): (i64, i64, i64, i64, i64, i64) = if s.len() == 10 {
        (s[0..4].parse().ok()?, s[5..7].parse().ok()?, s[8..10].parse().ok()?, 0, 0, 0)
    } else if s.len() >= 19 {
        (
            s[0..4].parse().ok()?,
            s[5..7].parse().ok()?,
            s[8..10].parse().ok()?,
            s[11..13].parse().ok()?,
            s[14..16].parse().ok()?,
            s[17..19].parse().ok()?,
        )
    } else {
        return None;
    };

    // Julian day number → days since the Unix epoch.
    let a = (14 - month) / 12;
    let y = year + 4800 - a;
    let m = month + 12 * a - 3;
    let jdn = day + (153 * m + 2) / 5 + 365 * y + y / 4 - y / 100 + y / 400 - 32045;
    let unix_days = jdn - 2_440_588;
    Some((unix_days * 86_400 + hour * 3_600 + minute * 60 + second) as f64)
}

// ---------------------------------------------------------------------------
// Relevance and ordering
// ---------------------------------------------------------------------------

/// Active, not archived, and current: ended at most 7 days ago, or with no
/// end date, created within 90 days. A market with neither date is kept.
pub fn is_relevant(m: &FeedMarket, now_ms: i64) -> bool {
    if !m.active || m.archived {
        return false;
    }
    match (m.end_date_ms, m.created_at_ms) {
        (Some(end), _) => (now_ms - end) as f64 / DAY_MS <= MAX_DAYS_SINCE_END,
        (None, Some(created)) => (now_ms - created) as f64 / DAY_MS <= MAX_DAYS_SINCE_CREATION,
        (None, None) => true,
    }
}

/// Recent activity first: reported 24h volume, then liquidity, then total
/// volume, all descending. Stable for full ties.
pub fn rank_by_activity(markets: &mut [FeedMarket]) {
    let desc = |a: f64, b: f64| b.partial_cmp(&a).unwrap_or(Ordering::Equal);
    markets.sort_by(|a, b| {
        desc(a.volume_24hr.unwrap_or(0.0), b.volume_24hr.unwrap_or(0.0))
            .then_with(|| desc(a.liquidity, b.liquidity))
            .then_with(|| desc(a.total_volume.unwrap_or(0.0), b.total_volume.unwrap_or(0.0)))
    });
}

/// Relevance filter, activity ordering and the batch cap, in that order.
pub fn select_markets(markets: Vec<FeedMarket>, now_ms: i64, limit: usize) -> Vec<FeedMarket> {
    let mut kept: Vec<FeedMarket> = markets.into_iter().filter(|m| is_relevant(m, now_ms)).collect();
    rank_by_activity(&mut kept);
    kept.truncate(limit);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;
    use serde_json::json;

    const NOW_MS: i64 = 1_700_000_000_000;

    #[test]
    fn outcome_prices_as_string_or_array() {
        assert_eq!(resolve_price(&json!({ "outcomePrices": "[\"0.62\", \"0.38\"]" })), 0.62);
        assert_eq!(resolve_price(&json!({ "outcomePrices": [0.3, 0.7] })), 0.3);
        // Percent-style values.
        assert_eq!(resolve_price(&json!({ "outcomePrices": [55, 45] })), 0.55);
    }

    #[test]
    fn price_fallback_chain() {
        assert_eq!(resolve_price(&json!({ "outcomePrices": ["0", "1"], "bestBid": 0.41 })), 0.41);
        assert_eq!(resolve_price(&json!({ "bestBid": 0, "bestAsk": 0.6 })), 0.6);
        assert_eq!(resolve_price(&json!({ "bestAsk": 1.0, "lastTradePrice": "0.33" })), 0.33);
        // Ask of zero is a usable-but-empty candidate; midpoint takes over.
        assert_eq!(resolve_price(&json!({ "bestBid": 0, "bestAsk": 0 })), 0.0);
        assert_eq!(resolve_price(&json!({})), 0.5);
        assert_eq!(resolve_price(&json!({ "lastTradePrice": 250 })), 1.0);
    }

    #[test]
    fn normalizes_string_numbers_and_tags() {
        let m = normalize_market(&json!({
            "id": "123",
            "question": "Will the Fed cut rates?",
            "outcomePrices": "[\"0.7\",\"0.3\"]",
            "volume24hr": "15000.5",
            "volume": "900000",
            "liquidity": "4200",
            "active": true,
            "tags": [{ "label": "Finance" }],
            "endDate": "2023-12-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(m.market_id, "123");
        assert_eq!(m.category, Category::Economics);
        assert_eq!(m.price, 0.7);
        assert_eq!(m.volume_24hr, Some(15000.5));
        assert_eq!(m.total_volume, Some(900000.0));
        assert_eq!(m.liquidity, 4200.0);
        assert!(m.active && !m.archived);
        assert_eq!(m.end_date_ms, Some(1_701_388_800_000));
    }

    #[test]
    fn volume_falls_back_to_total() {
        let m = normalize_market(&json!({
            "id": 7, "question": "q", "volume24hr": 0, "volumeNum": 12.0
        }))
        .unwrap();
        assert_eq!(m.market_id, "7");
        assert_eq!(m.volume_24h(), 12.0);
    }

    #[test]
    fn rejects_payloads_without_identity() {
        assert!(normalize_market(&json!({ "question": "q" })).is_none());
        assert!(normalize_market(&json!({ "id": "1" })).is_none());
        assert!(normalize_market(&json!({ "id": "1", "question": "  " })).is_none());
    }

    #[test]
    fn extracts_every_accepted_shape() {
        let m = json!({ "id": "1", "question": "q" });
        for payload in [
            json!([m.clone()]),
            json!({ "data": [m.clone()] }),
            json!({ "markets": [m.clone()] }),
            json!({ "results": [m.clone()] }),
            json!([{ "title": "event", "markets": [m.clone()] }]),
            json!({ "data": [{ "markets": [m.clone()] }] }),
        ] {
            assert_eq!(extract_markets(&payload), vec![m.clone()], "payload {payload}");
        }
        assert!(extract_markets(&json!({ "error": "nope" })).is_empty());
    }

    fn feed_market(id: &str) -> FeedMarket {
        FeedMarket {
            market_id: id.to_string(),
            question: "q".to_string(),
            category: Category::Other,
            price: 0.5,
            volume_24hr: None,
            total_volume: None,
            liquidity: 0.0,
            active: true,
            archived: false,
            end_date_ms: None,
            created_at_ms: None,
        }
    }

    #[test]
    fn relevance_window() {
        let day = DAY_MS as i64;
        let mut m = feed_market("a");
        assert!(is_relevant(&m, NOW_MS));

        m.end_date_ms = Some(NOW_MS - 6 * day);
        assert!(is_relevant(&m, NOW_MS));
        m.end_date_ms = Some(NOW_MS - 8 * day);
        assert!(!is_relevant(&m, NOW_MS));

        m.end_date_ms = None;
        m.created_at_ms = Some(NOW_MS - 91 * day);
        assert!(!is_relevant(&m, NOW_MS));
        m.created_at_ms = Some(NOW_MS - 30 * day);
        assert!(is_relevant(&m, NOW_MS));

        m.archived = true;
        assert!(!is_relevant(&m, NOW_MS));
        let mut inactive = feed_market("b");
        inactive.active = false;
        assert!(!is_relevant(&inactive, NOW_MS));
    }

    #[test]
    fn selection_orders_by_activity_and_caps() {
        let mut a = feed_market("a");
        a.liquidity = 10.0;
        let mut b = feed_market("b");
        b.volume_24hr = Some(100.0);
        let mut c = feed_market("c");
        c.liquidity = 10.0;
        c.total_volume = Some(5.0);
        let mut stale = feed_market("stale");
        stale.volume_24hr = Some(1e9);
        stale.active = false;

        let ids: Vec<String> = select_markets(vec![a, b, c, stale], NOW_MS, 2)
            .into_iter()
            .map(|m| m.market_id)
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn iso_dates() {
        assert_eq!(parse_iso_to_unix_secs("1970-01-01T00:00:00Z"), Some(0.0));
        assert_eq!(parse_iso_to_unix_secs("2024-01-04T22:58:33.146Z"), Some(1_704_409_113.0));
        assert_eq!(parse_iso_to_unix_secs("2024-01-05"), Some(1_704_412_800.0));
        assert_eq!(parse_iso_to_unix_secs("soon"), None);
    }
}
