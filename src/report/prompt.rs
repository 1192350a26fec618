//! Prompt construction and response parsing shared by every provider.

use std::fmt::Write;

use crate::report::GeneratedReport;
use crate::types::{Anomaly, MarketSnapshot};

const DEFAULT_HEADLINE: &str = "Market Movement Detected";
const DEFAULT_TAKEAWAYS: &str = "• Market showing unusual activity";
const SUMMARY_FALLBACK_CHARS: usize = 200;

fn pct(v: Option<f64>) -> String {
    v.map(|x| format!("{:.1}%", x * 100.0)).unwrap_or_else(|| "N/A".to_string())
}

/// Whole-dollar amount with thousands separators.
fn dollars(v: f64) -> String {
    let whole = v.round().max(0.0) as u64;
    let digits = whole.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    format!("${out}")
}

pub fn build_prompt(snapshot: &MarketSnapshot, anomalies: &[Anomaly], reasons: &[String]) -> String {
    let mut p = String::with_capacity(2048);
    p.push_str(
        "A prediction market on Polymarket is showing unusual activity. \
         Generate a neutral news report explaining this to a general audience:\n\n",
    );

    // Writing into a String cannot fail.
    let _ = writeln!(p, "Market Question: {}", snapshot.question);
    let _ = writeln!(p, "Category: {}", snapshot.category);
    let _ = writeln!(p, "Current Probability: {}", pct(Some(snapshot.current_price)));
    let _ = writeln!(p, "Previous Probability (1h ago): {}", pct(snapshot.previous_price_1h));
    let _ = writeln!(p, "Previous Probability (24h ago): {}", pct(snapshot.previous_price_24h));
    let _ = writeln!(p, "Price Change (1h): {}", pct(snapshot.price_change_1h()));
    let _ = writeln!(p, "Price Change (24h): {}", pct(snapshot.price_change_24h()));
    let _ = writeln!(p, "Volume (24h): {}", dollars(snapshot.volume_24h));
    let _ = writeln!(p, "Volume Spike: {}", pct(snapshot.volume_change()));

    p.push_str("\nDetected Anomalies:\n");
    for a in anomalies {
        let _ = writeln!(p, "- {}: {} ({} severity)", a.kind, a.description, a.severity);
    }

    if !reasons.is_empty() {
        p.push_str("\nWhy this was flagged:\n");
        for r in reasons {
            let _ = writeln!(p, "- {r}");
        }
    }

    p.push_str(
        "\nWrite a news report with the following structure:\n\
         1. HEADLINE: A clear, factual headline (max 80 characters)\n\
         2. SUMMARY: A 2-3 sentence summary paragraph explaining what happened\n\
         3. ANALYSIS: A detailed 3-4 paragraph analysis that:\n\
         \x20  - Explains what the market is about in plain language\n\
         \x20  - Describes the price movement and what it likely signals\n\
         \x20  - Provides context on why this matters\n\
         \x20  - Notes any limitations or caveats\n\
         4. KEY_TAKEAWAYS: 3-4 bullet points highlighting the most important information\n\n\
         Keep the tone neutral, factual, and accessible to non-traders. \
         Focus on \"markets are pricing in\" language rather than making predictions. \
         Avoid speculation and sensationalism.",
    );
    p
}

/// Text following `marker` up to the earliest `terminator` (or the end).
/// Matching is ASCII case-insensitive.
fn section(text: &str, lower: &str, marker: &str, terminators: &[&str]) -> Option<String> {
    let start = lower.find(marker)? + marker.len();
    let rest_lower = &lower[start..];
    let skipped = rest_lower.len() - rest_lower.trim_start().len();
    let body_start = start + skipped;
    let body_lower = &lower[body_start..];

    let end = terminators
        .iter()
        .filter_map(|t| body_lower.find(t))
        .min()
        .map(|i| body_start + i)
        .unwrap_or(text.len());

    let body = text[body_start..end].trim();
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

/// Split a model response into its four sections, with defaults for any
/// section the model left out.
pub fn parse_report(text: &str) -> GeneratedReport {
    let lower = text.to_ascii_lowercase();

    let headline = section(text, &lower, "headline:", &["\n", "summary:"]);
    let summary = section(text, &lower, "summary:", &["\nanalysis:"]);
    let analysis = section(text, &lower, "analysis:", &["\nkey_takeaways:"]);
    let key_takeaways = section(text, &lower, "key_takeaways:", &[]);

    GeneratedReport {
        headline: headline.unwrap_or_else(|| DEFAULT_HEADLINE.to_string()),
        summary: summary.unwrap_or_else(|| text.chars().take(SUMMARY_FALLBACK_CHARS).collect()),
        analysis: analysis.unwrap_or_else(|| text.to_string()),
        key_takeaways: key_takeaways.unwrap_or_else(|| DEFAULT_TAKEAWAYS.to_string()),
        reasons: None,
    }
}
