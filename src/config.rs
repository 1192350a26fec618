use std::time::Duration;

use crate::error::{AppError, Result};

pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";
pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4-turbo-preview";

/// Sent on every upstream feed request.
pub const USER_AGENT: &str = "Polymarket-News-Monitor/1.0";

/// Max tokens requested from the report generators.
pub const GENERATOR_MAX_TOKENS: u32 = 2000;

/// Anomaly detection thresholds. Fixed; tests depend on the exact values.
pub mod detector_thresholds {
    /// Markets below this 24h volume never produce anomalies.
    pub const NOISE_FLOOR_VOLUME: f64 = 5_000.0;
    /// |current - prev1h| / prev1h
    pub const PRICE_SPIKE_RATIO: f64 = 0.25;
    /// volume24h / volumeAverage
    pub const VOLUME_SPIKE_RATIO: f64 = 10.0;
    /// Absolute 1h move (probability points).
    pub const VOLATILITY_MIN_MOVE: f64 = 0.20;
    /// The 24h move must stay under this multiple of the 1h move.
    pub const VOLATILITY_SPAN_FACTOR: f64 = 1.5;
    pub const NEW_TREND_MIN_VOLUME: f64 = 20_000.0;
    /// Slack on `>=` threshold checks so cent-quantized prices that land
    /// exactly on a boundary still count.
    pub const THRESHOLD_EPSILON: f64 = 1e-9;

    pub const CONFIDENCE_CAP: f64 = 0.95;
    pub const VOLATILITY_CONFIDENCE: f64 = 0.75;
    pub const NEW_TREND_CONFIDENCE: f64 = 0.70;
}

/// Noise score weights and ranking cut-offs.
pub mod scoring {
    pub const PRICE_SPIKE_WEIGHT: f64 = 100.0;
    pub const VOLUME_SPIKE_WEIGHT: f64 = 5.0;
    pub const VOLUME_SPIKE_CAP: f64 = 50.0;
    pub const VOLATILITY_BONUS: f64 = 20.0;
    pub const NEW_TREND_BONUS: f64 = 15.0;
    pub const CONFIDENCE_WEIGHT: f64 = 10.0;
    pub const COMBINED_SIGNAL_MULTIPLIER: f64 = 1.5;
    pub const HIGH_VOLUME_THRESHOLD: f64 = 50_000.0;
    pub const HIGH_VOLUME_BONUS: f64 = 10.0;
    /// Scores below this never reach the gate.
    pub const MIN_SIGNIFICANCE: f64 = 30.0;
}

/// Escalation gate parameters.
pub mod gate {
    use std::time::Duration;

    /// How far back prior reports count against a new candidate.
    pub const LOOKBACK: Duration = Duration::from_secs(24 * 3600);
    /// A new candidate must beat the prior maximum by this factor.
    pub const ESCALATION_FACTOR: f64 = 1.5;
    pub const PRICE_CHANGE_WEIGHT: f64 = 100.0;
    pub const VOLUME_CHANGE_WEIGHT: f64 = 5.0;
}

/// History windows used to derive reference prices. All bounds are
/// `(now - start, now - end]`.
pub mod history_windows {
    use std::time::Duration;

    pub const PRICE_1H_START: Duration = Duration::from_secs(90 * 60);
    pub const PRICE_1H_END: Duration = Duration::from_secs(30 * 60);
    pub const PRICE_24H_START: Duration = Duration::from_secs(25 * 3600);
    pub const PRICE_24H_END: Duration = Duration::from_secs(24 * 3600);
    /// History retrieved per market per cycle; also the volume-average window.
    pub const LOOKBACK: Duration = PRICE_24H_START;
}

/// Upstream relevance filter.
pub mod relevance {
    /// Markets that ended longer ago than this are dropped.
    pub const MAX_DAYS_SINCE_END: f64 = 7.0;
    /// Markets without an end date must be younger than this.
    pub const MAX_DAYS_SINCE_CREATION: f64 = 90.0;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

/// Which report generator the coordinator is constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportProvider {
    Anthropic,
    OpenAi,
    Disabled,
}

impl std::fmt::Display for ReportProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReportProvider::Anthropic => "anthropic",
            ReportProvider::OpenAi => "openai",
            ReportProvider::Disabled => "disabled",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub store_backend: StoreBackend,
    pub api_port: u16,
    pub gamma_api_url: String,
    /// Markets monitored per cycle (MARKET_LIMIT)
    pub market_limit: usize,
    pub cycle_interval_secs: u64,
    /// Delay before the first cycle after startup (STARTUP_DELAY_SECS)
    pub startup_delay_secs: u64,
    /// Reports emitted per cycle at most (MAX_REPORTS)
    pub max_reports: usize,
    /// Pause between generator calls (REPORT_DELAY_MS)
    pub report_delay_ms: u64,
    pub ingest_concurrency: usize,
    pub feed_timeout_secs: u64,
    pub generator_timeout_secs: u64,
    pub report_provider: ReportProvider,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let anthropic_api_key = non_empty_var("ANTHROPIC_API_KEY");
        let openai_api_key = non_empty_var("OPENAI_API_KEY");
        let use_openai = std::env::var("USE_OPENAI").map(|v| v == "true").unwrap_or(false);

        let report_provider = match std::env::var("REPORT_PROVIDER").ok().as_deref() {
            Some(raw) => parse_provider(raw)?,
            None => default_provider(use_openai, openai_api_key.is_some(), anthropic_api_key.is_some()),
        };

        let store_backend = match std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "sqlite".to_string())
            .to_lowercase()
            .as_str()
        {
            "sqlite" => StoreBackend::Sqlite,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(AppError::Config(format!(
                    "STORE_BACKEND must be sqlite or memory, got {other}"
                )))
            }
        };

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "polymarket.db".to_string()),
            store_backend,
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            gamma_api_url: std::env::var("GAMMA_API_URL")
                .unwrap_or_else(|_| GAMMA_API_URL.to_string()),
            market_limit: parse_var("MARKET_LIMIT", 30),
            cycle_interval_secs: parse_var("CYCLE_INTERVAL_SECS", 300),
            startup_delay_secs: parse_var("STARTUP_DELAY_SECS", 5),
            max_reports: parse_var("MAX_REPORTS", 3),
            report_delay_ms: parse_var("REPORT_DELAY_MS", 2000),
            ingest_concurrency: parse_var::<usize>("INGEST_CONCURRENCY", 4).max(1),
            feed_timeout_secs: parse_var("FEED_TIMEOUT_SECS", 10),
            generator_timeout_secs: parse_var("GENERATOR_TIMEOUT_SECS", 60),
            report_provider,
            anthropic_api_key,
            anthropic_model: std::env::var("ANTHROPIC_MODEL")
                .unwrap_or_else(|_| DEFAULT_ANTHROPIC_MODEL.to_string()),
            openai_api_key,
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_MODEL.to_string()),
        })
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn report_delay(&self) -> Duration {
        Duration::from_millis(self.report_delay_ms)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_provider(raw: &str) -> Result<ReportProvider> {
    match raw.trim().to_lowercase().as_str() {
        "anthropic" | "claude" => Ok(ReportProvider::Anthropic),
        "openai" => Ok(ReportProvider::OpenAi),
        "none" | "disabled" | "" => Ok(ReportProvider::Disabled),
        other => Err(AppError::Config(format!(
            "REPORT_PROVIDER must be anthropic, openai or none, got {other}"
        ))),
    }
}

/// OpenAI wins only when explicitly requested and keyed; Anthropic otherwise.
fn default_provider(use_openai: bool, has_openai_key: bool, has_anthropic_key: bool) -> ReportProvider {
    if use_openai && has_openai_key {
        ReportProvider::OpenAi
    } else if has_anthropic_key {
        ReportProvider::Anthropic
    } else {
        ReportProvider::Disabled
    }
}
