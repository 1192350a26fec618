pub mod anthropic;
pub mod openai;
pub mod prompt;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{Config, ReportProvider};
use crate::error::{AppError, Result};
use crate::types::{Anomaly, MarketSnapshot};

pub use anthropic::AnthropicGenerator;
pub use openai::OpenAiGenerator;

/// Text produced for one candidate market.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedReport {
    pub headline: String,
    pub summary: String,
    pub analysis: String,
    pub key_takeaways: String,
    /// Overrides the scorer's reasons when present.
    pub reasons: Option<Vec<String>>,
}

#[async_trait]
pub trait ReportGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(
        &self,
        snapshot: &MarketSnapshot,
        anomalies: &[Anomaly],
        reasons: &[String],
    ) -> Result<GeneratedReport>;
}

/// Stands in when no provider is configured. Every call fails, so
/// candidates are logged and skipped.
pub struct DisabledGenerator;

#[async_trait]
impl ReportGenerator for DisabledGenerator {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn generate(&self, snapshot: &MarketSnapshot, _: &[Anomaly], _: &[String]) -> Result<GeneratedReport> {
        Err(AppError::Generation(format!(
            "no report provider configured, cannot report on {}",
            snapshot.market_id
        )))
    }
}

/// Construct the configured generator once at startup.
pub fn build_generator(cfg: &Config) -> Result<Arc<dyn ReportGenerator>> {
    let generator: Arc<dyn ReportGenerator> = match cfg.report_provider {
        ReportProvider::Anthropic => match &cfg.anthropic_api_key {
            Some(key) => Arc::new(AnthropicGenerator::new(cfg, key.clone())?),
            None => {
                warn!("REPORT_PROVIDER=anthropic but ANTHROPIC_API_KEY is not set; report generation disabled");
                Arc::new(DisabledGenerator)
            }
        },
        ReportProvider::OpenAi => match &cfg.openai_api_key {
            Some(key) => Arc::new(OpenAiGenerator::new(cfg, key.clone())?),
            None => {
                warn!("REPORT_PROVIDER=openai but OPENAI_API_KEY is not set; report generation disabled");
                Arc::new(DisabledGenerator)
            }
        },
        ReportProvider::Disabled => {
            warn!("No AI API key configured; anomalies will be detected but no reports generated");
            Arc::new(DisabledGenerator)
        }
    };
    info!(provider = generator.name(), "Report generator ready");
    Ok(generator)
}
