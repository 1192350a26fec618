use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::api::{HealthState, LatencyStats};
use crate::config::{self, Config};
use crate::db::SnapshotStore;
use crate::feed::MarketFeed;
use crate::gate::{self, GateDecision};
use crate::ingestor::MarketIngestor;
use crate::report::{GeneratedReport, ReportGenerator};
use crate::scorer;
use crate::types::{now_ms, primary_anomaly, NoiseScore, Report};

/// Tunables for one desk, usually taken from `Config`.
#[derive(Debug, Clone)]
pub struct DeskSettings {
    pub max_reports: usize,
    pub report_delay: Duration,
    pub ingest_concurrency: usize,
}

impl DeskSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_reports: cfg.max_reports,
            report_delay: cfg.report_delay(),
            ingest_concurrency: cfg.ingest_concurrency,
        }
    }
}

/// Counters for one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub ingested: usize,
    pub failed_ingest: usize,
    /// Markets with at least one anomaly.
    pub anomalous: usize,
    /// Markets that cleared the significance cut and the per-cycle cap.
    pub candidates: usize,
    pub emitted: usize,
    pub suppressed: usize,
    pub failed_emissions: usize,
    /// True if shutdown cut the candidate loop short.
    pub interrupted: bool,
}

// ---------------------------------------------------------------------------
// NewsDesk
// ---------------------------------------------------------------------------

/// Runs report cycles: ingest, detect and score, rank, gate, emit.
pub struct NewsDesk {
    feed: Arc<dyn MarketFeed>,
    store: Arc<dyn SnapshotStore>,
    generator: Arc<dyn ReportGenerator>,
    ingestor: MarketIngestor,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
    settings: DeskSettings,
}

impl NewsDesk {
    pub fn new(
        feed: Arc<dyn MarketFeed>,
        store: Arc<dyn SnapshotStore>,
        generator: Arc<dyn ReportGenerator>,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
        settings: DeskSettings,
    ) -> Self {
        let ingestor = MarketIngestor::new(Arc::clone(&store), settings.ingest_concurrency);
        Self {
            feed,
            store,
            generator,
            ingestor,
            health,
            latency,
            settings,
        }
    }

    /// Run one cycle unless another is in flight, in which case this is a
    /// no-op returning None.
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> Option<CycleSummary> {
        let Some(_guard) = self.health.try_begin_cycle() else {
            warn!("Previous report cycle still running; skipping this tick");
            return None;
        };

        let started = Instant::now();
        let summary = self.cycle(shutdown).await;
        self.health.record_cycle(now_ms(), summary.emitted as u64);

        info!(
            ingested = summary.ingested,
            failed_ingest = summary.failed_ingest,
            anomalous = summary.anomalous,
            candidates = summary.candidates,
            emitted = summary.emitted,
            suppressed = summary.suppressed,
            failed_emissions = summary.failed_emissions,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cycle complete: {} reports emitted, {} suppressed",
            summary.emitted,
            summary.suppressed,
        );
        Some(summary)
    }

    async fn cycle(&self, shutdown: &watch::Receiver<bool>) -> CycleSummary {
        let mut summary = CycleSummary::default();

        // --- Ingesting ---
        let batch = match self.feed.fetch_batch().await {
            Ok(batch) => batch,
            Err(e) => {
                error!("Market feed failed: {e}");
                Vec::new()
            }
        };
        if batch.is_empty() {
            warn!("No markets fetched this cycle");
            return summary;
        }
        let outcome = self.ingestor.ingest_batch(batch).await;
        summary.ingested = outcome.snapshots.len();
        summary.failed_ingest = outcome.failed;

        // --- Scoring ---
        let scores = scorer::score_batch(&outcome.snapshots);
        summary.anomalous = scores.len();
        let candidates = scorer::filter_noisiest(scores, self.settings.max_reports);
        summary.candidates = candidates.len();
        info!(
            anomalous = summary.anomalous,
            candidates = summary.candidates,
            "Found {} markets with anomalies, {} worth reporting",
            summary.anomalous,
            summary.candidates,
        );

        // --- Emitting ---
        let mut generator_called = false;
        for candidate in &candidates {
            if *shutdown.borrow() {
                info!("Shutdown requested; stopping before the next candidate");
                summary.interrupted = true;
                break;
            }

            let market_id = &candidate.snapshot.market_id;
            let recent = match self
                .store
                .list_recent_reports(market_id, config::gate::LOOKBACK)
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(market_id = %market_id, "Failed to load recent reports: {e}");
                    summary.failed_emissions += 1;
                    continue;
                }
            };

            match gate::evaluate(candidate.score, &recent) {
                GateDecision::Suppressed { previous_max, threshold } => {
                    info!(
                        market_id = %market_id,
                        score = candidate.score,
                        previous_max,
                        threshold,
                        "Suppressed report for {market_id}: score {:.1} does not exceed {:.1}",
                        candidate.score,
                        threshold,
                    );
                    summary.suppressed += 1;
                    continue;
                }
                GateDecision::Escalated { previous_max, .. } => info!(
                    market_id = %market_id,
                    score = candidate.score,
                    previous_max,
                    "Escalation for {market_id}: score {:.1} over prior {:.1}",
                    candidate.score,
                    previous_max,
                ),
                GateDecision::FirstReport => {}
            }

            if generator_called {
                sleep(self.settings.report_delay).await;
            }
            generator_called = true;

            match self.emit(candidate).await {
                Ok(id) => {
                    summary.emitted += 1;
                    info!(
                        market_id = %market_id,
                        report_id = id,
                        score = candidate.score,
                        "Generated report for: {}",
                        candidate.snapshot.question,
                    );
                }
                Err(e) => {
                    summary.failed_emissions += 1;
                    warn!(market_id = %market_id, "Failed to emit report: {e}");
                }
            }
        }

        summary
    }

    async fn emit(&self, candidate: &NoiseScore) -> crate::error::Result<i64> {
        let started = Instant::now();
        let generated = self
            .generator
            .generate(&candidate.snapshot, &candidate.anomalies, &candidate.reasons)
            .await;
        self.latency.record(started.elapsed());

        let report = build_report(candidate, generated?, now_ms());
        self.store.insert_report(&report).await
    }

    /// Scheduler loop. The first cycle runs after `startup_delay`, then one
    /// per `period`. Returns once `shutdown` flips and any in-flight cycle
    /// has finished.
    pub async fn run(self: Arc<Self>, startup_delay: Duration, period: Duration, mut shutdown: watch::Receiver<bool>) {
        tokio::select! {
            _ = sleep(startup_delay) => {}
            _ = shutdown.changed() => {
                info!("Shutdown before the first cycle");
                return;
            }
        }

        let mut in_flight: JoinHandle<()> = self.spawn_cycle(&shutdown);

        let start = tokio::time::Instant::now() + period;
        let mut ticker = interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !in_flight.is_finished() {
                        warn!("Previous report cycle still running; skipping this tick");
                        continue;
                    }
                    in_flight = self.spawn_cycle(&shutdown);
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopped; waiting for the in-flight cycle");
        if let Err(e) = in_flight.await {
            error!("Report cycle task failed: {e}");
        }
    }

    fn spawn_cycle(self: &Arc<Self>, shutdown: &watch::Receiver<bool>) -> JoinHandle<()> {
        let desk = Arc::clone(self);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            desk.run_cycle(&shutdown).await;
        })
    }
}

/// Assemble the persisted report for an emitted candidate.
///
/// Price change prefers the 1h reference, then 24h, then the primary
/// anomaly. Volume change prefers the rolling average, then the primary
/// anomaly.
pub fn build_report(candidate: &NoiseScore, generated: GeneratedReport, now_ms: i64) -> Report {
    let snap = &candidate.snapshot;
    let primary = primary_anomaly(&candidate.anomalies);

    let price_change = snap
        .price_change_1h()
        .or_else(|| snap.price_change_24h())
        .or_else(|| primary.map(|a| a.price_change))
        .unwrap_or(0.0);
    let volume_change = snap
        .volume_change()
        .or_else(|| primary.map(|a| a.volume_change))
        .unwrap_or(0.0);

    let reasons = generated
        .reasons
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| candidate.reasons.clone());

    Report {
        id: None,
        market_id: snap.market_id.clone(),
        headline: generated.headline,
        summary: generated.summary,
        analysis: generated.analysis,
        key_takeaways: generated.key_takeaways,
        reasons,
        confidence: primary.map(|a| a.confidence).unwrap_or(0.0),
        price_change,
        volume_change,
        created_at_ms: now_ms,
        event_at_ms: snap.observed_at_ms,
    }
}
