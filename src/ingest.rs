use anyhow::{Result, anyhow};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::feeds::{FeedError, StateFeed};
use crate::reconciler::reconcile_states;
use crate::states::State;
use crate::states_repo::StateRepository;

/// How a completed cycle obtained its batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// Both feeds answered and were merged
    Reconciled,
    /// The geography feed failed; the detail batch was stored as is
    Degraded,
    /// Only one feed is configured
    SingleFeed,
}

impl CycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleKind::Reconciled => "reconciled",
            CycleKind::Degraded => "degraded",
            CycleKind::SingleFeed => "single_feed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub kind: CycleKind,
    pub ingested: usize,
}

/// Periodic pull of the feeds into the state repository
pub struct IngestService {
    geography: Option<Arc<dyn StateFeed>>,
    detail: Option<Arc<dyn StateFeed>>,
    repo: Arc<StateRepository>,
}

impl IngestService {
    /// At least one feed must be given
    pub fn new(
        geography: Option<Arc<dyn StateFeed>>,
        detail: Option<Arc<dyn StateFeed>>,
        repo: Arc<StateRepository>,
    ) -> Result<Self> {
        if geography.is_none() && detail.is_none() {
            return Err(anyhow!("No state feed is configured"));
        }
        Ok(Self {
            geography,
            detail,
            repo,
        })
    }

    /// Fetch, reconcile and store one batch
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let (kind, states) = match (&self.geography, &self.detail) {
            (Some(geography), Some(detail)) => {
                let (geography_result, detail_result) =
                    tokio::join!(geography.fetch_states(), detail.fetch_states());

                let detail_states = detail_result.map_err(|e| feed_failure(detail.name(), e))?;
                match geography_result {
                    Ok(geography_states) => {
                        let (merged, stats) = reconcile_states(&geography_states, detail_states);
                        stats.record_metrics();
                        (CycleKind::Reconciled, merged)
                    }
                    Err(e) => {
                        record_feed_error(geography.name(), &e);
                        warn!(
                            feed = geography.name(),
                            kind = e.kind(),
                            "Geography feed failed, storing {} unreconciled states: {}",
                            detail_states.len(),
                            e
                        );
                        (CycleKind::Degraded, detail_states)
                    }
                }
            }
            (Some(feed), None) | (None, Some(feed)) => {
                let states = feed
                    .fetch_states()
                    .await
                    .map_err(|e| feed_failure(feed.name(), e))?;
                (CycleKind::SingleFeed, states)
            }
            (None, None) => return Err(anyhow!("No state feed is configured")),
        };

        let ingested = self.store(states).await?;
        Ok(CycleReport { kind, ingested })
    }

    async fn store(&self, states: Vec<State>) -> Result<usize> {
        let ingested = self.repo.insert_batch(states).await?;
        metrics::counter!("ingest.states_ingested").increment(ingested as u64);
        Ok(ingested)
    }

    /// Run cycles every `period` until `cancel` fires
    ///
    /// Each wait is shortened by the time the cycle took, so cycles start on a
    /// steady cadence unless one overruns the period.
    pub async fn run(&self, period: Duration, cancel: CancellationToken) {
        info!("Starting ingestion every {:?}", period);

        loop {
            let started = Instant::now();

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.run_cycle() => result,
            };
            match result {
                Ok(report) => {
                    metrics::counter!("ingest.cycle.total", "result" => report.kind.as_str())
                        .increment(1);
                    info!(
                        "Ingestion cycle ({}) stored {} states in {:?}",
                        report.kind.as_str(),
                        report.ingested,
                        started.elapsed()
                    );
                }
                Err(e) => {
                    metrics::counter!("ingest.cycle.total", "result" => "failed").increment(1);
                    error!("Ingestion cycle failed: {:#}", e);
                }
            }

            let wait = period.saturating_sub(started.elapsed());
            if wait.is_zero() {
                warn!("Ingestion cycle overran the {:?} period", period);
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        info!("Ingestion stopped");
    }
}

fn record_feed_error(feed: &'static str, err: &FeedError) {
    metrics::counter!("feed.errors_total", "feed" => feed, "kind" => err.kind()).increment(1);
}

fn feed_failure(feed: &'static str, err: FeedError) -> anyhow::Error {
    record_feed_error(feed, &err);
    error!(feed = feed, kind = err.kind(), "Feed request failed: {}", err);
    anyhow::Error::new(err).context(format!("{} feed failed", feed))
}
