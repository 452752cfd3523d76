//! Batch pipeline: scrape, reconcile, export, sync, detect.
//!
//! A failing stage is logged and reported in the summary; it never aborts
//! the stages after it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Local;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    config::AppConfig,
    database::{Database, SyncSummary},
    detector::{ChangeDetector, WatchlistSummary},
    email::SmtpMailer,
    errors::{EtaTrackerError, Result},
    export::export_csv,
    fetch::HttpFetcher,
    matcher::cross_match,
    models::{MatchedEvent, VesselEvent},
    snapshot::SnapshotStore,
    terminals::{EurogateSource, Extraction, HhlaSource, ScheduleSource, Terminal},
};

/// Outcome of a full run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub eurogate_count: usize,
    pub hhla_count: usize,
    /// Records after reconciliation
    pub total: usize,
    pub matched_pairs: usize,
    pub export_path: Option<PathBuf>,
    pub timestamp: String,
    pub elapsed_seconds: f64,
    /// `None` when no database is configured
    pub sync: Option<SyncSummary>,
    pub watchlist: Option<WatchlistSummary>,
    /// One message per stage that failed
    pub errors: Vec<String>,
}

pub struct Pipeline {
    config: AppConfig,
    fetcher: HttpFetcher,
    snapshots: SnapshotStore,
    eurogate: EurogateSource,
    hhla: HhlaSource,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.storage.ensure_directories()?;
        let fetcher = HttpFetcher::new(&config.scraper)?;
        let snapshots = SnapshotStore::new(&config.storage);
        let eurogate = EurogateSource::new(config.scraper.eurogate.clone());
        let hhla = HhlaSource::new(config.scraper.hhla.clone());
        Ok(Self {
            config,
            fetcher,
            snapshots,
            eurogate,
            hhla,
        })
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Scrape both terminals concurrently; a failing terminal yields no events.
    pub async fn run_scrape(&self) -> (Vec<VesselEvent>, Vec<VesselEvent>) {
        let (eurogate, hhla) = tokio::join!(self.scrape(&self.eurogate), self.scrape(&self.hhla));
        info!(
            "[pipeline] Scraped: {} Eurogate + {} HHLA",
            eurogate.len(),
            hhla.len()
        );
        (eurogate, hhla)
    }

    async fn scrape(&self, source: &dyn ScheduleSource) -> Vec<VesselEvent> {
        let fetched = source.fetch(&self.fetcher).await;
        self.collect(source, fetched)
    }

    /// Turn a fetch result into events, keeping snapshots and diagnostics.
    pub fn collect(&self, source: &dyn ScheduleSource, fetched: Result<String>) -> Vec<VesselEvent> {
        let terminal = source.terminal();
        let markup = match fetched {
            Ok(markup) => markup,
            Err(e) => {
                error!("[{}] Scraper failed: {}", terminal, e);
                if let EtaTrackerError::LinkNotFound { markup, .. } = &e {
                    self.keep_debug(source, markup);
                }
                return Vec::new();
            }
        };

        match source.parse(&markup) {
            Extraction::Found(events) => {
                if events.is_empty() {
                    warn!("[{}] Schedule table is empty", terminal);
                }
                if let Err(e) = self.snapshots.save(terminal, &events) {
                    warn!("[{}] Could not save snapshot: {}", terminal, e);
                }
                events
            }
            Extraction::TableNotFound { reason, markup } => {
                warn!("[{}] No schedule extracted: {}", terminal, reason);
                self.keep_debug(source, &markup);
                Vec::new()
            }
        }
    }

    fn keep_debug(&self, source: &dyn ScheduleSource, markup: &str) {
        if let Err(e) = self.snapshots.save_debug(source.terminal(), markup) {
            warn!("[{}] Could not save debug page: {}", source.terminal(), e);
        }
    }

    /// Reconcile both terminals and export the result.
    pub fn process(
        &self,
        eurogate: &[VesselEvent],
        hhla: &[VesselEvent],
        output: Option<&Path>,
    ) -> Result<(Vec<MatchedEvent>, PathBuf)> {
        info!(
            "[processor] Input: {} Eurogate + {} HHLA",
            eurogate.len(),
            hhla.len()
        );
        let records = cross_match(eurogate, hhla, self.config.processor.fuzzy_match_threshold);
        let path = export_csv(&records, output.unwrap_or(self.config.processor.export_path.as_path()))?;
        Ok((records, path))
    }

    /// Re-export from the newest snapshots without scraping
    pub fn run_process_from_latest(&self, output: Option<&Path>) -> Result<PathBuf> {
        let (eurogate, hhla) = self.load_latest()?;
        let (_, path) = self.process(&eurogate, &hhla, output)?;
        Ok(path)
    }

    /// Sync the newest snapshots without scraping
    pub async fn run_sync_from_latest(&self) -> Result<SyncSummary> {
        let (eurogate, hhla) = self.load_latest()?;
        let database = self.connect().await?;
        Ok(database.sync_all(&eurogate, &hhla).await)
    }

    /// One change detection cycle against the configured database
    pub async fn check_etas(&self) -> Result<WatchlistSummary> {
        let database = self.connect().await?;
        self.detect(&database).await
    }

    async fn detect(&self, database: &Database) -> Result<WatchlistSummary> {
        let mailer = SmtpMailer::from_config(self.config.smtp.as_ref())?;
        ChangeDetector::new(database, database, &mailer).run().await
    }

    async fn connect(&self) -> Result<Database> {
        let config = self
            .config
            .database
            .as_ref()
            .ok_or_else(|| EtaTrackerError::MissingConfiguration("database.url".to_string()))?;
        Database::connect(config).await
    }

    fn load_latest(&self) -> Result<(Vec<VesselEvent>, Vec<VesselEvent>)> {
        Ok((
            self.snapshots.load_latest(Terminal::Eurogate)?,
            self.snapshots.load_latest(Terminal::Hhla)?,
        ))
    }

    /// Scrape, reconcile, export, sync and detect changes.
    pub async fn run_full(&self, output: Option<&Path>) -> PipelineSummary {
        let start = Instant::now();
        info!("[pipeline] Starting full pipeline...");
        let mut errors = Vec::new();

        let (eurogate, hhla) = self.run_scrape().await;

        let records = cross_match(&eurogate, &hhla, self.config.processor.fuzzy_match_threshold);
        let matched_pairs = records.iter().filter(|r| r.is_matched()).count();
        let export_path = match export_csv(
            &records,
            output.unwrap_or(self.config.processor.export_path.as_path()),
        ) {
            Ok(path) => Some(path),
            Err(e) => {
                error!("[pipeline] Export failed: {}", e);
                errors.push(format!("export: {}", e));
                None
            }
        };

        let (sync, watchlist) = if self.config.database.is_none() {
            info!("[pipeline] No database configured, skipping sync and ETA check");
            (None, None)
        } else {
            match self.connect().await {
                Ok(database) => {
                    let sync = database.sync_all(&eurogate, &hhla).await;
                    let watchlist = match self.detect(&database).await {
                        Ok(summary) => Some(summary),
                        Err(e) => {
                            error!("[pipeline] ETA change check failed: {}", e);
                            errors.push(format!("watchlist: {}", e));
                            None
                        }
                    };
                    (Some(sync), watchlist)
                }
                Err(e) => {
                    error!("[pipeline] Database unavailable: {}", e);
                    errors.push(format!("database: {}", e));
                    (Some(SyncSummary::failed(&e)), None)
                }
            }
        };

        let elapsed = start.elapsed().as_secs_f64();
        let summary = PipelineSummary {
            eurogate_count: eurogate.len(),
            hhla_count: hhla.len(),
            total: records.len(),
            matched_pairs,
            export_path,
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            elapsed_seconds: (elapsed * 10.0).round() / 10.0,
            sync,
            watchlist,
            errors,
        };
        info!(
            "[pipeline] Done in {:.1}s - {} records ({} matched pairs)",
            elapsed, summary.total, summary.matched_pairs
        );
        summary
    }
}
