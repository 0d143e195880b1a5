use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::db::{DbError, SampleStore, WeatherSample};
use crate::fetch_error::FetchError;
use crate::importers::{ArchiveDownloader, StationFile};
use crate::stdmet::{StdmetParseError, StdmetParser};

/// Rows per persisted batch unless configured otherwise
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Error types for a single station/year import
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Download failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Parse failed: {0}")]
    Parse(#[from] StdmetParseError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parser task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Where in the per-year pipeline a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStage {
    Fetching,
    Parsing,
    Persisting,
}

/// Counters for one imported year
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    pub rows_parsed: usize,
    /// Data rows dropped because no timestamp could be built
    pub rows_skipped: usize,
    /// Rows dropped because their timestamp was already in the batch
    pub duplicates_dropped: usize,
    pub rows_persisted: u64,
    pub batches_committed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum YearStatus {
    Imported {
        stats: ImportStats,
    },
    /// The archive has no file for this year
    Skipped {
        reason: String,
    },
    Failed {
        stage: ImportStage,
        error: String,
        batches_committed: usize,
    },
}

impl YearStatus {
    fn failed(stage: ImportStage, error: ImportError, batches_committed: usize) -> Self {
        YearStatus::Failed {
            stage,
            error: error.to_string(),
            batches_committed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearOutcome {
    pub year: i32,
    #[serde(flatten)]
    pub status: YearStatus,
}

/// Per-year result of importing a station over `[start_year, end_year)`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportManifest {
    pub station_id: String,
    pub start_year: i32,
    /// Exclusive
    pub end_year: i32,
    pub years: Vec<YearOutcome>,
}

impl ImportManifest {
    pub fn new(station_id: impl Into<String>, start_year: i32, end_year: i32) -> Self {
        Self {
            station_id: station_id.into(),
            start_year,
            end_year,
            years: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.count(|status| matches!(status, YearStatus::Imported { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|status| matches!(status, YearStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|status| matches!(status, YearStatus::Failed { .. }))
    }

    /// Rows written across every imported year
    pub fn total_rows(&self) -> u64 {
        self.years
            .iter()
            .filter_map(|outcome| match &outcome.status {
                YearStatus::Imported { stats } => Some(stats.rows_persisted),
                _ => None,
            })
            .sum()
    }

    fn count(&self, predicate: impl Fn(&YearStatus) -> bool) -> usize {
        self.years.iter().filter(|o| predicate(&o.status)).count()
    }
}

/// Groups a sample stream into batches with unique timestamps.
///
/// The first sample seen for a timestamp wins; later samples with the same
/// timestamp are dropped until the batch is emitted.
pub struct SampleBatcher {
    batch_size: usize,
    rows: Vec<WeatherSample>,
    seen: HashSet<DateTime<Utc>>,
    duplicates_dropped: usize,
}

impl SampleBatcher {
    pub fn new(batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            rows: Vec::with_capacity(batch_size),
            seen: HashSet::with_capacity(batch_size),
            duplicates_dropped: 0,
        }
    }

    /// Add a sample, returning a full batch once `batch_size` rows are pending
    pub fn push(&mut self, sample: WeatherSample) -> Option<Vec<WeatherSample>> {
        if !self.seen.insert(sample.sample_datetime) {
            self.duplicates_dropped += 1;
            return None;
        }

        self.rows.push(sample);
        if self.rows.len() >= self.batch_size {
            Some(self.take())
        } else {
            None
        }
    }

    /// Remaining rows at end of input, if any
    pub fn finish(&mut self) -> Option<Vec<WeatherSample>> {
        if self.rows.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates_dropped
    }

    fn take(&mut self) -> Vec<WeatherSample> {
        self.seen.clear();
        std::mem::replace(&mut self.rows, Vec::with_capacity(self.batch_size))
    }
}

/// What the blocking parser side reports once the file is exhausted
#[derive(Debug, Default)]
struct ParseSummary {
    rows_parsed: usize,
    rows_skipped: usize,
    duplicates_dropped: usize,
}

/// Service for importing historical stdmet archives into a [`SampleStore`]
#[derive(Clone)]
pub struct IngestionService {
    downloader: ArchiveDownloader,
    store: Arc<dyn SampleStore>,
    batch_size: usize,
}

impl IngestionService {
    pub fn new(downloader: ArchiveDownloader, store: Arc<dyn SampleStore>) -> Self {
        Self {
            downloader,
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn SampleStore>) -> Result<Self, FetchError> {
        let downloader = ArchiveDownloader::from_config(config)?;
        Ok(Self::new(downloader, store).with_batch_size(config.import_batch_size))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Import every year in `[start_year, end_year)` for one station
    ///
    /// Years are processed in order. A failing year is recorded in the manifest
    /// and the next year proceeds; nothing is returned as an error.
    #[instrument(skip(self), fields(station_id = %station_id))]
    pub async fn import_range(
        &self,
        station_id: &str,
        start_year: i32,
        end_year: i32,
    ) -> ImportManifest {
        let mut manifest = ImportManifest::new(station_id, start_year, end_year);

        if end_year <= start_year {
            warn!(
                "Empty year range [{}, {}) for station {}, nothing to import",
                start_year, end_year, station_id
            );
            return manifest;
        }

        let start_time = Instant::now();
        info!(
            "Starting import for station {} years [{}, {})",
            station_id, start_year, end_year
        );

        for year in start_year..end_year {
            let status = self.import_year(station_id, year).await;
            manifest.years.push(YearOutcome { year, status });
        }

        info!(
            succeeded = manifest.succeeded(),
            skipped = manifest.skipped(),
            failed = manifest.failed(),
            total_rows = manifest.total_rows(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Finished import for station {}",
            station_id
        );

        manifest
    }

    /// Fetch, parse and persist one station/year
    #[instrument(skip(self), fields(station_id = %station_id, year = %year))]
    pub async fn import_year(&self, station_id: &str, year: i32) -> YearStatus {
        let file = match self.downloader.download_year(station_id, year).await {
            Ok(file) => file,
            Err(e) if e.is_not_found() => {
                info!("No archive file for station {} year {}: {}", station_id, year, e);
                return YearStatus::Skipped {
                    reason: e.to_string(),
                };
            }
            Err(e) => {
                error!("Failed to download station {} year {}: {}", station_id, year, e);
                return YearStatus::failed(ImportStage::Fetching, e.into(), 0);
            }
        };

        debug!(
            size_bytes = file.size_bytes(),
            "Fetched archive file for station {} year {}",
            station_id,
            year
        );

        self.ingest_file(file).await
    }

    /// Parse a downloaded file and persist it batch by batch
    ///
    /// Parsing runs on a blocking thread and hands batches over a channel of
    /// capacity one, so at most two batches are held in memory. The temp file
    /// is removed when parsing ends, whatever the outcome.
    pub async fn ingest_file(&self, file: StationFile) -> YearStatus {
        let station_id = file.station_id().to_string();
        let year = file.year();

        let reader = match file.lines() {
            Ok(reader) => reader,
            Err(e) => {
                error!("Failed to open archive file for station {} year {}: {}", station_id, year, e);
                return YearStatus::failed(ImportStage::Parsing, e.into(), 0);
            }
        };

        let (tx, mut rx) = mpsc::channel::<Vec<WeatherSample>>(1);
        let batch_size = self.batch_size;
        let parser_station = station_id.clone();
        let parser = tokio::task::spawn_blocking(move || {
            let result = parse_into_batches(&parser_station, reader, batch_size, &tx);
            drop(file);
            result
        });

        let mut stats = ImportStats::default();
        let mut persist_error = None;

        while let Some(batch) = rx.recv().await {
            match self.store.replace_batch(&station_id, &batch).await {
                Ok(rows) => {
                    stats.rows_persisted += rows;
                    stats.batches_committed += 1;
                    debug!(
                        batch = stats.batches_committed,
                        rows,
                        "Committed batch for station {} year {}",
                        station_id,
                        year
                    );
                }
                Err(e) => {
                    persist_error = Some(e);
                    break;
                }
            }
        }
        // Closing the receiver stops the parser at its next send
        drop(rx);

        let parse_result = parser.await;

        if let Some(e) = persist_error {
            error!(
                batches_committed = stats.batches_committed,
                "Failed to persist batch for station {} year {}: {}",
                station_id,
                year,
                e
            );
            return YearStatus::failed(ImportStage::Persisting, e.into(), stats.batches_committed);
        }

        let summary = match parse_result {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => {
                error!(
                    batches_committed = stats.batches_committed,
                    "Failed to parse archive file for station {} year {}: {}",
                    station_id,
                    year,
                    e
                );
                return YearStatus::failed(ImportStage::Parsing, e.into(), stats.batches_committed);
            }
            Err(e) => {
                error!("Parser task for station {} year {} did not finish: {}", station_id, year, e);
                return YearStatus::failed(ImportStage::Parsing, e.into(), stats.batches_committed);
            }
        };

        stats.rows_parsed = summary.rows_parsed;
        stats.rows_skipped = summary.rows_skipped;
        stats.duplicates_dropped = summary.duplicates_dropped;

        info!(
            rows_parsed = stats.rows_parsed,
            rows_skipped = stats.rows_skipped,
            duplicates_dropped = stats.duplicates_dropped,
            rows_persisted = stats.rows_persisted,
            batches = stats.batches_committed,
            "Imported station {} year {}",
            station_id,
            year
        );

        YearStatus::Imported { stats }
    }
}

/// Blocking side of [`IngestionService::ingest_file`]
fn parse_into_batches<R: BufRead>(
    station_id: &str,
    reader: R,
    batch_size: usize,
    tx: &mpsc::Sender<Vec<WeatherSample>>,
) -> Result<ParseSummary, StdmetParseError> {
    let mut rows = StdmetParser::new(station_id).parse(reader)?;
    let mut batcher = SampleBatcher::new(batch_size);

    for sample in rows.by_ref() {
        if let Some(batch) = batcher.push(sample?) {
            if tx.blocking_send(batch).is_err() {
                debug!("Persister stopped, abandoning parse for station {}", station_id);
                return Ok(ParseSummary::default());
            }
        }
    }

    if let Some(batch) = batcher.finish() {
        if tx.blocking_send(batch).is_err() {
            return Ok(ParseSummary::default());
        }
    }

    Ok(ParseSummary {
        rows_parsed: rows.parsed_rows(),
        rows_skipped: rows.skipped_rows(),
        duplicates_dropped: batcher.duplicates_dropped(),
    })
}
