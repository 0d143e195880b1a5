// IngestionService tests against a mocked archive and the in-memory store

mod common;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mockito::Server;
use ship_weather_service::db::{
    DbError, MemorySampleStore, SampleQuery, SampleStore, WeatherSample,
};
use ship_weather_service::importers::ArchiveDownloader;
use ship_weather_service::services::{ImportStage, IngestionService, YearStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn downloader(base_url: String) -> ArchiveDownloader {
    ArchiveDownloader::with_base_url(base_url)
        .with_max_retries(0)
        .with_retry_min_delay(Duration::from_millis(10))
}

fn service(base_url: String, store: Arc<dyn SampleStore>, batch_size: usize) -> IngestionService {
    IngestionService::new(downloader(base_url), store).with_batch_size(batch_size)
}

/// Store that accepts a fixed number of batches, then fails
struct FailingStore {
    inner: MemorySampleStore,
    accept_batches: usize,
    calls: AtomicUsize,
}

impl FailingStore {
    fn new(accept_batches: usize) -> Self {
        Self {
            inner: MemorySampleStore::new(),
            accept_batches,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SampleStore for FailingStore {
    async fn upsert_batch(&self, samples: &[WeatherSample]) -> Result<u64, DbError> {
        self.inner.upsert_batch(samples).await
    }

    async fn delete_by_keys(
        &self,
        station_id: &str,
        dates: &[DateTime<Utc>],
    ) -> Result<u64, DbError> {
        self.inner.delete_by_keys(station_id, dates).await
    }

    async fn replace_batch(
        &self,
        station_id: &str,
        samples: &[WeatherSample],
    ) -> Result<u64, DbError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.accept_batches {
            return Err(DbError::Unavailable("connection reset".to_string()));
        }
        self.inner.replace_batch(station_id, samples).await
    }

    async fn find_many(&self, query: &SampleQuery) -> Result<Vec<WeatherSample>, DbError> {
        self.inner.find_many(query).await
    }
}

#[tokio::test]
async fn test_import_range_reports_each_year() {
    let mut server = Server::new_async().await;

    let _imported = server
        .mock("GET", "/41002h2020.txt.gz")
        .with_status(200)
        .with_body(common::gzip(&common::stdmet_file(&common::rows_for_year(2020, 5))))
        .create_async()
        .await;
    let _missing = server
        .mock("GET", "/41002h2021.txt.gz")
        .with_status(404)
        .create_async()
        .await;
    let _broken = server
        .mock("GET", "/41002h2022.txt.gz")
        .with_status(200)
        .with_body(common::gzip(&common::row(2022, 1, 1, 0, 0, 5.0, 1.0)))
        .create_async()
        .await;

    let store = MemorySampleStore::new();
    let svc = service(server.url(), Arc::new(store.clone()), 5000);

    let manifest = svc.import_range("41002", 2020, 2023).await;

    assert_eq!(manifest.years.len(), 3);
    assert_eq!(manifest.succeeded(), 1);
    assert_eq!(manifest.skipped(), 1);
    assert_eq!(manifest.failed(), 1);
    assert_eq!(manifest.total_rows(), 5);

    assert!(matches!(manifest.years[0].status, YearStatus::Imported { .. }));
    assert!(matches!(manifest.years[1].status, YearStatus::Skipped { .. }));
    match &manifest.years[2].status {
        YearStatus::Failed { stage, error, .. } => {
            assert_eq!(*stage, ImportStage::Parsing);
            assert!(error.contains("header"));
        }
        other => panic!("Expected parse failure, got {other:?}"),
    }

    assert_eq!(store.len(), 5);
}

#[tokio::test]
async fn test_end_year_is_exclusive() {
    let mut server = Server::new_async().await;

    let mock_2020 = server
        .mock("GET", "/41002h2020.txt.gz")
        .with_status(200)
        .with_body(common::gzip(&common::stdmet_file(&common::rows_for_year(2020, 1))))
        .expect(1)
        .create_async()
        .await;
    let mock_2021 = server
        .mock("GET", "/41002h2021.txt.gz")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let svc = service(server.url(), Arc::new(MemorySampleStore::new()), 5000);
    let manifest = svc.import_range("41002", 2020, 2021).await;

    assert_eq!(manifest.years.len(), 1);
    assert_eq!(manifest.years[0].year, 2020);
    mock_2020.assert_async().await;
    mock_2021.assert_async().await;
}

#[tokio::test]
async fn test_empty_range_does_nothing() {
    let svc = service(
        "http://127.0.0.1:9".to_string(),
        Arc::new(MemorySampleStore::new()),
        5000,
    );

    let manifest = svc.import_range("41002", 2021, 2021).await;

    assert!(manifest.years.is_empty());
    assert_eq!(manifest.total_rows(), 0);
}

#[tokio::test]
async fn test_duplicate_timestamps_dropped_first_wins() {
    let mut server = Server::new_async().await;
    let rows = vec![
        common::row(2020, 3, 1, 0, 0, 4.0, 1.0),
        common::row(2020, 3, 1, 0, 0, 9.0, 2.0),
        common::row(2020, 3, 1, 0, 10, 5.0, 1.0),
    ];

    let _mock = server
        .mock("GET", "/41002h2020.txt.gz")
        .with_status(200)
        .with_body(common::gzip(&common::stdmet_file(&rows)))
        .create_async()
        .await;

    let store = MemorySampleStore::new();
    let svc = service(server.url(), Arc::new(store.clone()), 5000);
    let manifest = svc.import_range("41002", 2020, 2021).await;

    match &manifest.years[0].status {
        YearStatus::Imported { stats } => {
            assert_eq!(stats.rows_parsed, 3);
            assert_eq!(stats.duplicates_dropped, 1);
            assert_eq!(stats.rows_persisted, 2);
        }
        other => panic!("Expected import, got {other:?}"),
    }

    let stored = store.samples_for_station("41002");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].wind_speed_ms, Some(4.0));
}

#[tokio::test]
async fn test_batches_split_at_batch_size() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("GET", "/41002h2020.txt.gz")
        .with_status(200)
        .with_body(common::gzip(&common::stdmet_file(&common::rows_for_year(2020, 7))))
        .create_async()
        .await;

    let store = MemorySampleStore::new();
    let svc = service(server.url(), Arc::new(store.clone()), 3);
    let manifest = svc.import_range("41002", 2020, 2021).await;

    match &manifest.years[0].status {
        YearStatus::Imported { stats } => {
            assert_eq!(stats.batches_committed, 3);
            assert_eq!(stats.rows_persisted, 7);
        }
        other => panic!("Expected import, got {other:?}"),
    }
    assert_eq!(store.len(), 7);
}

#[tokio::test]
async fn test_reimport_is_idempotent() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("GET", "/41002h2020.txt.gz")
        .with_status(200)
        .with_body(common::gzip(&common::stdmet_file(&common::rows_for_year(2020, 10))))
        .expect(2)
        .create_async()
        .await;

    let store = MemorySampleStore::new();
    let svc = service(server.url(), Arc::new(store.clone()), 4);

    svc.import_range("41002", 2020, 2021).await;
    let first = store.samples_for_station("41002");
    svc.import_range("41002", 2020, 2021).await;
    let second = store.samples_for_station("41002");

    assert_eq!(first, second);
    assert_eq!(second.len(), 10);
}

#[tokio::test]
async fn test_persistence_failure_keeps_committed_batches() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("GET", "/41002h2020.txt.gz")
        .with_status(200)
        .with_body(common::gzip(&common::stdmet_file(&common::rows_for_year(2020, 10))))
        .create_async()
        .await;

    let store = Arc::new(FailingStore::new(1));
    let svc = service(server.url(), store.clone(), 4);
    let manifest = svc.import_range("41002", 2020, 2021).await;

    match &manifest.years[0].status {
        YearStatus::Failed {
            stage,
            batches_committed,
            error,
        } => {
            assert_eq!(*stage, ImportStage::Persisting);
            assert_eq!(*batches_committed, 1);
            assert!(error.contains("connection reset"));
        }
        other => panic!("Expected persistence failure, got {other:?}"),
    }

    assert_eq!(store.inner.len(), 4);
    assert_eq!(
        store.inner.samples_for_station("41002")[0].sample_datetime,
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn test_fetch_failure_recorded_and_next_year_runs() {
    let mut server = Server::new_async().await;

    let _forbidden = server
        .mock("GET", "/41002h2020.txt.gz")
        .with_status(403)
        .create_async()
        .await;
    let _ok = server
        .mock("GET", "/41002h2021.txt.gz")
        .with_status(200)
        .with_body(common::gzip(&common::stdmet_file(&common::rows_for_year(2021, 2))))
        .create_async()
        .await;

    let svc = service(server.url(), Arc::new(MemorySampleStore::new()), 5000);
    let manifest = svc.import_range("41002", 2020, 2022).await;

    match &manifest.years[0].status {
        YearStatus::Failed {
            stage,
            batches_committed,
            ..
        } => {
            assert_eq!(*stage, ImportStage::Fetching);
            assert_eq!(*batches_committed, 0);
        }
        other => panic!("Expected fetch failure, got {other:?}"),
    }
    assert!(matches!(manifest.years[1].status, YearStatus::Imported { .. }));
}
