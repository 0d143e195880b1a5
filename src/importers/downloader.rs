use backon::{ExponentialBuilder, Retryable};
use flate2::read::MultiGzDecoder;
use reqwest::Client;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::fetch_error::FetchError;

/// NDBC historical standard meteorological data
pub const DEFAULT_ARCHIVE_BASE_URL: &str = "https://www.ndbc.noaa.gov/data/historical/stdmet/";

/// A downloaded, still-compressed archive file for one station/year.
///
/// Backed by a uniquely named temp file that is deleted when this value is dropped.
pub struct StationFile {
    station_id: String,
    year: i32,
    size_bytes: u64,
    file: NamedTempFile,
}

impl StationFile {
    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Compressed size on disk
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Open a fresh decompressed line reader over the file
    pub fn lines(&self) -> std::io::Result<BufReader<MultiGzDecoder<File>>> {
        let file = self.file.reopen()?;
        Ok(BufReader::new(MultiGzDecoder::new(file)))
    }
}

/// Downloader for per-station, per-year stdmet archive files
#[derive(Clone)]
pub struct ArchiveDownloader {
    client: Client,
    base_url: String,
    temp_dir: Option<PathBuf>,
    max_retries: usize,
    retry_min_delay: Duration,
}

impl ArchiveDownloader {
    /// Create a downloader for the public NDBC archive
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_ARCHIVE_BASE_URL)
    }

    /// Create a downloader against another archive root (mirrors, tests)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            temp_dir: None,
            max_retries: 3,
            retry_min_delay: Duration::from_secs(2),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.archive_base_url.clone(),
            temp_dir: config.import_temp_dir.clone(),
            max_retries: config.download_max_retries,
            retry_min_delay: Duration::from_secs(2),
        })
    }

    /// Retries after the first attempt for transient failures (0 disables retrying)
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// First backoff delay; later retries grow exponentially from it
    pub fn with_retry_min_delay(mut self, delay: Duration) -> Self {
        self.retry_min_delay = delay;
        self
    }

    /// Directory for temp files instead of the system temp dir
    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(temp_dir.into());
        self
    }

    /// Archive file name, e.g. `41002h2023.txt.gz`
    pub fn file_name(station_id: &str, year: i32) -> String {
        format!("{}h{year}.txt.gz", station_id.to_lowercase())
    }

    pub fn file_url(&self, station_id: &str, year: i32) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            Self::file_name(station_id, year)
        )
    }

    /// Download the archive file for one station/year into a temp file
    ///
    /// Transient failures (connection errors, 5xx) are retried with exponential
    /// backoff. A 404 means the station did not report that year and is returned
    /// immediately as [`FetchError::NotFound`].
    #[instrument(skip(self), fields(station_id = %station_id, year = %year))]
    pub async fn download_year(&self, station_id: &str, year: i32) -> Result<StationFile, FetchError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry_min_delay)
            .with_max_delay(Duration::from_secs(60))
            .with_max_times(self.max_retries)
            .with_jitter();

        (move || async move { self.download_once(station_id, year).await })
            .retry(backoff)
            .when(FetchError::is_transient)
            .notify(|err: &FetchError, delay: Duration| {
                warn!(
                    station_id = %station_id,
                    year,
                    error = %err,
                    "Archive download failed, retrying in {:.1}s",
                    delay.as_secs_f64()
                );
            })
            .await
    }

    async fn download_once(&self, station_id: &str, year: i32) -> Result<StationFile, FetchError> {
        let filename = Self::file_name(station_id, year);
        let url = self.file_url(station_id, year);
        info!("Downloading archive file: {}", url);

        let mut response = self.client.get(&url).send().await?;
        let status = response.status();

        if status.as_u16() == 404 {
            return Err(FetchError::NotFound(format!(
                "{filename} not found on server"
            )));
        } else if status.is_server_error() {
            return Err(FetchError::ServerError(format!(
                "Server error {status} while downloading {filename}"
            )));
        } else if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }

        let mut file = self.create_temp_file(station_id, year)?;
        let mut size_bytes = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk)?;
            size_bytes += chunk.len() as u64;
        }
        file.flush()?;

        debug!(
            "Downloaded {filename} ({size_bytes} bytes) to {}",
            file.path().display()
        );

        Ok(StationFile {
            station_id: station_id.to_string(),
            year,
            size_bytes,
            file,
        })
    }

    fn create_temp_file(&self, station_id: &str, year: i32) -> std::io::Result<NamedTempFile> {
        let prefix = format!("{}h{year}-", station_id.to_lowercase());
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix).suffix(".txt.gz");

        match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }
}

impl Default for ArchiveDownloader {
    fn default() -> Self {
        Self::new()
    }
}
