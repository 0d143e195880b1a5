use clap::Parser;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use ship_weather_service::config::Config;
use ship_weather_service::db::{MemorySampleStore, SampleRepository, SampleStore};
use ship_weather_service::importers::{ArchiveDownloader, DEFAULT_ARCHIVE_BASE_URL};
use ship_weather_service::services::{ImportManifest, IngestionService, YearStatus};
use sqlx::postgres::PgPoolOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "historical-import")]
#[command(about = "Import NDBC historical stdmet archives for one or more stations", long_about = None)]
struct Cli {
    /// Database connection string (not needed with --dry-run)
    #[arg(long, env)]
    database_url: Option<String>,

    /// Station ID (e.g., "41002")
    #[arg(long, env = "DEFAULT_STATION_ID", default_value = "41002")]
    station_id: String,

    /// Additional stations, comma-separated; replaces --station-id when given
    #[arg(long, value_delimiter = ',')]
    stations: Vec<String>,

    /// First year to import
    #[arg(long)]
    start_year: i32,

    /// End year, exclusive (default: start year + 1)
    #[arg(long)]
    end_year: Option<i32>,

    /// Number of stations imported concurrently
    #[arg(long, default_value = "2")]
    parallel: usize,

    /// Rows per committed batch
    #[arg(long, env = "IMPORT_BATCH_SIZE", default_value = "5000")]
    batch_size: usize,

    /// Archive root URL
    #[arg(long, env = "ARCHIVE_BASE_URL", default_value = DEFAULT_ARCHIVE_BASE_URL)]
    archive_base_url: String,

    /// Per-request download timeout in seconds
    #[arg(long, env = "DOWNLOAD_TIMEOUT_SECS", default_value = "60")]
    download_timeout_secs: u64,

    /// Retries for transient download failures (0 disables retrying)
    #[arg(long, env = "DOWNLOAD_MAX_RETRIES", default_value = "3")]
    download_max_retries: usize,

    /// Directory for downloaded temp files (default: system temp dir)
    #[arg(long, env = "IMPORT_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Parse and batch into memory without touching the database
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn station_ids(&self) -> Vec<String> {
        let stations: Vec<String> = self
            .stations
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if stations.is_empty() {
            vec![self.station_id.clone()]
        } else {
            stations
        }
    }

    fn config(&self, database_url: String) -> Config {
        Config {
            database_url,
            server_host: String::new(),
            server_port: 0,
            archive_base_url: self.archive_base_url.clone(),
            import_batch_size: self.batch_size,
            import_temp_dir: self.temp_dir.clone(),
            download_timeout_secs: self.download_timeout_secs,
            download_max_retries: self.download_max_retries,
            default_station_id: self.station_id.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if it exists (ignore errors if not found)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let start_time = Instant::now();

    let end_year = cli.end_year.unwrap_or(cli.start_year + 1);
    if end_year <= cli.start_year {
        return Err(format!(
            "--end-year ({end_year}) must be greater than --start-year ({}); the end year is exclusive",
            cli.start_year
        )
        .into());
    }

    let (store, config): (Arc<dyn SampleStore>, Config) = if cli.dry_run {
        info!("Dry run: samples are kept in memory only");
        let store: Arc<dyn SampleStore> = Arc::new(MemorySampleStore::new());
        (store, cli.config(String::new()))
    } else {
        let database_url = cli
            .database_url
            .clone()
            .ok_or("--database-url (or DATABASE_URL) is required unless --dry-run is set")?;

        info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        let store: Arc<dyn SampleStore> = Arc::new(SampleRepository::new(pool));
        (store, cli.config(database_url))
    };

    let downloader = ArchiveDownloader::from_config(&config)?;
    let service = IngestionService::new(downloader, store).with_batch_size(config.import_batch_size);

    let station_ids = cli.station_ids();
    info!(
        "Importing {} station(s), years [{}, {})",
        station_ids.len(),
        cli.start_year,
        end_year
    );

    let pb = ProgressBar::new(station_ids.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} stations ({msg})")?
            .progress_chars("##-"),
    );

    let start_year = cli.start_year;
    let manifests: Vec<ImportManifest> = stream::iter(station_ids)
        .map(|station_id| {
            let service = service.clone();
            let pb = pb.clone();
            async move {
                let manifest = service.import_range(&station_id, start_year, end_year).await;
                pb.set_message(format!("{station_id}: {} rows", manifest.total_rows()));
                pb.inc(1);
                manifest
            }
        })
        .buffer_unordered(cli.parallel.max(1))
        .collect()
        .await;

    pb.finish_with_message("done");

    print_summary(&manifests, start_time.elapsed(), cli.dry_run);

    let total_years: usize = manifests.iter().map(|m| m.years.len()).sum();
    let failed_years: usize = manifests.iter().map(|m| m.failed()).sum();
    if total_years > 0 && failed_years == total_years {
        return Err(format!("All {total_years} station-years failed to import").into());
    }
    if failed_years > 0 {
        warn!("{failed_years} of {total_years} station-years failed");
    }

    info!("Import completed");
    Ok(())
}

fn print_summary(manifests: &[ImportManifest], elapsed: std::time::Duration, dry_run: bool) {
    println!("\n{}", "=".repeat(60));
    println!("Import Summary{}", if dry_run { " (dry run)" } else { "" });
    println!("{}", "=".repeat(60));

    for manifest in manifests {
        println!(
            "Station {} [{}, {}): {} imported, {} skipped, {} failed, {} rows",
            manifest.station_id,
            manifest.start_year,
            manifest.end_year,
            manifest.succeeded(),
            manifest.skipped(),
            manifest.failed(),
            manifest.total_rows()
        );

        for outcome in &manifest.years {
            match &outcome.status {
                YearStatus::Imported { stats } => println!(
                    "  {}  imported  {} rows ({} duplicates, {} bad rows)",
                    outcome.year, stats.rows_persisted, stats.duplicates_dropped, stats.rows_skipped
                ),
                YearStatus::Skipped { reason } => {
                    println!("  {}  skipped   {reason}", outcome.year)
                }
                YearStatus::Failed {
                    stage,
                    error,
                    batches_committed,
                } => println!(
                    "  {}  FAILED    {stage:?}: {error} ({batches_committed} batches committed)",
                    outcome.year
                ),
            }
        }
    }

    println!("{}", "-".repeat(60));
    println!("Total rows:         {}", manifests.iter().map(|m| m.total_rows()).sum::<u64>());
    println!("Elapsed:            {:.2}s", elapsed.as_secs_f64());
    println!("{}", "=".repeat(60));
}
