use chrono::NaiveDate;
use clap::Parser;
use ship_weather_service::db::{SampleRepository, SampleStore};
use ship_weather_service::services::{PredictionService, DEFAULT_PERCENTILE};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "day-predictions")]
#[command(about = "Print per-day wind and wave predictions as JSON", long_about = None)]
struct Cli {
    /// Database connection string
    #[arg(long, env)]
    database_url: String,

    /// First day, inclusive (YYYY-MM-DD)
    #[arg(long)]
    start_date: NaiveDate,

    /// Last day, inclusive (YYYY-MM-DD)
    #[arg(long)]
    end_date: NaiveDate,

    /// Stations to aggregate, comma-separated
    #[arg(long, value_delimiter = ',', required = true)]
    station_ids: Vec<String>,

    /// Percentile in [0, 1]
    #[arg(long, default_value_t = DEFAULT_PERCENTILE)]
    percentile: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&cli.database_url)
        .await?;

    let store: Arc<dyn SampleStore> = Arc::new(SampleRepository::new(pool));
    let service = PredictionService::new(store);

    let predictions = service
        .get_day_predictions(cli.start_date, cli.end_date, &cli.station_ids, cli.percentile)
        .await?;

    info!("Computed {} day predictions", predictions.len());
    println!("{}", serde_json::to_string_pretty(&predictions)?);

    Ok(())
}
