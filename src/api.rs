use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::db::DayPrediction;
use crate::services::{ImportManifest, IngestionService, PredictionService, DEFAULT_PERCENTILE};

#[derive(Clone)]
pub struct AppState {
    pub prediction_service: PredictionService,
    pub ingestion_service: IngestionService,
    /// Station imported when a request names none
    pub default_station_id: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionParams {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Comma-separated station ids
    pub station_ids: String,
    #[serde(default = "default_percentile")]
    pub percentile: f64,
}

fn default_percentile() -> f64 {
    DEFAULT_PERCENTILE
}

impl PredictionParams {
    pub fn station_list(&self) -> Vec<String> {
        self.station_ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Serialize)]
pub struct PredictionResponse {
    pub data: Vec<DayPrediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub start_year: i32,
    /// Exclusive; defaults to `start_year + 1`
    pub end_year: Option<i32>,
    pub station_id: Option<String>,
}

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/predictions", get(get_predictions))
        .route("/imports", post(start_import))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}

#[instrument(skip(_state))]
async fn health(State(_state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");
    let response = HealthResponse {
        status: "healthy".to_string(),
    };
    (StatusCode::OK, Json(response))
}

#[instrument(skip(state), fields(start = %params.start_date, end = %params.end_date))]
async fn get_predictions(
    State(state): State<AppState>,
    Query(params): Query<PredictionParams>,
) -> Result<Json<PredictionResponse>, StatusCode> {
    let station_ids = params.station_list();
    debug!(
        "Fetching day predictions for stations {:?} at percentile {}",
        station_ids, params.percentile
    );

    let data = state
        .prediction_service
        .get_day_predictions(
            params.start_date,
            params.end_date,
            &station_ids,
            params.percentile,
        )
        .await
        .map_err(|e| {
            error!(
                "Failed to fetch day predictions for {} to {}: {}",
                params.start_date, params.end_date, e
            );
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    info!("Returning {} day predictions", data.len());
    Ok(Json(PredictionResponse { data }))
}

#[instrument(skip(state))]
async fn start_import(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Result<Json<ImportManifest>, StatusCode> {
    let end_year = request
        .end_year
        .unwrap_or_else(|| request.start_year.saturating_add(1));
    let station_id = request
        .station_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| state.default_station_id.clone());

    if end_year <= request.start_year {
        warn!(
            "Rejecting import for station {}: empty year range [{}, {})",
            station_id, request.start_year, end_year
        );
        return Err(StatusCode::BAD_REQUEST);
    }

    let manifest = state
        .ingestion_service
        .import_range(&station_id, request.start_year, end_year)
        .await;

    info!(
        "Import for station {} finished: {} imported, {} skipped, {} failed",
        station_id,
        manifest.succeeded(),
        manifest.skipped(),
        manifest.failed()
    );

    Ok(Json(manifest))
}
