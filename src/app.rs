use sqlx::PgPool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::config::Config;
use crate::db::{SampleRepository, SampleStore};
use crate::services::{IngestionService, PredictionService};

/// Running HTTP server
pub struct Application {
    pub server_handle: JoinHandle<Result<(), std::io::Error>>,
}

impl Application {
    /// Build services on top of the pool and spawn the HTTP API server
    pub async fn build(config: Config, pool: PgPool) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Initializing application components");

        let store: Arc<dyn SampleStore> = Arc::new(SampleRepository::new(pool));

        let prediction_service = PredictionService::new(store.clone());
        let ingestion_service = IngestionService::from_config(&config, store)?;
        info!(
            "Import batch size: {} rows, archive: {}",
            ingestion_service.batch_size(),
            config.archive_base_url
        );

        let app_state = AppState {
            prediction_service,
            ingestion_service,
            default_station_id: config.default_station_id.clone(),
        };
        let app = create_router(app_state).layer(TraceLayer::new_for_http());

        let addr = config.server_addr();
        info!("Starting HTTP server on {}", addr);

        let server_handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            axum::serve(listener, app).await
        });

        info!("Application initialized successfully");

        Ok(Self { server_handle })
    }

    /// Run until the server stops (which runs indefinitely unless error)
    pub async fn run_until_stopped(self) -> Result<(), Box<dyn std::error::Error>> {
        self.server_handle.await??;
        Ok(())
    }
}
