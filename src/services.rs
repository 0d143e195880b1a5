pub mod ingestion_service;
pub mod prediction_service;

pub use ingestion_service::{
    ImportError, ImportManifest, ImportStage, ImportStats, IngestionService, SampleBatcher,
    YearOutcome, YearStatus,
};
pub use prediction_service::{PredictionService, DEFAULT_PERCENTILE};
