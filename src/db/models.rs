use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// Database entity models

/// One observation from a station's stdmet archive file.
///
/// Keyed by (`sample_datetime`, `station_id`). Every measurement is optional:
/// archive "missing" codes are normalized to `None` before a sample is built.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherSample {
    pub station_id: String,
    pub sample_datetime: DateTime<Utc>,
    pub wind_speed_ms: Option<f64>,
    pub air_temperature_c: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub gust_speed_ms: Option<f64>,
    pub wave_height_m: Option<f64>,
    pub dominant_wave_period_s: Option<f64>,
    pub average_wave_period_s: Option<f64>,
    pub mean_wave_direction_deg: Option<f64>,
    pub air_pressure_hpa: Option<f64>,
    pub water_temperature_c: Option<f64>,
    pub dew_point_c: Option<f64>,
    pub visibility_nmi: Option<f64>,
    pub tide_height_ft: Option<f64>,
}

impl WeatherSample {
    /// A sample with no measurements at all
    pub fn empty(station_id: impl Into<String>, sample_datetime: DateTime<Utc>) -> Self {
        Self {
            station_id: station_id.into(),
            sample_datetime,
            wind_speed_ms: None,
            air_temperature_c: None,
            wind_direction_deg: None,
            gust_speed_ms: None,
            wave_height_m: None,
            dominant_wave_period_s: None,
            average_wave_period_s: None,
            mean_wave_direction_deg: None,
            air_pressure_hpa: None,
            water_temperature_c: None,
            dew_point_c: None,
            visibility_nmi: None,
            tide_height_ft: None,
        }
    }
}

/// Filter for reading samples back out of a store
#[derive(Debug, Clone)]
pub struct SampleQuery {
    pub station_ids: Vec<String>,
    /// Inclusive lower bound
    pub start: DateTime<Utc>,
    /// Exclusive upper bound
    pub end: DateTime<Utc>,
    /// Only return samples that carry a wind speed
    pub require_wind_speed: bool,
}

// API response DTOs (to avoid circular dependency between services and api modules)

/// Representative ocean conditions for one calendar day
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayPrediction {
    pub date: NaiveDate,
    pub wind_speed_kts: f64,
    /// Measured when the day has wave data, otherwise a Beaufort estimate
    pub wave_height_ft: f64,
    pub wave_period_s: Option<f64>,
    /// Reserved: 1 pleasant, 2 unpleasant, 3 stormy. Never populated yet.
    pub weather_instability: Option<u8>,
    pub raw_data: Vec<WeatherSample>,
}
