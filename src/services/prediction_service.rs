use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::beaufort::{estimate_wave_height_ft, meters_to_feet, ms_to_knots};
use crate::db::{DayPrediction, DbError, SampleQuery, SampleStore, WeatherSample};

pub const DEFAULT_PERCENTILE: f64 = 0.95;

/// Longest allowed distance between start and end date
pub const MAX_RANGE_DAYS: i64 = 365;

#[derive(Clone)]
pub struct PredictionService {
    store: Arc<dyn SampleStore>,
}

impl PredictionService {
    pub fn new(store: Arc<dyn SampleStore>) -> Self {
        Self { store }
    }

    /// One prediction per calendar day in `[start_date, end_date]` that has samples
    ///
    /// Invalid input (reversed or over-long range, no stations, percentile
    /// outside `[0, 1]`) yields an empty list rather than an error. Only store
    /// failures are returned as `Err`.
    #[instrument(skip(self, station_ids), fields(stations = station_ids.len()))]
    pub async fn get_day_predictions(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
        station_ids: &[String],
        percentile: f64,
    ) -> Result<Vec<DayPrediction>, DbError> {
        if end_date < start_date {
            warn!("End date {} is before start date {}", end_date, start_date);
            return Ok(Vec::new());
        }
        if (end_date - start_date).num_days() > MAX_RANGE_DAYS {
            warn!(
                "Range {} to {} exceeds {} days",
                start_date, end_date, MAX_RANGE_DAYS
            );
            return Ok(Vec::new());
        }
        if station_ids.is_empty() {
            warn!("No stations requested");
            return Ok(Vec::new());
        }
        if !percentile.is_finite() || !(0.0..=1.0).contains(&percentile) {
            warn!("Percentile {} is outside [0, 1]", percentile);
            return Ok(Vec::new());
        }
        let Some(day_after_end) = end_date.succ_opt() else {
            warn!("End date {} has no following day", end_date);
            return Ok(Vec::new());
        };

        let query = SampleQuery {
            station_ids: station_ids.to_vec(),
            start: start_of_day(start_date),
            end: start_of_day(day_after_end),
            require_wind_speed: true,
        };

        let samples = self.store.find_many(&query).await?;
        debug!("Aggregating {} samples", samples.len());

        let predictions = aggregate_days(samples, percentile);

        info!(
            "Built {} day predictions for {} to {}",
            predictions.len(),
            start_date,
            end_date
        );

        Ok(predictions)
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(date.and_time(NaiveTime::MIN), Utc)
}

/// Per-day values collected before the percentile pick
struct DayAccumulator {
    date: NaiveDate,
    wind_speed_kts: Vec<f64>,
    wave_height_ft: Vec<f64>,
    wave_period_s: Vec<f64>,
    raw_data: Vec<WeatherSample>,
}

impl DayAccumulator {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            wind_speed_kts: Vec::new(),
            wave_height_ft: Vec::new(),
            wave_period_s: Vec::new(),
            raw_data: Vec::new(),
        }
    }

    fn add(&mut self, wind_speed_ms: f64, sample: WeatherSample) {
        let wind_kts = ms_to_knots(wind_speed_ms);
        let wave_ft = sample
            .wave_height_m
            .map(meters_to_feet)
            .unwrap_or_else(|| estimate_wave_height_ft(wind_kts));

        self.wind_speed_kts.push(wind_kts);
        self.wave_height_ft.push(wave_ft);
        if let Some(period) = sample.dominant_wave_period_s {
            self.wave_period_s.push(period);
        }
        self.raw_data.push(sample);
    }

    fn finish(mut self, percentile: f64) -> Option<DayPrediction> {
        Some(DayPrediction {
            date: self.date,
            wind_speed_kts: percentile_pick(&mut self.wind_speed_kts, percentile)?,
            wave_height_ft: percentile_pick(&mut self.wave_height_ft, percentile)?,
            wave_period_s: percentile_pick(&mut self.wave_period_s, percentile),
            weather_instability: None,
            raw_data: self.raw_data,
        })
    }
}

/// Group samples by UTC calendar day, in first-encounter order
fn aggregate_days(samples: Vec<WeatherSample>, percentile: f64) -> Vec<DayPrediction> {
    let mut days: Vec<DayAccumulator> = Vec::new();
    let mut index: HashMap<NaiveDate, usize> = HashMap::new();

    for sample in samples {
        let Some(wind_speed_ms) = sample.wind_speed_ms else {
            continue;
        };
        let date = sample.sample_datetime.date_naive();
        let slot = *index.entry(date).or_insert_with(|| {
            days.push(DayAccumulator::new(date));
            days.len() - 1
        });
        days[slot].add(wind_speed_ms, sample);
    }

    days.into_iter()
        .filter_map(|day| day.finish(percentile))
        .collect()
}

/// Order-statistic percentile: sort ascending, take index `floor(p * n)`.
///
/// The index is clamped to the last element so `p = 1.0` picks the maximum.
/// Returns `None` for an empty slice.
///
/// ```
/// use ship_weather_service::services::prediction_service::percentile_pick;
///
/// let mut values = vec![3.0, 1.0, 2.0, 4.0];
/// assert_eq!(percentile_pick(&mut values, 0.5), Some(3.0));
/// assert_eq!(percentile_pick(&mut values, 1.0), Some(4.0));
/// assert_eq!(percentile_pick(&mut [], 0.95), None);
/// ```
pub fn percentile_pick(values: &mut [f64], percentile: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let index = ((percentile * values.len() as f64).floor() as usize).min(values.len() - 1);
    Some(values[index])
}
