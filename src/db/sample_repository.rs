use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use tracing::{debug, error, info, instrument};

use crate::db::{last_per_key, DbError, SampleQuery, SampleStore, WeatherSample};

// Whole batches go in as one array per column. A 5000-row batch with 15 columns
// would overflow the 65535 bind parameter limit of a multi-row VALUES insert.
const INSERT_SAMPLES_SQL: &str = r#"
    INSERT INTO weather_sensor_samples (
        station_id, sample_datetime, wind_speed_ms, air_temperature_c,
        wind_direction_deg, gust_speed_ms, wave_height_m, dominant_wave_period_s,
        average_wave_period_s, mean_wave_direction_deg, air_pressure_hpa,
        water_temperature_c, dew_point_c, visibility_nmi, tide_height_ft
    )
    SELECT * FROM UNNEST(
        $1::text[], $2::timestamptz[], $3::float8[], $4::float8[], $5::float8[],
        $6::float8[], $7::float8[], $8::float8[], $9::float8[], $10::float8[],
        $11::float8[], $12::float8[], $13::float8[], $14::float8[], $15::float8[]
    )
"#;

const UPSERT_CONFLICT_SQL: &str = r#"
    ON CONFLICT (sample_datetime, station_id) DO UPDATE SET
        wind_speed_ms = EXCLUDED.wind_speed_ms,
        air_temperature_c = EXCLUDED.air_temperature_c,
        wind_direction_deg = EXCLUDED.wind_direction_deg,
        gust_speed_ms = EXCLUDED.gust_speed_ms,
        wave_height_m = EXCLUDED.wave_height_m,
        dominant_wave_period_s = EXCLUDED.dominant_wave_period_s,
        average_wave_period_s = EXCLUDED.average_wave_period_s,
        mean_wave_direction_deg = EXCLUDED.mean_wave_direction_deg,
        air_pressure_hpa = EXCLUDED.air_pressure_hpa,
        water_temperature_c = EXCLUDED.water_temperature_c,
        dew_point_c = EXCLUDED.dew_point_c,
        visibility_nmi = EXCLUDED.visibility_nmi,
        tide_height_ft = EXCLUDED.tide_height_ft
"#;

const DELETE_BY_KEYS_SQL: &str = r#"
    DELETE FROM weather_sensor_samples
    WHERE station_id = $1 AND sample_datetime = ANY($2)
"#;

const FIND_SAMPLES_SQL: &str = r#"
    SELECT station_id, sample_datetime, wind_speed_ms, air_temperature_c,
           wind_direction_deg, gust_speed_ms, wave_height_m, dominant_wave_period_s,
           average_wave_period_s, mean_wave_direction_deg, air_pressure_hpa,
           water_temperature_c, dew_point_c, visibility_nmi, tide_height_ft
    FROM weather_sensor_samples
    WHERE station_id = ANY($1)
      AND sample_datetime >= $2
      AND sample_datetime < $3
      AND (NOT $4::boolean OR wind_speed_ms IS NOT NULL)
    ORDER BY sample_datetime ASC, station_id ASC
"#;

/// PostgreSQL-backed [`SampleStore`]
#[derive(Clone)]
pub struct SampleRepository {
    pool: PgPool,
}

impl SampleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Count stored samples for one station
    #[instrument(skip(self))]
    pub async fn count_for_station(&self, station_id: &str) -> Result<i64, DbError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM weather_sensor_samples WHERE station_id = $1")
                .bind(station_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

/// Column-major copy of a batch, ready to bind as UNNEST arrays
struct SampleColumns {
    station_ids: Vec<String>,
    sample_datetimes: Vec<DateTime<Utc>>,
    wind_speed_ms: Vec<Option<f64>>,
    air_temperature_c: Vec<Option<f64>>,
    wind_direction_deg: Vec<Option<f64>>,
    gust_speed_ms: Vec<Option<f64>>,
    wave_height_m: Vec<Option<f64>>,
    dominant_wave_period_s: Vec<Option<f64>>,
    average_wave_period_s: Vec<Option<f64>>,
    mean_wave_direction_deg: Vec<Option<f64>>,
    air_pressure_hpa: Vec<Option<f64>>,
    water_temperature_c: Vec<Option<f64>>,
    dew_point_c: Vec<Option<f64>>,
    visibility_nmi: Vec<Option<f64>>,
    tide_height_ft: Vec<Option<f64>>,
}

impl SampleColumns {
    fn from_samples(samples: &[WeatherSample]) -> Self {
        let column = |f: fn(&WeatherSample) -> Option<f64>| -> Vec<Option<f64>> {
            samples.iter().map(f).collect()
        };

        Self {
            station_ids: samples.iter().map(|s| s.station_id.clone()).collect(),
            sample_datetimes: samples.iter().map(|s| s.sample_datetime).collect(),
            wind_speed_ms: column(|s| s.wind_speed_ms),
            air_temperature_c: column(|s| s.air_temperature_c),
            wind_direction_deg: column(|s| s.wind_direction_deg),
            gust_speed_ms: column(|s| s.gust_speed_ms),
            wave_height_m: column(|s| s.wave_height_m),
            dominant_wave_period_s: column(|s| s.dominant_wave_period_s),
            average_wave_period_s: column(|s| s.average_wave_period_s),
            mean_wave_direction_deg: column(|s| s.mean_wave_direction_deg),
            air_pressure_hpa: column(|s| s.air_pressure_hpa),
            water_temperature_c: column(|s| s.water_temperature_c),
            dew_point_c: column(|s| s.dew_point_c),
            visibility_nmi: column(|s| s.visibility_nmi),
            tide_height_ft: column(|s| s.tide_height_ft),
        }
    }

    fn bind(self, query: Query<'_, Postgres, PgArguments>) -> Query<'_, Postgres, PgArguments> {
        query
            .bind(self.station_ids)
            .bind(self.sample_datetimes)
            .bind(self.wind_speed_ms)
            .bind(self.air_temperature_c)
            .bind(self.wind_direction_deg)
            .bind(self.gust_speed_ms)
            .bind(self.wave_height_m)
            .bind(self.dominant_wave_period_s)
            .bind(self.average_wave_period_s)
            .bind(self.mean_wave_direction_deg)
            .bind(self.air_pressure_hpa)
            .bind(self.water_temperature_c)
            .bind(self.dew_point_c)
            .bind(self.visibility_nmi)
            .bind(self.tide_height_ft)
    }
}

#[async_trait]
impl SampleStore for SampleRepository {
    #[instrument(skip(self, samples), fields(count = samples.len()))]
    async fn upsert_batch(&self, samples: &[WeatherSample]) -> Result<u64, DbError> {
        if samples.is_empty() {
            return Ok(0);
        }

        // ON CONFLICT DO UPDATE rejects a key that appears twice in one statement
        let samples = last_per_key(samples);
        let sql = format!("{INSERT_SAMPLES_SQL}{UPSERT_CONFLICT_SQL}");
        let result = SampleColumns::from_samples(&samples)
            .bind(sqlx::query(&sql))
            .execute(&self.pool)
            .await?;

        debug!("Upserted {} samples", result.rows_affected());
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, dates), fields(station_id = %station_id, count = dates.len()))]
    async fn delete_by_keys(
        &self,
        station_id: &str,
        dates: &[DateTime<Utc>],
    ) -> Result<u64, DbError> {
        let result = sqlx::query(DELETE_BY_KEYS_SQL)
            .bind(station_id)
            .bind(dates.to_vec())
            .execute(&self.pool)
            .await?;

        debug!("Deleted {} samples", result.rows_affected());
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, samples), fields(station_id = %station_id, count = samples.len()))]
    async fn replace_batch(
        &self,
        station_id: &str,
        samples: &[WeatherSample],
    ) -> Result<u64, DbError> {
        if samples.is_empty() {
            return Ok(0);
        }

        let samples = last_per_key(samples);
        debug!(
            "Beginning transaction to replace {} samples",
            samples.len()
        );
        let dates: Vec<DateTime<Utc>> = samples.iter().map(|s| s.sample_datetime).collect();
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(DELETE_BY_KEYS_SQL)
            .bind(station_id)
            .bind(dates)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let inserted = SampleColumns::from_samples(&samples)
            .bind(sqlx::query(INSERT_SAMPLES_SQL))
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(station_id = %station_id, error = %e, "Failed to insert sample batch");
                e
            })?
            .rows_affected();

        tx.commit().await?;
        info!(
            "Replaced batch: {} existing rows deleted, {} rows inserted",
            deleted, inserted
        );
        Ok(inserted)
    }

    #[instrument(skip(self, query), fields(stations = query.station_ids.len(), start = %query.start, end = %query.end))]
    async fn find_many(&self, query: &SampleQuery) -> Result<Vec<WeatherSample>, DbError> {
        debug!("Querying samples from {} to {}", query.start, query.end);

        let samples = sqlx::query_as::<_, WeatherSample>(FIND_SAMPLES_SQL)
            .bind(query.station_ids.clone())
            .bind(query.start)
            .bind(query.end)
            .bind(query.require_wind_speed)
            .fetch_all(&self.pool)
            .await?;

        debug!("Found {} samples", samples.len());
        Ok(samples)
    }
}
