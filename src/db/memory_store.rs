use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::db::{last_per_key, DbError, SampleQuery, SampleStore, WeatherSample};

type SampleKey = (DateTime<Utc>, String);

/// In-process [`SampleStore`] for dry-run imports and tests.
///
/// Rows live in a `BTreeMap` keyed by (timestamp, station), which gives
/// `find_many` its ascending order for free. Clones share the same rows.
#[derive(Clone, Default)]
pub struct MemorySampleStore {
    rows: Arc<Mutex<BTreeMap<SampleKey, WeatherSample>>>,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. with fixtures
    pub fn with_samples(samples: impl IntoIterator<Item = WeatherSample>) -> Self {
        let store = Self::new();
        if let Ok(mut rows) = store.rows.lock() {
            for sample in samples {
                rows.insert(key_of(&sample), sample);
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored sample of one station, ascending by timestamp
    pub fn samples_for_station(&self, station_id: &str) -> Vec<WeatherSample> {
        self.rows
            .lock()
            .map(|rows| {
                rows.values()
                    .filter(|s| s.station_id == station_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<SampleKey, WeatherSample>>, DbError> {
        self.rows
            .lock()
            .map_err(|e| DbError::Unavailable(format!("memory store lock poisoned: {e}")))
    }
}

fn key_of(sample: &WeatherSample) -> SampleKey {
    (sample.sample_datetime, sample.station_id.clone())
}

#[async_trait]
impl SampleStore for MemorySampleStore {
    async fn upsert_batch(&self, samples: &[WeatherSample]) -> Result<u64, DbError> {
        let samples = last_per_key(samples);
        let mut rows = self.lock()?;
        for sample in samples.iter() {
            rows.insert(key_of(sample), sample.clone());
        }
        Ok(samples.len() as u64)
    }

    async fn delete_by_keys(
        &self,
        station_id: &str,
        dates: &[DateTime<Utc>],
    ) -> Result<u64, DbError> {
        let mut rows = self.lock()?;
        let deleted = dates
            .iter()
            .filter(|date| rows.remove(&(**date, station_id.to_string())).is_some())
            .count();
        Ok(deleted as u64)
    }

    async fn replace_batch(
        &self,
        station_id: &str,
        samples: &[WeatherSample],
    ) -> Result<u64, DbError> {
        let samples = last_per_key(samples);
        // One guard for delete + insert keeps the pair atomic
        let mut rows = self.lock()?;
        let mut deleted = 0;
        for sample in samples.iter() {
            if rows
                .remove(&(sample.sample_datetime, station_id.to_string()))
                .is_some()
            {
                deleted += 1;
            }
        }
        for sample in samples.iter() {
            rows.insert(key_of(sample), sample.clone());
        }
        debug!(
            station_id = %station_id,
            deleted,
            inserted = samples.len(),
            "Replaced batch in memory store"
        );
        Ok(samples.len() as u64)
    }

    async fn find_many(&self, query: &SampleQuery) -> Result<Vec<WeatherSample>, DbError> {
        let rows = self.lock()?;
        let samples = rows
            .range((query.start, String::new())..)
            .take_while(|((date, _), _)| *date < query.end)
            .map(|(_, sample)| sample)
            .filter(|s| query.station_ids.contains(&s.station_id))
            .filter(|s| !query.require_wind_speed || s.wind_speed_ms.is_some())
            .cloned()
            .collect();
        Ok(samples)
    }
}
