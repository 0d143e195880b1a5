use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::db::{DbError, SampleQuery, WeatherSample};

/// Durable keyed storage for weather samples.
///
/// Rows are keyed by (`sample_datetime`, `station_id`). Implementations must run
/// [`SampleStore::replace_batch`] as a single atomic unit: either every row of the
/// batch replaced its predecessor, or nothing changed.
///
/// A batch may repeat a key; the last sample for that key is the one stored and
/// write counts cover distinct keys only.
#[async_trait]
pub trait SampleStore: Send + Sync {
    /// Insert samples, overwriting any row that already has the same key.
    /// Returns the number of distinct rows written.
    async fn upsert_batch(&self, samples: &[WeatherSample]) -> Result<u64, DbError>;

    /// Delete the rows of one station at the given timestamps.
    /// Returns the number of rows removed.
    async fn delete_by_keys(
        &self,
        station_id: &str,
        dates: &[DateTime<Utc>],
    ) -> Result<u64, DbError>;

    /// Atomically delete every existing row of `station_id` whose timestamp appears
    /// in `samples`, then insert `samples`. Returns the number of distinct rows inserted.
    async fn replace_batch(
        &self,
        station_id: &str,
        samples: &[WeatherSample],
    ) -> Result<u64, DbError>;

    /// Samples matching the query, ordered by timestamp ascending (then station).
    async fn find_many(&self, query: &SampleQuery) -> Result<Vec<WeatherSample>, DbError>;
}

/// Collapse repeated (`sample_datetime`, `station_id`) keys, keeping the last
/// sample for each key at the position of its first occurrence.
///
/// Borrows the input unchanged when every key is already unique.
pub fn last_per_key(samples: &[WeatherSample]) -> Cow<'_, [WeatherSample]> {
    let mut slots: HashMap<(DateTime<Utc>, &str), usize> = HashMap::with_capacity(samples.len());
    let mut unique: Vec<&WeatherSample> = Vec::with_capacity(samples.len());

    for sample in samples {
        match slots.entry((sample.sample_datetime, sample.station_id.as_str())) {
            Entry::Occupied(slot) => unique[*slot.get()] = sample,
            Entry::Vacant(slot) => {
                slot.insert(unique.len());
                unique.push(sample);
            }
        }
    }

    if unique.len() == samples.len() {
        Cow::Borrowed(samples)
    } else {
        Cow::Owned(unique.into_iter().cloned().collect())
    }
}
