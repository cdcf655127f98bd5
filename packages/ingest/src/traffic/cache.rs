//! Latest aggregate per site.

use std::sync::Arc;

use dashmap::DashMap;

use super::aggregate::AggregateMeasurement;

/// Concurrent map from site id to its most recent aggregate.
///
/// One writer upserts whole aggregates; readers get an `Arc` to a complete
/// value and never see a partly written one. Sites that are absent from a
/// newer publication keep their last value.
#[derive(Debug, Default)]
pub struct MeasurementCache {
    entries: DashMap<String, Arc<AggregateMeasurement>>,
}

impl MeasurementCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the aggregate of one site.
    pub fn upsert(&self, measurement: AggregateMeasurement) {
        self.entries
            .insert(measurement.site_id.clone(), Arc::new(measurement));
    }

    /// Insert or replace several aggregates.
    pub fn upsert_all(&self, measurements: impl IntoIterator<Item = AggregateMeasurement>) -> usize {
        let mut count = 0;
        for measurement in measurements {
            self.upsert(measurement);
            count += 1;
        }
        count
    }

    #[must_use]
    pub fn get(&self, site_id: &str) -> Option<Arc<AggregateMeasurement>> {
        self.entries.get(site_id).map(|entry| Arc::clone(entry.value()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All cached site ids, sorted.
    #[must_use]
    pub fn site_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }
}
