//! The long-lived owner of reference data, cached aggregates and subscribers.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio::sync::mpsc;

use super::aggregate::{aggregate, AggregateMeasurement};
use super::cache::MeasurementCache;
use super::notify::{SubscriptionRegistry, UpdateNotice};
use super::reference::{ReferenceTable, SiteFilter};
use super::stats::DecodeStats;
use crate::config::IngestConfig;
use crate::datex2::{
    decode_records, Catalog, SiteMeasurementsDecoder, VmsUnit, VmsUnitDecoder, VmsUnitRecord,
    VmsUnitRecordDecoder,
};
use crate::error::Result;
use crate::gzip::open_document;

/// Turns measurement publications into cached per-site aggregates.
///
/// All methods take `&self`; share the handler with an `Arc`. Measurement
/// cycles are expected to come from one writer (the scheduler), while
/// lookups and subscriptions may come from any thread.
#[derive(Debug)]
pub struct TrafficHandler {
    reference: ArcSwap<ReferenceTable>,
    sign_table: ArcSwap<Catalog<VmsUnitRecord>>,
    sign_status: ArcSwap<Catalog<VmsUnit>>,
    cache: MeasurementCache,
    subscriptions: SubscriptionRegistry,
    filter: SiteFilter,
    cycles: AtomicU64,
}

impl TrafficHandler {
    /// Create a handler with an empty reference table.
    ///
    /// # Arguments
    /// * `filter` - Sites to keep; measurements for other sites are ignored
    /// * `notify_queue_capacity` - Size of each subscriber's notification queue
    #[must_use]
    pub fn new(filter: SiteFilter, notify_queue_capacity: usize) -> Self {
        Self {
            reference: ArcSwap::from_pointee(ReferenceTable::default()),
            sign_table: ArcSwap::from_pointee(Catalog::default()),
            sign_status: ArcSwap::from_pointee(Catalog::default()),
            cache: MeasurementCache::new(),
            subscriptions: SubscriptionRegistry::new(notify_queue_capacity),
            filter,
            cycles: AtomicU64::new(0),
        }
    }

    /// Create a handler from configuration, reading the site filter file if set.
    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let filter = match &config.site_filter_path {
            Some(path) => {
                let filter = SiteFilter::from_reader(BufReader::new(File::open(path)?))?;
                tracing::info!(path = %path.display(), sites = filter.len(), "Loaded site filter");
                filter
            }
            None => SiteFilter::all(),
        };
        Ok(Self::new(filter, config.notify_queue_capacity))
    }

    /// Decode a (possibly gzipped) measurement publication and update the cache.
    ///
    /// Bad records are skipped and counted. A malformed document fails the
    /// whole cycle and leaves the cache untouched.
    pub fn trigger_decode(&self, bytes: &[u8]) -> Result<DecodeStats> {
        self.decode_measurements(open_document(bytes))
    }

    /// Like [`trigger_decode`](Self::trigger_decode), for an XML stream.
    pub fn decode_measurements<R: BufRead>(&self, input: R) -> Result<DecodeStats> {
        let reference = self.reference.load_full();
        let mut pending: Vec<AggregateMeasurement> = Vec::new();
        let mut reference_mismatches = 0;

        let counts = decode_records(input, &SiteMeasurementsDecoder, |record| {
            if !self.filter.keeps(&record.site_id) {
                return;
            }
            let result = aggregate(&record, reference.site(&record.site_id));
            reference_mismatches += result.reference_mismatches;
            pending.push(result.measurement);
        })?;

        let mut stats = DecodeStats::from_counts(counts);
        stats.reference_mismatches = reference_mismatches;
        stats.sites_updated = self.cache.upsert_all(pending);

        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let report = self.subscriptions.broadcast(&UpdateNotice {
            cycle,
            sites_updated: stats.sites_updated,
            completed_at: Utc::now(),
        });

        tracing::info!(
            cycle,
            records = stats.records_seen,
            decoded = stats.records_decoded,
            errors = stats.record_errors,
            mismatches = stats.reference_mismatches,
            sites = stats.sites_updated,
            notified = report.delivered,
            "Measurement cycle complete"
        );
        Ok(stats)
    }

    /// Replace the reference table from a measurement site table publication.
    ///
    /// On failure the current table stays in force. Returns the number of sites loaded.
    pub fn reload_reference(&self, bytes: &[u8]) -> Result<usize> {
        let table = ReferenceTable::load(open_document(bytes), &self.filter)?;
        let counts = table.counts();
        let sites = table.len();
        self.reference.store(Arc::new(table));
        tracing::info!(sites, records = counts.seen, errors = counts.errors, "Reference table loaded");
        Ok(sites)
    }

    /// Install an already built reference table.
    pub fn set_reference(&self, table: ReferenceTable) {
        self.reference.store(Arc::new(table));
    }

    /// The current reference table.
    #[must_use]
    pub fn reference(&self) -> Arc<ReferenceTable> {
        self.reference.load_full()
    }

    /// Replace the sign location table. Returns the number of sign units.
    pub fn reload_sign_table(&self, bytes: &[u8]) -> Result<usize> {
        let table = Catalog::load(open_document(bytes), &VmsUnitRecordDecoder)?;
        let units = table.len();
        self.sign_table.store(Arc::new(table));
        tracing::info!(units, "Sign table loaded");
        Ok(units)
    }

    /// Replace the sign status. Returns the number of sign units.
    pub fn reload_sign_status(&self, bytes: &[u8]) -> Result<usize> {
        let status = Catalog::load(open_document(bytes), &VmsUnitDecoder)?;
        let units = status.len();
        self.sign_status.store(Arc::new(status));
        tracing::info!(units, "Sign status loaded");
        Ok(units)
    }

    #[must_use]
    pub fn get_aggregate(&self, site_id: &str) -> Option<Arc<AggregateMeasurement>> {
        self.cache.get(site_id)
    }

    #[must_use]
    pub fn cache(&self) -> &MeasurementCache {
        &self.cache
    }

    /// Register for a notice after every measurement cycle.
    pub fn subscribe(&self, client_id: impl Into<String>) -> mpsc::Receiver<UpdateNotice> {
        self.subscriptions.subscribe(client_id)
    }

    pub fn unsubscribe(&self, client_id: &str) -> bool {
        self.subscriptions.unsubscribe(client_id)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Number of completed measurement cycles.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sign_unit_record(&self, id: &str) -> Option<VmsUnitRecord> {
        self.sign_table.load().get(id).cloned()
    }

    #[must_use]
    pub fn sign_unit_records(&self) -> Vec<VmsUnitRecord> {
        self.sign_table.load().iter().cloned().collect()
    }

    #[must_use]
    pub fn sign_unit(&self, id: &str) -> Option<VmsUnit> {
        self.sign_status.load().get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SITES: &str = r#"<d2LogicalModel><payloadPublication><measurementSiteTable>
        <measurementSiteRecord id="S1">
          <measurementSpecificCharacteristics index="1"><measurementSpecificCharacteristics>
            <specificLane>lane1</specificLane>
            <specificVehicleCharacteristics><vehicleType>anyVehicle</vehicleType></specificVehicleCharacteristics>
          </measurementSpecificCharacteristics></measurementSpecificCharacteristics>
          <measurementSpecificCharacteristics index="2"><measurementSpecificCharacteristics>
            <specificLane>lane1</specificLane>
            <specificVehicleCharacteristics><vehicleType>anyVehicle</vehicleType></specificVehicleCharacteristics>
          </measurementSpecificCharacteristics></measurementSpecificCharacteristics>
        </measurementSiteRecord>
      </measurementSiteTable></payloadPublication></d2LogicalModel>"#;

    fn measurements(flow: &str) -> String {
        format!(
            r#"<d2LogicalModel><payloadPublication>
            <siteMeasurements>
              <measurementSiteReference id="S1"/>
              <measurementTimeDefault>2024-03-01T12:00:00Z</measurementTimeDefault>
              <measuredValue index="1"><measuredValue><basicData type="TrafficFlow">
                <vehicleFlow><vehicleFlowRate>{flow}</vehicleFlowRate></vehicleFlow>
              </basicData></measuredValue></measuredValue>
              <measuredValue index="2"><measuredValue><basicData type="TrafficSpeed">
                <averageVehicleSpeed><speed>90</speed></averageVehicleSpeed>
              </basicData></measuredValue></measuredValue>
            </siteMeasurements>
            <siteMeasurements>
              <measurementSiteReference id="S2"/>
              <measurementTimeDefault>2024-03-01T12:00:00Z</measurementTimeDefault>
            </siteMeasurements>
          </payloadPublication></d2LogicalModel>"#
        )
    }

    fn handler() -> TrafficHandler {
        let handler = TrafficHandler::new(SiteFilter::all(), 4);
        handler.reload_reference(SITES.as_bytes()).unwrap();
        handler
    }

    #[test]
    fn test_decode_cycle_updates_cache() {
        let handler = handler();
        let stats = handler.trigger_decode(measurements("600").as_bytes()).unwrap();

        assert_eq!(
            stats,
            DecodeStats {
                records_seen: 2,
                records_decoded: 2,
                record_errors: 0,
                reference_mismatches: 1,
                sites_updated: 2,
            }
        );
        let s1 = handler.get_aggregate("S1").unwrap();
        assert_eq!(s1.total_flow, Some(600.0));
        assert_eq!(s1.avg_speed, Some(90.0));
        assert!(handler.get_aggregate("S2").unwrap().is_undetermined());
        assert!(handler.get_aggregate("does-not-exist").is_none());
        assert_eq!(handler.cycles(), 1);
    }

    #[test]
    fn test_malformed_cycle_leaves_cache() {
        let handler = handler();
        handler.trigger_decode(measurements("600").as_bytes()).unwrap();

        let truncated = measurements("1200");
        let truncated = &truncated[..truncated.len() - 40];
        assert!(handler.trigger_decode(truncated.as_bytes()).is_err());

        assert_eq!(handler.get_aggregate("S1").unwrap().total_flow, Some(600.0));
        assert_eq!(handler.cycles(), 1);
    }

    #[test]
    fn test_failed_reload_keeps_reference() {
        let handler = handler();
        assert!(handler.reload_reference(b"<d2LogicalModel><unclosed>").is_err());
        assert_eq!(handler.reference().len(), 1);
    }

    #[test]
    fn test_filter_skips_other_sites() {
        let handler = TrafficHandler::new(SiteFilter::from_ids(["S1"]), 4);
        handler.reload_reference(SITES.as_bytes()).unwrap();
        let stats = handler.trigger_decode(measurements("10").as_bytes()).unwrap();

        assert_eq!(stats.sites_updated, 1);
        assert!(handler.get_aggregate("S2").is_none());
    }

    #[test]
    fn test_subscribers_notified_per_cycle() {
        let handler = handler();
        let mut receiver = handler.subscribe("client");
        handler.trigger_decode(measurements("10").as_bytes()).unwrap();

        let notice = receiver.try_recv().unwrap();
        assert_eq!(notice.cycle, 1);
        assert_eq!(notice.sites_updated, 2);

        assert!(handler.unsubscribe("client"));
        handler.trigger_decode(measurements("10").as_bytes()).unwrap();
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_sign_tables() {
        let handler = handler();
        let table = r#"<d2LogicalModel><payloadPublication><vmsUnitTable>
            <vmsUnitRecord id="U1" version="1"><numberOfVms>1</numberOfVms></vmsUnitRecord>
          </vmsUnitTable></payloadPublication></d2LogicalModel>"#;
        let status = r#"<d2LogicalModel><payloadPublication>
            <vmsUnit><vmsUnitReference id="U1" version="1"/></vmsUnit>
          </payloadPublication></d2LogicalModel>"#;

        assert_eq!(handler.reload_sign_table(table.as_bytes()).unwrap(), 1);
        assert_eq!(handler.reload_sign_status(status.as_bytes()).unwrap(), 1);
        assert_eq!(handler.sign_unit_record("U1").unwrap().number_of_vms, 1);
        assert_eq!(handler.sign_unit_records().len(), 1);
        assert!(handler.sign_unit("U1").is_some());
        assert!(handler.sign_unit("U2").is_none());
    }
}
