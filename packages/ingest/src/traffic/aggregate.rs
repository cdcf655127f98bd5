//! Per-site flow and speed aggregation.
//!
//! A site's measured values are only comparable after resolving each value
//! index against the reference table. Only values that count all vehicle
//! classes on a lane take part; the site's total flow is the sum over lanes and
//! its speed is the flow-weighted average of the lane speeds.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::datex2::{MeasurementKind, RawMeasurementValue, SiteCharacteristics, SiteMeasurementRecord};

/// Flow and speed of one lane. `None` means the value could not be determined.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaneMeasurement {
    /// Lane id from the reference table, e.g. `lane1`.
    pub lane: String,
    /// Vehicles per hour.
    pub flow: Option<f64>,
    /// km/h.
    pub speed: Option<f64>,
}

/// Aggregated traffic state of one site.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMeasurement {
    /// Measurement site id.
    pub site_id: String,
    /// Measurement time of the record the aggregate was built from.
    pub timestamp: DateTime<Utc>,
    /// Sum of lane flows in vehicles per hour.
    pub total_flow: Option<f64>,
    /// Flow-weighted average speed in km/h over lanes with a usable speed.
    pub avg_speed: Option<f64>,
    /// Lanes in lane id order; empty when the site is undetermined.
    pub lanes: Vec<LaneMeasurement>,
}

impl AggregateMeasurement {
    /// An aggregate for a site whose flow and speed cannot be determined.
    #[must_use]
    pub fn undetermined(site_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            site_id: site_id.into(),
            timestamp,
            total_flow: None,
            avg_speed: None,
            lanes: Vec::new(),
        }
    }

    /// Whether neither flow nor speed is known.
    #[must_use]
    pub fn is_undetermined(&self) -> bool {
        self.total_flow.is_none() && self.avg_speed.is_none() && self.lanes.is_empty()
    }
}

/// Result of aggregating one site measurement record.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// The aggregate to publish for the site.
    pub measurement: AggregateMeasurement,
    /// Lookups that missed the reference table: the site itself, or value indices.
    pub reference_mismatches: usize,
}

/// Aggregate a site's raw values against its reference characteristics.
///
/// A missing site, an empty flow set, or a different number of flow and speed
/// lanes yields an undetermined aggregate. Never fails.
///
/// # Examples
/// ```
/// use std::collections::BTreeMap;
/// use chrono::Utc;
/// use trafficflow_ingest::datex2::{
///     IndexCharacteristics, MeasurementKind, RawMeasurementValue, SiteCharacteristics,
///     SiteMeasurementRecord, ANY_VEHICLE,
/// };
/// use trafficflow_ingest::traffic::aggregate;
///
/// let lane = |index, value_type: &str| {
///     (index, IndexCharacteristics {
///         lane: "lane1".to_string(),
///         value_type: value_type.to_string(),
///         vehicle_class: ANY_VEHICLE.to_string(),
///     })
/// };
/// let site = SiteCharacteristics {
///     site_id: "S".to_string(),
///     version: "1".to_string(),
///     per_index: BTreeMap::from([lane(1, "trafficFlow"), lane(2, "trafficSpeed")]),
/// };
/// let value = |index, kind, value| RawMeasurementValue {
///     index, kind, value, inputs_used: 60, data_error: false,
/// };
/// let record = SiteMeasurementRecord {
///     site_id: "S".to_string(),
///     timestamp: Utc::now(),
///     values: vec![
///         value(1, MeasurementKind::Flow, 600.0),
///         value(2, MeasurementKind::Speed, 100.0),
///     ],
/// };
///
/// let result = aggregate(&record, Some(&site));
/// assert_eq!(result.measurement.total_flow, Some(600.0));
/// assert_eq!(result.measurement.avg_speed, Some(100.0));
/// ```
pub fn aggregate(
    record: &SiteMeasurementRecord,
    site: Option<&SiteCharacteristics>,
) -> Aggregation {
    let Some(site) = site else {
        tracing::debug!(site_id = %record.site_id, "Site not in reference table");
        return Aggregation {
            measurement: AggregateMeasurement::undetermined(&record.site_id, record.timestamp),
            reference_mismatches: 1,
        };
    };

    let mut reference_mismatches = 0;
    let mut flow_by_lane: BTreeMap<&str, &RawMeasurementValue> = BTreeMap::new();
    let mut speed_by_lane: BTreeMap<&str, &RawMeasurementValue> = BTreeMap::new();

    for value in &record.values {
        let Some(characteristics) = site.index(value.index) else {
            reference_mismatches += 1;
            tracing::debug!(
                site_id = %record.site_id,
                index = value.index,
                "Measured value index not in reference table"
            );
            continue;
        };
        if !characteristics.is_any_vehicle() {
            continue;
        }
        let lane = characteristics.lane.as_str();
        match value.kind {
            MeasurementKind::Flow => {
                flow_by_lane.insert(lane, value);
            }
            MeasurementKind::Speed => {
                speed_by_lane.insert(lane, value);
            }
            MeasurementKind::Unknown(_) => {}
        }
    }

    if flow_by_lane.is_empty() || flow_by_lane.len() != speed_by_lane.len() {
        return Aggregation {
            measurement: AggregateMeasurement::undetermined(&record.site_id, record.timestamp),
            reference_mismatches,
        };
    }

    let lanes: Vec<LaneMeasurement> = flow_by_lane
        .iter()
        .map(|(lane, flow)| {
            let flow = usable(flow);
            let speed = match (flow, speed_by_lane.get(lane)) {
                (Some(rate), Some(speed)) if rate > 0.0 => usable(speed),
                _ => None,
            };
            LaneMeasurement {
                lane: (*lane).to_string(),
                flow,
                speed,
            }
        })
        .collect();

    let total_flow = lanes
        .iter()
        .filter_map(|lane| lane.flow)
        .fold(None, |sum: Option<f64>, flow| Some(sum.unwrap_or(0.0) + flow));
    // Lanes without a usable speed stay out of both sums.
    let (weighted_speed, speed_flow) = lanes
        .iter()
        .filter_map(|lane| Some((lane.flow?, lane.speed?)))
        .fold((0.0, 0.0), |(weighted, flow_sum), (flow, speed)| {
            (weighted + flow * speed, flow_sum + flow)
        });
    let avg_speed = (speed_flow > 0.0).then(|| weighted_speed / speed_flow);

    Aggregation {
        measurement: AggregateMeasurement {
            site_id: record.site_id.clone(),
            timestamp: record.timestamp,
            total_flow,
            avg_speed,
            lanes,
        },
        reference_mismatches,
    }
}

fn usable(value: &RawMeasurementValue) -> Option<f64> {
    (!value.data_error && value.value.is_finite()).then_some(value.value)
}
