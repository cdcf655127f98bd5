//! Site measurements from the measured data publication (`trafficspeed.xml`).

use chrono::{DateTime, Utc};
use roxmltree::Node;

use super::RecordDecoder;
use crate::error::DecodeError;
use crate::xml::{
    find_by_path, find_child, find_children, get_attribute, parse_bool_at, parse_number_at,
    parse_number_attribute, require_number_attribute, text_at,
};

/// What a measured value measures, from the `basicData` type discriminant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeasurementKind {
    /// Vehicle flow rate in vehicles per hour.
    Flow,
    /// Average vehicle speed in km/h.
    Speed,
    /// Any other basic data type; carries the raw type name.
    Unknown(String),
}

/// `basicData` type → kind, with the payload element and its value element.
static KIND_TABLE: &[(&str, MeasurementKind, &str, &str)] = &[
    ("TrafficFlow", MeasurementKind::Flow, "vehicleFlow", "vehicleFlowRate"),
    ("TrafficSpeed", MeasurementKind::Speed, "averageVehicleSpeed", "speed"),
];

impl MeasurementKind {
    /// Map a `basicData` type attribute to a kind.
    ///
    /// # Examples
    /// ```
    /// use trafficflow_ingest::datex2::MeasurementKind;
    ///
    /// assert_eq!(MeasurementKind::from_type("TrafficFlow"), MeasurementKind::Flow);
    /// assert_eq!(MeasurementKind::from_type("d2:TrafficSpeed"), MeasurementKind::Speed);
    /// assert_eq!(
    ///     MeasurementKind::from_type("TrafficConcentration"),
    ///     MeasurementKind::Unknown("TrafficConcentration".to_string())
    /// );
    /// ```
    #[must_use]
    pub fn from_type(raw: &str) -> Self {
        let local = raw.rsplit(':').next().unwrap_or(raw);
        KIND_TABLE
            .iter()
            .find(|(name, ..)| *name == local)
            .map_or_else(
                || MeasurementKind::Unknown(raw.to_string()),
                |(_, kind, ..)| kind.clone(),
            )
    }

    fn payload_elements(&self) -> Option<(&'static str, &'static str)> {
        KIND_TABLE
            .iter()
            .find(|(_, kind, ..)| kind == self)
            .map(|(_, _, payload, value)| (*payload, *value))
    }
}

/// One measured value of a site, before it is matched to its lane.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMeasurementValue {
    /// 1-based index into the site's characteristics.
    pub index: u32,
    /// Flow or speed, from the `basicData` type.
    pub kind: MeasurementKind,
    /// Flow rate or speed; `NaN` when the value is absent and flagged as an error.
    pub value: f64,
    /// `numberOfInputValuesUsed`; 0 when absent.
    pub inputs_used: u32,
    /// The station flagged the value as unreliable.
    pub data_error: bool,
}

/// All measured values of one site at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteMeasurementRecord {
    /// `measurementSiteReference` id.
    pub site_id: String,
    /// `measurementTimeDefault`, normalized to UTC.
    pub timestamp: DateTime<Utc>,
    /// Measured values in document order.
    pub values: Vec<RawMeasurementValue>,
}

/// Decoder for `siteMeasurements` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiteMeasurementsDecoder;

impl RecordDecoder for SiteMeasurementsDecoder {
    type Record = SiteMeasurementRecord;
    const PATH_SUFFIX: &'static str = "payloadPublication/siteMeasurements";
    const ROOT: &'static str = "siteMeasurements";

    fn decode_node(&self, node: Node<'_, '_>) -> Result<SiteMeasurementRecord, DecodeError> {
        let reference =
            find_child(node, "measurementSiteReference").ok_or_else(|| DecodeError::MissingElement {
                element: "measurementSiteReference".to_string(),
                context: "siteMeasurements".to_string(),
            })?;
        let site_id = get_attribute(reference, "id")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DecodeError::MissingAttribute {
                attribute: "id".to_string(),
                element: "measurementSiteReference".to_string(),
            })?
            .to_string();

        let time_text = text_at(node, "measurementTimeDefault");
        if time_text.is_empty() {
            return Err(DecodeError::MissingElement {
                element: "measurementTimeDefault".to_string(),
                context: site_id,
            });
        }
        let timestamp = DateTime::parse_from_rfc3339(&time_text)
            .map_err(|_| DecodeError::InvalidTimestamp(time_text.clone()))?
            .with_timezone(&Utc);

        let values = find_children(node, "measuredValue")
            .map(decode_measured_value)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SiteMeasurementRecord {
            site_id,
            timestamp,
            values,
        })
    }
}

fn decode_measured_value(node: Node<'_, '_>) -> Result<RawMeasurementValue, DecodeError> {
    let index: u32 = require_number_attribute(node, "index")?;
    if index == 0 {
        return Err(DecodeError::InvalidNumber {
            field: "measuredValue/@index".to_string(),
            value: "0".to_string(),
        });
    }

    let Some(basic_data) = find_by_path(node, "measuredValue/basicData") else {
        return Ok(unknown_value(index, String::new()));
    };
    let kind = MeasurementKind::from_type(get_attribute(basic_data, "type").unwrap_or_default());
    let Some((payload_name, value_name)) = kind.payload_elements() else {
        return Ok(RawMeasurementValue {
            index,
            kind,
            value: f64::NAN,
            inputs_used: 0,
            data_error: false,
        });
    };

    let context = format!("measuredValue[{index}]");
    let payload = find_child(basic_data, payload_name).ok_or_else(|| DecodeError::MissingElement {
        element: payload_name.to_string(),
        context: context.clone(),
    })?;
    let data_error = parse_bool_at(payload, "dataError");
    let inputs_used = parse_number_attribute(payload, "numberOfInputValuesUsed")?.unwrap_or(0);
    let value = match parse_number_at::<f64>(payload, value_name)? {
        Some(value) => value,
        None if data_error => f64::NAN,
        None => {
            return Err(DecodeError::MissingElement {
                element: value_name.to_string(),
                context,
            })
        }
    };

    Ok(RawMeasurementValue {
        index,
        kind,
        value,
        inputs_used,
        data_error,
    })
}

fn unknown_value(index: u32, raw_type: String) -> RawMeasurementValue {
    RawMeasurementValue {
        index,
        kind: MeasurementKind::Unknown(raw_type),
        value: f64::NAN,
        inputs_used: 0,
        data_error: false,
    }
}
