//! Variable message sign (VMS) records.
//!
//! Two feeds describe signs: the static location table (`vmsUnitTable`) and
//! the dynamic status publication, which carries the image currently shown.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use roxmltree::Node;

use super::{Keyed, RecordDecoder};
use crate::error::DecodeError;
use crate::xml::{
    find_by_path, find_child, find_children, get_attribute, get_text, parse_bool_at,
    parse_number_at, require_number_attribute, text_at,
};

/// Display location of a sign, WGS84.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VmsLocation {
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
}

/// Static description of one sign within a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmsRecord {
    /// `None` when the record has no usable display location.
    pub location: Option<VmsLocation>,
    /// How the sign is mounted, e.g. `gantry`.
    pub physical_mounting: String,
    /// Sign type, e.g. `matrixSign`.
    pub sign_type: String,
    /// First text of the multilingual description.
    pub description: String,
}

/// One entry of the VMS location table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmsUnitRecord {
    /// Sign unit id.
    pub id: String,
    /// Record version attribute.
    pub version: String,
    /// Number of signs the unit declares.
    pub number_of_vms: u32,
    /// Signs by 1-based `vmsIndex`.
    pub records: BTreeMap<u32, VmsRecord>,
}

impl VmsUnitRecord {
    /// The sign at a 1-based `vmsIndex`.
    #[must_use]
    pub fn find(&self, index: u32) -> Option<&VmsRecord> {
        self.records.get(&index)
    }
}

impl Keyed for VmsUnitRecord {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Picture shown on a sign.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageData {
    /// Encoded image payload as it appears in the feed.
    pub binary: String,
    /// Payload encoding, normally `base64`.
    pub encoding: String,
    /// Image MIME type, e.g. `image/png`.
    pub mime_type: String,
}

impl ImageData {
    /// Decode the base64 payload.
    ///
    /// # Examples
    /// ```
    /// use trafficflow_ingest::datex2::ImageData;
    ///
    /// let image = ImageData {
    ///     binary: "iVBORw==".to_string(),
    ///     encoding: "base64".to_string(),
    ///     mime_type: "image/png".to_string(),
    /// };
    /// assert_eq!(image.as_bytes().unwrap(), vec![0x89, b'P', b'N', b'G']);
    /// ```
    pub fn as_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let compact: String = self.binary.split_whitespace().collect();
        STANDARD.decode(compact)
    }
}

/// A message currently set on a sign.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmsMessage {
    /// When the message was put on the sign.
    pub time_last_set: Option<DateTime<Utc>>,
    /// Picture of the message, if published.
    pub image: Option<ImageData>,
}

/// Dynamic state of one sign.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vms {
    /// Whether the sign reports itself as working.
    pub working: bool,
    /// Messages by 1-based `messageIndex`.
    pub messages: BTreeMap<u32, VmsMessage>,
}

impl Vms {
    /// The message at a 1-based `messageIndex`.
    #[must_use]
    pub fn find(&self, index: u32) -> Option<&VmsMessage> {
        self.messages.get(&index)
    }
}

/// One entry of the VMS status publication.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VmsUnit {
    /// Sign unit id.
    pub id: String,
    /// Record version attribute.
    pub version: String,
    /// Signs by 1-based `vmsIndex`.
    pub vms: BTreeMap<u32, Vms>,
}

impl VmsUnit {
    /// The sign at a 1-based `vmsIndex`.
    #[must_use]
    pub fn find(&self, index: u32) -> Option<&Vms> {
        self.vms.get(&index)
    }
}

impl Keyed for VmsUnit {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Decoder for `vmsUnitRecord` entries of the location table.
#[derive(Debug, Clone, Copy, Default)]
pub struct VmsUnitRecordDecoder;

impl RecordDecoder for VmsUnitRecordDecoder {
    type Record = VmsUnitRecord;
    const PATH_SUFFIX: &'static str = "vmsUnitTable/vmsUnitRecord";
    const ROOT: &'static str = "vmsUnitRecord";

    fn decode_node(&self, node: Node<'_, '_>) -> Result<VmsUnitRecord, DecodeError> {
        let id = required_id(node, Self::ROOT)?;
        let version = get_attribute(node, "version").unwrap_or_default().to_string();
        let number_of_vms = parse_number_at(node, "numberOfVms")?.unwrap_or(0);

        let mut records = BTreeMap::new();
        for wrapper in find_children(node, "vmsRecord") {
            let index: u32 = require_number_attribute(wrapper, "vmsIndex")?;
            let record = match find_child(wrapper, "vmsRecord") {
                Some(inner) => decode_vms_record(inner)?,
                None => VmsRecord::default(),
            };
            records.insert(index, record);
        }

        Ok(VmsUnitRecord {
            id,
            version,
            number_of_vms,
            records,
        })
    }
}

fn decode_vms_record(node: Node<'_, '_>) -> Result<VmsRecord, DecodeError> {
    let display = "vmsLocation/locationForDisplay";
    let latitude: Option<f64> = parse_number_at(node, &format!("{display}/latitude"))?;
    let longitude: Option<f64> = parse_number_at(node, &format!("{display}/longitude"))?;
    let location = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) if latitude.is_finite() && longitude.is_finite() => {
            Some(VmsLocation {
                latitude,
                longitude,
            })
        }
        _ => None,
    };

    let description = find_by_path(node, "vmsDescription/values")
        .and_then(|values| find_children(values, "value").next())
        .map(get_text)
        .unwrap_or_default();

    Ok(VmsRecord {
        location,
        physical_mounting: text_at(node, "physicalMounting"),
        sign_type: text_at(node, "type"),
        description,
    })
}

/// Decoder for `vmsUnit` entries of the status publication.
#[derive(Debug, Clone, Copy, Default)]
pub struct VmsUnitDecoder;

impl RecordDecoder for VmsUnitDecoder {
    type Record = VmsUnit;
    const PATH_SUFFIX: &'static str = "payloadPublication/vmsUnit";
    const ROOT: &'static str = "vmsUnit";

    fn decode_node(&self, node: Node<'_, '_>) -> Result<VmsUnit, DecodeError> {
        let reference = find_child(node, "vmsUnitReference").ok_or_else(|| {
            DecodeError::MissingElement {
                element: "vmsUnitReference".to_string(),
                context: Self::ROOT.to_string(),
            }
        })?;
        let id = required_id(reference, "vmsUnitReference")?;
        let version = get_attribute(reference, "version")
            .unwrap_or_default()
            .to_string();

        let mut vms = BTreeMap::new();
        for wrapper in find_children(node, "vms") {
            let index: u32 = require_number_attribute(wrapper, "vmsIndex")?;
            let state = match find_child(wrapper, "vms") {
                Some(inner) => decode_vms(inner)?,
                None => Vms::default(),
            };
            vms.insert(index, state);
        }

        Ok(VmsUnit { id, version, vms })
    }
}

fn decode_vms(node: Node<'_, '_>) -> Result<Vms, DecodeError> {
    let mut messages = BTreeMap::new();
    for wrapper in find_children(node, "vmsMessage") {
        let index: u32 = require_number_attribute(wrapper, "messageIndex")?;
        let message = match find_child(wrapper, "vmsMessage") {
            Some(inner) => decode_message(inner)?,
            None => VmsMessage::default(),
        };
        messages.insert(index, message);
    }
    Ok(Vms {
        working: parse_bool_at(node, "vmsWorking"),
        messages,
    })
}

fn decode_message(node: Node<'_, '_>) -> Result<VmsMessage, DecodeError> {
    let time_text = text_at(node, "timeLastSet");
    let time_last_set = if time_text.is_empty() {
        None
    } else {
        let parsed = DateTime::parse_from_rfc3339(&time_text)
            .map_err(|_| DecodeError::InvalidTimestamp(time_text.clone()))?;
        Some(parsed.with_timezone(&Utc))
    };

    let image = find_by_path(node, "vmsMessageExtension/vmsMessageExtension/vmsImage/imageData")
        .map(|data| ImageData {
            binary: text_at(data, "binary"),
            encoding: text_at(data, "encoding"),
            mime_type: text_at(data, "mimeType"),
        });

    Ok(VmsMessage {
        time_last_set,
        image,
    })
}

fn required_id(node: Node<'_, '_>, element: &str) -> Result<String, DecodeError> {
    get_attribute(node, "id")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| DecodeError::MissingAttribute {
            attribute: "id".to_string(),
            element: element.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const UNIT_RECORD: &str = r#"<vmsUnitRecord id="RWS01_MTM_A2_HRR_12.345" version="3">
        <numberOfVms>1</numberOfVms>
        <vmsRecord vmsIndex="1">
          <vmsRecord>
            <vmsDescription><values><value lang="nl">Boven rijstrook 1</value><value lang="en">Above lane 1</value></values></vmsDescription>
            <physicalMounting>gantry</physicalMounting>
            <type>matrixSign</type>
            <vmsLocation>
              <locationForDisplay><latitude>52.1</latitude><longitude>5.1</longitude></locationForDisplay>
            </vmsLocation>
          </vmsRecord>
        </vmsRecord>
        <vmsRecord vmsIndex="2"><vmsRecord/></vmsRecord>
      </vmsUnitRecord>"#;

    const UNIT: &str = r#"<vmsUnit>
        <vmsUnitReference id="RWS01_MTM_A2_HRR_12.345" version="3"/>
        <vms vmsIndex="1">
          <vms>
            <vmsWorking>true</vmsWorking>
            <vmsMessage messageIndex="1">
              <vmsMessage>
                <timeLastSet>2024-03-01T11:59:00Z</timeLastSet>
                <vmsMessageExtension><vmsMessageExtension><vmsImage><imageData>
                  <binary>iVBORw==</binary><encoding>base64</encoding><mimeType>image/png</mimeType>
                </imageData></vmsImage></vmsMessageExtension></vmsMessageExtension>
              </vmsMessage>
            </vmsMessage>
          </vms>
        </vms>
      </vmsUnit>"#;

    #[test]
    fn test_decode_unit_record() {
        let record = VmsUnitRecordDecoder.decode(UNIT_RECORD).unwrap();

        assert_eq!(record.id, "RWS01_MTM_A2_HRR_12.345");
        assert_eq!(record.version, "3");
        assert_eq!(record.number_of_vms, 1);
        assert_eq!(
            record.find(1),
            Some(&VmsRecord {
                location: Some(VmsLocation {
                    latitude: 52.1,
                    longitude: 5.1
                }),
                physical_mounting: "gantry".to_string(),
                sign_type: "matrixSign".to_string(),
                description: "Boven rijstrook 1".to_string(),
            })
        );
        assert_eq!(record.find(2), Some(&VmsRecord::default()));
    }

    #[test]
    fn test_decode_unit() {
        let unit = VmsUnitDecoder.decode(UNIT).unwrap();

        assert_eq!(unit.id, "RWS01_MTM_A2_HRR_12.345");
        let vms = unit.find(1).unwrap();
        assert!(vms.working);
        let message = vms.find(1).unwrap();
        assert_eq!(
            message.time_last_set,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 11, 59, 0).unwrap())
        );
        let image = message.image.as_ref().unwrap();
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.as_bytes().unwrap(), vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_unit_without_messages() {
        let xml = r#"<vmsUnit><vmsUnitReference id="U"/><vms vmsIndex="1"><vms><vmsWorking>false</vmsWorking></vms></vms></vmsUnit>"#;
        let unit = VmsUnitDecoder.decode(xml).unwrap();
        let vms = unit.find(1).unwrap();
        assert!(!vms.working);
        assert!(vms.messages.is_empty());
    }

    #[test]
    fn test_unit_requires_reference() {
        assert!(matches!(
            VmsUnitDecoder.decode("<vmsUnit/>"),
            Err(DecodeError::MissingElement { .. })
        ));
    }

    #[test]
    fn test_half_location_is_none() {
        let xml = r#"<vmsUnitRecord id="R"><vmsRecord vmsIndex="1"><vmsRecord>
            <vmsLocation><locationForDisplay><latitude>52.0</latitude></locationForDisplay></vmsLocation>
          </vmsRecord></vmsRecord></vmsUnitRecord>"#;
        let record = VmsUnitRecordDecoder.decode(xml).unwrap();
        assert_eq!(record.find(1).unwrap().location, None);
    }
}
