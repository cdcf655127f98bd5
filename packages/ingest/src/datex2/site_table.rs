//! Measurement site table records (`measurement_current.xml`).

use std::collections::BTreeMap;

use roxmltree::Node;

use super::{Keyed, RecordDecoder};
use crate::error::DecodeError;
use crate::xml::{find_child, find_children, get_attribute, require_number_attribute, text_at};

/// Vehicle class of a characteristic that covers every vehicle on the lane.
pub const ANY_VEHICLE: &str = "anyVehicle";

/// What one measured value index of a site stands for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexCharacteristics {
    /// Lane id, e.g. `lane1`; empty when absent.
    pub lane: String,
    /// `trafficFlow`, `trafficSpeed`, ...
    pub value_type: String,
    /// `vehicleType` of the characteristic, e.g. `anyVehicle`.
    pub vehicle_class: String,
}

impl IndexCharacteristics {
    /// Whether this index measures all vehicle classes together.
    #[must_use]
    pub fn is_any_vehicle(&self) -> bool {
        self.vehicle_class == ANY_VEHICLE
    }
}

/// Reference data for one measurement site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteCharacteristics {
    /// Measurement site id.
    pub site_id: String,
    /// Record version attribute.
    pub version: String,
    /// Characteristics by 1-based measured value index.
    pub per_index: BTreeMap<u32, IndexCharacteristics>,
}

impl SiteCharacteristics {
    /// Characteristics for a 1-based measured value index.
    #[must_use]
    pub fn index(&self, index: u32) -> Option<&IndexCharacteristics> {
        self.per_index.get(&index)
    }
}

impl Keyed for SiteCharacteristics {
    fn key(&self) -> &str {
        &self.site_id
    }
}

/// Decoder for `measurementSiteRecord` entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeasurementSiteRecordDecoder;

impl RecordDecoder for MeasurementSiteRecordDecoder {
    type Record = SiteCharacteristics;
    const PATH_SUFFIX: &'static str = "measurementSiteTable/measurementSiteRecord";
    const ROOT: &'static str = "measurementSiteRecord";

    fn decode_node(&self, node: Node<'_, '_>) -> Result<SiteCharacteristics, DecodeError> {
        let site_id = get_attribute(node, "id")
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| DecodeError::MissingAttribute {
                attribute: "id".to_string(),
                element: Self::ROOT.to_string(),
            })?
            .to_string();
        let version = get_attribute(node, "version").unwrap_or_default().to_string();

        let mut per_index = BTreeMap::new();
        for wrapper in find_children(node, "measurementSpecificCharacteristics") {
            let index: u32 = require_number_attribute(wrapper, "index")?;
            let characteristics = find_child(wrapper, "measurementSpecificCharacteristics")
                .map(|inner| IndexCharacteristics {
                    lane: text_at(inner, "specificLane"),
                    value_type: text_at(inner, "specificMeasurementValueType"),
                    vehicle_class: text_at(inner, "specificVehicleCharacteristics/vehicleType"),
                })
                .unwrap_or_default();
            per_index.insert(index, characteristics);
        }

        Ok(SiteCharacteristics {
            site_id,
            version,
            per_index,
        })
    }
}
