//! DATEX II record decoders.
//!
//! Each NDW publication is a long list of repeated records. A
//! [`RecordDecoder`] knows where its records sit in the document and how to
//! turn one extracted fragment into a typed value. [`decode_records`] streams a
//! whole publication through a decoder, skipping records that fail to decode.

mod catalog;
mod measurement;
mod site_table;
mod vms;

use std::io::BufRead;

use roxmltree::{Document, Node};

use crate::error::{DecodeError, Result};
use crate::xml::{expect_root, RecordExtractor};

pub use catalog::{Catalog, Keyed};
pub use measurement::{
    MeasurementKind, RawMeasurementValue, SiteMeasurementRecord, SiteMeasurementsDecoder,
};
pub use site_table::{
    IndexCharacteristics, MeasurementSiteRecordDecoder, SiteCharacteristics, ANY_VEHICLE,
};
pub use vms::{
    ImageData, Vms, VmsLocation, VmsMessage, VmsRecord, VmsUnit, VmsUnitDecoder, VmsUnitRecord,
    VmsUnitRecordDecoder,
};

/// Decoder for one kind of DATEX II record.
pub trait RecordDecoder {
    /// The decoded record.
    type Record;

    /// Element path suffix under which the records appear in a publication.
    const PATH_SUFFIX: &'static str;

    /// Local name of the record element.
    const ROOT: &'static str;

    /// Decode a record from its element.
    fn decode_node(&self, node: Node<'_, '_>) -> std::result::Result<Self::Record, DecodeError>;

    /// Decode a record from a standalone fragment.
    fn decode(&self, fragment: &str) -> std::result::Result<Self::Record, DecodeError> {
        let doc = Document::parse(fragment)?;
        let root = expect_root(&doc, Self::ROOT)?;
        self.decode_node(root)
    }
}

/// Per-publication record counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    /// Fragments extracted from the document.
    pub seen: usize,
    /// Fragments decoded successfully.
    pub decoded: usize,
    /// Fragments that failed to decode and were skipped.
    pub errors: usize,
}

/// Stream a publication through `decoder`, calling `on_record` for every
/// record that decodes.
///
/// Records that fail to decode are logged and counted; only a malformed
/// document aborts the pass.
pub fn decode_records<R, D, F>(input: R, decoder: &D, mut on_record: F) -> Result<RecordCounts>
where
    R: BufRead,
    D: RecordDecoder,
    F: FnMut(D::Record),
{
    let mut counts = RecordCounts::default();
    for fragment in RecordExtractor::new(input, D::PATH_SUFFIX) {
        let fragment = fragment?;
        counts.seen += 1;
        match decoder.decode(fragment.as_str()) {
            Ok(record) => {
                counts.decoded += 1;
                on_record(record);
            }
            Err(err) => {
                counts.errors += 1;
                tracing::warn!(
                    ordinal = fragment.ordinal,
                    record = D::ROOT,
                    error = %err,
                    "Skipping record that failed to decode"
                );
            }
        }
    }
    Ok(counts)
}
