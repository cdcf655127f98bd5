use serde::Serialize;

use crate::datex2::RecordCounts;

/// Counters for one measurement decode cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeStats {
    /// Records extracted from the publication.
    pub records_seen: usize,
    /// Records that decoded successfully.
    pub records_decoded: usize,
    /// Records skipped because they failed to decode.
    pub record_errors: usize,
    /// Sites or value indices not found in the reference table.
    pub reference_mismatches: usize,
    /// Aggregates written to the cache.
    pub sites_updated: usize,
}

impl DecodeStats {
    pub(crate) fn from_counts(counts: RecordCounts) -> Self {
        Self {
            records_seen: counts.seen,
            records_decoded: counts.decoded,
            record_errors: counts.errors,
            ..Self::default()
        }
    }
}
