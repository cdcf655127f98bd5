//! Keyed collections of decoded records.

use std::collections::BTreeMap;
use std::io::BufRead;

use super::{decode_records, RecordCounts, RecordDecoder};
use crate::error::Result;

/// A record with a stable identifier.
pub trait Keyed {
    fn key(&self) -> &str;
}

/// All records of one publication, keyed by identifier.
///
/// A later record with the same key replaces an earlier one.
#[derive(Debug, Clone)]
pub struct Catalog<T> {
    records: BTreeMap<String, T>,
    counts: RecordCounts,
}

impl<T> Default for Catalog<T> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
            counts: RecordCounts::default(),
        }
    }
}

impl<T: Keyed> Catalog<T> {
    /// Decode every record of a publication.
    pub fn load<R, D>(input: R, decoder: &D) -> Result<Self>
    where
        R: BufRead,
        D: RecordDecoder<Record = T>,
    {
        Self::load_filtered(input, decoder, |_| true)
    }

    /// Decode a publication, keeping only records for which `keep` holds.
    pub fn load_filtered<R, D, F>(input: R, decoder: &D, keep: F) -> Result<Self>
    where
        R: BufRead,
        D: RecordDecoder<Record = T>,
        F: Fn(&T) -> bool,
    {
        let mut records = BTreeMap::new();
        let counts = decode_records(input, decoder, |record: T| {
            if keep(&record) {
                records.insert(record.key().to_string(), record);
            }
        })?;
        Ok(Self { records, counts })
    }

    /// Build a catalog from records already in memory.
    pub fn from_records(records: impl IntoIterator<Item = T>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|record| (record.key().to_string(), record))
                .collect(),
            counts: RecordCounts::default(),
        }
    }
}

impl<T> Catalog<T> {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&T> {
        self.records.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in key order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.values()
    }

    /// Counters from the load that produced this catalog.
    #[must_use]
    pub fn counts(&self) -> RecordCounts {
        self.counts
    }
}
