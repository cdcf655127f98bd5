//! The measurement site reference table.

use std::collections::HashSet;
use std::io::BufRead;

use crate::datex2::{Catalog, MeasurementSiteRecordDecoder, RecordCounts, SiteCharacteristics};
use crate::error::Result;

/// Site ids to retain in the reference table.
///
/// An empty filter keeps every site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteFilter {
    ids: HashSet<String>,
}

impl SiteFilter {
    /// Keep every site.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Keep only the given site ids.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Read one site id per line; blank lines and `#` comments are skipped.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut ids = HashSet::new();
        for line in reader.lines() {
            let line = line?;
            let id = line.trim();
            if !id.is_empty() && !id.starts_with('#') {
                ids.insert(id.to_string());
            }
        }
        Ok(Self { ids })
    }

    #[must_use]
    pub fn keeps(&self, site_id: &str) -> bool {
        self.ids.is_empty() || self.ids.contains(site_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Per-site lane and vehicle class metadata, keyed by site id.
///
/// A table is immutable once built; reloads build a new table and swap it in.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    sites: Catalog<SiteCharacteristics>,
}

impl ReferenceTable {
    /// Decode a measurement site table publication.
    pub fn load<R: BufRead>(input: R, filter: &SiteFilter) -> Result<Self> {
        let sites = Catalog::load_filtered(input, &MeasurementSiteRecordDecoder, |site| {
            filter.keeps(&site.site_id)
        })?;
        Ok(Self { sites })
    }

    /// Build a table from already decoded sites.
    pub fn from_sites(sites: impl IntoIterator<Item = SiteCharacteristics>) -> Self {
        Self {
            sites: Catalog::from_records(sites),
        }
    }

    #[must_use]
    pub fn site(&self, site_id: &str) -> Option<&SiteCharacteristics> {
        self.sites.get(site_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Counters from the load that built this table.
    #[must_use]
    pub fn counts(&self) -> RecordCounts {
        self.sites.counts()
    }
}
