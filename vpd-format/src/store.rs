//! `Store`: an in-memory view over a parsed IPZ blob's records and keywords.
//!
//! Lookups go through the printable-name transform (`crate::names`), but the
//! original wire-format names and insertion order are retained so the blob
//! can be faithfully re-encoded without reshuffling anything.

use crate::ipz::{ParsedIpz, Record};
use crate::names::printable_name;

#[derive(Clone, Debug)]
struct StoredRecord {
    /// The record's own on-wire name, e.g. `VINI`.
    wire_name: [u8; 4],
    /// `(printable keyword name, wire keyword name, value)`, in wire order.
    keywords: Vec<(String, [u8; 2], Vec<u8>)>,
}

/// A queryable view over one parsed VPD image's records and keywords.
#[derive(Clone, Debug, Default)]
pub struct Store {
    records: Vec<StoredRecord>,
}

impl Store {
    pub fn from_parsed(parsed: ParsedIpz) -> Self {
        let records = parsed.records.into_iter().map(|Record { name, keywords }| {
            let keywords = keywords.into_iter()
                .map(|(wire_name, value)| (printable_name(wire_name), wire_name, value))
                .collect();
            StoredRecord { wire_name: name, keywords }
        }).collect();
        Self { records }
    }

    /// Record names in on-wire (VTOC) order.
    pub fn records(&self) -> impl Iterator<Item = String> + '_ {
        self.records.iter().map(|r| String::from_utf8_lossy(&r.wire_name).into_owned())
    }

    /// Keyword printable names for `record`, in on-wire order.
    pub fn keywords(&self, record: &str) -> impl Iterator<Item = &str> {
        self.find_record(record).into_iter()
            .flat_map(|r| r.keywords.iter().map(|(name, _, _)| name.as_str()))
    }

    pub fn get(&self, record: &str, keyword: &str) -> Option<&[u8]> {
        let record = self.find_record(record)?;
        record.keywords.iter()
            .find(|(name, _, _)| name == keyword)
            .map(|(_, _, value)| value.as_slice())
    }

    /// The keyword's on-wire two-byte name, needed by the writer to locate
    /// its byte range without re-deriving the printable-name transform.
    pub(crate) fn wire_keyword_name(&self, record: &str, keyword: &str) -> Option<[u8; 2]> {
        let record = self.find_record(record)?;
        record.keywords.iter()
            .find(|(name, _, _)| name == keyword)
            .map(|(_, wire, _)| *wire)
    }

    fn find_record(&self, record: &str) -> Option<&StoredRecord> {
        self.records.iter().find(|r| r.wire_name == record.as_bytes())
    }
}
