//! C9: reconciles a declared set of (source, destination) keyword pairs
//! between a primary VPD copy and its backup mirror.
//!
//! The mapping itself is opaque configuration (see `crate::config`); this
//! module only knows how to compare, restore, reset, and render it.

use std::fmt;

use vpd_format::ipz;

use crate::redundancy::{self, RedundancyCoordinator};

/// One declared correspondence between a source keyword and its backup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    pub source_record: String,
    pub source_keyword: String,
    pub destination_record: String,
    pub destination_keyword: String,
    pub default_value: Option<Vec<u8>>,
    pub is_manufacture_reset_required: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Comparison {
    Match { value: Vec<u8> },
    Mismatch { source_value: Vec<u8>, destination_value: Vec<u8> },
    SourceMissing,
    DestinationMissing,
}

#[derive(Debug)]
pub enum Error {
    Parse(ipz::Error),
    Write(redundancy::Error),
    KeywordMissing { record: String, keyword: String },
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "failed to parse VPD for reconciliation: {e}"),
            Self::Write(e) => write!(f, "failed to write during reconciliation: {e}"),
            Self::KeywordMissing { record, keyword } => write!(f, "{record}/{keyword} is absent from the parsed store"),
        }
    }
}
impl std::error::Error for Error {
}

/// The side a caller picked during an interactive fix-up.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UserChoice {
    UseSource,
    UseDestination,
    EnterNewValue,
    Skip,
}

/// Lets an interactive caller pick a resolution per mismatched entry without
/// this module knowing anything about how the choice is actually collected.
pub trait UserChoicePrompt {
    fn choose(&self, entry: &Entry, comparison: &Comparison) -> (UserChoice, Option<Vec<u8>>);
}

/// Reads both sides of `entry` out of an already-parsed `Store`.
pub fn compare(store: &vpd_format::Store, entry: &Entry) -> Comparison {
    let source = store.get(&entry.source_record, &entry.source_keyword);
    let destination = store.get(&entry.destination_record, &entry.destination_keyword);
    match (source, destination) {
        (Some(s), Some(d)) if s == d => Comparison::Match { value: s.to_vec() },
        (Some(s), Some(d)) => Comparison::Mismatch { source_value: s.to_vec(), destination_value: d.to_vec() },
        (None, Some(_)) => Comparison::SourceMissing,
        (Some(_), None) => Comparison::DestinationMissing,
        (None, None) => Comparison::SourceMissing,
    }
}

/// Renders a mismatch table as plain text, one line per entry, for an
/// interactive caller to display before prompting for a choice.
pub fn render_mismatches(store: &vpd_format::Store, entries: &[Entry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let comparison = compare(store, entry);
        if matches!(comparison, Comparison::Match { .. }) {
            continue;
        }
        out.push_str(&format!(
            "{}/{} <-> {}/{}: {:?}\n",
            entry.source_record, entry.source_keyword,
            entry.destination_record, entry.destination_keyword,
            comparison,
        ));
    }
    out
}

/// Copies the source value onto the destination via C7+C8.
pub fn restore(coordinator: &RedundancyCoordinator<'_>, store: &vpd_format::Store, entry: &Entry) -> Result<usize, Error> {
    let value = store.get(&entry.source_record, &entry.source_keyword)
        .ok_or_else(|| Error::KeywordMissing { record: entry.source_record.clone(), keyword: entry.source_keyword.clone() })?
        .to_vec();
    let (result, _replication_failure) = coordinator.write_keyword(&entry.destination_record, &entry.destination_keyword, &value);
    result.map_err(Error::Write)
}

/// Writes `default_value` to both sides of every entry flagged for
/// manufacturing reset.
pub fn manufacturing_reset(coordinator: &RedundancyCoordinator<'_>, entries: &[Entry]) -> Vec<(Entry, Result<(), Error>)> {
    entries.iter()
        .filter(|e| e.is_manufacture_reset_required)
        .map(|entry| {
            let outcome = (|| {
                let default = entry.default_value.as_deref().unwrap_or(&[]);
                let (src, _) = coordinator.write_keyword(&entry.source_record, &entry.source_keyword, default);
                src.map_err(Error::Write)?;
                let (dst, _) = coordinator.write_keyword(&entry.destination_record, &entry.destination_keyword, default);
                dst.map_err(Error::Write)?;
                Ok(())
            })();
            (entry.clone(), outcome)
        })
        .collect()
}

/// Walks every entry, rendering mismatches and asking `prompt` how to
/// resolve each one, then applies the chosen resolution via C7+C8.
pub fn interactive_fix(
    coordinator: &RedundancyCoordinator<'_>,
    store: &vpd_format::Store,
    entries: &[Entry],
    prompt: &dyn UserChoicePrompt,
) -> Vec<(Entry, Result<(), Error>)> {
    entries.iter()
        .filter_map(|entry| {
            let comparison = compare(store, entry);
            if matches!(comparison, Comparison::Match { .. }) {
                return None;
            }
            let (choice, new_value) = prompt.choose(entry, &comparison);
            let outcome = apply_choice(coordinator, store, entry, choice, new_value);
            Some((entry.clone(), outcome))
        })
        .collect()
}

fn apply_choice(
    coordinator: &RedundancyCoordinator<'_>,
    store: &vpd_format::Store,
    entry: &Entry,
    choice: UserChoice,
    new_value: Option<Vec<u8>>,
) -> Result<(), Error> {
    match choice {
        UserChoice::Skip => Ok(()),
        UserChoice::UseSource => restore(coordinator, store, entry).map(|_| ()),
        UserChoice::UseDestination => {
            let value = store.get(&entry.destination_record, &entry.destination_keyword)
                .ok_or_else(|| Error::KeywordMissing { record: entry.destination_record.clone(), keyword: entry.destination_keyword.clone() })?
                .to_vec();
            let (result, _) = coordinator.write_keyword(&entry.source_record, &entry.source_keyword, &value);
            result.map(|_| ()).map_err(Error::Write)
        },
        UserChoice::EnterNewValue => {
            let value = new_value.unwrap_or_default();
            let (src, _) = coordinator.write_keyword(&entry.source_record, &entry.source_keyword, &value);
            src.map_err(Error::Write)?;
            let (dst, _) = coordinator.write_keyword(&entry.destination_record, &entry.destination_keyword, &value);
            dst.map(|_| ()).map_err(Error::Write)
        },
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use vpd_format::ipz::{ParsedIpz, Record, VtocEntry};

    fn sample_store() -> vpd_format::Store {
        let parsed = ParsedIpz {
            vtoc: vec![
                VtocEntry { record_name: *b"VINI", record_offset: 0, record_length: 0, ecc_offset: 0, ecc_length: 0 },
                VtocEntry { record_name: *b"VSYS", record_offset: 0, record_length: 0, ecc_offset: 0, ecc_length: 0 },
            ],
            records: vec![
                Record { name: *b"VINI", keywords: vec![(*b"RT", b"VINI".to_vec()), (*b"SN", b"Y131UF07300L".to_vec())] },
                Record { name: *b"VSYS", keywords: vec![(*b"RT", b"VSYS".to_vec()), (*b"SN", b"MISMATCHED01".to_vec())] },
            ],
        };
        vpd_format::Store::from_parsed(parsed)
    }

    fn sample_entries() -> Vec<Entry> {
        vec![Entry {
            source_record: "VINI".to_owned(),
            source_keyword: "SN".to_owned(),
            destination_record: "VSYS".to_owned(),
            destination_keyword: "SN".to_owned(),
            default_value: Some(b"DEFAULT-SN  ".to_vec()),
            is_manufacture_reset_required: true,
        }]
    }

    #[test]
    fn compare_reports_mismatch() {
        let store = sample_store();
        let entries = sample_entries();
        let comparison = compare(&store, &entries[0]);
        assert_eq!(comparison, Comparison::Mismatch {
            source_value: b"Y131UF07300L".to_vec(),
            destination_value: b"MISMATCHED01".to_vec(),
        });
    }

    #[test]
    fn render_mismatches_skips_matching_entries() {
        let store = sample_store();
        let mut entries = sample_entries();
        entries.push(Entry {
            source_record: "VINI".to_owned(),
            source_keyword: "SN".to_owned(),
            destination_record: "VINI".to_owned(),
            destination_keyword: "SN".to_owned(),
            default_value: None,
            is_manufacture_reset_required: false,
        });
        let rendered = render_mismatches(&store, &entries);
        assert_eq!(rendered.lines().count(), 1);
        assert!(rendered.contains("VINI/SN <-> VSYS/SN"));
    }

    struct AlwaysUseSource;
    impl UserChoicePrompt for AlwaysUseSource {
        fn choose(&self, _entry: &Entry, _comparison: &Comparison) -> (UserChoice, Option<Vec<u8>>) {
            (UserChoice::Skip, None)
        }
    }

    #[test]
    fn interactive_fix_skips_when_prompt_says_skip() {
        // Without a real EEPROM-backed coordinator this only exercises the
        // skip path, which never touches the writer.
        let store = sample_store();
        let entries = sample_entries();
        let bus = crate::inventory_bus::NoopInventoryBus;
        let coordinator = RedundancyCoordinator {
            primary: redundancy::EepromTarget { path: "/nonexistent".into(), offset: 0 },
            redundant: None,
            inventory_path: "/fru/0".to_owned(),
            bus: &bus,
        };
        let results = interactive_fix(&coordinator, &store, &entries, &AlwaysUseSource);
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_ok());
    }
}
