//! C8: replicates a keyword write onto the redundant EEPROM and the
//! inventory-bus cache after the primary write has already succeeded.
//!
//! A redundant-write or cache-update failure is reported but never rolls
//! back the primary write — the EEPROM is the source of truth and the
//! cache catches up on the next full collection.

use std::fmt;
use std::path::PathBuf;

use vpd_format::ipz;
use vpd_format::writer;

use crate::eeprom;
use crate::inventory_bus::{CacheUpdateFailed, InventoryBus};

#[derive(Debug)]
pub enum Error {
    PrimaryEeprom(eeprom::Error),
    PrimaryWrite(writer::Error),
    PrimaryParse(ipz::Error),
    RedundantWriteFailed(Box<Error>),
    CacheUpdateFailed(CacheUpdateFailed),
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimaryEeprom(e) => write!(f, "primary EEPROM I/O failed: {e}"),
            Self::PrimaryWrite(e) => write!(f, "primary write failed: {e}"),
            Self::PrimaryParse(e) => write!(f, "primary blob did not parse: {e}"),
            Self::RedundantWriteFailed(inner) => write!(f, "redundant write failed: {inner}"),
            Self::CacheUpdateFailed(e) => write!(f, "{e}"),
        }
    }
}
impl std::error::Error for Error {
}

/// An EEPROM file plus the byte offset its VPD blob starts at.
#[derive(Clone, Debug)]
pub struct EepromTarget {
    pub path: PathBuf,
    pub offset: u64,
}

pub struct RedundancyCoordinator<'b> {
    pub primary: EepromTarget,
    pub redundant: Option<EepromTarget>,
    pub inventory_path: String,
    pub bus: &'b dyn InventoryBus,
}

impl<'b> RedundancyCoordinator<'b> {
    /// Writes `record`/`keyword` on the primary EEPROM, then best-effort
    /// replicates to the redundant EEPROM (if configured) and the cache.
    /// Returns the number of bytes written to the primary, plus any
    /// replication failure encountered along the way (which does not
    /// invalidate the primary's success).
    pub fn write_keyword(&self, record: &str, keyword: &str, new_value: &[u8]) -> (Result<usize, Error>, Option<Error>) {
        let primary_result = write_one(&self.primary, record, keyword, new_value);
        let bytes_written = match primary_result {
            Ok(n) => n,
            Err(e) => return (Err(e), None),
        };

        let mut replication_failure = None;

        if let Some(redundant) = &self.redundant {
            if let Err(e) = write_one(redundant, record, keyword, new_value) {
                replication_failure = Some(Error::RedundantWriteFailed(Box::new(e)));
            }
        }

        if let Err(e) = self.bus.update_cache(&self.inventory_path, record, keyword, new_value) {
            replication_failure.get_or_insert(Error::CacheUpdateFailed(e));
        }

        (Ok(bytes_written), replication_failure)
    }
}

fn write_one(target: &EepromTarget, record: &str, keyword: &str, new_value: &[u8]) -> Result<usize, Error> {
    let mut buf = eeprom::read_blob(&target.path, target.offset).map_err(Error::PrimaryEeprom)?;
    let parsed = ipz::parse(&mut buf).map_err(Error::PrimaryParse)?;
    let written = writer::write_keyword(&mut buf, &parsed.vtoc, record, keyword, new_value)
        .map_err(Error::PrimaryWrite)?;
    eeprom::write_blob(&target.path, target.offset, &buf).map_err(Error::PrimaryEeprom)?;
    Ok(written)
}
