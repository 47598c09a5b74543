//! C11: the read/write surface external collaborators call into.
//!
//! Wraps a write as the state sequence `Idle -> Guarded -> PrimaryWritten ->
//! RedundantWritten -> CacheUpdated -> Done`, with every state able to fall
//! to `Failed`. The facade always attempts to release the guard on the way
//! out, whether the write succeeded or not.

use std::collections::HashMap;
use std::fmt;

use tracing::{info, warn};
use vpd_format::{ipz, Store};

use crate::config::FruConfig;
use crate::eeprom;
use crate::inventory_bus::InventoryBus;
use crate::reboot_guard::{self, RebootGuard};
use crate::redundancy::{self, EepromTarget, RedundancyCoordinator};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum WriteState {
    Idle,
    Guarded,
    PrimaryWritten,
    RedundantWritten,
    CacheUpdated,
    Done,
    Failed,
}

#[derive(Debug)]
pub enum Error {
    UnknownPath(String),
    GuardAcquireFailed(reboot_guard::AcquireFailed),
    GuardReleaseFailed(reboot_guard::ReleaseFailed),
    Write(redundancy::Error),
    Read(ipz::Error),
    Eeprom(eeprom::Error),
    KeywordNotFound { record: String, keyword: String },
    PostCheckMismatch { record: String, keyword: String },
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPath(p) => write!(f, "{p} does not resolve to any configured FRU"),
            Self::GuardAcquireFailed(e) => write!(f, "{e}"),
            Self::GuardReleaseFailed(e) => write!(f, "{e}"),
            Self::Write(e) => write!(f, "{e}"),
            Self::Read(e) => write!(f, "{e}"),
            Self::Eeprom(e) => write!(f, "{e}"),
            Self::KeywordNotFound { record, keyword } => write!(f, "{record}/{keyword} is absent from the parsed store"),
            Self::PostCheckMismatch { record, keyword } => write!(f, "post-write read-back of {record}/{keyword} did not match the value just written"),
        }
    }
}
impl std::error::Error for Error {
}

/// The per-FRU write/read surface, holding the configuration, reboot guard,
/// and inventory bus this service process was constructed with.
pub struct KeywordManager<'b> {
    frus: HashMap<String, FruConfig>,
    guard: Box<dyn RebootGuard>,
    bus: &'b dyn InventoryBus,
}

impl<'b> KeywordManager<'b> {
    pub fn new(frus: HashMap<String, FruConfig>, guard: Box<dyn RebootGuard>, bus: &'b dyn InventoryBus) -> Self {
        Self { frus, guard, bus }
    }

    /// Resolves `vpd_path` — either an EEPROM file path (a `frus` key
    /// directly) or an inventory object path — to its `FruConfig`.
    fn resolve(&self, vpd_path: &str) -> Result<(&str, &FruConfig), Error> {
        if let Some((key, cfg)) = self.frus.get_key_value(vpd_path) {
            return Ok((key.as_str(), cfg));
        }
        self.frus.iter()
            .find(|(_, cfg)| cfg.inventory_path == vpd_path)
            .map(|(key, cfg)| (key.as_str(), cfg))
            .ok_or_else(|| Error::UnknownPath(vpd_path.to_owned()))
    }

    /// `updateKeyword(vpdPath, (record, keyword, value)) -> bytesWritten`.
    pub fn update_keyword(&self, vpd_path: &str, record: &str, keyword: &str, value: &[u8]) -> Result<usize, Error> {
        let (eeprom_path, cfg) = self.resolve(vpd_path)?;
        let mut state = WriteState::Idle;
        trace_state(state, record, keyword);

        if let Err(e) = self.guard.acquire() {
            trace_state(WriteState::Failed, record, keyword);
            return Err(Error::GuardAcquireFailed(e));
        }
        state = WriteState::Guarded;
        trace_state(state, record, keyword);

        self.precheck(eeprom_path, cfg, record, keyword);

        let coordinator = RedundancyCoordinator {
            primary: EepromTarget { path: eeprom_path.into(), offset: cfg.offset },
            redundant: cfg.redundant_eeprom.clone().map(|path| EepromTarget { path, offset: cfg.offset }),
            inventory_path: cfg.inventory_path.clone(),
            bus: self.bus,
        };
        let (write_result, replication_failure) = coordinator.write_keyword(record, keyword, value);
        if let Some(failure) = &replication_failure {
            warn!(%failure, "replication did not fully succeed; primary EEPROM remains the source of truth");
        }
        let bytes_written = match write_result {
            Ok(n) => {
                state = WriteState::PrimaryWritten;
                trace_state(state, record, keyword);
                state = WriteState::RedundantWritten;
                trace_state(state, record, keyword);
                state = WriteState::CacheUpdated;
                trace_state(state, record, keyword);
                n
            },
            Err(e) => {
                trace_state(WriteState::Failed, record, keyword);
                self.release_guard();
                return Err(Error::Write(e));
            },
        };

        if let Err(e) = self.postcheck(eeprom_path, cfg.offset, record, keyword, value) {
            trace_state(WriteState::Failed, record, keyword);
            self.release_guard();
            return Err(e);
        }
        state = WriteState::Done;
        trace_state(state, record, keyword);

        self.release_guard();
        info!(?state, record, keyword, "keyword write complete");
        Ok(bytes_written)
    }

    /// `readKeyword(vpdPath, (record, keyword)) -> bytes`. Always re-parses
    /// from the EEPROM; never consults the cache.
    pub fn read_keyword(&self, vpd_path: &str, record: &str, keyword: &str) -> Result<Vec<u8>, Error> {
        let (eeprom_path, cfg) = self.resolve(vpd_path)?;
        let mut buf = eeprom::read_blob(eeprom_path.as_ref(), cfg.offset).map_err(Error::Eeprom)?;
        let parsed = ipz::parse(&mut buf).map_err(Error::Read)?;
        let store = Store::from_parsed(parsed);
        store.get(record, keyword)
            .map(|v| v.to_vec())
            .ok_or_else(|| Error::KeywordNotFound { record: record.to_owned(), keyword: keyword.to_owned() })
    }

    /// Re-verifies the record's ECC on primary (and redundant, if
    /// configured) and compares the keyword's current value on both sides;
    /// any divergence — a parse/ECC failure or differing content — is
    /// logged but never blocks the write.
    fn precheck(&self, eeprom_path: &str, cfg: &FruConfig, record: &str, keyword: &str) {
        let read_value = |path: &std::path::Path| -> Result<Vec<u8>, String> {
            let mut buf = eeprom::read_blob(path, cfg.offset).map_err(|e| e.to_string())?;
            let parsed = ipz::parse(&mut buf).map_err(|e| e.to_string())?;
            let store = Store::from_parsed(parsed);
            Ok(store.get(record, keyword).unwrap_or(&[]).to_vec())
        };

        let primary_value = match read_value(eeprom_path.as_ref()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(record, keyword, error = %e, "pre-write ECC check failed on primary; proceeding anyway");
                None
            },
        };

        let Some(redundant) = &cfg.redundant_eeprom else { return };
        match read_value(redundant) {
            Ok(redundant_value) => {
                if primary_value.is_some_and(|primary_value| primary_value != redundant_value) {
                    warn!(record, keyword, "primary and redundant content diverge before write; proceeding anyway");
                }
            },
            Err(e) => {
                warn!(record, keyword, error = %e, "pre-write ECC check failed on redundant; proceeding anyway");
            },
        }
    }

    fn postcheck(&self, eeprom_path: &str, offset: u64, record: &str, keyword: &str, expected: &[u8]) -> Result<(), Error> {
        let mut buf = eeprom::read_blob(eeprom_path.as_ref(), offset).map_err(Error::Eeprom)?;
        let parsed = ipz::parse(&mut buf).map_err(Error::Read)?;
        let store = Store::from_parsed(parsed);
        let actual = store.get(record, keyword).unwrap_or(&[]);
        if actual.starts_with(expected) {
            Ok(())
        } else {
            Err(Error::PostCheckMismatch { record: record.to_owned(), keyword: keyword.to_owned() })
        }
    }

    fn release_guard(&self) {
        if let Err(e) = self.guard.release() {
            warn!(error = %e, "failed to release reboot guard after write");
        }
    }
}

fn trace_state(state: WriteState, record: &str, keyword: &str) {
    tracing::trace!(?state, record, keyword, "write state transition");
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory_bus::InMemoryInventoryBus;
    use crate::reboot_guard::{AcquireFailed, NullGuard};

    /// Builds a complete, parseable IPZ blob (VHDR tag at offset 17, VTOC
    /// tag at offset 61, one VINI record carrying RT and a 12-byte SN) and
    /// writes it to `path`. Mirrors `vpd_format::ipz`'s own test fixture,
    /// since `KeywordManager` routes every read/write through `ipz::parse`,
    /// which hard-requires that framing.
    fn build_ipz_fixture(sn_value: &[u8; 12]) -> Vec<u8> {
        const VHDR_TAG_OFFSET: usize = 17;
        const VHDR_LENGTH_OFFSET: usize = 18;
        const VTOC_TAG_OFFSET: usize = 61;
        const VTOC_LENGTH_OFFSET: usize = 62;
        const VTOC_BODY_OFFSET: usize = 64;
        const LARGE_RESOURCE_TAG: u8 = 0x84;
        const SMALL_RESOURCE_END_TAG: u8 = 0x78;

        let mut buf = vec![0u8; VTOC_BODY_OFFSET];
        buf[VHDR_TAG_OFFSET] = LARGE_RESOURCE_TAG;
        buf[VHDR_LENGTH_OFFSET..VHDR_LENGTH_OFFSET + 2].copy_from_slice(&41u16.to_le_bytes());
        buf[VTOC_TAG_OFFSET] = LARGE_RESOURCE_TAG;

        let mut vini_body = Vec::new();
        vini_body.extend(b"RT"); vini_body.push(4); vini_body.extend(b"VINI");
        vini_body.extend(b"SN"); vini_body.push(12); vini_body.extend(sn_value);
        let vini_record_offset = 200u16;
        let vini_ecc_offset = 300u16;
        let vini_ecc_length = vini_body.len().div_ceil(8) as u16;

        let mut vtoc_body = Vec::new();
        vtoc_body.extend(b"RT"); vtoc_body.push(4); vtoc_body.extend(b"VTOC");
        let mut pt_value = Vec::new();
        pt_value.extend(b"VINI");
        pt_value.extend(vini_record_offset.to_le_bytes());
        pt_value.extend((vini_body.len() as u16).to_le_bytes());
        pt_value.extend(vini_ecc_offset.to_le_bytes());
        pt_value.extend(vini_ecc_length.to_le_bytes());
        vtoc_body.extend(b"PT"); vtoc_body.push(pt_value.len() as u8); vtoc_body.extend(&pt_value);
        vtoc_body.push(SMALL_RESOURCE_END_TAG);

        let vtoc_len = vtoc_body.len() as u16;
        buf[VTOC_LENGTH_OFFSET..VTOC_LENGTH_OFFSET + 2].copy_from_slice(&vtoc_len.to_le_bytes());
        buf.extend(&vtoc_body);

        buf.resize(vini_record_offset as usize, 0);
        buf.push(LARGE_RESOURCE_TAG);
        buf.extend((vini_body.len() as u16).to_le_bytes());
        buf.extend(&vini_body);

        buf.resize(vini_ecc_offset as usize, 0);
        buf.extend(std::iter::repeat_n(0u8, vini_ecc_length as usize));
        buf.push(SMALL_RESOURCE_END_TAG);

        let body_start = vini_record_offset as usize + 3;
        let body_end = body_start + vini_body.len();
        let ecc_start = vini_ecc_offset as usize;
        let ecc_end = ecc_start + vini_ecc_length as usize;
        vpd_format::ecc::update(&mut buf, body_start..body_end, ecc_start..ecc_end).unwrap();

        buf
    }

    fn write_fixture(path: &std::path::Path) {
        std::fs::write(path, build_ipz_fixture(b"OLD-SERIAL  ")).unwrap();
    }

    fn unique_path(label: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("vpd-manager-facade-test-{}-{}", std::process::id(), label));
        path
    }

    fn fru_config(inventory_path: &str) -> FruConfig {
        FruConfig {
            inventory_path: inventory_path.to_owned(),
            offset: 0,
            redundant_eeprom: None,
            power_off_only: false,
            replaceable_at_runtime: true,
            replaceable_at_standby: true,
            pre_action: None,
            post_action: None,
            post_fail_action: None,
        }
    }

    #[test]
    fn update_and_read_keyword_round_trip() {
        let path = unique_path("primary");
        write_fixture(&path);

        let mut frus = HashMap::new();
        frus.insert(path.to_string_lossy().into_owned(), fru_config("/xyz/fru0"));
        let bus = InMemoryInventoryBus::new();
        let manager = KeywordManager::new(frus, Box::new(NullGuard), &bus);

        let written = manager.update_keyword(&path.to_string_lossy(), "VINI", "SN", b"NEWSERIAL01 ").unwrap();
        assert_eq!(written, 12);

        let read_back = manager.read_keyword(&path.to_string_lossy(), "VINI", "SN").unwrap();
        assert_eq!(read_back, b"NEWSERIAL01 ");
        assert_eq!(bus.get("/xyz/fru0", "VINI", "SN"), Some(b"NEWSERIAL01 ".to_vec()));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn resolves_by_inventory_path_too() {
        let path = unique_path("by-inventory-path");
        write_fixture(&path);

        let mut frus = HashMap::new();
        frus.insert(path.to_string_lossy().into_owned(), fru_config("/xyz/fru1"));
        let bus = InMemoryInventoryBus::new();
        let manager = KeywordManager::new(frus, Box::new(NullGuard), &bus);

        let read_back = manager.read_keyword("/xyz/fru1", "VINI", "SN").unwrap();
        assert_eq!(read_back, b"OLD-SERIAL  ");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unknown_path_is_rejected() {
        let bus = InMemoryInventoryBus::new();
        let manager = KeywordManager::new(HashMap::new(), Box::new(NullGuard), &bus);
        let result = manager.read_keyword("/does/not/exist", "VINI", "SN");
        assert!(matches!(result, Err(Error::UnknownPath(_))));
    }

    struct AlwaysDenyGuard;
    impl RebootGuard for AlwaysDenyGuard {
        fn acquire(&self) -> Result<(), AcquireFailed> {
            Err(AcquireFailed("a reboot is already pending".to_owned()))
        }

        fn release(&self) -> Result<(), reboot_guard::ReleaseFailed> {
            Ok(())
        }
    }

    #[test]
    fn guard_acquire_failure_aborts_before_any_write() {
        let path = unique_path("guard-denied");
        write_fixture(&path);

        let mut frus = HashMap::new();
        frus.insert(path.to_string_lossy().into_owned(), fru_config("/xyz/fru2"));
        let bus = InMemoryInventoryBus::new();
        let manager = KeywordManager::new(frus, Box::new(AlwaysDenyGuard), &bus);

        let result = manager.update_keyword(&path.to_string_lossy(), "VINI", "SN", b"NEWSERIAL01 ");
        assert!(matches!(result, Err(Error::GuardAcquireFailed(_))));

        let unchanged = std::fs::read(&path).unwrap();
        let mut parsed_buf = unchanged.clone();
        let parsed = ipz::parse(&mut parsed_buf).unwrap();
        let store = Store::from_parsed(parsed);
        assert_eq!(store.get("VINI", "SN"), Some(&b"OLD-SERIAL  "[..]));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn oversize_value_is_rejected() {
        let path = unique_path("oversize");
        write_fixture(&path);

        let mut frus = HashMap::new();
        frus.insert(path.to_string_lossy().into_owned(), fru_config("/xyz/fru3"));
        let bus = InMemoryInventoryBus::new();
        let manager = KeywordManager::new(frus, Box::new(NullGuard), &bus);

        let result = manager.update_keyword(&path.to_string_lossy(), "VINI", "SN", b"WAY TOO LONG OF A VALUE");
        assert!(matches!(result, Err(Error::Write(_))));

        std::fs::remove_file(&path).ok();
    }
}
