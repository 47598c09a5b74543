//! Configuration loading.
//!
//! Treated as an opaque source by the rest of the core: this module only
//! knows enough `serde_json` shape to get `offset`, `redundantEeprom`, and
//! the backup/restore mapping path out of it. Action-hook descriptors
//! (pre/post/post-fail) are kept as raw [`serde_json::Value`]s since their
//! interpretation belongs to external collaborators, not this core.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backup_restore::Entry;

#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Json(serde_json::Error),
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read configuration: {e}"),
            Self::Json(e) => write!(f, "configuration is not valid JSON: {e}"),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
        }
    }
}
impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}
impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Per-EEPROM-path configuration, as supplied by the surrounding service.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FruConfig {
    pub inventory_path: String,
    pub offset: u64,
    #[serde(default)]
    pub redundant_eeprom: Option<PathBuf>,
    #[serde(default)]
    pub power_off_only: bool,
    #[serde(default)]
    pub replaceable_at_runtime: bool,
    #[serde(default)]
    pub replaceable_at_standby: bool,
    #[serde(default)]
    pub pre_action: Option<serde_json::Value>,
    #[serde(default)]
    pub post_action: Option<serde_json::Value>,
    #[serde(default)]
    pub post_fail_action: Option<serde_json::Value>,
}

/// The top-level configuration document: one [`FruConfig`] per EEPROM path,
/// plus a pointer to the backup/restore mapping document.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub frus: std::collections::HashMap<String, FruConfig>,
    pub backup_restore_config_path: PathBuf,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let file = File::open(path)?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }
}

/// On-disk shape of one backup/restore mapping entry; see §6 of the
/// configuration interface this core expects to be handed.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct BackupRestoreEntryConfig {
    source_record: String,
    source_keyword: String,
    destination_record: String,
    destination_keyword: String,
    #[serde(default)]
    default_value: Option<Vec<u8>>,
    #[serde(default)]
    is_manufacture_reset_required: bool,
}

impl From<BackupRestoreEntryConfig> for Entry {
    fn from(c: BackupRestoreEntryConfig) -> Self {
        Entry {
            source_record: c.source_record,
            source_keyword: c.source_keyword,
            destination_record: c.destination_record,
            destination_keyword: c.destination_keyword,
            default_value: c.default_value,
            is_manufacture_reset_required: c.is_manufacture_reset_required,
        }
    }
}

pub fn load_backup_restore_entries(path: &Path) -> Result<Vec<Entry>, Error> {
    let file = File::open(path)?;
    let entries: Vec<BackupRestoreEntryConfig> = serde_json::from_reader(BufReader::new(file))?;
    Ok(entries.into_iter().map(Entry::from).collect())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn unique_path(label: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("vpd-manager-config-test-{}-{}", std::process::id(), label));
        path
    }

    #[test]
    fn loads_minimal_fru_config() {
        let path = unique_path("config");
        let json = r#"{
            "frus": {
                "/eeprom/fru0": {
                    "inventoryPath": "/xyz/fru0",
                    "offset": 0
                }
            },
            "backupRestoreConfigPath": "/etc/vpd/backup-restore.json"
        }"#;
        let mut f = File::create(&path).unwrap();
        f.write_all(json.as_bytes()).unwrap();
        drop(f);

        let config = Config::load(&path).unwrap();
        let fru = &config.frus["/eeprom/fru0"];
        assert_eq!(fru.inventory_path, "/xyz/fru0");
        assert_eq!(fru.offset, 0);
        assert!(fru.redundant_eeprom.is_none());
        assert!(!fru.power_off_only);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let path = unique_path("forgiving");
        let json = r#"{
            "frus": {
                "/eeprom/fru0": {
                    "inventoryPath": "/xyz/fru0",
                    "offset": 512,
                    "somethingTheCoreDoesNotKnowAbout": true
                }
            },
            "backupRestoreConfigPath": "/etc/vpd/backup-restore.json",
            "anotherUnknownTopLevelField": 42
        }"#;
        let mut f = File::create(&path).unwrap();
        f.write_all(json.as_bytes()).unwrap();
        drop(f);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.frus["/eeprom/fru0"].offset, 512);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn loads_backup_restore_entries() {
        let path = unique_path("backup-restore");
        let json = r#"[
            {
                "sourceRecord": "VSYS",
                "sourceKeyword": "SN",
                "destinationRecord": "VSBP",
                "destinationKeyword": "SN",
                "isManufactureResetRequired": true
            }
        ]"#;
        let mut f = File::create(&path).unwrap();
        f.write_all(json.as_bytes()).unwrap();
        drop(f);

        let entries = load_backup_restore_entries(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_record, "VSYS");
        assert!(entries[0].is_manufacture_reset_required);

        std::fs::remove_file(&path).ok();
    }
}
