//! Single-slot credential persistence

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;

use crate::credential::CredentialRecord;

const STORE_FILE: &str = "credentials.json";
const TEMP_FILE: &str = "credentials.json.tmp";

/// Persists the most recently acquired credential record as one JSON file.
///
/// Saves are atomic with respect to process termination: the record is
/// written to a temp file and renamed into place, so a crash mid-save
/// leaves the previous record intact. A corrupt or structurally invalid
/// file reads as "no credentials yet", never as an error.
pub struct CredentialStore {
    path: PathBuf,
    temp_path: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(STORE_FILE),
            temp_path: dir.join(TEMP_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite any prior record. Idempotent.
    pub fn save(&self, record: &CredentialRecord) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&self.temp_path, data)?;
        fs::rename(&self.temp_path, &self.path)
    }

    /// The saved record, or None if never saved / unreadable / invalid.
    pub fn load(&self) -> Option<CredentialRecord> {
        let data = fs::read_to_string(&self.path).ok()?;
        let record: CredentialRecord = match serde_json::from_str(&data) {
            Ok(r) => r,
            Err(e) => {
                warn!("ignoring corrupt credential file {}: {e}", self.path.display());
                return None;
            }
        };
        if let Err(e) = record.as_payload().validate() {
            warn!("ignoring invalid credential file {}: {e}", self.path.display());
            return None;
        }
        Some(record)
    }

    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StrategyKind;
    use pisetup_proto::CredentialPayload;

    fn record(ssid: &str, pass: Option<&str>) -> CredentialRecord {
        CredentialRecord::from_payload(CredentialPayload::new(ssid, pass), StrategyKind::GattWrite)
            .unwrap()
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());

        assert!(store.load().is_none());

        let r = record("HomeNet", Some("sup3rsecret"));
        store.save(&r).unwrap();
        assert_eq!(store.load().unwrap(), r);
    }

    #[test]
    fn save_is_idempotent_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());

        let r = record("HomeNet", Some("sup3rsecret"));
        store.save(&r).unwrap();
        store.save(&r).unwrap();
        assert_eq!(store.load().unwrap(), r);

        let r2 = record("OtherNet", Some("otherpass"));
        store.save(&r2).unwrap();
        assert_eq!(store.load().unwrap(), r2);
    }

    #[test]
    fn crash_between_temp_write_and_rename_keeps_old_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());

        let r = record("HomeNet", Some("sup3rsecret"));
        store.save(&r).unwrap();

        // Simulate a crash that left a half-written temp file behind
        fs::write(dir.path().join(TEMP_FILE), "{\"ssid\": \"Half").unwrap();
        assert_eq!(store.load().unwrap(), r);
    }

    #[test]
    fn corrupt_file_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());

        fs::write(dir.path().join(STORE_FILE), "not json at all").unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn structurally_invalid_record_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());

        // Parses as a record but fails validation (secured, 3-byte passphrase)
        let bad = serde_json::json!({
            "ssid": "Net",
            "passphrase": "abc",
            "security": "wpa-psk",
            "source": "gatt-write",
            "acquired_at": 0,
        });
        fs::write(dir.path().join(STORE_FILE), bad.to_string()).unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn clear_removes_record_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path());

        store.clear().unwrap();

        store.save(&record("HomeNet", Some("sup3rsecret"))).unwrap();
        store.clear().unwrap();
        assert!(store.load().is_none());
    }
}
