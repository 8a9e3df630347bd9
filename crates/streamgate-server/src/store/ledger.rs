use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use tracing::info;

use super::error::LedgerError;

/// Length of generated stream keys. 43 alphanumeric characters carry a
/// little over 256 bits of entropy.
pub const GENERATED_KEY_LEN: usize = 43;

/// Generation attempts before giving up on finding an unused key.
const MAX_GENERATION_ATTEMPTS: u32 = 5;

/// The full persisted mapping: publisher name to stream key.
pub type KeyMap = BTreeMap<String, String>;

/// File-backed `name -> stream key` mapping.
///
/// The whole mapping lives in one flat JSON object and is reread from disk
/// on every operation, so a key added or revoked takes effect on the very
/// next authorization check. Mutations hold a process-wide lock around the
/// load/modify/save sequence, and `save` replaces the file through a
/// rename so readers never observe a torn write.
#[derive(Clone)]
pub struct KeyLedger {
    path: Arc<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl KeyLedger {
    /// Open the ledger at `path`, creating an empty mapping file when
    /// absent. A file that exists but does not decode is an error here,
    /// so a corrupt ledger stops the server at startup rather than at the
    /// first admin call.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        if !path.exists() {
            fs::write(&path, "{}").map_err(|source| LedgerError::Io {
                path: path.clone(),
                source,
            })?;
            info!(path = %path.display(), "created empty key ledger");
        }

        let ledger = Self {
            path: Arc::new(path),
            write_lock: Arc::new(Mutex::new(())),
        };
        ledger.load()?;
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full mapping fresh from disk.
    pub fn load(&self) -> Result<KeyMap, LedgerError> {
        let raw = fs::read_to_string(self.path.as_ref()).map_err(|source| LedgerError::Io {
            path: self.path.as_ref().clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| LedgerError::Corrupt {
            path: self.path.as_ref().clone(),
            source,
        })
    }

    /// Persist the full mapping, replacing the previous contents. Written
    /// to a sibling temp file first and renamed into place so a concurrent
    /// reader sees either the old mapping or the new one, never half.
    fn save(&self, map: &KeyMap) -> Result<(), LedgerError> {
        let body = serde_json::to_string_pretty(map).expect("flat string map always serializes");
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|source| LedgerError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, self.path.as_ref()).map_err(|source| LedgerError::Io {
            path: self.path.as_ref().clone(),
            source,
        })
    }

    /// Insert or overwrite the key for `name`.
    ///
    /// An explicit key is stored verbatim; an absent or blank one is
    /// replaced by a freshly generated token. Returns the stored key and
    /// whether it was generated. Collisions between caller-supplied keys
    /// and existing records are deliberately not checked.
    pub fn upsert(&self, name: &str, key: Option<&str>) -> Result<(String, bool), LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::EmptyName);
        }

        let _guard = self.write_lock.lock().expect("ledger lock poisoned");
        let mut map = self.load()?;

        let supplied = key.filter(|k| !k.trim().is_empty());
        let (final_key, generated) = match supplied {
            Some(k) => (k.to_owned(), false),
            None => (self.generate_unused(&map)?, true),
        };

        map.insert(name.to_owned(), final_key.clone());
        self.save(&map)?;
        info!(name, generated, "audit: ledger.upsert");
        Ok((final_key, generated))
    }

    /// Remove `name` from the ledger. Removing an absent name is a no-op,
    /// not an error. Returns whether the entry existed.
    pub fn delete(&self, name: &str) -> Result<bool, LedgerError> {
        let _guard = self.write_lock.lock().expect("ledger lock poisoned");
        let mut map = self.load()?;
        let existed = map.remove(name.trim()).is_some();
        self.save(&map)?;
        info!(name, existed, "audit: ledger.delete");
        Ok(existed)
    }

    /// First publisher name whose stored key equals `key`, if any.
    ///
    /// Duplicate caller-supplied keys make the winner unspecified; the
    /// ledger does not police those collisions.
    pub fn reverse_lookup(&self, key: &str) -> Result<Option<String>, LedgerError> {
        let map = self.load()?;
        Ok(map
            .into_iter()
            .find(|(_, stored)| stored == key)
            .map(|(name, _)| name))
    }

    fn generate_unused(&self, map: &KeyMap) -> Result<String, LedgerError> {
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let candidate = generate_key();
            if !map.values().any(|existing| *existing == candidate) {
                return Ok(candidate);
            }
        }
        Err(LedgerError::KeyGeneration {
            attempts: MAX_GENERATION_ATTEMPTS,
        })
    }
}

/// Generate a URL-safe stream key: random alphanumeric characters from the
/// thread CSPRNG.
pub fn generate_key() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_KEY_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, KeyLedger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = KeyLedger::open(dir.path().join("keys.json")).unwrap();
        (dir, ledger)
    }

    #[test]
    fn open_creates_an_empty_mapping() {
        let (_dir, ledger) = open_temp();
        assert!(ledger.load().unwrap().is_empty());
    }

    #[test]
    fn generated_keys_are_long_and_alphanumeric() {
        let (_dir, ledger) = open_temp();
        let (key, generated) = ledger.upsert("alice", None).unwrap();
        assert!(generated);
        assert_eq!(key.len(), GENERATED_KEY_LEN);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn reupsert_regenerates_the_key() {
        let (_dir, ledger) = open_temp();
        let (first, _) = ledger.upsert("alice", None).unwrap();
        let (second, _) = ledger.upsert("alice", None).unwrap();
        assert_ne!(first, second);
        assert_eq!(ledger.load().unwrap().len(), 1);
    }

    #[test]
    fn supplied_key_is_stored_verbatim() {
        let (_dir, ledger) = open_temp();
        let (key, generated) = ledger.upsert("bob", Some("my manual key")).unwrap();
        assert!(!generated);
        assert_eq!(key, "my manual key");
        assert_eq!(ledger.load().unwrap()["bob"], "my manual key");
    }

    #[test]
    fn blank_supplied_key_triggers_generation() {
        let (_dir, ledger) = open_temp();
        let (key, generated) = ledger.upsert("bob", Some("   ")).unwrap();
        assert!(generated);
        assert_eq!(key.len(), GENERATED_KEY_LEN);
    }

    #[test]
    fn blank_name_is_rejected_and_store_unchanged() {
        let (_dir, ledger) = open_temp();
        assert!(matches!(
            ledger.upsert("   ", None),
            Err(LedgerError::EmptyName)
        ));
        assert!(ledger.load().unwrap().is_empty());
    }

    #[test]
    fn names_are_trimmed() {
        let (_dir, ledger) = open_temp();
        ledger.upsert("  carol  ", Some("k1")).unwrap();
        assert_eq!(ledger.load().unwrap()["carol"], "k1");
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, ledger) = open_temp();
        ledger.upsert("alice", Some("abc")).unwrap();
        assert!(ledger.delete("alice").unwrap());
        assert!(!ledger.delete("alice").unwrap());
        assert!(ledger.load().unwrap().is_empty());
    }

    #[test]
    fn reverse_lookup_maps_key_back_to_name() {
        let (_dir, ledger) = open_temp();
        ledger.upsert("alice", Some("abc123")).unwrap();
        assert_eq!(
            ledger.reverse_lookup("abc123").unwrap().as_deref(),
            Some("alice")
        );
        assert_eq!(ledger.reverse_lookup("nope").unwrap(), None);
    }

    #[test]
    fn persistence_round_trips() {
        let (_dir, ledger) = open_temp();
        ledger.upsert("alice", Some("a")).unwrap();
        ledger.upsert("bob", Some("b")).unwrap();
        let before = ledger.load().unwrap();

        // delete of a missing name still rewrites the file
        ledger.delete("missing").unwrap();
        assert_eq!(ledger.load().unwrap(), before);
    }

    #[test]
    fn corrupt_file_is_an_error_not_an_empty_map() {
        let (dir, ledger) = open_temp();
        fs::write(dir.path().join("keys.json"), "not json").unwrap();
        assert!(matches!(ledger.load(), Err(LedgerError::Corrupt { .. })));
        assert!(KeyLedger::open(dir.path().join("keys.json")).is_err());
    }
}
