//! The entries-file reader/writer.
//!
//! One JSON-encoded table per administrative directory, written
//! atomically, mapping each child basename to its recorded state.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::paths;

/// The sentinel key used for a directory's entry describing itself,
/// mirroring the "this dir" record every admin directory's table
/// carries alongside its children.
pub const THIS_DIR: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Dir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub kind: EntryKind,
    pub revision: u64,
    pub url: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub incomplete: bool,
    #[serde(default)]
    pub scheduled_for_addition: bool,
    pub text_checksum: Option<String>,
    pub prop_checksum: Option<String>,
    pub text_time: Option<i64>,
    pub prop_time: Option<i64>,
    pub committed_rev: Option<u64>,
    pub committed_date: Option<String>,
    pub last_author: Option<String>,
    pub copyfrom_url: Option<String>,
    pub copyfrom_rev: Option<u64>,
}

impl EntryRecord {
    pub fn new_dir(revision: u64, url: Option<String>) -> Self {
        EntryRecord {
            kind: EntryKind::Dir,
            revision,
            url,
            deleted: false,
            incomplete: false,
            scheduled_for_addition: false,
            text_checksum: None,
            prop_checksum: None,
            text_time: None,
            prop_time: None,
            committed_rev: None,
            committed_date: None,
            last_author: None,
            copyfrom_url: None,
            copyfrom_rev: None,
        }
    }

    pub fn new_file(revision: u64, url: Option<String>) -> Self {
        EntryRecord {
            kind: EntryKind::File,
            ..EntryRecord::new_dir(revision, url)
        }
    }
}

/// The full per-directory entries table: the `THIS_DIR` record plus
/// one record per child basename.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entries {
    pub records: BTreeMap<String, EntryRecord>,
}

impl Entries {
    pub fn this_dir(&self) -> Option<&EntryRecord> {
        self.records.get(THIS_DIR)
    }

    pub fn this_dir_mut(&mut self) -> Option<&mut EntryRecord> {
        self.records.get_mut(THIS_DIR)
    }

    pub fn get(&self, name: &str) -> Option<&EntryRecord> {
        self.records.get(name)
    }
}

/// Reads and writes one directory's entries table, atomically.
pub trait EntriesStore {
    fn load(&self, dir: &Path) -> Result<Entries>;
    fn save(&self, dir: &Path, entries: &Entries) -> Result<()>;
}

/// The default, JSON-backed entries store.
#[derive(Default, Clone, Copy)]
pub struct JsonEntriesStore;

impl EntriesStore for JsonEntriesStore {
    fn load(&self, dir: &Path) -> Result<Entries> {
        let path = paths::entries_path(dir);
        match fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).unwrap_or_default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Entries::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, dir: &Path, entries: &Entries) -> Result<()> {
        let admin = paths::admin_dir(dir);
        fs::create_dir_all(&admin)?;
        let path = paths::entries_path(dir);
        let tmp_path = admin.join(format!("{}.tmp", paths::ENTRIES_FILE));
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&tmp_path, &bytes)?;
        let f = fs::File::open(&tmp_path)?;
        f.sync_all()?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_entries() {
        let dir = tempdir().unwrap();
        let store = JsonEntriesStore;
        let mut entries = Entries::default();
        entries
            .records
            .insert(THIS_DIR.to_string(), EntryRecord::new_dir(1, Some("u".into())));
        entries
            .records
            .insert("foo".to_string(), EntryRecord::new_file(1, Some("u/foo".into())));
        store.save(dir.path(), &entries).unwrap();

        let loaded = store.load(dir.path()).unwrap();
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.get("foo").unwrap().revision, 1);
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = JsonEntriesStore;
        let loaded = store.load(dir.path()).unwrap();
        assert!(loaded.records.is_empty());
    }
}
