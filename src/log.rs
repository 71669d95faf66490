//! Journaled per-directory log.
//!
//! A log is a sequence of self-closing records accumulated in memory,
//! then written and fsynced as a unit, then replayed, then removed.
//! Replay is idempotent — each command only ever moves state forward
//! (e.g. `Move` is a no-op if `dest` already exists and `src` does
//! not) — so a crash between "log written" and "log removed" is
//! recovered for free the next time any operation opens this
//! directory's log.
//!
//! Records are stored one `serde_json`-encoded [`LogOp`] per line
//! rather than as literal self-closing tags — see `DESIGN.md` for the
//! rationale.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::entries::{EntriesStore, EntryKind};
use crate::error::Result;
use crate::merge::MergeTool;
use crate::paths;
use crate::translate::{self, EolStyle};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModifyEntryFields {
    pub kind: Option<EntryKind>,
    pub revision: Option<u64>,
    pub url: Option<Option<String>>,
    pub deleted: Option<bool>,
    pub incomplete: Option<bool>,
    pub scheduled_for_addition: Option<bool>,
    pub text_checksum: Option<Option<String>>,
    pub prop_checksum: Option<Option<String>>,
    pub text_time: Option<Option<i64>>,
    pub prop_time: Option<Option<i64>>,
    pub committed_rev: Option<Option<u64>>,
    pub committed_date: Option<Option<String>>,
    pub last_author: Option<Option<String>>,
    pub copyfrom_url: Option<Option<String>>,
    pub copyfrom_rev: Option<Option<u64>>,
}

impl ModifyEntryFields {
    pub fn apply_to(&self, record: &mut crate::entries::EntryRecord) {
        if let Some(v) = self.kind {
            record.kind = v;
        }
        if let Some(v) = self.revision {
            record.revision = v;
        }
        if let Some(v) = self.url.clone() {
            record.url = v;
        }
        if let Some(v) = self.deleted {
            record.deleted = v;
        }
        if let Some(v) = self.incomplete {
            record.incomplete = v;
        }
        if let Some(v) = self.scheduled_for_addition {
            record.scheduled_for_addition = v;
        }
        if let Some(v) = self.text_checksum.clone() {
            record.text_checksum = v;
        }
        if let Some(v) = self.prop_checksum.clone() {
            record.prop_checksum = v;
        }
        if let Some(v) = self.text_time {
            record.text_time = v;
        }
        if let Some(v) = self.prop_time {
            record.prop_time = v;
        }
        if let Some(v) = self.committed_rev {
            record.committed_rev = v;
        }
        if let Some(v) = self.committed_date.clone() {
            record.committed_date = v;
        }
        if let Some(v) = self.last_author.clone() {
            record.last_author = v;
        }
        if let Some(v) = self.copyfrom_url.clone() {
            record.copyfrom_url = v;
        }
        if let Some(v) = self.copyfrom_rev {
            record.copyfrom_rev = v;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogOp {
    ModifyEntry {
        name: String,
        fields: ModifyEntryFields,
    },
    DeleteEntry {
        name: String,
    },
    ModifyWcProp {
        name: String,
        propname: String,
        propval: Option<String>,
    },
    CopyAndTranslate {
        src: String,
        dest: String,
        eol_style: EolStyle,
    },
    CopyAndDetranslate {
        src: String,
        dest: String,
    },
    Move {
        src: String,
        dest: String,
    },
    SetReadonly {
        name: String,
    },
    Merge {
        name: String,
        left: String,
        right: String,
        left_label: String,
        right_label: String,
        local_label: String,
    },
    SetTimestamp {
        name: String,
        timestamp: i64,
    },
    /// Stamps `text_time`/`prop_time` on `name`'s entry from whatever
    /// mtime the working file (resp. working proplist) carries right
    /// now, i.e. after every other op in this log has already run.
    RecordTimestamps {
        name: String,
        text: bool,
        prop: bool,
    },
}

// `EolStyle` needs (de)serialization to ride along inside `LogOp`.
impl Serialize for EolStyle {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        let tag = match self {
            EolStyle::Lf => "lf",
            EolStyle::Crlf => "crlf",
            EolStyle::Cr => "cr",
            EolStyle::Native => "native",
        };
        s.serialize_str(tag)
    }
}

impl<'de> Deserialize<'de> for EolStyle {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Ok(match s.as_str() {
            "lf" => EolStyle::Lf,
            "crlf" => EolStyle::Crlf,
            "cr" => EolStyle::Cr,
            _ => EolStyle::Native,
        })
    }
}

/// Accumulates log records for one administrative directory.
pub struct Log {
    dir: PathBuf,
    ops: Vec<LogOp>,
}

/// Result of replaying a log: which merged files ended up conflicted.
#[derive(Default, Debug)]
pub struct RunReport {
    pub conflicted: HashMap<String, bool>,
}

impl Log {
    pub fn new(dir: &Path) -> Self {
        Log {
            dir: dir.to_path_buf(),
            ops: Vec::new(),
        }
    }

    pub fn push(&mut self, op: LogOp) {
        self.ops.push(op);
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Writes and fsyncs the accumulated records, then replays and
    /// removes them. This is the two-phase write crash-safety needs.
    pub fn close_and_run(
        self,
        entries: &dyn EntriesStore,
        merge: &dyn MergeTool,
    ) -> Result<RunReport> {
        if self.ops.is_empty() {
            return Ok(RunReport::default());
        }
        self.flush()?;
        Log::run(&self.dir, entries, merge)
    }

    fn flush(&self) -> Result<()> {
        let admin = paths::admin_dir(&self.dir);
        fs::create_dir_all(&admin)?;
        let tmp_path = admin.join(format!("{}.tmp", paths::LOG_FILE));
        {
            let mut f = fs::File::create(&tmp_path)?;
            for op in &self.ops {
                let line = serde_json::to_string(op)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                writeln!(f, "{line}")?;
            }
            f.sync_all()?;
        }
        fs::rename(&tmp_path, paths::log_path(&self.dir))?;
        Ok(())
    }

    /// Replays (and removes) whatever log is currently on disk for
    /// `dir`, if any. Safe to call on a directory with no pending log
    /// — this is exactly what makes crash recovery idempotent: the
    /// next operation on a directory just calls this first.
    pub fn run(dir: &Path, entries: &dyn EntriesStore, merge: &dyn MergeTool) -> Result<RunReport> {
        let log_path = paths::log_path(dir);
        let bytes = match fs::read(&log_path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(RunReport::default()),
            Err(e) => return Err(e.into()),
        };

        let mut report = RunReport::default();
        let mut table = entries.load(dir)?;

        for line in bytes.as_slice().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let op: LogOp = serde_json::from_str(&line)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            run_one(dir, op, &mut table, merge, &mut report)?;
        }

        entries.save(dir, &table)?;
        fs::remove_file(&log_path)?;
        tracing::info!(dir = %dir.display(), "replayed and removed pending log");
        Ok(report)
    }
}

fn run_one(
    dir: &Path,
    op: LogOp,
    table: &mut crate::entries::Entries,
    merge: &dyn MergeTool,
    report: &mut RunReport,
) -> Result<()> {
    match op {
        LogOp::ModifyEntry { name, fields } => {
            let record = table
                .records
                .entry(name)
                .or_insert_with(|| crate::entries::EntryRecord::new_file(0, None));
            fields.apply_to(record);
        }
        LogOp::DeleteEntry { name } => {
            table.records.remove(&name);
            let path = dir.join(&name);
            if path.is_dir() {
                let _ = fs::remove_dir_all(&path);
            } else {
                let _ = fs::remove_file(&path);
            }
        }
        LogOp::ModifyWcProp {
            name,
            propname,
            propval,
        } => {
            set_wcprop(dir, &name, &propname, propval)?;
        }
        LogOp::CopyAndTranslate {
            src,
            dest,
            eol_style,
        } => {
            let data = fs::read(dir.join(&src))?;
            let translated = translate::translate(&data, eol_style);
            fs::write(dir.join(&dest), translated)?;
        }
        LogOp::CopyAndDetranslate { src, dest } => {
            let data = fs::read(dir.join(&src))?;
            let canonical = translate::detranslate(&data);
            fs::write(dir.join(&dest), canonical)?;
        }
        LogOp::Move { src, dest } => {
            let src_path = dir.join(&src);
            let dest_path = dir.join(&dest);
            if src_path.exists() {
                if let Some(parent) = dest_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::rename(&src_path, &dest_path)?;
            }
        }
        LogOp::SetReadonly { name } => {
            let path = dir.join(&name);
            if path.exists() {
                let mut perms = fs::metadata(&path)?.permissions();
                perms.set_readonly(true);
                fs::set_permissions(&path, perms)?;
            }
        }
        LogOp::Merge {
            name,
            left,
            right,
            left_label,
            right_label,
            local_label,
        } => {
            let base = fs::read(dir.join(&left))?;
            let latest = fs::read(dir.join(&right))?;
            let local_path = dir.join(&name);
            let local = fs::read(&local_path)?;
            let outcome = merge.merge(&base, &local, &latest, &left_label, &right_label)?;
            fs::write(&local_path, &outcome.content)?;
            if outcome.conflicted {
                fs::write(dir.join(format!("{name}.{local_label}")), &local)?;
                fs::write(dir.join(format!("{name}.{left_label}")), &base)?;
                fs::write(dir.join(format!("{name}.{right_label}")), &latest)?;
            }
            report.conflicted.insert(name, outcome.conflicted);
        }
        LogOp::SetTimestamp { name, timestamp } => {
            set_mtime(&dir.join(&name), timestamp)?;
        }
        LogOp::RecordTimestamps { name, text, prop } => {
            let record = table
                .records
                .entry(name.clone())
                .or_insert_with(|| crate::entries::EntryRecord::new_file(0, None));
            if text {
                if let Some(secs) = mtime_secs(&dir.join(&name)) {
                    record.text_time = Some(secs);
                }
            }
            if prop {
                if let Some(secs) = mtime_secs(&paths::props_dir(dir).join(format!("{name}.json"))) {
                    record.prop_time = Some(secs);
                }
            }
        }
    }
    Ok(())
}

fn mtime_secs(path: &Path) -> Option<i64> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    let secs = modified.duration_since(std::time::UNIX_EPOCH).ok()?.as_secs();
    Some(secs as i64)
}

fn set_wcprop(dir: &Path, name: &str, propname: &str, propval: Option<String>) -> Result<()> {
    let wcprops_dir = paths::wcprops_dir(dir);
    fs::create_dir_all(&wcprops_dir)?;
    let path = wcprops_dir.join(format!("{name}.json"));
    let mut map: HashMap<String, String> = match fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
        Err(e) => return Err(e.into()),
    };
    match propval {
        Some(v) => {
            map.insert(propname.to_string(), v);
        }
        None => {
            map.remove(propname);
        }
    }
    let bytes = serde_json::to_vec(&map)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(&path, bytes)?;
    Ok(())
}

fn set_mtime(path: &Path, timestamp: i64) -> Result<()> {
    let time = std::time::UNIX_EPOCH + std::time::Duration::from_secs(timestamp.max(0) as u64);
    let file = fs::OpenOptions::new().write(true).open(path)?;
    file.set_modified(time)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::JsonEntriesStore;
    use crate::merge::Diff3Merge;
    use tempfile::tempdir;

    #[test]
    fn crash_between_flush_and_run_is_recovered_on_replay() {
        let dir = tempdir().unwrap();
        let store = JsonEntriesStore;
        let merge = Diff3Merge;

        let mut log = Log::new(dir.path());
        log.push(LogOp::ModifyEntry {
            name: "foo".into(),
            fields: ModifyEntryFields {
                revision: Some(2),
                ..Default::default()
            },
        });
        // Simulate a crash right after the log was written but before
        // it was replayed: flush only, don't run.
        log.flush().unwrap();
        assert!(paths::log_path(dir.path()).exists());

        // The next operation on this directory replays the pending log.
        let report = Log::run(dir.path(), &store, &merge).unwrap();
        assert!(report.conflicted.is_empty());
        assert!(!paths::log_path(dir.path()).exists());

        let entries = store.load(dir.path()).unwrap();
        assert_eq!(entries.get("foo").unwrap().revision, 2);
    }

    #[test]
    fn replaying_with_no_log_is_a_noop() {
        let dir = tempdir().unwrap();
        let store = JsonEntriesStore;
        let merge = Diff3Merge;
        let report = Log::run(dir.path(), &store, &merge).unwrap();
        assert!(report.conflicted.is_empty());
    }

    #[test]
    fn delete_entry_removes_record_and_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("foo"), b"x").unwrap();
        let store = JsonEntriesStore;
        let merge = Diff3Merge;

        let mut entries = crate::entries::Entries::default();
        entries.records.insert(
            "foo".to_string(),
            crate::entries::EntryRecord::new_file(1, None),
        );
        store.save(dir.path(), &entries).unwrap();

        let mut log = Log::new(dir.path());
        log.push(LogOp::DeleteEntry { name: "foo".into() });
        log.close_and_run(&store, &merge).unwrap();

        assert!(!dir.path().join("foo").exists());
        let entries = store.load(dir.path()).unwrap();
        assert!(entries.get("foo").is_none());
    }
}
