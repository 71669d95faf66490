//! Anchor/target resolution.

use std::path::{Path, PathBuf};

use crate::entries::EntriesStore;
use crate::error::Result;
use crate::paths;

fn is_versioned_dir(dir: &Path) -> bool {
    paths::entries_path(dir).exists()
}

fn entry_url(dir: &Path, name: &str, entries: &dyn EntriesStore) -> Result<Option<String>> {
    let table = entries.load(dir)?;
    Ok(table.get(name).and_then(|r| r.url.clone()))
}

/// True if `path` must be treated as a working-copy root: it has no
/// versioned parent, the parent has no URL recorded, or the parent's
/// URL joined with `path`'s basename doesn't match `path`'s own URL.
fn is_wc_root(path: &Path, entries: &dyn EntriesStore) -> Result<bool> {
    let Some(parent) = path.parent() else {
        return Ok(true);
    };
    if !is_versioned_dir(parent) {
        return Ok(true);
    }

    let parent_url = entry_url(parent, crate::entries::THIS_DIR, entries)?;
    let Some(parent_url) = parent_url else {
        return Ok(true);
    };

    let basename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let own_url = if is_versioned_dir(path) {
        entry_url(path, crate::entries::THIS_DIR, entries)?
    } else {
        entry_url(parent, basename, entries)?
    };

    let expected = format!("{}/{}", parent_url.trim_end_matches('/'), basename);
    Ok(own_url.as_deref() != Some(expected.as_str()))
}

/// Resolves a user-supplied path into an (anchor, target) pair. A
/// directory that is a WC root anchors the edit on itself with no
/// target restriction; everything else anchors on the parent with the
/// basename as target. A file is never returned as the anchor, since
/// the editor protocol cannot replace a directory with a file at its
/// root.
pub fn resolve_anchor(
    path: &Path,
    path_is_dir: bool,
    entries: &dyn EntriesStore,
) -> Result<(PathBuf, Option<String>)> {
    if path_is_dir && is_wc_root(path, entries)? {
        return Ok((path.to_path_buf(), None));
    }

    let parent = path.parent().unwrap_or(path).to_path_buf();
    let basename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    Ok((parent, Some(basename)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::{EntryRecord, JsonEntriesStore, THIS_DIR};
    use tempfile::tempdir;

    fn versioned_dir(root: &Path, url: &str, store: &dyn EntriesStore) {
        let mut table = crate::entries::Entries::default();
        table
            .records
            .insert(THIS_DIR.to_string(), EntryRecord::new_dir(1, Some(url.to_string())));
        store.save(root, &table).unwrap();
    }

    #[test]
    fn directory_that_is_wc_root_anchors_on_itself() {
        let dir = tempdir().unwrap();
        let store = JsonEntriesStore;
        versioned_dir(dir.path(), "http://example/repo", &store);
        // No versioned parent recorded for the tempdir's parent, so
        // this directory is necessarily a WC root.
        let (anchor, target) = resolve_anchor(dir.path(), true, &store).unwrap();
        assert_eq!(anchor, dir.path());
        assert_eq!(target, None);
    }

    #[test]
    fn nested_directory_resolves_to_parent_and_basename() {
        let dir = tempdir().unwrap();
        let store = JsonEntriesStore;
        versioned_dir(dir.path(), "http://example/repo", &store);

        let child = dir.path().join("sub");
        std::fs::create_dir(&child).unwrap();
        versioned_dir(&child, "http://example/repo/sub", &store);
        let mut parent_table = store.load(dir.path()).unwrap();
        parent_table.records.insert(
            "sub".to_string(),
            EntryRecord::new_dir(1, Some("http://example/repo/sub".into())),
        );
        store.save(dir.path(), &parent_table).unwrap();

        let (anchor, target) = resolve_anchor(&child, true, &store).unwrap();
        assert_eq!(anchor, dir.path());
        assert_eq!(target, Some("sub".to_string()));
    }

    #[test]
    fn file_resolves_to_parent_and_basename() {
        let dir = tempdir().unwrap();
        let store = JsonEntriesStore;
        versioned_dir(dir.path(), "http://example/repo", &store);
        let mut table = store.load(dir.path()).unwrap();
        table.records.insert(
            "foo.txt".to_string(),
            EntryRecord::new_file(1, Some("http://example/repo/foo.txt".into())),
        );
        store.save(dir.path(), &table).unwrap();

        let (anchor, target) = resolve_anchor(&dir.path().join("foo.txt"), false, &store).unwrap();
        assert_eq!(anchor, dir.path());
        assert_eq!(target, Some("foo.txt".to_string()));
    }
}
