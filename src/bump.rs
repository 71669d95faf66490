//! Bump tracking & directory completion.
//!
//! Every entity touched by the edit holds one reference on its
//! directory's [`Bump`] record; the root's record carries one extra
//! reference for the edit itself, released on `close_edit`. When a
//! record's count reaches zero the directory is "complete": its
//! `THIS_DIR` entry is no longer `incomplete`, and any entry that is
//! `deleted` or a missing, non-added child directory is swept away.
//! Completion then ascends to the parent record and repeats.
//!
//! Parent links are weak, per the design notes: a child bump record
//! does not keep its parent's `Rc` alive — the owning [`crate::context::EditContext`]
//! retains every directory state (and so every bump record) for the
//! life of the edit; the weak link only lets completion walk upward.

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use crate::entries::{EntriesStore, EntryKind};
use crate::error::Result;
use crate::notify::{Action, ContentState, NodeKind, Notification, NotifyFn, PropState};

pub struct Bump {
    pub path: PathBuf,
    ref_count: Cell<u32>,
    parent: Option<Weak<Bump>>,
}

impl Bump {
    /// Creates the root's bump record, pre-loaded with the extra
    /// reference the edit itself holds until `close_edit`.
    pub fn new_root(path: PathBuf) -> Rc<Bump> {
        Rc::new(Bump {
            path,
            ref_count: Cell::new(1),
            parent: None,
        })
    }

    /// Creates a child directory's bump record, incrementing the
    /// parent's count by one for the child's own existence.
    pub fn new_child(path: PathBuf, parent: &Rc<Bump>) -> Rc<Bump> {
        parent.increment();
        Rc::new(Bump {
            path,
            ref_count: Cell::new(0),
            parent: Some(Rc::downgrade(parent)),
        })
    }

    pub fn increment(&self) {
        self.ref_count.set(self.ref_count.get() + 1);
    }

    pub fn count(&self) -> u32 {
        self.ref_count.get()
    }

    /// Decrements this record's reference count and, if it reaches
    /// zero, completes the directory and ascends to the parent,
    /// repeating the decrement there. `is_root_target` restricts the
    /// sweep to a single named entry when this is the edit root and
    /// the edit has a target.
    pub fn decrement(
        self_rc: &Rc<Bump>,
        entries: &dyn EntriesStore,
        notify: &mut NotifyFn<'_>,
        is_root_target: Option<&str>,
    ) -> Result<()> {
        self_rc.ref_count.set(self_rc.ref_count.get().saturating_sub(1));
        if self_rc.ref_count.get() != 0 {
            return Ok(());
        }

        complete_directory(&self_rc.path, entries, notify, is_root_target)?;

        if let Some(parent_weak) = &self_rc.parent {
            if let Some(parent) = parent_weak.upgrade() {
                return Bump::decrement(&parent, entries, notify, None);
            }
        }
        Ok(())
    }
}

/// Performs the completion sweep for one directory: clears
/// `incomplete`, removes deleted entries, and removes child-directory
/// entries that are missing from disk and not scheduled for addition.
pub fn complete_directory(
    dir: &Path,
    entries: &dyn EntriesStore,
    notify: &mut NotifyFn<'_>,
    restrict_to: Option<&str>,
) -> Result<()> {
    let mut table = entries.load(dir)?;

    if let Some(this_dir) = table.this_dir_mut() {
        this_dir.incomplete = false;
    }

    let names: Vec<String> = match restrict_to {
        Some(name) => vec![name.to_string()],
        None => table
            .records
            .keys()
            .filter(|k| k.as_str() != crate::entries::THIS_DIR)
            .cloned()
            .collect(),
    };

    for name in names {
        let Some(record) = table.records.get(&name) else {
            continue;
        };

        // The ghost left behind by a target deletion must survive the
        // sweep untouched.
        if record.deleted && restrict_to.is_some() {
            continue;
        }

        if record.deleted {
            table.records.remove(&name);
            continue;
        }

        if record.kind == EntryKind::Dir
            && !record.scheduled_for_addition
            && !dir.join(&name).is_dir()
        {
            table.records.remove(&name);
            notify(Notification {
                path: dir.join(&name),
                action: Action::Delete,
                node_kind: Some(NodeKind::Dir),
                content_state: ContentState::Unchanged,
                prop_state: PropState::Unchanged,
                revision: None,
            });
        }
    }

    entries.save(dir, &table)
}
