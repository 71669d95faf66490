//! The tree-delta editor interface and the concrete engine
//! that drives a working copy through it.
//!
//! A driver calls these callbacks in the usual nested order —
//! `open_root`, then `open_directory`/`add_directory`/`add_file`/
//! `open_file`/`delete_entry` for each entry, closing each directory
//! only after every entry inside it has closed, finishing with
//! `close_edit` — exactly like any tree-delta consumer. Directory and
//! file batons carry everything a later callback needs to know about
//! the entry currently open; this implementation uses
//! [`DirState`]/[`FileState`] rather than an opaque handle, since Rust
//! gives those to us for free.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::bump::Bump;
use crate::checksum::{Checksum, ChecksumAccumulator};
use crate::context::{CancelFn, EditContext};
use crate::dirstate::{self, DirState, FileState, PropChange, EXTERNALS_PROPERTY};
use crate::entries::{self, EntryKind};
use crate::error::{EditError, ErrorCode, Result};
use crate::install::{self, InstallRequest};
use crate::log::{Log, LogOp, ModifyEntryFields};
use crate::notify::{Action, ContentState, NodeKind, Notification, PropState};
use crate::paths;
use crate::props;

/// A sink for one file's incoming text, opened by [`TreeEditor::apply_textdelta`].
/// Every window handed to it is written to the scratch pristine and
/// folded into a running checksum; `close` yields the checksum of the
/// whole reconstructed fulltext.
pub struct TextDeltaHandler {
    file: File,
    acc: ChecksumAccumulator,
}

impl TextDeltaHandler {
    pub fn open(dir: &Path, name: &str) -> Result<Self> {
        let path = paths::scratch_pristine_path(dir, name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(TextDeltaHandler {
            file: File::create(path)?,
            acc: ChecksumAccumulator::new(),
        })
    }

    pub fn write_window(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data)?;
        self.acc.update(data);
        Ok(())
    }

    pub fn close(self) -> Result<Checksum> {
        self.file.sync_all()?;
        Ok(Checksum(self.acc.finalize()))
    }
}

/// The tree-delta editor interface. Every callback takes `&mut self`
/// because the engine mutates shared edit state (the log, the entries
/// table, the bump graph) as the tree traversal proceeds.
pub trait TreeEditor {
    type DirBaton;
    type FileBaton;

    fn set_target_revision(&mut self, revision: u64) -> Result<()>;
    fn open_root(&mut self, base_revision: u64) -> Result<Self::DirBaton>;
    fn delete_entry(&mut self, name: &str, revision: Option<u64>, parent: &mut Self::DirBaton) -> Result<()>;
    fn add_directory(
        &mut self,
        name: &str,
        parent: &mut Self::DirBaton,
        copyfrom: Option<(String, u64)>,
    ) -> Result<Self::DirBaton>;
    fn open_directory(&mut self, name: &str, parent: &mut Self::DirBaton, base_revision: u64) -> Result<Self::DirBaton>;
    fn change_dir_prop(&mut self, dir: &mut Self::DirBaton, name: &str, value: Option<String>) -> Result<()>;
    fn close_directory(&mut self, dir: Self::DirBaton) -> Result<()>;
    fn add_file(
        &mut self,
        name: &str,
        parent: &mut Self::DirBaton,
        copyfrom: Option<(String, u64)>,
    ) -> Result<Self::FileBaton>;
    fn open_file(&mut self, name: &str, parent: &mut Self::DirBaton, base_revision: u64) -> Result<Self::FileBaton>;
    fn apply_textdelta(&mut self, file: &mut Self::FileBaton, base_checksum: Option<Checksum>) -> Result<TextDeltaHandler>;
    fn change_file_prop(&mut self, file: &mut Self::FileBaton, name: &str, value: Option<String>) -> Result<()>;
    fn close_file(&mut self, file: Self::FileBaton, text_checksum: Option<Checksum>) -> Result<()>;
    fn close_edit(&mut self) -> Result<()>;
}

/// Gives a freshly-created directory bump record its own pending-close
/// reference, on top of whatever reference its creation just added to
/// the parent. Mirrors [`Bump::new_root`]'s initial count of one.
fn new_dir_bump(path: PathBuf, parent: &Rc<Bump>) -> Rc<Bump> {
    let bump = Bump::new_child(path, parent);
    bump.increment();
    bump
}

/// Refuses to add `name` over something already on disk that the
/// working copy doesn't already know about — an unversioned
/// obstruction.
fn check_unobstructed(ctx: &EditContext, parent: &DirState, name: &str, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let table = ctx.entries.load(&parent.path)?;
    if table.get(name).is_some() {
        return Ok(());
    }
    Err(EditError::new(
        ErrorCode::ObstructedUpdate,
        format!("'{name}' already exists and is not under version control"),
    ))
}

/// Resolves the root directory's own new URL: the switch destination
/// if this edit is a switch, otherwise whatever URL the anchor's own
/// entry already records. Every child URL cascades from this one by
/// joining its name on, so a switch's new branch propagates all the
/// way down the tree exactly like the original URL would have.
fn root_new_url(ctx: &EditContext) -> Result<Option<String>> {
    if let Some(switch_url) = &ctx.options.switch_url {
        return Ok(Some(switch_url.clone()));
    }
    Ok(ctx.entries.load(&ctx.anchor)?.this_dir().and_then(|r| r.url.clone()))
}

/// Resolves `name`'s URL by joining it onto `parent`'s own new URL —
/// the same URL `parent`'s baton was constructed with, which already
/// cascaded down from the root's (see [`root_new_url`]).
fn child_url(parent: &DirState, name: &str) -> Option<String> {
    parent.new_url.as_ref().map(|u| format!("{}/{}", u.trim_end_matches('/'), name))
}

/// The concrete engine: drives one working-copy directory tree through
/// an incoming edit, installing files via [`install::install_file`]
/// and tracking directory completion via [`Bump`].
pub struct UpdateEditor<'a> {
    ctx: EditContext<'a>,
    root_bump: Option<Rc<Bump>>,
}

impl<'a> UpdateEditor<'a> {
    pub fn new(ctx: EditContext<'a>) -> Self {
        UpdateEditor { ctx, root_bump: None }
    }

    pub fn into_context(self) -> EditContext<'a> {
        self.ctx
    }
}

impl<'a> TreeEditor for UpdateEditor<'a> {
    type DirBaton = Box<DirState>;
    type FileBaton = Box<FileState>;

    fn set_target_revision(&mut self, revision: u64) -> Result<()> {
        self.ctx.target_revision = revision;
        Ok(())
    }

    fn open_root(&mut self, _base_revision: u64) -> Result<Self::DirBaton> {
        Log::run(&self.ctx.anchor, &*self.ctx.entries, &*self.ctx.merge_tool)?;
        let bump = Bump::new_root(self.ctx.anchor.clone());
        bump.increment();
        self.root_bump = Some(Rc::clone(&bump));
        self.ctx.root_opened = true;

        let new_url = root_new_url(&self.ctx)?;

        // When there is no target the anchor itself is the directory
        // being updated, so it is marked incomplete the moment it is
        // opened, just like every other directory `open_directory`
        // reaches — completion clears the flag once the edit finishes
        // with it.
        if self.ctx.target.is_none() {
            let mut table = self.ctx.entries.load(&self.ctx.anchor)?;
            let mut this_dir = table
                .this_dir()
                .cloned()
                .unwrap_or_else(|| entries::EntryRecord::new_dir(self.ctx.target_revision, new_url.clone()));
            this_dir.incomplete = true;
            this_dir.revision = self.ctx.target_revision;
            this_dir.url = new_url.clone();
            table.records.insert(entries::THIS_DIR.to_string(), this_dir);
            self.ctx.entries.save(&self.ctx.anchor, &table)?;
        }

        let access = self
            .ctx
            .access
            .take()
            .ok_or_else(|| EditError::new(ErrorCode::Io, "admin access for the anchor was already consumed"))?;
        Ok(Box::new(DirState::new(
            self.ctx.anchor.clone(),
            entries::THIS_DIR.to_string(),
            new_url,
            false,
            bump,
            access,
        )))
    }

    fn delete_entry(&mut self, name: &str, revision: Option<u64>, parent: &mut Self::DirBaton) -> Result<()> {
        let table = self.ctx.entries.load(&parent.path)?;
        let kind = table.get(name).map(|r| r.kind);

        match kind {
            Some(EntryKind::File) => install::check_deletable(&parent.path, name)?,
            Some(EntryKind::Dir) => {
                let child_path = parent.path.join(name);
                let _ = fs::remove_dir_all(paths::admin_dir(&child_path));
            }
            None => {}
        }

        let is_target = parent.path == self.ctx.anchor && self.ctx.target.as_deref() == Some(name);

        let mut log = Log::new(&parent.path);
        log.push(LogOp::DeleteEntry { name: name.to_string() });
        if is_target {
            log.push(LogOp::ModifyEntry {
                name: name.to_string(),
                fields: ModifyEntryFields {
                    deleted: Some(true),
                    revision: Some(revision.unwrap_or(self.ctx.target_revision)),
                    ..Default::default()
                },
            });
            self.ctx.target_deleted = true;
        }
        log.close_and_run(&*self.ctx.entries, &*self.ctx.merge_tool)?;

        let node_kind = match kind {
            Some(EntryKind::Dir) => NodeKind::Dir,
            _ => NodeKind::File,
        };
        self.ctx.notify(Notification::delete(parent.path.join(name), node_kind));
        Ok(())
    }

    fn add_directory(
        &mut self,
        name: &str,
        parent: &mut Self::DirBaton,
        copyfrom: Option<(String, u64)>,
    ) -> Result<Self::DirBaton> {
        let path = parent.path.join(name);
        check_unobstructed(&self.ctx, parent, name, &path)?;
        fs::create_dir_all(&path)?;
        let access = parent.access.open_child(&path)?;
        Log::run(&path, &*self.ctx.entries, &*self.ctx.merge_tool)?;

        let bump = new_dir_bump(path.clone(), &parent.bump);
        let new_url = child_url(parent, name);

        let (copyfrom_url, copyfrom_rev) = match &copyfrom {
            Some((url, rev)) => (Some(Some(url.clone())), Some(Some(*rev))),
            None => (None, None),
        };
        let mut log = Log::new(&parent.path);
        log.push(LogOp::ModifyEntry {
            name: name.to_string(),
            fields: ModifyEntryFields {
                kind: Some(EntryKind::Dir),
                scheduled_for_addition: Some(true),
                copyfrom_url,
                copyfrom_rev,
                ..Default::default()
            },
        });
        log.close_and_run(&*self.ctx.entries, &*self.ctx.merge_tool)?;

        let mut child_table = self.ctx.entries.load(&path)?;
        let mut this_dir = child_table
            .this_dir()
            .cloned()
            .unwrap_or_else(|| entries::EntryRecord::new_dir(0, new_url.clone()));
        this_dir.incomplete = true;
        this_dir.url = new_url.clone();
        child_table.records.insert(entries::THIS_DIR.to_string(), this_dir);
        self.ctx.entries.save(&path, &child_table)?;

        self.ctx
            .notify(Notification::add(path.clone(), NodeKind::Dir, self.ctx.target_revision));

        Ok(Box::new(DirState::new(path, name.to_string(), new_url, true, bump, access)))
    }

    fn open_directory(&mut self, name: &str, parent: &mut Self::DirBaton, _base_revision: u64) -> Result<Self::DirBaton> {
        let path = parent.path.join(name);
        let access = parent.access.open_child(&path)?;
        Log::run(&path, &*self.ctx.entries, &*self.ctx.merge_tool)?;

        let bump = new_dir_bump(path.clone(), &parent.bump);
        let new_url = child_url(parent, name);

        // Mirrors `open_root`: a directory is marked incomplete and
        // stamped with the incoming revision/URL the moment it is
        // opened, not only once it closes, so a crash mid-edit leaves
        // it correctly flagged as unfinished.
        let mut table = self.ctx.entries.load(&path)?;
        let mut this_dir = table
            .this_dir()
            .cloned()
            .unwrap_or_else(|| entries::EntryRecord::new_dir(self.ctx.target_revision, new_url.clone()));
        this_dir.incomplete = true;
        this_dir.revision = self.ctx.target_revision;
        this_dir.url = new_url.clone();
        table.records.insert(entries::THIS_DIR.to_string(), this_dir);
        self.ctx.entries.save(&path, &table)?;

        Ok(Box::new(DirState::new(path, name.to_string(), new_url, false, bump, access)))
    }

    fn change_dir_prop(&mut self, dir: &mut Self::DirBaton, name: &str, value: Option<String>) -> Result<()> {
        if name == EXTERNALS_PROPERTY {
            let old = props::read_working(&dir.path, entries::THIS_DIR)?.get(name).cloned();
            self.ctx.traversal_info.record_externals_change(dir.path.clone(), old, value.clone());
        }
        dir.propchanges.push(PropChange {
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn close_directory(&mut self, dir: Self::DirBaton) -> Result<()> {
        let (regular, entry, wc) = dirstate::partition_propchanges(&dir.propchanges);

        let mut prop_state = PropState::Unchanged;
        if !regular.is_empty() {
            let mut working = props::read_working(&dir.path, entries::THIS_DIR)?;
            let mut base = props::read_base(&dir.path, entries::THIS_DIR)?;
            for change in &regular {
                let delta = props::PropDelta {
                    name: change.name.clone(),
                    value: change.value.clone(),
                };
                props::apply_delta(&mut working, &delta);
                props::apply_delta(&mut base, &delta);
            }
            props::write_working(&dir.path, entries::THIS_DIR, &working)?;
            props::write_base(&dir.path, entries::THIS_DIR, &base)?;
            prop_state = PropState::Changed;
        }

        let mut fields = ModifyEntryFields {
            revision: Some(self.ctx.target_revision),
            scheduled_for_addition: Some(false),
            url: dir.new_url.clone().map(Some),
            ..Default::default()
        };
        for change in &entry {
            match change.name.as_str() {
                "entry:committed-rev" => {
                    fields.committed_rev = Some(change.value.as_ref().and_then(|v| v.parse().ok()));
                }
                "entry:committed-date" => fields.committed_date = Some(change.value.clone()),
                "entry:last-author" => fields.last_author = Some(change.value.clone()),
                _ => {}
            }
        }

        let mut log = Log::new(&dir.path);
        log.push(LogOp::ModifyEntry {
            name: entries::THIS_DIR.to_string(),
            fields,
        });
        for change in &wc {
            log.push(LogOp::ModifyWcProp {
                name: entries::THIS_DIR.to_string(),
                propname: change.name.clone(),
                propval: change.value.clone(),
            });
        }
        log.close_and_run(&*self.ctx.entries, &*self.ctx.merge_tool)?;

        let action = if dir.added { Action::Add } else { Action::Update };
        self.ctx.notify(Notification {
            path: dir.path.clone(),
            action,
            node_kind: Some(NodeKind::Dir),
            content_state: ContentState::Unchanged,
            prop_state,
            revision: Some(self.ctx.target_revision),
        });

        // The root's completion is deliberately deferred to `close_edit`
        // — see the extra reference `open_root` gives it — so this
        // decrement never actually reaches zero for the root itself.
        let is_root_target = if dir.path == self.ctx.anchor {
            self.ctx.target.clone()
        } else {
            None
        };
        Bump::decrement(&dir.bump, &*self.ctx.entries, &mut self.ctx.notify, is_root_target.as_deref())
    }

    fn add_file(
        &mut self,
        name: &str,
        parent: &mut Self::DirBaton,
        copyfrom: Option<(String, u64)>,
    ) -> Result<Self::FileBaton> {
        let path = parent.path.join(name);
        check_unobstructed(&self.ctx, parent, name, &path)?;

        parent.bump.increment();
        let new_url = child_url(parent, name);
        let mut state = FileState::new(path, name.to_string(), new_url, true, Rc::clone(&parent.bump));
        state.copyfrom = copyfrom;
        Ok(Box::new(state))
    }

    fn open_file(&mut self, name: &str, parent: &mut Self::DirBaton, _base_revision: u64) -> Result<Self::FileBaton> {
        parent.bump.increment();
        let path = parent.path.join(name);
        let new_url = child_url(parent, name);
        Ok(Box::new(FileState::new(path, name.to_string(), new_url, false, Rc::clone(&parent.bump))))
    }

    fn apply_textdelta(&mut self, file: &mut Self::FileBaton, base_checksum: Option<Checksum>) -> Result<TextDeltaHandler> {
        let dir = file
            .path
            .parent()
            .ok_or_else(|| EditError::new(ErrorCode::Io, "file path has no parent directory"))?;

        if let Some(expected) = base_checksum {
            if let Ok(existing) = fs::read(paths::pristine_path(dir, &file.name)) {
                let actual = Checksum::of_bytes(&existing);
                if actual != expected {
                    return Err(EditError::new(
                        ErrorCode::ChecksumMismatch,
                        format!("pristine checksum mismatch for '{}'", file.name),
                    ));
                }
            }
        }

        file.text_changed = true;
        TextDeltaHandler::open(dir, &file.name)
    }

    fn change_file_prop(&mut self, file: &mut Self::FileBaton, name: &str, value: Option<String>) -> Result<()> {
        if name == "entry:committed-date" {
            file.cached_committed_date = value.clone();
        }
        file.prop_changed = true;
        file.propchanges.push(PropChange {
            name: name.to_string(),
            value,
        });
        Ok(())
    }

    fn close_file(&mut self, file: Self::FileBaton, text_checksum: Option<Checksum>) -> Result<()> {
        let dir = file
            .path
            .parent()
            .ok_or_else(|| EditError::new(ErrorCode::Io, "file path has no parent directory"))?
            .to_path_buf();

        // The commit-time prop rides in as a plain Unix timestamp
        // string; no date-parsing library is pulled in for what is, in
        // this engine, a single optional mtime hint.
        let commit_time = if self.ctx.options.use_commit_times {
            file.cached_committed_date.as_deref().and_then(|s| s.parse().ok())
        } else {
            None
        };

        let req = InstallRequest {
            dir: &dir,
            name: &file.name,
            new_revision: self.ctx.target_revision,
            has_new_pristine: file.text_changed,
            new_text_checksum: text_checksum,
            propchanges: file.propchanges.clone(),
            props_are_full_list: false,
            new_url: file.new_url.clone(),
            adding: file.added,
            copyfrom: file.copyfrom.clone(),
            commit_time,
        };
        let report = install::install_file(req, &*self.ctx.entries, &*self.ctx.merge_tool)?;

        let action = if file.added { Action::Add } else { Action::Update };
        self.ctx.notify(Notification {
            path: file.path.clone(),
            action,
            node_kind: Some(NodeKind::File),
            content_state: report.content_state,
            prop_state: report.prop_state,
            revision: Some(self.ctx.target_revision),
        });

        Bump::decrement(&file.bump, &*self.ctx.entries, &mut self.ctx.notify, None)
    }

    fn close_edit(&mut self) -> Result<()> {
        // A driver that opens no directories at all (because the single
        // target it was asked to update is already gone from the
        // server's point of view) never calls `open_root`, so nothing
        // else has recorded the deletion. Synthesize it here.
        if !self.ctx.root_opened {
            if let Some(name) = self.ctx.target.clone() {
                let target_path = self.ctx.anchor.join(&name);
                if !target_path.exists() {
                    let mut log = Log::new(&self.ctx.anchor);
                    log.push(LogOp::DeleteEntry { name: name.clone() });
                    log.push(LogOp::ModifyEntry {
                        name: name.clone(),
                        fields: ModifyEntryFields {
                            deleted: Some(true),
                            revision: Some(self.ctx.target_revision),
                            ..Default::default()
                        },
                    });
                    log.close_and_run(&*self.ctx.entries, &*self.ctx.merge_tool)?;
                    self.ctx.target_deleted = true;
                    self.ctx.notify(Notification::delete(target_path, NodeKind::File));
                }
            }
        }

        if let Some(root) = self.root_bump.take() {
            let target = self.ctx.target.clone();
            Bump::decrement(&root, &*self.ctx.entries, &mut self.ctx.notify, target.as_deref())?;
        }

        // Every entry this edit's callbacks never touched still needs
        // its recorded revision bumped to the new one, and, on a
        // switch, its URL rewritten onto the new branch. Skipped
        // entirely if the target itself was deleted — there is nothing
        // left under it to sweep.
        if !self.ctx.target_deleted {
            run_cleanup_sweep(&self.ctx)?;
        }

        self.ctx.notify(Notification::completed(self.ctx.target_revision));
        Ok(())
    }
}

/// Recursively bumps every untouched entry's recorded revision to
/// `target_revision` and, on a switch, rewrites its URL to stay rooted
/// under the new branch. An entry is "untouched" if it is not
/// `incomplete` (still mid-edit in this same pass), not `deleted`, and
/// not freshly `scheduled_for_addition` — all three already got their
/// final revision/URL from the callback that handled them directly.
fn run_cleanup_sweep(ctx: &EditContext) -> Result<()> {
    let restrict_to = ctx.target.as_deref();
    let base_url = match (restrict_to, &ctx.options.switch_url) {
        (Some(name), Some(switch_url)) => Some(format!("{}/{}", switch_url.trim_end_matches('/'), name)),
        (None, Some(switch_url)) => Some(switch_url.clone()),
        (_, None) => None,
    };
    cleanup_dir(&ctx.anchor, base_url.as_deref(), restrict_to, ctx.target_revision, &*ctx.entries)
}

fn cleanup_dir(
    dir: &Path,
    base_url: Option<&str>,
    restrict_to: Option<&str>,
    target_revision: u64,
    entries: &dyn entries::EntriesStore,
) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    let mut table = entries.load(dir)?;
    if table.records.is_empty() {
        return Ok(());
    }

    let mut changed = false;

    if restrict_to.is_none() {
        if let Some(this_dir) = table.this_dir_mut() {
            if !this_dir.incomplete && !this_dir.deleted {
                if this_dir.revision != target_revision {
                    this_dir.revision = target_revision;
                    changed = true;
                }
                if let Some(base) = base_url {
                    let new_url = Some(base.to_string());
                    if this_dir.url != new_url {
                        this_dir.url = new_url;
                        changed = true;
                    }
                }
            }
        }
    }

    let names: Vec<String> = match restrict_to {
        Some(name) => vec![name.to_string()],
        None => table
            .records
            .keys()
            .filter(|k| k.as_str() != entries::THIS_DIR)
            .cloned()
            .collect(),
    };

    let mut children: Vec<(String, Option<String>, EntryKind)> = Vec::new();

    for name in &names {
        let Some(record) = table.records.get_mut(name) else {
            continue;
        };
        if record.incomplete || record.deleted || record.scheduled_for_addition {
            children.push((name.clone(), record.url.clone(), record.kind));
            continue;
        }
        if record.revision != target_revision {
            record.revision = target_revision;
            changed = true;
        }
        let new_url = match base_url {
            Some(base) => {
                let u = Some(format!("{}/{}", base.trim_end_matches('/'), name));
                if record.url != u {
                    record.url = u.clone();
                    changed = true;
                }
                u
            }
            None => record.url.clone(),
        };
        children.push((name.clone(), new_url, record.kind));
    }

    if changed {
        entries.save(dir, &table)?;
    }

    for (name, url, kind) in children {
        if kind == EntryKind::Dir {
            cleanup_dir(&dir.join(&name), url.as_deref(), None, target_revision, entries)?;
        }
    }
    Ok(())
}

/// Decorates any [`TreeEditor`] with a cancellation check run before
/// every callback is dispatched — the inner engine never polls for
/// cancellation itself.
pub struct CancellingEditor<'a, E: TreeEditor> {
    inner: E,
    cancel: CancelFn<'a>,
}

impl<'a, E: TreeEditor> CancellingEditor<'a, E> {
    pub fn new(inner: E, cancel: CancelFn<'a>) -> Self {
        CancellingEditor { inner, cancel }
    }

    pub fn into_inner(self) -> E {
        self.inner
    }

    fn check(&mut self) -> Result<()> {
        if (self.cancel)() {
            Err(EditError::new(ErrorCode::Cancelled, "operation cancelled"))
        } else {
            Ok(())
        }
    }
}

impl<'a, E: TreeEditor> TreeEditor for CancellingEditor<'a, E> {
    type DirBaton = E::DirBaton;
    type FileBaton = E::FileBaton;

    fn set_target_revision(&mut self, revision: u64) -> Result<()> {
        self.check()?;
        self.inner.set_target_revision(revision)
    }

    fn open_root(&mut self, base_revision: u64) -> Result<Self::DirBaton> {
        self.check()?;
        self.inner.open_root(base_revision)
    }

    fn delete_entry(&mut self, name: &str, revision: Option<u64>, parent: &mut Self::DirBaton) -> Result<()> {
        self.check()?;
        self.inner.delete_entry(name, revision, parent)
    }

    fn add_directory(
        &mut self,
        name: &str,
        parent: &mut Self::DirBaton,
        copyfrom: Option<(String, u64)>,
    ) -> Result<Self::DirBaton> {
        self.check()?;
        self.inner.add_directory(name, parent, copyfrom)
    }

    fn open_directory(&mut self, name: &str, parent: &mut Self::DirBaton, base_revision: u64) -> Result<Self::DirBaton> {
        self.check()?;
        self.inner.open_directory(name, parent, base_revision)
    }

    fn change_dir_prop(&mut self, dir: &mut Self::DirBaton, name: &str, value: Option<String>) -> Result<()> {
        self.check()?;
        self.inner.change_dir_prop(dir, name, value)
    }

    fn close_directory(&mut self, dir: Self::DirBaton) -> Result<()> {
        self.check()?;
        self.inner.close_directory(dir)
    }

    fn add_file(
        &mut self,
        name: &str,
        parent: &mut Self::DirBaton,
        copyfrom: Option<(String, u64)>,
    ) -> Result<Self::FileBaton> {
        self.check()?;
        self.inner.add_file(name, parent, copyfrom)
    }

    fn open_file(&mut self, name: &str, parent: &mut Self::DirBaton, base_revision: u64) -> Result<Self::FileBaton> {
        self.check()?;
        self.inner.open_file(name, parent, base_revision)
    }

    fn apply_textdelta(&mut self, file: &mut Self::FileBaton, base_checksum: Option<Checksum>) -> Result<TextDeltaHandler> {
        self.check()?;
        self.inner.apply_textdelta(file, base_checksum)
    }

    fn change_file_prop(&mut self, file: &mut Self::FileBaton, name: &str, value: Option<String>) -> Result<()> {
        self.check()?;
        self.inner.change_file_prop(file, name, value)
    }

    fn close_file(&mut self, file: Self::FileBaton, text_checksum: Option<Checksum>) -> Result<()> {
        self.check()?;
        self.inner.close_file(file, text_checksum)
    }

    fn close_edit(&mut self) -> Result<()> {
        self.check()?;
        self.inner.close_edit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AdminAccess;
    use crate::context::UpdateOptions;
    use crate::entries::JsonEntriesStore;
    use crate::merge::Diff3Merge;
    use crate::notify::TraversalInfo;
    use std::rc::Rc;
    use tempfile::tempdir;

    fn new_ctx<'a>(anchor: &Path, notifications: &'a mut Vec<Notification>) -> EditContext<'a> {
        new_ctx_with(anchor, None, None, notifications)
    }

    fn new_ctx_with<'a>(
        anchor: &Path,
        target: Option<&str>,
        switch_url: Option<&str>,
        notifications: &'a mut Vec<Notification>,
    ) -> EditContext<'a> {
        EditContext {
            anchor: anchor.to_path_buf(),
            target: target.map(str::to_string),
            target_revision: 0,
            options: UpdateOptions {
                switch_url: switch_url.map(str::to_string),
                ..Default::default()
            },
            cancel: None,
            notify: Box::new(move |n| notifications.push(n)),
            traversal_info: TraversalInfo::default(),
            root_opened: false,
            target_deleted: false,
            access: Some(AdminAccess::open(anchor).unwrap()),
            entries: Rc::new(JsonEntriesStore),
            merge_tool: Rc::new(Diff3Merge),
        }
    }

    fn seed_this_dir(dir: &Path, revision: u64, url: &str) {
        let store = JsonEntriesStore;
        let mut table = crate::entries::Entries::default();
        table
            .records
            .insert(entries::THIS_DIR.to_string(), entries::EntryRecord::new_dir(revision, Some(url.to_string())));
        store.save(dir, &table).unwrap();
    }

    #[test]
    fn clean_add_of_a_single_file_drives_all_callbacks() {
        let dir = tempdir().unwrap();
        let mut notifications = Vec::new();
        let ctx = new_ctx(dir.path(), &mut notifications);
        let mut editor = UpdateEditor::new(ctx);

        editor.set_target_revision(2).unwrap();
        let mut root = editor.open_root(0).unwrap();

        let mut file = editor.add_file("foo", &mut root, None).unwrap();
        let mut handler = editor.apply_textdelta(&mut file, None).unwrap();
        handler.write_window(b"hello\n").unwrap();
        let checksum = handler.close().unwrap();
        editor.close_file(file, Some(checksum)).unwrap();

        editor.close_directory(root).unwrap();
        editor.close_edit().unwrap();

        let working = fs::read_to_string(dir.path().join("foo")).unwrap();
        assert_eq!(working, "hello\n");

        let has_completed = notifications.iter().any(|n| n.action == Action::Completed);
        assert!(has_completed);
    }

    #[test]
    fn cancelling_editor_stops_before_any_callback_runs() {
        let dir = tempdir().unwrap();
        let mut notifications = Vec::new();
        let ctx = new_ctx(dir.path(), &mut notifications);
        let inner = UpdateEditor::new(ctx);
        let mut editor = CancellingEditor::new(inner, Box::new(|| true));

        let err = editor.open_root(0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Cancelled);
    }

    #[test]
    fn open_root_with_no_target_marks_the_anchor_incomplete_immediately() {
        let dir = tempdir().unwrap();
        let mut notifications = Vec::new();
        let ctx = new_ctx(dir.path(), &mut notifications);
        let mut editor = UpdateEditor::new(ctx);
        editor.set_target_revision(5).unwrap();

        let _root = editor.open_root(0).unwrap();

        let table = JsonEntriesStore.load(dir.path()).unwrap();
        let this_dir = table.this_dir().unwrap();
        assert!(this_dir.incomplete);
        assert_eq!(this_dir.revision, 5);
    }

    #[test]
    fn open_directory_marks_itself_incomplete_until_it_closes() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("sub");
        seed_this_dir(&sub, 1, "http://x/repo/sub");

        let mut notifications = Vec::new();
        let ctx = new_ctx(dir.path(), &mut notifications);
        let mut editor = UpdateEditor::new(ctx);
        editor.set_target_revision(3).unwrap();

        let mut root = editor.open_root(0).unwrap();
        let sub_baton = editor.open_directory("sub", &mut root, 1).unwrap();

        let mid_table = JsonEntriesStore.load(&sub).unwrap();
        let mid_this_dir = mid_table.this_dir().unwrap();
        assert!(mid_this_dir.incomplete);
        assert_eq!(mid_this_dir.revision, 3);

        editor.close_directory(sub_baton).unwrap();

        let final_table = JsonEntriesStore.load(&sub).unwrap();
        assert!(!final_table.this_dir().unwrap().incomplete);
    }

    #[test]
    fn switch_cascades_its_new_url_into_nested_directories_and_files() {
        let dir = tempdir().unwrap();
        seed_this_dir(dir.path(), 1, "http://old/repo");

        let mut notifications = Vec::new();
        let ctx = new_ctx_with(dir.path(), None, Some("http://new/repo"), &mut notifications);
        let mut editor = UpdateEditor::new(ctx);
        editor.set_target_revision(4).unwrap();

        let mut root = editor.open_root(0).unwrap();
        assert_eq!(root.new_url.as_deref(), Some("http://new/repo"));

        let mut sub = editor.add_directory("sub", &mut root, None).unwrap();
        assert_eq!(sub.new_url.as_deref(), Some("http://new/repo/sub"));

        let leaf = editor.add_file("leaf", &mut sub, None).unwrap();
        assert_eq!(leaf.new_url.as_deref(), Some("http://new/repo/sub/leaf"));
    }

    #[test]
    fn close_edit_synthesizes_a_missed_target_deletion_when_root_is_never_opened() {
        let dir = tempdir().unwrap();
        let mut seed = entries::Entries::default();
        seed.records.insert(
            "gone".to_string(),
            entries::EntryRecord::new_file(1, Some("http://x/repo/gone".into())),
        );
        JsonEntriesStore.save(dir.path(), &seed).unwrap();

        let mut notifications = Vec::new();
        let ctx = new_ctx_with(dir.path(), Some("gone"), None, &mut notifications);
        let mut editor = UpdateEditor::new(ctx);
        editor.set_target_revision(9).unwrap();

        editor.close_edit().unwrap();

        let table = JsonEntriesStore.load(dir.path()).unwrap();
        let record = table.get("gone").unwrap();
        assert!(record.deleted);
        assert_eq!(record.revision, 9);
        assert!(notifications.iter().any(|n| n.action == Action::Delete));
    }

    #[test]
    fn close_edit_cleanup_sweep_bumps_an_untouched_entrys_revision() {
        let dir = tempdir().unwrap();
        let mut seed = entries::Entries::default();
        seed.records.insert(
            entries::THIS_DIR.to_string(),
            entries::EntryRecord::new_dir(1, Some("http://x/repo".into())),
        );
        seed.records.insert(
            "untouched".to_string(),
            entries::EntryRecord::new_file(1, Some("http://x/repo/untouched".into())),
        );
        JsonEntriesStore.save(dir.path(), &seed).unwrap();

        let mut notifications = Vec::new();
        let ctx = new_ctx(dir.path(), &mut notifications);
        let mut editor = UpdateEditor::new(ctx);
        editor.set_target_revision(7).unwrap();

        let root = editor.open_root(0).unwrap();
        editor.close_directory(root).unwrap();
        editor.close_edit().unwrap();

        let table = JsonEntriesStore.load(dir.path()).unwrap();
        assert_eq!(table.get("untouched").unwrap().revision, 7);
    }
}
