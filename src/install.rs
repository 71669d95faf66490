//! File installation: merges incoming text and properties with local
//! modifications and schedules the result through a directory's log
//! content.

use std::fs;
use std::path::Path;

use crate::checksum::Checksum;
use crate::dirstate::{self, PropChange};
use crate::entries::{EntriesStore, EntryKind};
use crate::error::{EditError, ErrorCode, Result};
use crate::log::{Log, LogOp, ModifyEntryFields};
use crate::merge::MergeTool;
use crate::notify::{ContentState, PropState};
use crate::paths;
use crate::props;
use crate::translate::{self, EolStyle};

/// Everything `install_file` needs to know about one file's incoming
/// change.
pub struct InstallRequest<'a> {
    pub dir: &'a Path,
    pub name: &'a str,
    pub new_revision: u64,
    pub has_new_pristine: bool,
    pub new_text_checksum: Option<Checksum>,
    pub propchanges: Vec<PropChange>,
    pub props_are_full_list: bool,
    pub new_url: Option<String>,
    pub adding: bool,
    pub copyfrom: Option<(String, u64)>,
    pub commit_time: Option<i64>,
}

pub struct InstallReport {
    pub content_state: ContentState,
    pub prop_state: PropState,
}

/// Installs a file's new pristine text and properties, merging with
/// whatever local modifications exist.
///
/// The new pristine text, if any, is assumed already written to
/// `paths::scratch_pristine_path(dir, name)` by the caller's
/// text-delta handler before this is invoked.
pub fn install_file(
    req: InstallRequest,
    entries: &dyn EntriesStore,
    merge_tool: &dyn MergeTool,
) -> Result<InstallReport> {
    if req.adding {
        assert_eq!(req.new_revision, 0, "an added file carries no revision of its own yet");
    } else {
        assert!(req.copyfrom.is_none(), "copyfrom only applies to an add");
    }

    let mut log = Log::new(req.dir);

    if req.adding {
        let (copyfrom_url, copyfrom_rev) = match &req.copyfrom {
            Some((url, rev)) => (Some(Some(url.clone())), Some(Some(*rev))),
            None => (None, None),
        };
        log.push(LogOp::ModifyEntry {
            name: req.name.to_string(),
            fields: ModifyEntryFields {
                kind: Some(EntryKind::File),
                scheduled_for_addition: Some(true),
                copyfrom_url,
                copyfrom_rev,
                ..Default::default()
            },
        });
    }

    let (prop_state, any_magic_change) = apply_propchanges(&req, &mut log)?;

    let content_state = install_text(&req, any_magic_change)?;

    log.push(LogOp::ModifyEntry {
        name: req.name.to_string(),
        fields: ModifyEntryFields {
            revision: Some(req.new_revision),
            deleted: Some(false),
            scheduled_for_addition: Some(false),
            url: req.new_url.clone().map(Some),
            ..Default::default()
        },
    });

    match content_state {
        TextAction::Overwrite => {
            log.push(LogOp::CopyAndTranslate {
                src: paths::rel_scratch_pristine(req.name),
                dest: req.name.to_string(),
                eol_style: EolStyle::Native,
            });
        }
        TextAction::Merge => {
            log.push(LogOp::Merge {
                name: req.name.to_string(),
                left: paths::rel_pristine(req.name),
                right: paths::rel_scratch_pristine(req.name),
                left_label: "old".to_string(),
                right_label: format!("r{}", req.new_revision),
                local_label: "mine".to_string(),
            });
        }
        TextAction::RetranslateOnly => {
            log.push(LogOp::CopyAndDetranslate {
                src: req.name.to_string(),
                dest: paths::rel_detranslate_scratch(req.name),
            });
            log.push(LogOp::CopyAndTranslate {
                src: paths::rel_detranslate_scratch(req.name),
                dest: req.name.to_string(),
                eol_style: EolStyle::Native,
            });
        }
        TextAction::None => {}
    }

    if req.has_new_pristine {
        log.push(LogOp::Move {
            src: paths::rel_scratch_pristine(req.name),
            dest: paths::rel_pristine(req.name),
        });
        log.push(LogOp::SetReadonly {
            name: paths::rel_pristine(req.name),
        });
        if let Some(sum) = &req.new_text_checksum {
            log.push(LogOp::ModifyEntry {
                name: req.name.to_string(),
                fields: ModifyEntryFields {
                    text_checksum: Some(Some(sum.to_hex())),
                    ..Default::default()
                },
            });
        }
    }

    if let Some(t) = req.commit_time {
        log.push(LogOp::SetTimestamp {
            name: req.name.to_string(),
            timestamp: t,
        });
    }

    // A merge leaves the working file holding a blend of local and
    // incoming text, so its mtime can no longer stand in for "matches
    // pristine"; every other outcome can safely be timestamped. There is
    // no local-property-modification tracking in this engine (properties
    // are always written flat, never three-way merged), so the working
    // proplist's mtime is always safe to record.
    log.push(LogOp::RecordTimestamps {
        name: req.name.to_string(),
        text: content_state != TextAction::Merge,
        prop: true,
    });

    let report = log.close_and_run(entries, merge_tool)?;
    let conflicted = report.conflicted.get(req.name).copied().unwrap_or(false);

    let resolved_content_state = match (content_state, conflicted) {
        (TextAction::None, _) => ContentState::Unchanged,
        (TextAction::Overwrite, _) => ContentState::Changed,
        (TextAction::RetranslateOnly, _) => ContentState::Changed,
        (TextAction::Merge, true) => ContentState::Conflicted,
        (TextAction::Merge, false) => ContentState::Merged,
    };

    let resolved_prop_state = if any_magic_change && resolved_content_state == ContentState::Unchanged {
        PropState::Changed
    } else {
        prop_state
    };

    Ok(InstallReport {
        content_state: resolved_content_state,
        prop_state: resolved_prop_state,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextAction {
    None,
    Overwrite,
    Merge,
    RetranslateOnly,
}

/// Decides what to do with the working file's text: the 2x2 matrix of
/// {no local mod, local mod} x {no new text, new text}, plus the case
/// where no new text arrived at all but a magic property (keywords,
/// EOL style, the executable bit) changed and needs its translation
/// redone against the working file in place.
fn install_text(req: &InstallRequest, any_magic_change: bool) -> Result<TextAction> {
    if !req.has_new_pristine {
        if any_magic_change && req.dir.join(req.name).exists() {
            return Ok(TextAction::RetranslateOnly);
        }
        return Ok(TextAction::None);
    }

    let working_path = req.dir.join(req.name);
    let old_pristine_path = paths::pristine_path(req.dir, req.name);

    let locally_modified = match (fs::read(&working_path), fs::read(&old_pristine_path)) {
        (Ok(working), Ok(old_pristine)) => translate::detranslate(&working) != old_pristine,
        // A freshly-added file has no old pristine to compare against
        // and therefore carries no local modification of its own yet.
        (Ok(_), Err(e)) if e.kind() == std::io::ErrorKind::NotFound => false,
        (Err(e), _) if e.kind() == std::io::ErrorKind::NotFound => false,
        (Err(e), _) => return Err(e.into()),
    };

    Ok(if locally_modified {
        TextAction::Merge
    } else {
        TextAction::Overwrite
    })
}

/// Applies the regular/entry/wc propchange partition, updating the
/// stored proplists directly (no three-way property merge is modelled
/// — see the design notes) and queuing entry-field and wc-prop updates
/// on `log`. Returns the resulting `PropState` and whether any change
/// touched a magic translation-affecting property.
fn apply_propchanges(req: &InstallRequest, log: &mut Log) -> Result<(PropState, bool)> {
    let (regular, entry, wc) = dirstate::partition_propchanges(&req.propchanges);

    let mut any_magic = false;
    let mut prop_state = PropState::Unchanged;

    if !regular.is_empty() {
        let mut working = props::read_working(req.dir, req.name)?;
        let mut base = props::read_base(req.dir, req.name)?;

        // A "full list" carries the entire incoming proplist rather
        // than an incremental diff; it must be diffed against the
        // current pristine proplist before it tells us anything about
        // what actually changed (additions, edits, and the deletions
        // a full list expresses only by omission).
        let deltas: Vec<props::PropDelta> = if req.props_are_full_list {
            let mut incoming = props::PropMap::new();
            for change in &regular {
                if let Some(v) = &change.value {
                    incoming.insert(change.name.clone(), v.clone());
                }
            }
            props::diff_full_list(&incoming, &base)
        } else {
            regular
                .iter()
                .map(|c| props::PropDelta {
                    name: c.name.clone(),
                    value: c.value.clone(),
                })
                .collect()
        };

        for delta in &deltas {
            if dirstate::is_magic_property(&delta.name) {
                any_magic = true;
            }
            props::apply_delta(&mut working, delta);
            props::apply_delta(&mut base, delta);
        }

        if !deltas.is_empty() {
            props::write_working(req.dir, req.name, &working)?;
            props::write_base(req.dir, req.name, &base)?;
            prop_state = PropState::Changed;
        }
    }

    if !entry.is_empty() {
        let mut fields = ModifyEntryFields::default();
        for change in &entry {
            match change.name.as_str() {
                "entry:committed-rev" => {
                    fields.committed_rev = Some(change.value.as_ref().and_then(|v| v.parse().ok()));
                }
                "entry:committed-date" => {
                    fields.committed_date = Some(change.value.clone());
                }
                "entry:last-author" => {
                    fields.last_author = Some(change.value.clone());
                }
                _ => {}
            }
        }
        log.push(LogOp::ModifyEntry {
            name: req.name.to_string(),
            fields,
        });
    }

    for change in &wc {
        log.push(LogOp::ModifyWcProp {
            name: req.name.to_string(),
            propname: change.name.clone(),
            propval: change.value.clone(),
        });
    }

    Ok((prop_state, any_magic))
}

/// Refuses to delete a file that carries local modifications, unless
/// the deletion is itself part of resolving the edit's own target.
pub fn check_deletable(dir: &Path, name: &str) -> Result<()> {
    let working_path = dir.join(name);
    let old_pristine_path = paths::pristine_path(dir, name);

    let locally_modified = match (fs::read(&working_path), fs::read(&old_pristine_path)) {
        (Ok(working), Ok(old_pristine)) => translate::detranslate(&working) != old_pristine,
        _ => false,
    };

    if locally_modified {
        return Err(EditError::new(
            ErrorCode::LeftLocalMod,
            format!("'{name}' has local modifications"),
        )
        .wrap(ErrorCode::ObstructedUpdate, format!("cannot delete '{name}'")));
    }
    Ok(())
}
