//! The textual three-way merge tool ("diff3 or equivalent"). The core
//! only needs to be able to ask "merge these three texts" and get back
//! merged bytes plus a conflict flag; this module provides that
//! interface plus two concrete implementations.

use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use crate::error::{EditError, ErrorCode, Result};

pub struct MergeOutcome {
    pub content: Vec<u8>,
    pub conflicted: bool,
}

/// Reconciles local edits against a new pristine using the ancestor
/// pristine as base.
pub trait MergeTool {
    fn merge(
        &self,
        base: &[u8],
        local: &[u8],
        latest: &[u8],
        left_label: &str,
        right_label: &str,
    ) -> Result<MergeOutcome>;
}

/// Built-in three-way merge using `diffy`'s diff3 algorithm.
#[derive(Default, Clone, Copy)]
pub struct Diff3Merge;

impl MergeTool for Diff3Merge {
    fn merge(
        &self,
        base: &[u8],
        local: &[u8],
        latest: &[u8],
        _left_label: &str,
        _right_label: &str,
    ) -> Result<MergeOutcome> {
        let (base, local, latest) = match (
            std::str::from_utf8(base),
            std::str::from_utf8(local),
            std::str::from_utf8(latest),
        ) {
            (Ok(b), Ok(l), Ok(n)) => (b, l, n),
            _ => {
                // Binary content: there is no textual merge to attempt.
                // The incoming text always wins, and we report a
                // conflict only if the local copy actually differs.
                let conflicted = local != latest && local != base;
                return Ok(MergeOutcome {
                    content: latest.to_vec(),
                    conflicted,
                });
            }
        };

        match diffy::merge(base, local, latest) {
            Ok(merged) => Ok(MergeOutcome {
                content: merged.into_bytes(),
                conflicted: false,
            }),
            Err(merged_with_markers) => Ok(MergeOutcome {
                content: merged_with_markers.into_bytes(),
                conflicted: true,
            }),
        }
    }
}

/// Shells out to an external merge command (the `diff3`-compatible
/// tool named by `EditContext::external_merge_tool`). Invoked as
/// `<command> <base> <local> <latest>`; a non-zero exit status other
/// than 1 is treated as a tool failure rather than a conflict, mirroring
/// the conventional `diff3` exit-code contract (0 = clean, 1 =
/// conflicts, 2 = trouble).
pub struct ExternalCommandMerge {
    pub command: String,
}

impl MergeTool for ExternalCommandMerge {
    fn merge(
        &self,
        base: &[u8],
        local: &[u8],
        latest: &[u8],
        _left_label: &str,
        _right_label: &str,
    ) -> Result<MergeOutcome> {
        let dir = tempfile::tempdir()?;
        let base_path = write_temp(dir.path(), "base", base)?;
        let local_path = write_temp(dir.path(), "local", local)?;
        let latest_path = write_temp(dir.path(), "latest", latest)?;

        let output = Command::new(&self.command)
            .arg(&local_path)
            .arg(&base_path)
            .arg(&latest_path)
            .output()
            .map_err(|e| {
                EditError::new(
                    ErrorCode::Io,
                    format!("failed to launch external merge tool '{}': {e}", self.command),
                )
            })?;

        match output.status.code() {
            Some(0) => Ok(MergeOutcome {
                content: output.stdout,
                conflicted: false,
            }),
            Some(1) => Ok(MergeOutcome {
                content: output.stdout,
                conflicted: true,
            }),
            other => Err(EditError::new(
                ErrorCode::Io,
                format!(
                    "external merge tool '{}' exited with status {:?}",
                    self.command, other
                ),
            )),
        }
    }
}

fn write_temp(dir: &std::path::Path, name: &str, data: &[u8]) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path)?;
    f.write_all(data)?;
    Ok(path)
}
