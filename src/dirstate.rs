//! Per-node state held while a directory or file is open during an
//! edit.

use std::path::PathBuf;
use std::rc::Rc;

use crate::access::AdminAccess;
use crate::bump::Bump;

#[derive(Debug, Clone)]
pub struct PropChange {
    pub name: String,
    /// `None` means the property is being deleted.
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropCategory {
    Regular,
    Entry,
    Wc,
}

/// Properties named with these prefixes are metadata the engine
/// itself tracks (entry fields, wc-props) rather than regular
/// versioned properties subject to three-way property merge.
const ENTRY_PROP_PREFIX: &str = "entry:";
const WC_PROP_PREFIX: &str = "wc:";

pub fn categorize(name: &str) -> PropCategory {
    if name.starts_with(ENTRY_PROP_PREFIX) {
        PropCategory::Entry
    } else if name.starts_with(WC_PROP_PREFIX) {
        PropCategory::Wc
    } else {
        PropCategory::Regular
    }
}

/// Regular properties whose change flips on "magic" translation
/// behavior: executable bit, keyword substitution, EOL style.
pub fn is_magic_property(name: &str) -> bool {
    matches!(name, "svn:executable" | "svn:keywords" | "svn:eol-style")
}

pub const EXTERNALS_PROPERTY: &str = "svn:externals";

pub struct DirState {
    pub path: PathBuf,
    pub name: String,
    pub new_url: Option<String>,
    pub added: bool,
    pub propchanges: Vec<PropChange>,
    pub bump: Rc<Bump>,
    /// Held for as long as this directory is open; released when the
    /// directory closes.
    pub access: AdminAccess,
}

impl DirState {
    pub fn new(
        path: PathBuf,
        name: String,
        new_url: Option<String>,
        added: bool,
        bump: Rc<Bump>,
        access: AdminAccess,
    ) -> Self {
        DirState {
            path,
            name,
            new_url,
            added,
            propchanges: Vec::new(),
            bump,
            access,
        }
    }
}

pub struct FileState {
    pub path: PathBuf,
    pub name: String,
    pub new_url: Option<String>,
    pub added: bool,
    pub copyfrom: Option<(String, u64)>,
    pub text_changed: bool,
    pub prop_changed: bool,
    pub propchanges: Vec<PropChange>,
    pub cached_committed_date: Option<String>,
    pub pending_checksum: Option<[u8; 16]>,
    pub bump: Rc<Bump>,
}

impl FileState {
    pub fn new(path: PathBuf, name: String, new_url: Option<String>, added: bool, bump: Rc<Bump>) -> Self {
        FileState {
            path,
            name,
            new_url,
            added,
            copyfrom: None,
            text_changed: false,
            prop_changed: false,
            propchanges: Vec::new(),
            cached_committed_date: None,
            pending_checksum: None,
            bump,
        }
    }
}

/// Splits a flat propchange list into its three categories,
/// preserving insertion order within each category.
pub fn partition_propchanges(
    changes: &[PropChange],
) -> (Vec<&PropChange>, Vec<&PropChange>, Vec<&PropChange>) {
    let mut regular = Vec::new();
    let mut entry = Vec::new();
    let mut wc = Vec::new();
    for c in changes {
        match categorize(&c.name) {
            PropCategory::Regular => regular.push(c),
            PropCategory::Entry => entry.push(c),
            PropCategory::Wc => wc.push(c),
        }
    }
    (regular, entry, wc)
}
