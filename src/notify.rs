//! Typed notifications the engine emits as it works, plus the
//! traversal-info side channel for observed `svn:externals`-style
//! property changes.

use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Dir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentState {
    Unchanged,
    Changed,
    Merged,
    Conflicted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropState {
    Unchanged,
    Changed,
    Merged,
    Conflicted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Add,
    Update,
    Delete,
    Completed,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub path: PathBuf,
    pub action: Action,
    pub node_kind: Option<NodeKind>,
    pub content_state: ContentState,
    pub prop_state: PropState,
    pub revision: Option<u64>,
}

impl Notification {
    pub fn add(path: PathBuf, node_kind: NodeKind, revision: u64) -> Self {
        Notification {
            path,
            action: Action::Add,
            node_kind: Some(node_kind),
            content_state: ContentState::Changed,
            prop_state: PropState::Unchanged,
            revision: Some(revision),
        }
    }

    pub fn delete(path: PathBuf, node_kind: NodeKind) -> Self {
        Notification {
            path,
            action: Action::Delete,
            node_kind: Some(node_kind),
            content_state: ContentState::Unchanged,
            prop_state: PropState::Unchanged,
            revision: None,
        }
    }

    pub fn completed(revision: u64) -> Self {
        Notification {
            path: PathBuf::new(),
            action: Action::Completed,
            node_kind: None,
            content_state: ContentState::Unchanged,
            prop_state: PropState::Unchanged,
            revision: Some(revision),
        }
    }
}

pub type NotifyFn<'a> = Box<dyn FnMut(Notification) + 'a>;

/// Records old/new `svn:externals`-style property values observed
/// while closing directories, so a caller can process them once the
/// edit completes.
#[derive(Default, Debug, Clone)]
pub struct TraversalInfo {
    pub externals_old: HashMap<PathBuf, String>,
    pub externals_new: HashMap<PathBuf, String>,
}

impl TraversalInfo {
    pub fn record_externals_change(&mut self, dir: PathBuf, old: Option<String>, new: Option<String>) {
        if let Some(old) = old {
            self.externals_old.insert(dir.clone(), old);
        }
        if let Some(new) = new {
            self.externals_new.insert(dir, new);
        }
    }
}
