//! A working-copy update/switch engine: a tree-delta editor that
//! applies a server-driven sequence of add/open/delete callbacks to a
//! local administrative area, installing incoming file content through
//! a crash-safe journaled log and a three-way merge against local
//! modifications.

pub mod access;
pub mod anchor;
pub mod bump;
pub mod checksum;
pub mod context;
pub mod dirstate;
pub mod editor;
pub mod entries;
pub mod error;
pub mod install;
pub mod log;
pub mod merge;
pub mod notify;
pub mod paths;
pub mod props;
pub mod translate;

pub use context::{EditContext, UpdateOptions};
pub use editor::{CancellingEditor, TreeEditor, UpdateEditor};
pub use error::{EditError, ErrorCode, Result};
pub use notify::{Action, ContentState, Notification, NodeKind, PropState, TraversalInfo};
