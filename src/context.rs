//! The edit context: everything that lives for the duration of one
//! edit.

use std::path::PathBuf;
use std::rc::Rc;

use crate::access::AdminAccess;
use crate::entries::EntriesStore;
use crate::merge::MergeTool;
use crate::notify::{Notification, TraversalInfo};

/// Cancellation is polled by the outer [`crate::editor::CancellingEditor`]
/// before dispatching each callback; the inner engine never calls this
/// itself.
pub type CancelFn<'a> = Box<dyn FnMut() -> bool + 'a>;

/// Configuration flags carried for the life of one edit.
pub struct UpdateOptions {
    pub recurse: bool,
    pub use_commit_times: bool,
    pub switch_url: Option<String>,
    pub external_merge_tool: Option<String>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        UpdateOptions {
            recurse: true,
            use_commit_times: false,
            switch_url: None,
            external_merge_tool: None,
        }
    }
}

impl UpdateOptions {
    pub fn is_switch(&self) -> bool {
        self.switch_url.is_some()
    }
}

/// Everything one edit needs, held for its whole lifetime. Per the
/// design notes, this is *not* torn down inside `close_edit` — the
/// caller drops it explicitly once done, so the editor can in
/// principle be reused for diagnostics after the edit completes.
pub struct EditContext<'a> {
    pub anchor: PathBuf,
    pub target: Option<String>,
    pub target_revision: u64,
    pub options: UpdateOptions,
    pub cancel: Option<CancelFn<'a>>,
    pub notify: Box<dyn FnMut(Notification) + 'a>,
    pub traversal_info: TraversalInfo,
    pub root_opened: bool,
    pub target_deleted: bool,
    /// The anchor's admin access baton, acquired by the caller before
    /// the edit begins. `open_root` takes ownership of it for the
    /// root directory baton — re-opening it here would self-deadlock
    /// against the lock the caller already holds.
    pub access: Option<AdminAccess>,
    pub entries: Rc<dyn EntriesStore>,
    pub merge_tool: Rc<dyn MergeTool>,
}

impl<'a> EditContext<'a> {
    pub fn notify(&mut self, n: Notification) {
        (self.notify)(n)
    }

    pub fn check_cancelled(&mut self) -> bool {
        match &mut self.cancel {
            Some(f) => f(),
            None => false,
        }
    }
}
