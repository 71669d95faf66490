//! Error chain with trace links (see `DESIGN.md`).
//!
//! Errors form a singly-linked, shared-ownership chain from outermost
//! to innermost cause. Each node is a [`ChainNode`]: a code, an
//! optional message, optional source location, and a flag telling
//! apart a real error from a pure "trace link" breadcrumb.
//!
//! The original C implementation this is modelled on refcounts each
//! node's message by hand (`ErrorDescription::reference` /
//! `dereference`) so that a partially-built chain can be unwound
//! safely. In Rust that refcounting falls out of `Rc` for free: cloning
//! an `Rc<ChainNode>` into `cause` *is* the "post-increment reference
//! count", and `Drop` is the release — there is nothing left to hand-write.

use std::fmt;
use std::panic::Location;
use std::rc::Rc;

/// Design-level error kinds from the error handling section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ObstructedUpdate,
    EntryNotFound,
    EntryMissingUrl,
    CorruptTextBase,
    ChecksumMismatch,
    UnsupportedFeature,
    LeftLocalMod,
    Cancelled,
    Io,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::ObstructedUpdate => "obstructed update",
            ErrorCode::EntryNotFound => "entry not found",
            ErrorCode::EntryMissingUrl => "entry has no URL",
            ErrorCode::CorruptTextBase => "corrupt pristine text base",
            ErrorCode::ChecksumMismatch => "checksum mismatch",
            ErrorCode::UnsupportedFeature => "unsupported feature",
            ErrorCode::LeftLocalMod => "local modifications would be lost",
            ErrorCode::Cancelled => "operation cancelled",
            ErrorCode::Io => "I/O error",
        };
        f.write_str(s)
    }
}

/// One node of the error chain.
pub struct ChainNode {
    pub code: ErrorCode,
    pub message: Option<String>,
    pub location: Option<&'static Location<'static>>,
    pub is_trace: bool,
    pub cause: Option<Rc<ChainNode>>,
}

/// A rendered, chained error. Cloning is cheap — it clones the `Rc`
/// head, not the chain.
#[derive(Clone)]
pub struct EditError {
    pub(crate) head: Rc<ChainNode>,
}

impl EditError {
    #[track_caller]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        EditError {
            head: Rc::new(ChainNode {
                code,
                message: Some(message.into()),
                location: Some(Location::caller()),
                is_trace: false,
                cause: None,
            }),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.head.code
    }

    /// Wraps `self` as the cause of a new, higher-level error.
    #[track_caller]
    pub fn wrap(self, code: ErrorCode, message: impl Into<String>) -> Self {
        EditError {
            head: Rc::new(ChainNode {
                code,
                message: Some(message.into()),
                location: Some(Location::caller()),
                is_trace: false,
                cause: Some(self.head),
            }),
        }
    }

    /// Pushes a pure trace link: no message of its own, just a
    /// breadcrumb recording where the error passed through.
    #[track_caller]
    pub fn trace(self) -> Self {
        EditError {
            head: Rc::new(ChainNode {
                code: self.head.code,
                message: None,
                location: Some(Location::caller()),
                is_trace: true,
                cause: Some(self.head),
            }),
        }
    }

    /// Renders the chain outermost-first. When `with_trace` is false,
    /// only nodes that carry a message are shown; when true, one
    /// location line is emitted per node, and each unique generic
    /// message is shown only once across the whole chain (later trace
    /// links for the same code are suppressed).
    pub fn render(&self, with_trace: bool) -> String {
        let mut out = String::new();
        let mut seen_codes = std::collections::HashSet::new();
        let mut node = Some(self.head.clone());
        while let Some(n) = node {
            if with_trace {
                if let Some(loc) = n.location {
                    out.push_str(&format!("  at {}:{}\n", loc.file(), loc.line()));
                }
            }
            if !n.is_trace || n.message.is_some() {
                if seen_codes.insert(n.code) {
                    let msg = n.message.as_deref().unwrap_or_else(|| "");
                    if msg.is_empty() {
                        out.push_str(&format!("{}\n", n.code));
                    } else {
                        out.push_str(&format!("{}: {}\n", n.code, msg));
                    }
                }
            }
            node = n.cause.clone();
        }
        out
    }

    /// Iterates the chain from outermost to innermost.
    pub fn chain(&self) -> ChainIter {
        ChainIter {
            next: Some(self.head.clone()),
        }
    }
}

pub struct ChainIter {
    next: Option<Rc<ChainNode>>,
}

impl Iterator for ChainIter {
    type Item = Rc<ChainNode>;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.next.take()?;
        self.next = cur.cause.clone();
        Some(cur)
    }
}

impl fmt::Debug for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

impl std::error::Error for EditError {}

impl From<std::io::Error> for EditError {
    #[track_caller]
    fn from(err: std::io::Error) -> Self {
        EditError::new(ErrorCode::Io, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_suppresses_duplicate_generic_messages() {
        let inner = EditError::new(ErrorCode::LeftLocalMod, "foo.txt has local edits");
        let outer = inner.wrap(ErrorCode::ObstructedUpdate, "cannot delete foo.txt");
        let rendered = outer.render(false);
        assert!(rendered.contains("obstructed update"));
        assert!(rendered.contains("local modifications"));
    }

    #[test]
    fn trace_links_carry_no_message() {
        let err = EditError::new(ErrorCode::EntryNotFound, "bar").trace();
        assert_eq!(err.chain().count(), 2);
        assert!(err.chain().next().unwrap().is_trace);
    }
}
