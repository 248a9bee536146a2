//! The storage-facing side of a domain node.
//!
//! A [`Writable`] holds the backend position of one node and a weak link to
//! its parent. Domain objects own their `Writable`; tasks and backends hold
//! cheap clones of the same handle, so a position assigned by the backend
//! during a flush is visible to the owner afterwards.

use std::fmt;
use std::sync::{Arc, RwLock, Weak};

/// An opaque location inside a backend.
///
/// Only backends construct and interpret positions; the rest of the system
/// copies them around and prints them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FilePosition {
    segments: Vec<String>,
}

impl FilePosition {
    /// The root of a file.
    pub fn root() -> Self {
        Self::default()
    }

    /// The position of `path` relative to this one. Empty segments are
    /// ignored, so `"a//b/"` and `"a/b"` are the same location.
    pub fn join(&self, path: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(
            path.split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The last path segment, or `None` at the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The enclosing position, or `None` at the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FilePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct WritableState {
    position: Option<FilePosition>,
    written: bool,
    parent: Weak<RwLock<WritableState>>,
}

/// Shared handle to a node's backend state.
#[derive(Clone, Default)]
pub struct Writable {
    inner: Arc<RwLock<WritableState>>,
}

impl Writable {
    /// A fresh node with no position, no parent, not yet written.
    pub fn new() -> Self {
        Self::default()
    }

    /// The backend position, once a backend has placed this node.
    pub fn position(&self) -> Option<FilePosition> {
        self.inner.read().expect("writable lock poisoned").position.clone()
    }

    /// Assign the backend position. Called by backends.
    pub fn set_position(&self, position: FilePosition) {
        self.inner.write().expect("writable lock poisoned").position = Some(position);
    }

    /// Whether the node's backend counterpart has been created or opened.
    pub fn written(&self) -> bool {
        self.inner.read().expect("writable lock poisoned").written
    }

    /// Record that the backend counterpart exists. There is no way back:
    /// a node never becomes unwritten again.
    pub fn mark_written(&self) {
        self.inner.write().expect("writable lock poisoned").written = true;
    }

    /// The parent node, if it is linked and still alive.
    pub fn parent(&self) -> Option<Writable> {
        let state = self.inner.read().expect("writable lock poisoned");
        state.parent.upgrade().map(|inner| Writable { inner })
    }

    /// Link this node below `parent`.
    pub fn set_parent(&self, parent: &Writable) {
        let weak = Arc::downgrade(&parent.inner);
        self.inner.write().expect("writable lock poisoned").parent = weak;
    }

    /// Returns `true` if both handles refer to the same node.
    pub fn same_node(&self, other: &Writable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Writable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.read().expect("writable lock poisoned");
        f.debug_struct("Writable")
            .field("position", &state.position)
            .field("written", &state.written)
            .field("has_parent", &(state.parent.strong_count() > 0))
            .finish()
    }
}
