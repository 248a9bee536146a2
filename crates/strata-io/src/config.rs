use std::fmt;

use serde::{Deserialize, Serialize};

/// How a session accesses its storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Open existing storage; every write operation is rejected.
    ReadOnly,
    /// Open existing storage (or start empty) and allow updates.
    ReadWrite,
    /// Start from empty storage, replacing whatever was there.
    #[default]
    Create,
}

impl Access {
    /// Returns `true` when write operations are forbidden.
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::ReadWrite => write!(f, "read-write"),
            Self::Create => write!(f, "create"),
        }
    }
}

/// When a backend moves flushed data to physical storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// The backend may hold data until the file is closed.
    #[default]
    Lazy,
    /// The backend persists at the end of every flushed batch.
    Synchronous,
}

/// What flushing an attribute mapping does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeFlushMode {
    /// Write every attribute not yet persisted.
    #[default]
    Write,
    /// Refresh every known attribute from the backend instead of writing.
    FullyReread,
}

/// Options for one flush of the I/O queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushParams {
    /// Reject write operations at flush time when the session is read-only.
    pub check_access: bool,
    /// Let the backend drop in-memory copies of data it has persisted.
    pub release_buffers: bool,
    /// Synchronous/lazy hint for backends that defer physical writes.
    pub sync: SyncMode,
    /// Attribute handling during this flush.
    pub attribute_mode: AttributeFlushMode,
}

impl Default for FlushParams {
    fn default() -> Self {
        Self {
            check_access: true,
            release_buffers: false,
            sync: SyncMode::Lazy,
            attribute_mode: AttributeFlushMode::Write,
        }
    }
}

impl FlushParams {
    /// Parameters that force the backend to persist at the end of the batch.
    pub fn synchronous() -> Self {
        Self {
            sync: SyncMode::Synchronous,
            ..Default::default()
        }
    }

    /// Parameters that refresh attributes instead of writing them.
    pub fn reread() -> Self {
        Self {
            attribute_mode: AttributeFlushMode::FullyReread,
            ..Default::default()
        }
    }
}
