//! Deferred I/O for Strata hierarchies.
//!
//! Domain objects never touch storage directly. They describe what they need
//! as [`IoTask`]s, each a target [`Writable`] plus a typed [`Parameter`]
//! record, and hand them to an [`IoHandler`]. Nothing reaches the backend
//! until [`IoHandler::flush`] drains the queue in FIFO order. Outputs such as
//! attribute values or child listings arrive in [`Slot`]s that can be read
//! once the batch has been flushed.
//!
//! # Backends
//!
//! All backends implement the [`Backend`] trait. The built-in one is
//! [`DocumentBackend`], an in-memory tree of groups, datasets and attributes
//! persisted through a [`DocumentStore`]:
//!
//! - [`MemoryStore`] -- shared in-process slot, for tests and embedding
//! - [`JsonStore`] -- one JSON text file
//! - [`PackedStore`] -- one bincode file framed with length and CRC32
//!
//! # Design Rules
//!
//! 1. `enqueue` never performs I/O and never fails.
//! 2. A flush stops at the first failing task; the rest of the batch is
//!    discarded, never replayed.
//! 3. A node's written flag, once set, is never cleared.
//! 4. Positions are opaque outside backends.

pub mod backend;
pub mod config;
pub mod document;
pub mod error;
pub mod format;
pub mod handler;
pub mod json;
pub mod operation;
pub mod packed;
pub mod parameter;
pub mod slot;
pub mod store;
pub mod task;
pub mod traits;
pub mod writable;

// Re-export primary types at crate root for ergonomic imports.
pub use backend::{open_backend, DocumentBackend};
pub use config::{Access, AttributeFlushMode, FlushParams, SyncMode};
pub use document::{DatasetNode, Document, Group};
pub use error::{
    AffectedObject, BackendError, BackendResult, IoError, IoResult, ReadError, Reason,
};
pub use format::{determine_format, Format};
pub use handler::{Diagnostic, IoHandler};
pub use json::JsonStore;
pub use operation::Operation;
pub use packed::PackedStore;
pub use parameter::Parameter;
pub use slot::Slot;
pub use store::{DocumentStore, MemoryStore};
pub use task::IoTask;
pub use traits::Backend;
pub use writable::{FilePosition, Writable};
