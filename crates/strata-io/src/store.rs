use std::sync::{Arc, RwLock};

use crate::document::Document;
use crate::error::BackendResult;

/// Where a [`DocumentBackend`](crate::DocumentBackend) keeps its document
/// between sessions.
///
/// Implementations only move whole documents; the backend owns the
/// in-memory tree and decides when to load and save.
pub trait DocumentStore: Send {
    /// Short store name, also used as the backend name.
    fn kind(&self) -> &'static str;

    /// Human-readable location for logs and errors.
    fn location(&self) -> String;

    /// Load the persisted document.
    ///
    /// Returns `Ok(None)` if nothing has been persisted yet.
    fn load(&self) -> BackendResult<Option<Document>>;

    /// Replace the persisted document.
    fn save(&mut self, document: &Document) -> BackendResult<()>;
}

/// In-memory store.
///
/// Clones share the same slot, so a document saved through one session can
/// be opened by another in the same process. Useful for testing.
#[derive(Clone, Default)]
pub struct MemoryStore {
    name: String,
    slot: Arc<RwLock<Option<Document>>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot: Arc::default(),
        }
    }

    /// A copy of the currently persisted document.
    pub fn snapshot(&self) -> Option<Document> {
        self.slot.read().expect("lock poisoned").clone()
    }
}

impl DocumentStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    fn location(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn load(&self) -> BackendResult<Option<Document>> {
        Ok(self.snapshot())
    }

    fn save(&mut self, document: &Document) -> BackendResult<()> {
        *self.slot.write().expect("lock poisoned") = Some(document.clone());
        Ok(())
    }
}
