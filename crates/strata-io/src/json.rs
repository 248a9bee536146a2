use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::document::Document;
use crate::error::{BackendError, BackendResult};
use crate::store::DocumentStore;

/// Stores the document as one JSON file.
///
/// Saves write a temporary file next to the target and rename it into
/// place, so readers never observe a half-written document.
pub struct JsonStore {
    path: PathBuf,
    pretty: bool,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>, pretty: bool) -> Self {
        Self {
            path: path.into(),
            pretty,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentStore for JsonStore {
    fn kind(&self) -> &'static str {
        "json"
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> BackendResult<Option<Document>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let document = serde_json::from_str(&text).map_err(|e| BackendError::Serialization(e.to_string()))?;
        debug!(path = %self.path.display(), bytes = text.len(), "loaded JSON document");
        Ok(Some(document))
    }

    fn save(&mut self, document: &Document) -> BackendResult<()> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(document)
        } else {
            serde_json::to_vec(document)
        }
        .map_err(|e| BackendError::Serialization(e.to_string()))?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(&encoded)?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| BackendError::Io(e.error))?;
        debug!(path = %self.path.display(), bytes = encoded.len(), "saved JSON document");
        Ok(())
    }
}
