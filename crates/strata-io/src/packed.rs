use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::document::Document;
use crate::error::{BackendError, BackendResult};
use crate::store::DocumentStore;

/// File magic of the packed binary format.
pub const MAGIC: &[u8; 4] = b"STPK";

/// Magic + payload length + CRC.
const HEADER_SIZE: usize = 12;

/// Stores the document as one checksummed binary file.
///
/// On-disk format:
/// ```text
/// [4 bytes: magic "STPK"]
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized Document)]
/// ```
pub struct PackedStore {
    path: PathBuf,
}

impl PackedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(&self, reason: impl Into<String>) -> BackendError {
        BackendError::Corrupt {
            location: self.path.display().to_string(),
            reason: reason.into(),
        }
    }
}

impl DocumentStore for PackedStore {
    fn kind(&self) -> &'static str {
        "packed"
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> BackendResult<Option<Document>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if bytes.len() < HEADER_SIZE {
            return Err(self.corrupt(format!("file is {} bytes, shorter than the header", bytes.len())));
        }
        if &bytes[0..4] != MAGIC {
            return Err(self.corrupt("bad magic"));
        }

        let length = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let expected_crc = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let payload = &bytes[HEADER_SIZE..];
        if payload.len() != length {
            return Err(self.corrupt(format!(
                "payload is {} bytes, header says {length}",
                payload.len()
            )));
        }

        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            warn!(
                path = %self.path.display(),
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch in packed file"
            );
            return Err(self.corrupt("CRC mismatch"));
        }

        let document =
            bincode::deserialize(payload).map_err(|e| BackendError::Serialization(e.to_string()))?;
        debug!(path = %self.path.display(), len = length, "loaded packed document");
        Ok(Some(document))
    }

    fn save(&mut self, document: &Document) -> BackendResult<()> {
        let payload =
            bincode::serialize(document).map_err(|e| BackendError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| BackendError::Serialization("document exceeds 4 GiB".into()))?;
        let crc = crc32fast::hash(&payload);

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(MAGIC)?;
        file.write_all(&length.to_le_bytes())?;
        file.write_all(&crc.to_le_bytes())?;
        file.write_all(&payload)?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| BackendError::Io(e.error))?;
        debug!(path = %self.path.display(), len = payload.len(), "saved packed document");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use strata_types::{Attribute, Datatype};

    use super::*;
    use crate::document::DatasetNode;

    fn sample() -> Document {
        let mut doc = Document::new();
        let meshes = doc
            .create_groups(&crate::FilePosition::root().join("meshes/E"))
            .unwrap();
        meshes.attributes.insert("axisLabels".into(), Attribute::new(vec!["x".to_string()]));
        meshes
            .datasets
            .insert("x".into(), DatasetNode::zeros(Datatype::F64, vec![2, 2]).unwrap());
        doc.root
            .attributes
            .insert("unitDimension".into(), Attribute::new([0.0f64, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]));
        doc
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PackedStore::new(dir.path().join("data.stpk"));
        let doc = sample();
        store.save(&doc).unwrap();

        let bytes = fs::read(store.path()).unwrap();
        assert_eq!(&bytes[0..4], MAGIC);
        assert_eq!(store.load().unwrap(), Some(doc));
    }

    #[test]
    fn detects_flipped_bit() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PackedStore::new(dir.path().join("data.stpk"));
        store.save(&sample()).unwrap();

        let mut bytes = fs::read(store.path()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(store.path(), &bytes).unwrap();

        match store.load() {
            Err(BackendError::Corrupt { reason, .. }) => assert_eq!(reason, "CRC mismatch"),
            other => panic!("expected corruption, got {other:?}"),
        }
    }

    #[test]
    fn detects_truncation_and_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.stpk");
        let mut store = PackedStore::new(&path);
        store.save(&sample()).unwrap();

        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();
        assert!(matches!(store.load(), Err(BackendError::Corrupt { .. })));

        fs::write(&path, b"JSON{}{}{}{}{}").unwrap();
        assert!(matches!(store.load(), Err(BackendError::Corrupt { .. })));
    }
}
