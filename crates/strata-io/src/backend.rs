use std::path::Path;

use tracing::{debug, info};

use crate::config::{Access, FlushParams, SyncMode};
use crate::document::{DatasetNode, Document};
use crate::error::{AffectedObject, BackendError, BackendResult, ReadError};
use crate::format::Format;
use crate::json::JsonStore;
use crate::packed::PackedStore;
use crate::parameter::Parameter;
use crate::store::{DocumentStore, MemoryStore};
use crate::task::IoTask;
use crate::traits::Backend;
use crate::writable::{FilePosition, Writable};

/// Executes tasks against an in-memory [`Document`] and moves whole
/// documents to and from a [`DocumentStore`].
///
/// The document is loaded on first use and persisted at `CLOSE_FILE`, or at
/// the end of a batch flushed with [`SyncMode::Synchronous`]. Read-only
/// sessions never persist.
pub struct DocumentBackend {
    store: Box<dyn DocumentStore>,
    access: Access,
    document: Option<Document>,
    dirty: bool,
}

impl DocumentBackend {
    pub fn new(store: Box<dyn DocumentStore>, access: Access) -> Self {
        Self {
            store,
            access,
            document: None,
            dirty: false,
        }
    }

    /// The working document, loading it from the store on first use.
    fn document(&mut self) -> BackendResult<&mut Document> {
        if self.document.is_none() {
            self.document = self.store.load()?;
        }
        Ok(self.document.get_or_insert_with(Document::new))
    }

    fn persist(&mut self) -> BackendResult<()> {
        if !self.dirty || self.access.is_read_only() {
            return Ok(());
        }
        if let Some(document) = &self.document {
            self.store.save(document)?;
            debug!(store = self.store.kind(), location = %self.store.location(), "document persisted");
        }
        self.dirty = false;
        Ok(())
    }

    fn open_file(&mut self, writable: &Writable) -> BackendResult<()> {
        match self.store.load()? {
            Some(document) => self.document = Some(document),
            None if self.access.is_read_only() => {
                return Err(not_found(
                    self.store.kind(),
                    AffectedObject::File,
                    format!("nothing stored at {}", self.store.location()),
                ));
            }
            None => {
                self.document = Some(Document::new());
                self.dirty = true;
            }
        }
        info!(store = self.store.kind(), location = %self.store.location(), access = %self.access, "file opened");
        place(writable, FilePosition::root());
        Ok(())
    }

    fn create_dataset(
        &mut self,
        writable: &Writable,
        name: &str,
        node: DatasetNode,
    ) -> BackendResult<()> {
        if writable.written() {
            return Ok(());
        }
        let parent = parent_position(writable)?;
        let position = parent.join(name);
        let group = self.document()?.create_groups(&parent)?;
        if group.groups.contains_key(name) {
            return Err(BackendError::AlreadyExists(format!("group {position}")));
        }
        match group.datasets.get(name) {
            Some(existing) if existing.dtype != node.dtype || existing.extent != node.extent => {
                return Err(BackendError::AlreadyExists(format!(
                    "dataset {position} with kind {} and extent {:?}",
                    existing.dtype, existing.extent
                )));
            }
            Some(_) => {}
            None => {
                group.datasets.insert(name.to_string(), node);
                self.dirty = true;
            }
        }
        place(writable, position);
        Ok(())
    }
}

impl Backend for DocumentBackend {
    fn name(&self) -> &'static str {
        self.store.kind()
    }

    fn execute(&mut self, task: &IoTask) -> BackendResult<()> {
        let backend = self.store.kind();
        let writable = task.writable();
        match task.parameter() {
            Parameter::CreateFile(p) => {
                if self.access.is_read_only() {
                    return Err(BackendError::AccessViolation {
                        operation: task.operation(),
                        access: self.access,
                    });
                }
                self.document = Some(Document::new());
                self.dirty = true;
                info!(store = self.store.kind(), name = %p.name, location = %self.store.location(), "file created");
                place(writable, FilePosition::root());
            }
            Parameter::OpenFile(_) => self.open_file(writable)?,
            Parameter::CloseFile(_) => {
                self.persist()?;
                self.document = None;
                info!(store = self.store.kind(), location = %self.store.location(), "file closed");
            }
            Parameter::CreatePath(p) => {
                if writable.written() {
                    return Ok(());
                }
                let position = parent_position(writable)?.join(&p.path);
                self.document()?.create_groups(&position)?;
                self.dirty = true;
                place(writable, position);
            }
            Parameter::OpenPath(p) => {
                let position = parent_position(writable)?.join(&p.path);
                if self.document()?.group(&position).is_none() {
                    return Err(not_found(backend, AffectedObject::Group, format!("no group at {position}")));
                }
                place(writable, position);
            }
            Parameter::CreateDataset(p) => {
                let node = DatasetNode::zeros(p.dtype, p.extent.clone())?;
                self.create_dataset(writable, &p.name, node)?;
            }
            Parameter::OpenDataset(p) => {
                let position = parent_position(writable)?.join(&p.name);
                let Some(dataset) = self.document()?.dataset(&position) else {
                    return Err(not_found(backend, AffectedObject::Dataset, format!("no dataset at {position}")));
                };
                p.dtype.fill(dataset.dtype);
                p.extent.fill(dataset.extent.clone());
                place(writable, position);
            }
            Parameter::WriteDataset(p) => {
                let position = own_position(writable)?;
                let Some(dataset) = self.document()?.dataset_mut(&position) else {
                    return Err(not_found(backend, AffectedObject::Dataset, format!("no dataset at {position}")));
                };
                dataset.write_chunk(&p.offset, &p.extent, &p.data)?;
                self.dirty = true;
            }
            Parameter::ReadDataset(p) => {
                let position = own_position(writable)?;
                let Some(dataset) = self.document()?.dataset(&position) else {
                    return Err(not_found(backend, AffectedObject::Dataset, format!("no dataset at {position}")));
                };
                p.data.fill(dataset.read_chunk(&p.offset, &p.extent)?);
            }
            Parameter::WriteAttribute(p) => {
                let position = own_position(writable)?;
                let Some(attributes) = self.document()?.attributes_mut(&position) else {
                    return Err(BackendError::Unplaced);
                };
                attributes.insert(p.name.clone(), p.value.clone());
                self.dirty = true;
            }
            Parameter::ReadAttribute(p) => {
                let position = own_position(writable)?;
                let value = self
                    .document()?
                    .attributes(&position)
                    .and_then(|attributes| attributes.get(&p.name))
                    .cloned();
                let Some(value) = value else {
                    return Err(not_found(
                        backend,
                        AffectedObject::Attribute,
                        format!("no attribute {} at {position}", p.name),
                    ));
                };
                p.dtype.fill(value.dtype());
                p.value.fill(value);
            }
            Parameter::ListPaths(p) => {
                let position = own_position(writable)?;
                let document = self.document()?;
                let paths = match document.group(&position) {
                    Some(group) => group.groups.keys().cloned().collect(),
                    None if document.dataset(&position).is_some() => Vec::new(),
                    None => {
                        return Err(not_found(backend, AffectedObject::Group, format!("no group at {position}")));
                    }
                };
                p.paths.fill(paths);
            }
            Parameter::ListDatasets(p) => {
                let position = own_position(writable)?;
                let document = self.document()?;
                let datasets = match document.group(&position) {
                    Some(group) => group.datasets.keys().cloned().collect(),
                    None if document.dataset(&position).is_some() => Vec::new(),
                    None => {
                        return Err(not_found(backend, AffectedObject::Group, format!("no group at {position}")));
                    }
                };
                p.datasets.fill(datasets);
            }
            Parameter::ListAttributes(p) => {
                let position = own_position(writable)?;
                let names = self
                    .document()?
                    .attributes(&position)
                    .map(|attributes| attributes.keys().cloned().collect());
                let Some(names) = names else {
                    return Err(not_found(backend, AffectedObject::Other, format!("nothing at {position}")));
                };
                p.attributes.fill(names);
            }
            Parameter::KeepSynchronous(p) => {
                let position = p.other.position().ok_or(BackendError::Unplaced)?;
                place(writable, position);
            }
        }
        Ok(())
    }

    fn finish_batch(&mut self, params: &FlushParams) -> BackendResult<()> {
        if params.sync == SyncMode::Synchronous {
            self.persist()?;
        }
        if params.release_buffers && !self.dirty && self.document.is_some() {
            self.document = None;
            debug!(store = self.store.kind(), "released in-memory document");
        }
        Ok(())
    }
}

/// A backend for `format`, storing at `path`.
///
/// For [`Format::Memory`] the path only names the store; nothing is shared
/// with other sessions. Build a [`DocumentBackend`] over a cloned
/// [`MemoryStore`] to share one.
pub fn open_backend(format: Format, path: &Path, access: Access, json_pretty: bool) -> Box<dyn Backend> {
    let store: Box<dyn DocumentStore> = match format {
        Format::Json => Box::new(JsonStore::new(path, json_pretty)),
        Format::Packed => Box::new(PackedStore::new(path)),
        Format::Memory => Box::new(MemoryStore::new(path.display().to_string())),
    };
    Box::new(DocumentBackend::new(store, access))
}

fn not_found(backend: &'static str, affected: AffectedObject, description: String) -> BackendError {
    ReadError::not_found(affected, description)
        .with_backend(backend)
        .into()
}

fn place(writable: &Writable, position: FilePosition) {
    writable.set_position(position);
    writable.mark_written();
}

fn parent_position(writable: &Writable) -> BackendResult<FilePosition> {
    writable
        .parent()
        .and_then(|parent| parent.position())
        .ok_or(BackendError::UnresolvedParent)
}

fn own_position(writable: &Writable) -> BackendResult<FilePosition> {
    writable.position().ok_or(BackendError::Unplaced)
}

#[cfg(test)]
mod tests {
    use strata_types::{Attribute, Datatype};

    use super::*;
    use crate::error::{IoError, Reason};
    use crate::handler::IoHandler;
    use crate::parameter::*;

    fn session(store: &MemoryStore, access: Access) -> IoHandler {
        IoHandler::new(Box::new(DocumentBackend::new(Box::new(store.clone()), access)), access)
    }

    fn child_of(parent: &Writable) -> Writable {
        let child = Writable::new();
        child.set_parent(parent);
        child
    }

    /// Writes `/meshes/E` with attribute `geometry` and dataset `/meshes/E/x`.
    fn write_sample(store: &MemoryStore) {
        let mut io = session(store, Access::Create);
        let root = Writable::new();
        let meshes = child_of(&root);
        let mesh = child_of(&meshes);
        let x = child_of(&mesh);

        io.enqueue(IoTask::new(&root, CreateFile { name: "sample".into() }));
        io.enqueue(IoTask::new(&meshes, CreatePath { path: "meshes".into() }));
        io.enqueue(IoTask::new(&mesh, CreatePath { path: "E".into() }));
        io.enqueue(IoTask::new(&mesh, WriteAttribute::new("geometry", "cartesian")));
        io.enqueue(IoTask::new(
            &x,
            CreateDataset {
                name: "x".into(),
                dtype: Datatype::F64,
                extent: vec![2, 2],
            },
        ));
        io.enqueue(IoTask::new(
            &x,
            WriteDataset {
                offset: vec![0, 0],
                extent: vec![1, 2],
                data: Attribute::new(vec![1.5f64, 2.5]),
            },
        ));
        io.enqueue(IoTask::new(&root, CloseFile));
        io.flush(&FlushParams::default()).unwrap();

        assert_eq!(mesh.position().unwrap().to_string(), "/meshes/E");
        assert_eq!(x.position().unwrap().to_string(), "/meshes/E/x");
    }

    // -----------------------------------------------------------------------
    // Write then read
    // -----------------------------------------------------------------------

    #[test]
    fn persisted_only_at_close() {
        let store = MemoryStore::new("lazy");
        let mut io = session(&store, Access::Create);
        let root = Writable::new();
        io.enqueue(IoTask::new(&root, CreateFile { name: "lazy".into() }));
        io.enqueue(IoTask::new(&root, WriteAttribute::new("a", 1i32)));
        io.flush(&FlushParams::default()).unwrap();
        assert!(store.snapshot().is_none());

        io.enqueue(IoTask::new(&root, CloseFile));
        io.flush(&FlushParams::default()).unwrap();
        let doc = store.snapshot().unwrap();
        assert_eq!(doc.root.attributes["a"], Attribute::new(1i32));
    }

    #[test]
    fn synchronous_flush_persists_batch() {
        let store = MemoryStore::new("sync");
        let mut io = session(&store, Access::Create);
        let root = Writable::new();
        io.enqueue(IoTask::new(&root, CreateFile { name: "sync".into() }));
        io.flush(&FlushParams::synchronous()).unwrap();
        assert!(store.snapshot().is_some());
    }

    #[test]
    fn reopen_and_read_back() {
        let store = MemoryStore::new("roundtrip");
        write_sample(&store);

        let mut io = session(&store, Access::ReadOnly);
        let root = Writable::new();
        let meshes = child_of(&root);
        let mesh = child_of(&meshes);
        let x = child_of(&mesh);
        io.enqueue(IoTask::new(&root, OpenFile { name: "roundtrip".into() }));
        io.enqueue(IoTask::new(&meshes, OpenPath { path: "meshes".into() }));
        let paths = ListPaths::default();
        io.enqueue(IoTask::new(&meshes, paths.clone()));
        io.enqueue(IoTask::new(&mesh, OpenPath { path: "E".into() }));
        let datasets = ListDatasets::default();
        io.enqueue(IoTask::new(&mesh, datasets.clone()));
        let geometry = ReadAttribute::new("geometry");
        io.enqueue(IoTask::new(&mesh, geometry.clone()));
        let open = OpenDataset::new("x");
        io.enqueue(IoTask::new(&x, open.clone()));
        let chunk = ReadDataset::new(vec![0, 0], vec![2, 2]);
        io.enqueue(IoTask::new(&x, chunk.clone()));

        assert!(matches!(paths.paths.get(), Err(IoError::OutputUnavailable(_))));
        io.flush(&FlushParams::default()).unwrap();

        assert_eq!(paths.paths.get().unwrap(), vec!["E"]);
        assert_eq!(datasets.datasets.get().unwrap(), vec!["x"]);
        assert_eq!(geometry.dtype.get().unwrap(), Datatype::String);
        assert_eq!(geometry.value.get().unwrap(), Attribute::from("cartesian"));
        assert_eq!(open.dtype.get().unwrap(), Datatype::F64);
        assert_eq!(open.extent.get().unwrap(), vec![2, 2]);
        assert_eq!(
            chunk.data.get().unwrap(),
            Attribute::new(vec![1.5f64, 2.5, 0.0, 0.0])
        );
    }

    #[test]
    fn create_path_is_idempotent_once_written() {
        let store = MemoryStore::new("idem");
        let mut io = session(&store, Access::Create);
        let root = Writable::new();
        let meshes = child_of(&root);
        io.enqueue(IoTask::new(&root, CreateFile { name: "idem".into() }));
        io.enqueue(IoTask::new(&meshes, CreatePath { path: "meshes".into() }));
        io.enqueue(IoTask::new(&meshes, CreatePath { path: "meshes".into() }));
        io.enqueue(IoTask::new(&root, CloseFile));
        io.flush(&FlushParams::default()).unwrap();

        let doc = store.snapshot().unwrap();
        assert_eq!(doc.root.groups.len(), 1);
        assert!(doc.root.groups["meshes"].groups.is_empty());
    }

    #[test]
    fn keep_synchronous_copies_position() {
        let store = MemoryStore::new("sync-pos");
        let mut io = session(&store, Access::Create);
        let root = Writable::new();
        let meshes = child_of(&root);
        let component = child_of(&meshes);
        let mesh = child_of(&meshes);
        io.enqueue(IoTask::new(&root, CreateFile { name: "s".into() }));
        io.enqueue(IoTask::new(&meshes, CreatePath { path: "meshes".into() }));
        io.enqueue(IoTask::new(
            &component,
            CreateDataset {
                name: "rho".into(),
                dtype: Datatype::F32,
                extent: vec![4],
            },
        ));
        io.enqueue(IoTask::new(
            &mesh,
            KeepSynchronous {
                other: component.clone(),
            },
        ));
        io.enqueue(IoTask::new(&mesh, WriteAttribute::new("gridUnitSI", 1.0f64)));
        io.flush(&FlushParams::default()).unwrap();

        assert!(mesh.written());
        assert_eq!(mesh.position(), component.position());
        assert_eq!(mesh.position().unwrap().to_string(), "/meshes/rho");
    }

    // -----------------------------------------------------------------------
    // Failures
    // -----------------------------------------------------------------------

    #[test]
    fn missing_objects_are_classified() {
        let store = MemoryStore::new("missing");
        write_sample(&store);
        let mut io = session(&store, Access::ReadOnly);
        let root = Writable::new();
        let meshes = child_of(&root);
        io.enqueue(IoTask::new(&root, OpenFile { name: "missing".into() }));
        io.enqueue(IoTask::new(&meshes, OpenPath { path: "meshes".into() }));
        io.enqueue(IoTask::new(&meshes, ReadAttribute::new("nope")));
        let err = io.flush(&FlushParams::default()).unwrap_err();
        let read = err.read_error().unwrap();
        assert_eq!(read.affected, AffectedObject::Attribute);
        assert_eq!(read.reason, Reason::NotFound);
        assert_eq!(read.backend.as_deref(), Some("memory"));

        let y = child_of(&meshes);
        io.enqueue(IoTask::new(&y, OpenDataset::new("y")));
        let err = io.flush(&FlushParams::default()).unwrap_err();
        assert_eq!(err.read_error().unwrap().affected, AffectedObject::Dataset);
    }

    #[test]
    fn read_only_open_of_empty_store_fails() {
        let store = MemoryStore::new("empty");
        let mut io = session(&store, Access::ReadOnly);
        io.enqueue(IoTask::new(&Writable::new(), OpenFile { name: "empty".into() }));
        let err = io.flush(&FlushParams::default()).unwrap_err();
        assert_eq!(err.read_error().unwrap().affected, AffectedObject::File);
    }

    #[test]
    fn create_path_without_placed_parent() {
        let store = MemoryStore::new("orphan");
        let mut io = session(&store, Access::Create);
        io.enqueue(IoTask::new(&Writable::new(), CreatePath { path: "a".into() }));
        let err = io.flush(&FlushParams::default()).unwrap_err();
        assert!(matches!(
            err,
            IoError::Task {
                source: BackendError::UnresolvedParent,
                ..
            }
        ));
    }

    #[test]
    fn release_buffers_reloads_from_store() {
        let store = MemoryStore::new("release");
        let mut io = session(&store, Access::Create);
        let root = Writable::new();
        io.enqueue(IoTask::new(&root, CreateFile { name: "release".into() }));
        io.enqueue(IoTask::new(&root, WriteAttribute::new("a", 7u8)));
        let params = FlushParams {
            release_buffers: true,
            ..FlushParams::synchronous()
        };
        io.flush(&params).unwrap();

        let read = ReadAttribute::new("a");
        io.enqueue(IoTask::new(&root, read.clone()));
        io.flush(&FlushParams::default()).unwrap();
        assert_eq!(read.value.get().unwrap(), Attribute::new(7u8));
    }
}
