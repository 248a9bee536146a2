use std::path::Path;

use strata_io::parameter::{CloseFile, CreateFile, CreatePath, ListDatasets, ListPaths, OpenFile, OpenPath};
use strata_io::{open_backend, Access, Backend, Diagnostic, FilePosition, FlushParams, IoHandler, IoTask, Writable};
use tracing::{debug, error, info};

use crate::attributable::{Attributable, ReadMode};
use crate::config::SessionConfig;
use crate::container::Container;
use crate::error::{ModelError, ModelResult};
use crate::mesh::{skip_on_read_error, Mesh};
use crate::stale::EraseStaleEntries;

pub const SCHEMA_VERSION: &str = "1.0.0";
const DEFAULT_MESHES_PATH: &str = "meshes/";

/// Root of a stored hierarchy: root attributes plus the meshes container.
///
/// The series owns the [`IoHandler`]. Changes are queued until [`flush`]
/// and persisted at the latest by [`close`], which also runs when the
/// series is dropped.
///
/// [`flush`]: Series::flush
/// [`close`]: Series::close
pub struct Series {
    name: String,
    handler: IoHandler,
    root: Attributable,
    meshes: Container<Mesh>,
    flush_params: FlushParams,
    closed: bool,
}

impl Series {
    /// Create a new file at `path`, replacing any existing one.
    pub fn create(path: impl AsRef<Path>, config: &SessionConfig) -> ModelResult<Self> {
        Self::open(path, Access::Create, config)
    }

    /// Open `path` with the given access. Formats come from the config or
    /// the file extension.
    pub fn open(path: impl AsRef<Path>, access: Access, config: &SessionConfig) -> ModelResult<Self> {
        let path = path.as_ref();
        let format = config.format_for(path)?;
        let backend = open_backend(format, path, access, config.json_pretty);
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::with_backend(name, backend, access, config.flush.clone())
    }

    /// A series over an existing backend.
    ///
    /// Unless `access` is [`Access::Create`], the file is opened and read
    /// immediately; meshes that fail to read are skipped and reported in
    /// [`diagnostics`](Self::diagnostics).
    pub fn with_backend(
        name: impl Into<String>,
        backend: Box<dyn Backend>,
        access: Access,
        flush_params: FlushParams,
    ) -> ModelResult<Self> {
        let root = Attributable::new();
        let meshes_node = Writable::new();
        meshes_node.set_parent(root.writable());
        let mut series = Self {
            name: name.into(),
            handler: IoHandler::new(backend, access),
            root,
            meshes: Container::new(meshes_node),
            flush_params,
            closed: false,
        };

        if access == Access::Create {
            series.set_defaults();
        } else {
            series.handler.enqueue(IoTask::new(
                series.root.writable(),
                OpenFile {
                    name: series.name.clone(),
                },
            ));
            series.handler.flush(&FlushParams::default())?;
            series.read()?;
            if !series.root.contains_attribute("schemaVersion") {
                series.set_defaults();
            }
        }
        info!(name = %series.name, backend = series.handler.backend_name(), %access, "series opened");
        Ok(series)
    }

    fn set_defaults(&mut self) {
        self.root.set_attribute("schemaVersion", SCHEMA_VERSION);
        self.root.set_attribute("meshesPath", DEFAULT_MESHES_PATH);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn access(&self) -> Access {
        self.handler.access()
    }

    pub fn schema_version(&self) -> ModelResult<String> {
        self.root.get("schemaVersion")
    }

    /// Relative path of the meshes group, with a trailing slash.
    pub fn meshes_path(&self) -> ModelResult<String> {
        self.root.get("meshesPath")
    }

    pub fn attributes(&self) -> &Attributable {
        &self.root
    }

    pub fn attributes_mut(&mut self) -> &mut Attributable {
        &mut self.root
    }

    pub fn meshes(&self) -> &Container<Mesh> {
        &self.meshes
    }

    pub fn meshes_mut(&mut self) -> &mut Container<Mesh> {
        &mut self.meshes
    }

    /// The mesh called `name`, created if absent.
    pub fn mesh_mut(&mut self, name: &str) -> &mut Mesh {
        self.meshes.entry(name)
    }

    /// The handler, for queueing chunk loads.
    pub fn handler_mut(&mut self) -> &mut IoHandler {
        &mut self.handler
    }

    /// Split borrow of one mesh and the handler.
    pub fn mesh_and_handler(&mut self, name: &str) -> Option<(&mut Mesh, &mut IoHandler)> {
        let mesh = self.meshes.get_mut(name)?;
        Some((mesh, &mut self.handler))
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.handler.diagnostics()
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.handler.take_diagnostics()
    }

    /// Flush with the session's configured parameters.
    pub fn flush(&mut self) -> ModelResult<()> {
        let params = self.flush_params.clone();
        self.flush_with(&params)
    }

    /// Bring every pending change to the backend.
    pub fn flush_with(&mut self, params: &FlushParams) -> ModelResult<()> {
        if self.closed {
            return Err(ModelError::WrongApiUsage(format!("series {} is closed", self.name)));
        }
        if !self.handler.access().is_read_only() {
            if !self.root.written() {
                self.handler.enqueue(IoTask::new(
                    self.root.writable(),
                    CreateFile {
                        name: self.name.clone(),
                    },
                ));
            }
            if !self.meshes.writable().written() {
                let path = self.meshes_path()?;
                self.handler.enqueue(IoTask::new(
                    self.meshes.writable(),
                    CreatePath {
                        path: path.trim_end_matches('/').to_string(),
                    },
                ));
            }
        }
        for (name, mesh) in self.meshes.iter_mut() {
            mesh.flush(&mut self.handler, name, params)?;
        }
        self.root.flush_attributes(&mut self.handler, params)?;
        debug!(name = %self.name, tasks = self.handler.len(), "flushing series");
        self.handler.flush(params)?;
        Ok(())
    }

    /// Re-read the root attributes and every mesh.
    ///
    /// Meshes that are gone from storage are dropped. A mesh that fails to
    /// read is skipped with a diagnostic.
    pub fn read(&mut self) -> ModelResult<()> {
        self.root.read_attributes(&mut self.handler, ReadMode::FullyReread)?;
        let Ok(meshes_path) = self.meshes_path() else {
            debug!(name = %self.name, "no meshes path; nothing to read");
            return Ok(());
        };

        let meshes_node = self.meshes.writable().clone();
        self.handler.enqueue(IoTask::new(
            &meshes_node,
            OpenPath {
                path: meshes_path.trim_end_matches('/').to_string(),
            },
        ));
        let paths = ListPaths::default();
        let datasets = ListDatasets::default();
        self.handler.enqueue(IoTask::new(&meshes_node, paths.clone()));
        self.handler.enqueue(IoTask::new(&meshes_node, datasets.clone()));
        self.handler.flush(&FlushParams::default())?;

        let base = meshes_node.position().unwrap_or_else(FilePosition::root);
        let handler = &mut self.handler;
        let mut tracker = EraseStaleEntries::new(&mut self.meshes);
        for name in paths.paths.get()? {
            let mesh = tracker.at(&name);
            let result = mesh
                .open_path(handler, &name)
                .and_then(|()| mesh.read(handler));
            skip_on_read_error(handler, &mut tracker, &base, &name, result)?;
        }
        for name in datasets.datasets.get()? {
            let mesh = tracker.at(&name);
            let result = mesh
                .open_scalar_dataset(handler, &name, &meshes_node)
                .and_then(|()| mesh.read(handler));
            skip_on_read_error(handler, &mut tracker, &base, &name, result)?;
        }
        tracker.finish();
        info!(name = %self.name, meshes = self.meshes.len(), "series read");
        Ok(())
    }

    /// Flush, close the file and persist it.
    pub fn close(&mut self) -> ModelResult<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.handler
            .enqueue(IoTask::new(self.root.writable(), CloseFile));
        self.handler.flush(&self.flush_params)?;
        self.closed = true;
        info!(name = %self.name, "series closed");
        Ok(())
    }
}

impl Drop for Series {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.close() {
            error!(name = %self.name, error = %err, "failed to close series");
        }
    }
}

impl std::fmt::Debug for Series {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Series")
            .field("name", &self.name)
            .field("handler", &self.handler)
            .field("meshes", &self.meshes.len())
            .field("closed", &self.closed)
            .finish()
    }
}
