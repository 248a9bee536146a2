use std::collections::BTreeMap;

use strata_io::parameter::{ListAttributes, ReadAttribute, WriteAttribute};
use strata_io::{AttributeFlushMode, FlushParams, IoHandler, IoTask, Slot, Writable};
use strata_types::{Attribute, AttributeType, TypeError};
use tracing::debug;

use crate::error::{ModelError, ModelResult};

/// How [`Attributable::read_attributes`] treats attributes already known.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// Only fetch attributes not yet present locally.
    IgnoreExisting,
    /// Fetch every stored attribute, replacing local values.
    OverrideExisting,
    /// Like `OverrideExisting`, and also drop persisted attributes that are
    /// no longer stored.
    FullyReread,
}

#[derive(Clone, Debug)]
enum State {
    /// Changed locally, no write queued.
    Dirty,
    /// A write was queued while the handler epoch was `epoch`.
    Pending { done: Slot<()>, epoch: u64 },
    /// Stored by the backend.
    Persisted,
}

#[derive(Clone, Debug)]
struct Entry {
    value: Attribute,
    state: State,
}

impl Entry {
    fn local(value: Attribute) -> Self {
        Self {
            value,
            state: State::Dirty,
        }
    }

    fn persisted(&self) -> bool {
        match &self.state {
            State::Dirty => false,
            State::Pending { done, .. } => done.is_ready(),
            State::Persisted => true,
        }
    }

    /// Whether a write must be queued. A pending write whose batch has run
    /// without completing it failed or was discarded.
    fn needs_write(&self, epoch: u64) -> bool {
        match &self.state {
            State::Dirty => true,
            State::Pending { done, epoch: queued } => !done.is_ready() && epoch > *queued,
            State::Persisted => false,
        }
    }
}

/// Named attributes of one node plus the node's [`Writable`].
///
/// Setting an attribute never performs I/O. Unpersisted attributes are
/// turned into write tasks by [`flush_attributes`](Self::flush_attributes).
#[derive(Debug, Default)]
pub struct Attributable {
    writable: Writable,
    attributes: BTreeMap<String, Entry>,
}

impl Attributable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writable(&self) -> &Writable {
        &self.writable
    }

    /// Whether the node exists in the backend.
    pub fn written(&self) -> bool {
        self.writable.written()
    }

    /// Set an attribute. Returns `true` if an attribute of that name was
    /// replaced. Re-setting an identical value keeps it persisted.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Attribute>) -> bool {
        let name = name.into();
        let value = value.into();
        match self.attributes.get_mut(&name) {
            Some(entry) if entry.value == value => true,
            Some(entry) => {
                *entry = Entry::local(value);
                true
            }
            None => {
                self.attributes.insert(name, Entry::local(value));
                false
            }
        }
    }

    pub fn get_attribute(&self, name: &str) -> ModelResult<&Attribute> {
        self.attributes
            .get(name)
            .map(|entry| &entry.value)
            .ok_or_else(|| ModelError::NoSuchAttribute(name.to_string()))
    }

    /// Typed access through the lossless conversions of
    /// [`Attribute::get_optional`].
    pub fn get<T: AttributeType>(&self, name: &str) -> ModelResult<T> {
        let attribute = self.get_attribute(name)?;
        attribute.get_optional::<T>().ok_or_else(|| {
            TypeError::Mismatch {
                requested: T::DATATYPE,
                stored: attribute.dtype(),
            }
            .into()
        })
    }

    pub fn contains_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn num_attributes(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the backend has stored the current value of `name`.
    pub fn is_persisted(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(Entry::persisted)
    }

    /// Record a value that came from the backend.
    pub(crate) fn set_read_attribute(&mut self, name: impl Into<String>, value: Attribute) {
        self.attributes.insert(
            name.into(),
            Entry {
                value,
                state: State::Persisted,
            },
        );
    }

    /// Enqueue a write for every unpersisted attribute.
    ///
    /// An attribute counts as persisted once its write has executed. If the
    /// flush carrying the write fails, the next call queues it again.
    ///
    /// Nothing is written under read-only access. With
    /// [`AttributeFlushMode::FullyReread`] the attributes of a written node
    /// are refreshed from the backend instead, which flushes the handler.
    pub fn flush_attributes(&mut self, handler: &mut IoHandler, params: &FlushParams) -> ModelResult<()> {
        if params.attribute_mode == AttributeFlushMode::FullyReread {
            if self.written() {
                self.reread(handler, &[])?;
            }
            return Ok(());
        }
        if handler.access().is_read_only() {
            return Ok(());
        }

        let epoch = handler.epoch();
        let mut queued = 0usize;
        for (name, entry) in self.attributes.iter_mut() {
            if !entry.needs_write(epoch) {
                continue;
            }
            let task = IoTask::new(
                &self.writable,
                WriteAttribute {
                    name: name.clone(),
                    value: entry.value.clone(),
                },
            );
            entry.state = State::Pending {
                done: task.completion(),
                epoch,
            };
            handler.enqueue(task);
            queued += 1;
        }
        if queued > 0 {
            debug!(count = queued, "attribute writes enqueued");
        }
        Ok(())
    }

    /// Fetch the node's stored attributes.
    pub fn read_attributes(&mut self, handler: &mut IoHandler, mode: ReadMode) -> ModelResult<()> {
        match mode {
            ReadMode::FullyReread => self.reread(handler, &[]),
            ReadMode::IgnoreExisting | ReadMode::OverrideExisting => {
                let names = self.list(handler)?;
                let wanted: Vec<String> = names
                    .into_iter()
                    .filter(|name| mode == ReadMode::OverrideExisting || !self.contains_attribute(name))
                    .collect();
                self.fetch(handler, wanted)
            }
        }
    }

    /// Read one attribute with its own round trip, without recording it.
    pub(crate) fn read_attribute(&self, handler: &mut IoHandler, name: &str) -> ModelResult<Attribute> {
        let read = ReadAttribute::new(name);
        handler.enqueue(IoTask::new(&self.writable, read.clone()));
        handler.flush(&FlushParams::default())?;
        Ok(read.value.get()?)
    }

    /// Full re-read of every stored attribute except `skip`.
    pub(crate) fn reread(&mut self, handler: &mut IoHandler, skip: &[&str]) -> ModelResult<()> {
        let names = self.list(handler)?;
        let wanted: Vec<String> = names
            .iter()
            .filter(|name| !skip.contains(&name.as_str()))
            .cloned()
            .collect();
        self.fetch(handler, wanted)?;
        self.attributes.retain(|name, entry| {
            !entry.persisted() || names.contains(name) || skip.contains(&name.as_str())
        });
        Ok(())
    }

    fn list(&self, handler: &mut IoHandler) -> ModelResult<Vec<String>> {
        let list = ListAttributes::default();
        handler.enqueue(IoTask::new(&self.writable, list.clone()));
        handler.flush(&FlushParams::default())?;
        Ok(list.attributes.get()?)
    }

    fn fetch(&mut self, handler: &mut IoHandler, names: Vec<String>) -> ModelResult<()> {
        if names.is_empty() {
            return Ok(());
        }
        let reads: Vec<ReadAttribute> = names.into_iter().map(ReadAttribute::new).collect();
        for read in &reads {
            handler.enqueue(IoTask::new(&self.writable, read.clone()));
        }
        handler.flush(&FlushParams::default())?;
        for read in reads {
            let value = read.value.get()?;
            self.set_read_attribute(read.name, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use strata_io::{
        Access, Backend, BackendError, BackendResult, DocumentBackend, FilePosition, MemoryStore, Operation,
        Parameter,
    };

    use super::*;

    fn handler(store: &MemoryStore, access: Access) -> IoHandler {
        IoHandler::new(Box::new(DocumentBackend::new(Box::new(store.clone()), access)), access)
    }

    /// A handler whose backend document already has a root node.
    fn placed_root(store: &MemoryStore) -> (IoHandler, Attributable) {
        let mut io = handler(store, Access::Create);
        let node = Attributable::new();
        io.enqueue(IoTask::new(
            node.writable(),
            strata_io::parameter::CreateFile { name: "t".into() },
        ));
        io.flush(&FlushParams::default()).unwrap();
        assert_eq!(node.writable().position(), Some(FilePosition::root()));
        (io, node)
    }

    // -----------------------------------------------------------------------
    // Local access
    // -----------------------------------------------------------------------

    #[test]
    fn set_and_get() {
        let mut node = Attributable::new();
        assert!(!node.set_attribute("unitSI", 1.0f64));
        assert!(node.set_attribute("unitSI", 2.0f64));
        assert_eq!(node.get::<f64>("unitSI").unwrap(), 2.0);
        assert!(matches!(
            node.get_attribute("missing"),
            Err(ModelError::NoSuchAttribute(name)) if name == "missing"
        ));
        assert!(matches!(node.get::<i32>("unitSI"), Err(ModelError::Type(_))));
    }

    #[test]
    fn get_widens_losslessly() {
        let mut node = Attributable::new();
        node.set_attribute("n", 7u16);
        assert_eq!(node.get::<i64>("n").unwrap(), 7);
        assert_eq!(node.get::<f64>("n").unwrap(), 7.0);
        assert_eq!(node.get::<Vec<u32>>("n").unwrap(), vec![7]);
    }

    // -----------------------------------------------------------------------
    // Flushing
    // -----------------------------------------------------------------------

    #[test]
    fn flush_writes_only_unpersisted() {
        let store = MemoryStore::new("attrs");
        let (mut io, mut node) = placed_root(&store);
        node.set_attribute("a", 1i32);
        node.set_attribute("b", "two");

        node.flush_attributes(&mut io, &FlushParams::default()).unwrap();
        assert_eq!(io.len(), 2);
        assert!(io.pending().all(|t| t.operation() == Operation::WriteAttribute));
        assert!(!node.is_persisted("a"));

        // Queued writes are not queued twice.
        node.flush_attributes(&mut io, &FlushParams::default()).unwrap();
        assert_eq!(io.len(), 2);
        io.flush(&FlushParams::default()).unwrap();
        assert!(node.is_persisted("a"));

        node.flush_attributes(&mut io, &FlushParams::default()).unwrap();
        assert!(io.is_empty());

        node.set_attribute("a", 1i32);
        node.flush_attributes(&mut io, &FlushParams::default()).unwrap();
        assert!(io.is_empty());

        node.set_attribute("a", 3i32);
        assert!(!node.is_persisted("a"));
        node.flush_attributes(&mut io, &FlushParams::default()).unwrap();
        let names: Vec<_> = io
            .pending()
            .filter_map(|t| match t.parameter() {
                Parameter::WriteAttribute(p) => Some(p.name.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["a"]);
    }

    /// Fails the first `WRITE_ATTRIBUTE` it is given.
    struct FailFirstWrite {
        inner: DocumentBackend,
        failed: bool,
    }

    impl Backend for FailFirstWrite {
        fn name(&self) -> &'static str {
            "fail-first-write"
        }

        fn execute(&mut self, task: &IoTask) -> BackendResult<()> {
            if task.operation() == Operation::WriteAttribute && !self.failed {
                self.failed = true;
                return Err(BackendError::Io(std::io::Error::other("disk full")));
            }
            self.inner.execute(task)
        }

        fn finish_batch(&mut self, params: &FlushParams) -> BackendResult<()> {
            self.inner.finish_batch(params)
        }
    }

    #[test]
    fn failed_write_is_queued_again() {
        let store = MemoryStore::new("retry");
        let backend = FailFirstWrite {
            inner: DocumentBackend::new(Box::new(store.clone()), Access::Create),
            failed: false,
        };
        let mut io = IoHandler::new(Box::new(backend), Access::Create);
        let mut node = Attributable::new();
        io.enqueue(IoTask::new(
            node.writable(),
            strata_io::parameter::CreateFile { name: "t".into() },
        ));
        io.flush(&FlushParams::default()).unwrap();

        node.set_attribute("unitSI", 2.0f64);
        node.flush_attributes(&mut io, &FlushParams::default()).unwrap();
        assert!(io.flush(&FlushParams::default()).is_err());
        assert!(!node.is_persisted("unitSI"));

        node.flush_attributes(&mut io, &FlushParams::default()).unwrap();
        assert_eq!(io.len(), 1);
        io.flush(&FlushParams::default()).unwrap();
        assert!(node.is_persisted("unitSI"));

        let mut reader = Attributable {
            writable: node.writable().clone(),
            attributes: BTreeMap::new(),
        };
        reader.read_attributes(&mut io, ReadMode::IgnoreExisting).unwrap();
        assert_eq!(reader.get::<f64>("unitSI").unwrap(), 2.0);
    }

    #[test]
    fn discarded_write_is_queued_again() {
        let store = MemoryStore::new("discard");
        let (mut io, mut node) = placed_root(&store);

        // A failing task ahead of the write discards it.
        let orphan = Writable::new();
        io.enqueue(IoTask::new(
            &orphan,
            strata_io::parameter::OpenPath { path: "missing".into() },
        ));
        node.set_attribute("a", 1i32);
        node.flush_attributes(&mut io, &FlushParams::default()).unwrap();
        assert!(io.flush(&FlushParams::default()).is_err());
        assert!(!node.is_persisted("a"));

        node.flush_attributes(&mut io, &FlushParams::default()).unwrap();
        assert_eq!(io.len(), 1);
        io.flush(&FlushParams::default()).unwrap();
        assert!(node.is_persisted("a"));
    }

    #[test]
    fn read_only_never_writes() {
        let store = MemoryStore::new("ro");
        let mut io = handler(&store, Access::ReadOnly);
        let mut node = Attributable::new();
        node.set_attribute("a", 1i32);
        node.flush_attributes(&mut io, &FlushParams::default()).unwrap();
        assert!(io.is_empty());
        assert!(!node.is_persisted("a"));
    }

    // -----------------------------------------------------------------------
    // Reading
    // -----------------------------------------------------------------------

    #[test]
    fn read_modes() {
        let store = MemoryStore::new("modes");
        let (mut io, mut writer) = placed_root(&store);
        writer.set_attribute("a", 1i32);
        writer.set_attribute("b", 2i32);
        writer.flush_attributes(&mut io, &FlushParams::default()).unwrap();
        io.flush(&FlushParams::default()).unwrap();

        // Same node, different local state.
        let mut reader = Attributable {
            writable: writer.writable().clone(),
            attributes: BTreeMap::new(),
        };
        reader.set_attribute("a", 100i32);
        reader.read_attributes(&mut io, ReadMode::IgnoreExisting).unwrap();
        assert_eq!(reader.get::<i32>("a").unwrap(), 100);
        assert_eq!(reader.get::<i32>("b").unwrap(), 2);
        assert!(reader.is_persisted("b"));

        reader.read_attributes(&mut io, ReadMode::OverrideExisting).unwrap();
        assert_eq!(reader.get::<i32>("a").unwrap(), 1);
    }

    #[test]
    fn full_reread_drops_vanished_attributes() {
        let store = MemoryStore::new("reread");
        let (mut io, mut node) = placed_root(&store);
        node.set_attribute("kept", 1i32);
        node.flush_attributes(&mut io, &FlushParams::default()).unwrap();
        io.flush(&FlushParams::default()).unwrap();

        // Pretend "gone" was persisted earlier but has since disappeared.
        node.set_read_attribute("gone", Attribute::new(5i32));
        node.set_attribute("local", 9i32);

        node.flush_attributes(&mut io, &FlushParams::reread()).unwrap();
        assert!(node.contains_attribute("kept"));
        assert!(!node.contains_attribute("gone"));
        assert!(node.contains_attribute("local"));
    }
}
