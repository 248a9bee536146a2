use strata_io::parameter::{CreateDataset, CreatePath, KeepSynchronous, OpenDataset, OpenPath, ReadDataset, WriteDataset};
use strata_io::{AffectedObject, FlushParams, IoHandler, IoTask, ReadError, Slot, Writable};
use strata_types::{Attribute, Datatype};

use crate::attributable::{Attributable, ReadMode};
use crate::container::Node;
use crate::error::{ModelError, ModelResult};

/// Key of the only component of a scalar mesh.
pub const SCALAR: &str = "\u{b}Scalar";

/// Element kind and extent of a component's data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dataset {
    pub dtype: Datatype,
    pub extent: Vec<u64>,
}

impl Dataset {
    pub fn new(dtype: Datatype, extent: Vec<u64>) -> Self {
        Self { dtype, extent }
    }

    /// Number of elements, or `None` on overflow.
    pub fn element_count(&self) -> Option<u64> {
        self.extent.iter().try_fold(1u64, |acc, &n| acc.checked_mul(n))
    }
}

/// One component of a mesh: an N-dimensional dataset, or a constant value
/// with a shape.
///
/// Chunks stored before the first flush are buffered and written after the
/// dataset has been created.
#[derive(Debug)]
pub struct RecordComponent {
    attributable: Attributable,
    dataset: Option<Dataset>,
    constant: bool,
    chunks: Vec<WriteDataset>,
}

impl Default for RecordComponent {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for RecordComponent {
    fn writable(&self) -> &Writable {
        self.attributable.writable()
    }
}

impl RecordComponent {
    /// An empty component with `unitSI = 1.0` and `position = [0.0]`.
    pub fn new() -> Self {
        let mut attributable = Attributable::new();
        attributable.set_attribute("unitSI", 1.0f64);
        attributable.set_attribute("position", vec![0.0f64]);
        Self {
            attributable,
            dataset: None,
            constant: false,
            chunks: Vec::new(),
        }
    }

    pub fn attributes(&self) -> &Attributable {
        &self.attributable
    }

    pub fn attributes_mut(&mut self) -> &mut Attributable {
        &mut self.attributable
    }

    pub fn unit_si(&self) -> ModelResult<f64> {
        self.attributable.get("unitSI")
    }

    pub fn set_unit_si(&mut self, unit_si: f64) -> &mut Self {
        self.attributable.set_attribute("unitSI", unit_si);
        self
    }

    /// Relative in-cell position of the component's values.
    pub fn position(&self) -> ModelResult<Vec<f64>> {
        self.attributable.get("position")
    }

    pub fn set_position(&mut self, position: Vec<f64>) -> &mut Self {
        self.attributable.set_attribute("position", position);
        self
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    /// Declare the component's element kind and extent.
    pub fn reset_dataset(&mut self, dataset: Dataset) -> ModelResult<&mut Self> {
        if dataset.dtype.is_vector() {
            return Err(ModelError::WrongApiUsage(format!(
                "dataset elements must be scalar, got {}",
                dataset.dtype
            )));
        }
        if self.attributable.written() && self.dataset.as_ref() != Some(&dataset) {
            return Err(ModelError::WrongApiUsage(
                "cannot change the dataset of a component that has been written".into(),
            ));
        }
        self.dataset = Some(dataset);
        Ok(self)
    }

    /// Make every element of the declared dataset equal to `value`.
    ///
    /// Stored as the attributes `value` and `shape` instead of a dataset.
    pub fn make_constant(&mut self, value: impl Into<Attribute>) -> ModelResult<&mut Self> {
        let value = value.into();
        if value.dtype().is_vector() {
            return Err(ModelError::WrongApiUsage(format!(
                "constant value must be a scalar, got {}",
                value.dtype()
            )));
        }
        let Some(dataset) = self.dataset.as_mut() else {
            return Err(ModelError::WrongApiUsage(
                "reset_dataset must be called before make_constant".into(),
            ));
        };
        if self.attributable.written() && !self.constant {
            return Err(ModelError::WrongApiUsage(
                "a written dataset cannot become constant".into(),
            ));
        }
        dataset.dtype = value.dtype();
        let shape = dataset.extent.clone();
        self.attributable.set_attribute("value", value);
        self.attributable.set_attribute("shape", shape);
        self.constant = true;
        Ok(self)
    }

    /// The constant value, if this is a constant component.
    pub fn constant_value(&self) -> Option<&Attribute> {
        if !self.constant {
            return None;
        }
        self.attributable.get_attribute("value").ok()
    }

    /// Buffer a chunk write. `data` is a flat sequence in row-major order.
    pub fn store_chunk(
        &mut self,
        offset: Vec<u64>,
        extent: Vec<u64>,
        data: impl Into<Attribute>,
    ) -> ModelResult<()> {
        let data = data.into();
        if self.constant {
            return Err(ModelError::WrongApiUsage(
                "cannot store chunks in a constant component".into(),
            ));
        }
        let dataset = self.checked_selection(&offset, &extent)?;
        if data.dtype().scalar_of() != Some(dataset.dtype) {
            return Err(ModelError::WrongApiUsage(format!(
                "chunk of kind {} does not match dataset kind {}",
                data.dtype(),
                dataset.dtype
            )));
        }
        let expected = selection_len(&extent)?;
        if data.len() != Some(expected) {
            return Err(ModelError::WrongApiUsage(format!(
                "chunk holds {:?} elements, selection needs {expected}",
                data.len()
            )));
        }
        self.chunks.push(WriteDataset { offset, extent, data });
        Ok(())
    }

    /// Request a chunk. The returned slot is filled by the next flush.
    ///
    /// Constant components are answered locally and the slot is filled
    /// immediately.
    pub fn load_chunk(
        &self,
        handler: &mut IoHandler,
        offset: Vec<u64>,
        extent: Vec<u64>,
    ) -> ModelResult<Slot<Attribute>> {
        let dataset = self.checked_selection(&offset, &extent)?;
        if let Some(value) = self.constant_value() {
            let count = selection_len(&extent)?;
            let mut data = Attribute::zeros(dataset.dtype, count)?;
            for i in 0..count {
                data.set_element(i, value)?;
            }
            let slot = Slot::new("data");
            slot.fill(data);
            return Ok(slot);
        }
        if !self.attributable.written() {
            return Err(ModelError::WrongApiUsage(
                "component must be flushed or opened before loading chunks".into(),
            ));
        }
        let read = ReadDataset::new(offset, extent);
        let slot = read.data.clone();
        handler.enqueue(IoTask::new(self.attributable.writable(), read));
        Ok(slot)
    }

    fn checked_selection(&self, offset: &[u64], extent: &[u64]) -> ModelResult<&Dataset> {
        let dataset = self
            .dataset
            .as_ref()
            .ok_or_else(|| ModelError::WrongApiUsage("component has no dataset".into()))?;
        let rank = dataset.extent.len();
        if offset.len() != rank || extent.len() != rank {
            return Err(ModelError::WrongApiUsage(format!(
                "selection rank does not match dataset rank {rank}"
            )));
        }
        let fits = (0..rank).all(|d| {
            offset[d]
                .checked_add(extent[d])
                .is_some_and(|end| end <= dataset.extent[d])
        });
        if !fits {
            return Err(ModelError::WrongApiUsage(format!(
                "selection {offset:?}+{extent:?} exceeds dataset extent {:?}",
                dataset.extent
            )));
        }
        Ok(dataset)
    }

    /// Enqueue the tasks that bring the component to storage as `name`
    /// below its parent node.
    pub fn flush(&mut self, handler: &mut IoHandler, name: &str, params: &FlushParams) -> ModelResult<()> {
        if handler.access().is_read_only() {
            if !self.chunks.is_empty() {
                return Err(ModelError::WrongApiUsage(format!(
                    "cannot store chunks of {name} with read-only access"
                )));
            }
            return self.attributable.flush_attributes(handler, params);
        }

        let writable = self.attributable.writable().clone();
        if !writable.written() {
            if self.constant {
                handler.enqueue(IoTask::new(&writable, CreatePath { path: name.to_string() }));
            } else {
                let dataset = self.dataset.as_ref().ok_or_else(|| {
                    ModelError::WrongApiUsage(format!("component {name} has no dataset"))
                })?;
                handler.enqueue(IoTask::new(
                    &writable,
                    CreateDataset {
                        name: name.to_string(),
                        dtype: dataset.dtype,
                        extent: dataset.extent.clone(),
                    },
                ));
            }
        }
        for chunk in self.chunks.drain(..) {
            handler.enqueue(IoTask::new(&writable, chunk));
        }
        self.attributable.flush_attributes(handler, params)
    }

    /// Open the dataset `name` below the parent node.
    pub(crate) fn open_dataset(&mut self, handler: &mut IoHandler, name: &str) -> ModelResult<()> {
        let open = OpenDataset::new(name);
        handler.enqueue(IoTask::new(self.attributable.writable(), open.clone()));
        handler.flush(&FlushParams::default())?;
        self.dataset = Some(Dataset::new(open.dtype.get()?, open.extent.get()?));
        self.constant = false;
        Ok(())
    }

    /// Open the group `name` below the parent node as a constant component.
    pub(crate) fn open_constant(&mut self, handler: &mut IoHandler, name: &str) -> ModelResult<()> {
        handler.enqueue(IoTask::new(
            self.attributable.writable(),
            OpenPath { path: name.to_string() },
        ));
        handler.flush(&FlushParams::default())?;
        self.constant = true;
        Ok(())
    }

    /// Share `other`'s backend node as a constant component.
    pub(crate) fn open_constant_at(&mut self, handler: &mut IoHandler, other: &Writable) -> ModelResult<()> {
        handler.enqueue(IoTask::new(
            self.attributable.writable(),
            KeepSynchronous { other: other.clone() },
        ));
        handler.flush(&FlushParams::default())?;
        self.constant = true;
        Ok(())
    }

    /// Read the component's attributes. The component must be open.
    pub fn read(&mut self, handler: &mut IoHandler) -> ModelResult<()> {
        let mut required = vec!["unitSI"];
        if self.constant {
            let value = self.attributable.read_attribute(handler, "value")?;
            if value.dtype().is_vector() {
                return Err(unexpected("value", "a scalar kind", value.dtype()).into());
            }
            let shape = self.attributable.read_attribute(handler, "shape")?;
            let extent = shape
                .get_optional::<Vec<u64>>()
                .ok_or_else(|| unexpected("shape", "VEC_U64", shape.dtype()))?;
            self.dataset = Some(Dataset::new(value.dtype(), extent.clone()));
            self.attributable.set_read_attribute("value", value);
            self.attributable.set_read_attribute("shape", Attribute::new(extent));
            required.extend(["value", "shape"]);
        }

        let unit = self.attributable.read_attribute(handler, "unitSI")?;
        let unit_si = unit
            .get_optional::<f64>()
            .ok_or_else(|| unexpected("unitSI", "F64", unit.dtype()))?;
        self.attributable.set_read_attribute("unitSI", Attribute::new(unit_si));

        self.attributable.reread(handler, &required)
    }

    /// Full re-read of the component's attributes.
    pub fn reread_attributes(&mut self, handler: &mut IoHandler) -> ModelResult<()> {
        self.attributable.read_attributes(handler, ReadMode::FullyReread)
    }
}

/// Number of elements in a selection of the given extent.
fn selection_len(extent: &[u64]) -> ModelResult<usize> {
    extent
        .iter()
        .try_fold(1u64, |acc, &n| acc.checked_mul(n))
        .and_then(|count| usize::try_from(count).ok())
        .ok_or_else(|| ModelError::WrongApiUsage(format!("selection {extent:?} is too large")))
}

pub(crate) fn unexpected(attribute: &str, expected: &str, found: Datatype) -> ReadError {
    ReadError::unexpected_content(
        AffectedObject::Attribute,
        format!("unexpected datatype for '{attribute}' (expected {expected}, found {found})"),
    )
}

#[cfg(test)]
mod tests {
    use strata_io::{Access, DocumentBackend, MemoryStore, Operation, Parameter};

    use super::*;

    fn handler(store: &MemoryStore, access: Access) -> IoHandler {
        IoHandler::new(Box::new(DocumentBackend::new(Box::new(store.clone()), access)), access)
    }

    /// A created file root and a component linked below it.
    fn rooted(io: &mut IoHandler) -> (Writable, RecordComponent) {
        let root = Writable::new();
        io.enqueue(IoTask::new(&root, strata_io::parameter::CreateFile { name: "t".into() }));
        io.flush(&FlushParams::default()).unwrap();
        let component = RecordComponent::new();
        component.writable().set_parent(&root);
        (root, component)
    }

    #[test]
    fn defaults() {
        let c = RecordComponent::new();
        assert_eq!(c.unit_si().unwrap(), 1.0);
        assert_eq!(c.position().unwrap(), vec![0.0]);
        assert!(c.dataset().is_none());
        assert!(!c.is_constant());
    }

    // -----------------------------------------------------------------------
    // API misuse
    // -----------------------------------------------------------------------

    #[test]
    fn chunk_validation() {
        let mut c = RecordComponent::new();
        assert!(matches!(
            c.store_chunk(vec![0], vec![1], vec![1.0f64]),
            Err(ModelError::WrongApiUsage(_))
        ));
        c.reset_dataset(Dataset::new(Datatype::F64, vec![4])).unwrap();
        assert!(c.store_chunk(vec![0], vec![2], vec![1.0f64, 2.0]).is_ok());
        assert!(c.store_chunk(vec![3], vec![2], vec![1.0f64, 2.0]).is_err());
        assert!(c.store_chunk(vec![0], vec![2], vec![1.0f32, 2.0]).is_err());
        assert!(c.store_chunk(vec![0], vec![3], vec![1.0f64, 2.0]).is_err());
        assert!(c.store_chunk(vec![0, 0], vec![1, 1], vec![1.0f64]).is_err());
    }

    #[test]
    fn make_constant_needs_dataset() {
        let mut c = RecordComponent::new();
        assert!(c.make_constant(1.0f64).is_err());
        c.reset_dataset(Dataset::new(Datatype::F64, vec![2, 3])).unwrap();
        assert!(c.make_constant(vec![1.0f64]).is_err());
        c.make_constant(5i32).unwrap();
        assert!(c.is_constant());
        assert_eq!(c.dataset().unwrap().dtype, Datatype::I32);
        assert_eq!(c.attributes().get::<Vec<u64>>("shape").unwrap(), vec![2, 3]);
        assert!(c.store_chunk(vec![0, 0], vec![1, 1], vec![1i32]).is_err());
    }

    // -----------------------------------------------------------------------
    // Flush and read
    // -----------------------------------------------------------------------

    #[test]
    fn first_flush_creates_dataset_then_chunks() {
        let store = MemoryStore::new("rc");
        let mut io = handler(&store, Access::Create);
        let (_root, mut c) = rooted(&mut io);
        c.reset_dataset(Dataset::new(Datatype::I64, vec![3])).unwrap();
        c.store_chunk(vec![1], vec![2], vec![7i64, 8]).unwrap();
        c.flush(&mut io, "x", &FlushParams::default()).unwrap();

        let ops: Vec<Operation> = io.pending().map(|t| t.operation()).collect();
        assert_eq!(ops[0], Operation::CreateDataset);
        assert_eq!(ops[1], Operation::WriteDataset);
        assert!(ops[2..].iter().all(|op| *op == Operation::WriteAttribute));
        io.flush(&FlushParams::default()).unwrap();
        assert_eq!(c.writable().position().unwrap().to_string(), "/x");

        c.flush(&mut io, "x", &FlushParams::default()).unwrap();
        assert!(io.is_empty());

        let slot = c.load_chunk(&mut io, vec![0], vec![3]).unwrap();
        assert!(!slot.is_ready());
        io.flush(&FlushParams::default()).unwrap();
        assert_eq!(slot.get().unwrap(), Attribute::new(vec![0i64, 7, 8]));
    }

    #[test]
    fn oversized_selection_is_rejected() {
        let store = MemoryStore::new("huge");
        let mut io = handler(&store, Access::Create);
        let huge = vec![1u64 << 32, 1u64 << 32];

        let mut constant = RecordComponent::new();
        constant.reset_dataset(Dataset::new(Datatype::F64, huge.clone())).unwrap();
        constant.make_constant(1.0f64).unwrap();
        assert!(matches!(
            constant.load_chunk(&mut io, vec![0, 0], huge.clone()),
            Err(ModelError::WrongApiUsage(_))
        ));

        let mut dataset = RecordComponent::new();
        dataset.reset_dataset(Dataset::new(Datatype::F64, huge.clone())).unwrap();
        assert!(matches!(
            dataset.store_chunk(vec![0, 0], huge, Vec::<f64>::new()),
            Err(ModelError::WrongApiUsage(_))
        ));
        assert!(io.is_empty());
    }

    #[test]
    fn constant_component_round_trip() {
        let store = MemoryStore::new("const");
        let mut io = handler(&store, Access::Create);
        let (root, mut c) = rooted(&mut io);
        c.reset_dataset(Dataset::new(Datatype::F64, vec![2, 2])).unwrap();
        c.make_constant(2.5f64).unwrap();
        c.set_unit_si(3.0);
        c.flush(&mut io, "rho", &FlushParams::default()).unwrap();
        assert!(matches!(
            io.pending().next().map(|t| t.parameter()),
            Some(Parameter::CreatePath(_))
        ));
        io.flush(&FlushParams::default()).unwrap();

        let mut back = RecordComponent::new();
        back.writable().set_parent(&root);
        back.open_constant(&mut io, "rho").unwrap();
        back.read(&mut io).unwrap();
        assert!(back.is_constant());
        assert_eq!(back.dataset(), Some(&Dataset::new(Datatype::F64, vec![2, 2])));
        assert_eq!(back.unit_si().unwrap(), 3.0);
        let slot = back.load_chunk(&mut io, vec![0, 0], vec![1, 2]).unwrap();
        assert_eq!(slot.get().unwrap(), Attribute::new(vec![2.5f64, 2.5]));
    }

    #[test]
    fn read_normalizes_unit_si() {
        let store = MemoryStore::new("unit");
        let mut io = handler(&store, Access::Create);
        let (root, mut c) = rooted(&mut io);
        c.reset_dataset(Dataset::new(Datatype::F32, vec![1])).unwrap();
        c.attributes_mut().set_attribute("unitSI", 2u32);
        c.flush(&mut io, "e", &FlushParams::default()).unwrap();
        io.flush(&FlushParams::default()).unwrap();

        let mut back = RecordComponent::new();
        back.writable().set_parent(&root);
        back.open_dataset(&mut io, "e").unwrap();
        back.read(&mut io).unwrap();
        assert_eq!(back.dataset(), Some(&Dataset::new(Datatype::F32, vec![1])));
        assert_eq!(
            back.attributes().get_attribute("unitSI").unwrap(),
            &Attribute::new(2.0f64)
        );
    }

    #[test]
    fn non_numeric_unit_si_is_content_mismatch() {
        let store = MemoryStore::new("badunit");
        let mut io = handler(&store, Access::Create);
        let (root, mut c) = rooted(&mut io);
        c.reset_dataset(Dataset::new(Datatype::F32, vec![1])).unwrap();
        c.attributes_mut().set_attribute("unitSI", "metre");
        c.flush(&mut io, "e", &FlushParams::default()).unwrap();
        io.flush(&FlushParams::default()).unwrap();

        let mut back = RecordComponent::new();
        back.writable().set_parent(&root);
        back.open_dataset(&mut io, "e").unwrap();
        let err = back.read(&mut io).unwrap_err();
        assert!(err.is_recoverable_read());
        assert!(err.to_string().contains("unitSI"));
    }
}
