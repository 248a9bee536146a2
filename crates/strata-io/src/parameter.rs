//! Typed parameter records, one per [`Operation`].
//!
//! Input fields are plain data owned by the record. Output fields are
//! [`Slot`]s shared between the caller and the queued task, filled by the
//! backend when the task is executed.

use strata_types::{Attribute, Datatype};

use crate::operation::Operation;
use crate::slot::Slot;
use crate::writable::Writable;

/// Create a file, replacing any existing content.
#[derive(Clone, Debug)]
pub struct CreateFile {
    pub name: String,
}

/// Open an existing file.
#[derive(Clone, Debug)]
pub struct OpenFile {
    pub name: String,
}

/// Close the file, persisting everything written to it.
#[derive(Clone, Debug, Default)]
pub struct CloseFile;

/// Create a group at `path` below the parent's position.
#[derive(Clone, Debug)]
pub struct CreatePath {
    pub path: String,
}

/// Open the group at `path` below the parent's position.
#[derive(Clone, Debug)]
pub struct OpenPath {
    pub path: String,
}

/// Create a zero-filled dataset below the parent's position.
#[derive(Clone, Debug)]
pub struct CreateDataset {
    pub name: String,
    pub dtype: Datatype,
    pub extent: Vec<u64>,
}

/// Open an existing dataset, reporting its element kind and extent.
#[derive(Clone, Debug)]
pub struct OpenDataset {
    pub name: String,
    pub dtype: Slot<Datatype>,
    pub extent: Slot<Vec<u64>>,
}

impl OpenDataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dtype: Slot::new("dtype"),
            extent: Slot::new("extent"),
        }
    }
}

/// Write a rectangular chunk, given as a flat sequence in row-major order.
#[derive(Clone, Debug)]
pub struct WriteDataset {
    pub offset: Vec<u64>,
    pub extent: Vec<u64>,
    pub data: Attribute,
}

/// Read a rectangular chunk into a flat row-major sequence.
#[derive(Clone, Debug)]
pub struct ReadDataset {
    pub offset: Vec<u64>,
    pub extent: Vec<u64>,
    pub data: Slot<Attribute>,
}

impl ReadDataset {
    pub fn new(offset: Vec<u64>, extent: Vec<u64>) -> Self {
        Self {
            offset,
            extent,
            data: Slot::new("data"),
        }
    }
}

/// Write one attribute on the target node.
#[derive(Clone, Debug)]
pub struct WriteAttribute {
    pub name: String,
    pub value: Attribute,
}

impl WriteAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<Attribute>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Read one attribute of the target node.
#[derive(Clone, Debug)]
pub struct ReadAttribute {
    pub name: String,
    pub dtype: Slot<Datatype>,
    pub value: Slot<Attribute>,
}

impl ReadAttribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dtype: Slot::new("dtype"),
            value: Slot::new("value"),
        }
    }
}

/// List the groups directly below the target node.
#[derive(Clone, Debug)]
pub struct ListPaths {
    pub paths: Slot<Vec<String>>,
}

/// List the datasets directly below the target node.
#[derive(Clone, Debug)]
pub struct ListDatasets {
    pub datasets: Slot<Vec<String>>,
}

/// List the attribute names of the target node.
#[derive(Clone, Debug)]
pub struct ListAttributes {
    pub attributes: Slot<Vec<String>>,
}

impl Default for ListPaths {
    fn default() -> Self {
        Self {
            paths: Slot::new("paths"),
        }
    }
}

impl Default for ListDatasets {
    fn default() -> Self {
        Self {
            datasets: Slot::new("datasets"),
        }
    }
}

impl Default for ListAttributes {
    fn default() -> Self {
        Self {
            attributes: Slot::new("attributes"),
        }
    }
}

/// Give the target the same backend position as `other`.
///
/// Used when two domain objects denote one storage node, such as a scalar
/// mesh and its single component.
#[derive(Clone, Debug)]
pub struct KeepSynchronous {
    pub other: Writable,
}

/// A parameter record for any operation.
#[derive(Clone, Debug)]
pub enum Parameter {
    CreateFile(CreateFile),
    OpenFile(OpenFile),
    CloseFile(CloseFile),
    CreatePath(CreatePath),
    OpenPath(OpenPath),
    CreateDataset(CreateDataset),
    OpenDataset(OpenDataset),
    WriteDataset(WriteDataset),
    ReadDataset(ReadDataset),
    WriteAttribute(WriteAttribute),
    ReadAttribute(ReadAttribute),
    ListPaths(ListPaths),
    ListDatasets(ListDatasets),
    ListAttributes(ListAttributes),
    KeepSynchronous(KeepSynchronous),
}

impl Parameter {
    /// The operation this record parameterizes.
    pub fn operation(&self) -> Operation {
        match self {
            Self::CreateFile(_) => Operation::CreateFile,
            Self::OpenFile(_) => Operation::OpenFile,
            Self::CloseFile(_) => Operation::CloseFile,
            Self::CreatePath(_) => Operation::CreatePath,
            Self::OpenPath(_) => Operation::OpenPath,
            Self::CreateDataset(_) => Operation::CreateDataset,
            Self::OpenDataset(_) => Operation::OpenDataset,
            Self::WriteDataset(_) => Operation::WriteDataset,
            Self::ReadDataset(_) => Operation::ReadDataset,
            Self::WriteAttribute(_) => Operation::WriteAttribute,
            Self::ReadAttribute(_) => Operation::ReadAttribute,
            Self::ListPaths(_) => Operation::ListPaths,
            Self::ListDatasets(_) => Operation::ListDatasets,
            Self::ListAttributes(_) => Operation::ListAttributes,
            Self::KeepSynchronous(_) => Operation::KeepSynchronous,
        }
    }

    /// The named sub-object the operation addresses, if any.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Self::CreateFile(p) => Some(&p.name),
            Self::OpenFile(p) => Some(&p.name),
            Self::CreatePath(p) => Some(&p.path),
            Self::OpenPath(p) => Some(&p.path),
            Self::CreateDataset(p) => Some(&p.name),
            Self::OpenDataset(p) => Some(&p.name),
            Self::WriteAttribute(p) => Some(&p.name),
            Self::ReadAttribute(p) => Some(&p.name),
            _ => None,
        }
    }
}

macro_rules! parameter_from {
    ($($kind:ident),* $(,)?) => {
        $(impl From<$kind> for Parameter {
            fn from(value: $kind) -> Self {
                Parameter::$kind(value)
            }
        })*
    };
}

parameter_from!(
    CreateFile,
    OpenFile,
    CloseFile,
    CreatePath,
    OpenPath,
    CreateDataset,
    OpenDataset,
    WriteDataset,
    ReadDataset,
    WriteAttribute,
    ReadAttribute,
    ListPaths,
    ListDatasets,
    ListAttributes,
    KeepSynchronous,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_matches_record() {
        let p: Parameter = CreatePath { path: "meshes".into() }.into();
        assert_eq!(p.operation(), Operation::CreatePath);
        assert_eq!(p.subject(), Some("meshes"));

        let p: Parameter = ListPaths::default().into();
        assert_eq!(p.operation(), Operation::ListPaths);
        assert_eq!(p.subject(), None);
    }

    #[test]
    fn cloned_record_shares_outputs() {
        let read = ReadAttribute::new("geometry");
        let queued = Parameter::from(read.clone());
        if let Parameter::ReadAttribute(p) = &queued {
            p.value.fill(Attribute::from("cartesian"));
            p.dtype.fill(Datatype::String);
        }
        assert_eq!(read.dtype.get().unwrap(), Datatype::String);
        assert_eq!(read.value.get().unwrap().get::<String>().unwrap(), "cartesian");
    }
}
