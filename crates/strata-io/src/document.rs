//! The in-memory hierarchy shared by every document-style store.
//!
//! A [`Document`] is a tree of groups. Groups carry attributes, child groups
//! and datasets; datasets carry an element kind, an extent, a flat row-major
//! data buffer and their own attributes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strata_types::{Attribute, Datatype};

use crate::error::{AffectedObject, BackendError, BackendResult, ReadError};
use crate::writable::FilePosition;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub root: Group,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    pub attributes: BTreeMap<String, Attribute>,
    pub groups: BTreeMap<String, Group>,
    pub datasets: BTreeMap<String, DatasetNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetNode {
    /// Scalar element kind.
    pub dtype: Datatype,
    pub extent: Vec<u64>,
    /// Sequence of `dtype` elements in row-major order.
    pub data: Attribute,
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// The group at `position`.
    pub fn group(&self, position: &FilePosition) -> Option<&Group> {
        position
            .segments()
            .iter()
            .try_fold(&self.root, |group, name| group.groups.get(name))
    }

    pub fn group_mut(&mut self, position: &FilePosition) -> Option<&mut Group> {
        position
            .segments()
            .iter()
            .try_fold(&mut self.root, |group, name| group.groups.get_mut(name))
    }

    /// The dataset at `position`.
    pub fn dataset(&self, position: &FilePosition) -> Option<&DatasetNode> {
        let name = position.name()?;
        self.group(&position.parent()?)?.datasets.get(name)
    }

    pub fn dataset_mut(&mut self, position: &FilePosition) -> Option<&mut DatasetNode> {
        let name = position.name()?.to_string();
        self.group_mut(&position.parent()?)?.datasets.get_mut(&name)
    }

    /// The attribute map of the group or dataset at `position`.
    pub fn attributes(&self, position: &FilePosition) -> Option<&BTreeMap<String, Attribute>> {
        if let Some(group) = self.group(position) {
            return Some(&group.attributes);
        }
        self.dataset(position).map(|d| &d.attributes)
    }

    pub fn attributes_mut(
        &mut self,
        position: &FilePosition,
    ) -> Option<&mut BTreeMap<String, Attribute>> {
        if self.group(position).is_some() {
            return self.group_mut(position).map(|g| &mut g.attributes);
        }
        self.dataset_mut(position).map(|d| &mut d.attributes)
    }

    /// Create every missing group along `position`.
    pub fn create_groups(&mut self, position: &FilePosition) -> BackendResult<&mut Group> {
        let mut group = &mut self.root;
        let mut walked = FilePosition::root();
        for name in position.segments() {
            walked = walked.join(name);
            if group.datasets.contains_key(name) {
                return Err(BackendError::AlreadyExists(format!(
                    "dataset {walked} (expected a group)"
                )));
            }
            group = group.groups.entry(name.clone()).or_default();
        }
        Ok(group)
    }
}

impl DatasetNode {
    /// A zero-filled dataset of scalar kind `dtype`.
    pub fn zeros(dtype: Datatype, extent: Vec<u64>) -> BackendResult<Self> {
        let count = element_count(&extent)?;
        let data = Attribute::zeros(dtype, count)?;
        Ok(Self {
            dtype,
            extent,
            data,
            attributes: BTreeMap::new(),
        })
    }

    /// Copy a row-major chunk into the dataset.
    pub fn write_chunk(&mut self, offset: &[u64], extent: &[u64], chunk: &Attribute) -> BackendResult<()> {
        let indices = self.chunk_indices(offset, extent)?;
        if chunk.len() != Some(indices.len()) {
            return Err(BackendError::InvalidChunk(format!(
                "chunk holds {} elements, selection needs {}",
                chunk.len().map_or_else(|| "no".to_string(), |n| n.to_string()),
                indices.len()
            )));
        }
        if chunk.dtype().scalar_of() != Some(self.dtype) {
            return Err(BackendError::InvalidChunk(format!(
                "chunk of kind {} does not match dataset kind {}",
                chunk.dtype(),
                self.dtype
            )));
        }
        for (i, flat) in indices.into_iter().enumerate() {
            let element = chunk
                .element(i)
                .ok_or_else(|| BackendError::InvalidChunk(format!("missing element {i}")))?;
            self.data.set_element(flat, &element)?;
        }
        Ok(())
    }

    /// Copy a row-major chunk out of the dataset.
    pub fn read_chunk(&self, offset: &[u64], extent: &[u64]) -> BackendResult<Attribute> {
        let indices = self.chunk_indices(offset, extent)?;
        let mut chunk = Attribute::zeros(self.dtype, indices.len())?;
        for (i, flat) in indices.into_iter().enumerate() {
            let element = self.data.element(flat).ok_or_else(|| {
                BackendError::from(ReadError::unexpected_content(
                    AffectedObject::Dataset,
                    format!("stored data is shorter than its extent (index {flat})"),
                ))
            })?;
            chunk.set_element(i, &element)?;
        }
        Ok(chunk)
    }

    /// Flat indices of a selection, in row-major order of the selection.
    fn chunk_indices(&self, offset: &[u64], extent: &[u64]) -> BackendResult<Vec<usize>> {
        let rank = self.extent.len();
        if offset.len() != rank || extent.len() != rank {
            return Err(BackendError::InvalidChunk(format!(
                "selection rank {}/{} does not match dataset rank {rank}",
                offset.len(),
                extent.len()
            )));
        }
        for d in 0..rank {
            let end = offset[d].checked_add(extent[d]);
            if end.map_or(true, |end| end > self.extent[d]) {
                return Err(BackendError::InvalidChunk(format!(
                    "selection {}+{} exceeds extent {} in dimension {d}",
                    offset[d], extent[d], self.extent[d]
                )));
            }
        }

        let count = element_count(extent)?;
        let too_large = || BackendError::InvalidChunk(format!("extent {:?} is too large", self.extent));
        let mut strides = vec![1u64; rank];
        for d in (0..rank.saturating_sub(1)).rev() {
            strides[d] = strides[d + 1]
                .checked_mul(self.extent[d + 1])
                .ok_or_else(too_large)?;
        }

        let mut indices = Vec::with_capacity(count);
        let mut cursor = vec![0u64; rank];
        for _ in 0..count {
            let flat = (0..rank)
                .try_fold(0u64, |acc, d| {
                    (offset[d] + cursor[d])
                        .checked_mul(strides[d])
                        .and_then(|term| acc.checked_add(term))
                })
                .and_then(|flat| usize::try_from(flat).ok())
                .ok_or_else(too_large)?;
            indices.push(flat);
            for d in (0..rank).rev() {
                cursor[d] += 1;
                if cursor[d] < extent[d] {
                    break;
                }
                cursor[d] = 0;
            }
        }
        Ok(indices)
    }
}

fn element_count(extent: &[u64]) -> BackendResult<usize> {
    extent
        .iter()
        .try_fold(1u64, |acc, &n| acc.checked_mul(n))
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| BackendError::InvalidChunk(format!("extent {extent:?} is too large")))
}
