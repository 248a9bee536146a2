use std::fmt;

use serde::{Deserialize, Serialize};

/// The catalog of storage actions a backend executes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
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
    /// Alias the target's backend position onto another node's.
    KeepSynchronous,
}

impl Operation {
    /// Returns `true` for operations that modify storage.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::CreateFile
                | Self::CreatePath
                | Self::CreateDataset
                | Self::WriteDataset
                | Self::WriteAttribute
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateFile => "CREATE_FILE",
            Self::OpenFile => "OPEN_FILE",
            Self::CloseFile => "CLOSE_FILE",
            Self::CreatePath => "CREATE_PATH",
            Self::OpenPath => "OPEN_PATH",
            Self::CreateDataset => "CREATE_DATASET",
            Self::OpenDataset => "OPEN_DATASET",
            Self::WriteDataset => "WRITE_DATASET",
            Self::ReadDataset => "READ_DATASET",
            Self::WriteAttribute => "WRITE_ATTRIBUTE",
            Self::ReadAttribute => "READ_ATTRIBUTE",
            Self::ListPaths => "LIST_PATHS",
            Self::ListDatasets => "LIST_DATASETS",
            Self::ListAttributes => "LIST_ATTRIBUTES",
            Self::KeepSynchronous => "KEEP_SYNCHRONOUS",
        };
        f.write_str(name)
    }
}
