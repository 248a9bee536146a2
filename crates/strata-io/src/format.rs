use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IoError, IoResult};

/// Storage formats known to [`open_backend`](crate::open_backend).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// One JSON text file.
    Json,
    /// One checksummed binary file.
    Packed,
    /// Process memory only.
    Memory,
}

impl Format {
    /// File name suffix, including the dot. Empty for [`Format::Memory`].
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Json => ".json",
            Self::Packed => ".stpk",
            Self::Memory => "",
        }
    }
}

/// The format implied by a file name's extension.
pub fn determine_format(path: impl AsRef<Path>) -> IoResult<Format> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("stpk") => Ok(Format::Packed),
        _ => Err(IoError::UnknownFormat(path.display().to_string())),
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Packed => write!(f, "packed"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for Format {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "packed" | "stpk" => Ok(Self::Packed),
            "memory" => Ok(Self::Memory),
            _ => Err(IoError::UnknownFormat(s.to_string())),
        }
    }
}
