use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use strata_io::{determine_format, FlushParams, Format};

use crate::error::{ModelError, ModelResult};

/// Configuration for one series session.
///
/// Loadable from TOML; every field is optional:
///
/// ```toml
/// format = "packed"
/// json_pretty = true
///
/// [flush]
/// sync = "synchronous"
/// release_buffers = true
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Storage format; detected from the file extension when unset.
    pub format: Option<Format>,
    /// Parameters of every flush issued by the series.
    pub flush: FlushParams,
    /// Indent JSON output.
    pub json_pretty: bool,
}

impl SessionConfig {
    pub fn from_toml_str(text: &str) -> ModelResult<Self> {
        toml::from_str(text).map_err(|e| ModelError::Config(e.to_string()))
    }

    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ModelResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| ModelError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// The configured format, or the one implied by `path`.
    pub fn format_for(&self, path: impl AsRef<Path>) -> ModelResult<Format> {
        match self.format {
            Some(format) => Ok(format),
            None => Ok(determine_format(path)?),
        }
    }
}
