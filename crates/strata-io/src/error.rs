use strata_types::TypeError;
use thiserror::Error;

use crate::config::Access;
use crate::operation::Operation;

/// The kind of object a read failure concerns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AffectedObject {
    Attribute,
    Dataset,
    File,
    Group,
    Other,
}

/// Why a read failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reason {
    /// The object does not exist in the backend.
    NotFound,
    /// The backend could not read the object.
    CannotRead,
    /// The object exists but its kind or value fails validation.
    UnexpectedContent,
    /// The object exists but may not be accessed.
    Inaccessible,
    Other,
}

/// A failed read, classified by affected object and reason.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("read error ({affected:?}, {reason:?}{}): {description}", backend_suffix(.backend))]
pub struct ReadError {
    pub affected: AffectedObject,
    pub reason: Reason,
    /// Name of the backend that reported the failure, if it came from one.
    pub backend: Option<String>,
    pub description: String,
}

impl ReadError {
    pub fn new(affected: AffectedObject, reason: Reason, description: impl Into<String>) -> Self {
        Self {
            affected,
            reason,
            backend: None,
            description: description.into(),
        }
    }

    /// Shorthand for a missing object.
    pub fn not_found(affected: AffectedObject, description: impl Into<String>) -> Self {
        Self::new(affected, Reason::NotFound, description)
    }

    /// Shorthand for a kind or value that fails schema validation.
    pub fn unexpected_content(affected: AffectedObject, description: impl Into<String>) -> Self {
        Self::new(affected, Reason::UnexpectedContent, description)
    }

    /// Attach the name of the reporting backend.
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }
}

fn backend_suffix(backend: &Option<String>) -> String {
    backend
        .as_ref()
        .map(|name| format!(", backend {name}"))
        .unwrap_or_default()
}

/// Failures reported by a backend while executing one task.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A read-oriented operation could not be satisfied.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// A write operation was issued under read-only access.
    #[error("{operation} is not permitted with {access} access")]
    AccessViolation { operation: Operation, access: Access },

    /// The task target has no parent with a backend position.
    #[error("parent node has not been placed in the backend")]
    UnresolvedParent,

    /// The task target (or the node it refers to) has no backend position.
    #[error("node has not been placed in the backend")]
    Unplaced,

    /// An object of a different shape already occupies the location.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// A chunk selection does not fit the dataset.
    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    /// A value does not match the kind the backend expects.
    #[error("type error: {0}")]
    Type(#[from] TypeError),

    /// Encoding or decoding the persisted document failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The persisted document failed an integrity check.
    #[error("corrupt store {location}: {reason}")]
    Corrupt { location: String, reason: String },

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for backend task execution.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors surfaced by the I/O layer to domain objects.
#[derive(Debug, Error)]
pub enum IoError {
    /// A queued task failed; the rest of its batch was discarded.
    #[error("{operation} on {target} failed: {source}")]
    Task {
        operation: Operation,
        target: String,
        #[source]
        source: BackendError,
    },

    /// The backend failed to complete a batch after its tasks ran.
    #[error("{backend} backend failed to complete the batch: {source}")]
    Batch {
        backend: &'static str,
        #[source]
        source: BackendError,
    },

    /// An output field was read before its task was flushed.
    #[error("output `{0}` is not available until its task has been flushed")]
    OutputUnavailable(&'static str),

    /// No backend is known for a file name.
    #[error("cannot determine storage format of {0}")]
    UnknownFormat(String),
}

impl IoError {
    /// The classified read failure behind this error, if any.
    pub fn read_error(&self) -> Option<&ReadError> {
        match self {
            Self::Task {
                source: BackendError::Read(err),
                ..
            } => Some(err),
            _ => None,
        }
    }

    /// Returns `true` for failures reported by the backend itself.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::Task { .. } | Self::Batch { .. })
    }
}

/// Result alias for I/O layer operations.
pub type IoResult<T> = Result<T, IoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_error_display_names_backend() {
        let err = ReadError::not_found(AffectedObject::Dataset, "no dataset at /meshes/E/y")
            .with_backend("json");
        let text = err.to_string();
        assert!(text.contains("NotFound"));
        assert!(text.contains("json"));
        assert!(text.contains("/meshes/E/y"));
    }

    #[test]
    fn read_error_display_without_backend() {
        let err = ReadError::unexpected_content(AffectedObject::Attribute, "bad dataOrder");
        assert_eq!(err.to_string(), "read error (Attribute, UnexpectedContent): bad dataOrder");
        let err = err.with_backend("packed");
        assert_eq!(
            err.to_string(),
            "read error (Attribute, UnexpectedContent, backend packed): bad dataOrder"
        );
    }

    #[test]
    fn task_error_exposes_read_error() {
        let err = IoError::Task {
            operation: Operation::OpenDataset,
            target: "/meshes/E/y".into(),
            source: ReadError::not_found(AffectedObject::Dataset, "gone").into(),
        };
        assert_eq!(err.read_error().map(|e| e.reason), Some(Reason::NotFound));
        assert!(err.is_backend_failure());
        assert!(err.to_string().starts_with("OPEN_DATASET on /meshes/E/y failed"));
    }

    #[test]
    fn output_unavailable_is_not_a_backend_failure() {
        let err = IoError::OutputUnavailable("paths");
        assert!(!err.is_backend_failure());
        assert!(err.read_error().is_none());
    }
}
