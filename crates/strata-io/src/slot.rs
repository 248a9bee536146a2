use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::{IoError, IoResult};

/// A backend-filled output field of a parameter record.
///
/// The caller keeps one clone and the queued task carries another. The slot
/// is empty until the backend fills it during a flush; reading it earlier is
/// reported as [`IoError::OutputUnavailable`] instead of yielding a default.
pub struct Slot<T> {
    name: &'static str,
    value: Arc<RwLock<Option<T>>>,
}

impl<T> Slot<T> {
    /// An empty slot. `name` identifies the field in error messages.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            value: Arc::new(RwLock::new(None)),
        }
    }

    /// Store the backend's result. Called by backends.
    pub fn fill(&self, value: T) {
        *self.value.write().expect("slot lock poisoned") = Some(value);
    }

    /// Returns `true` once the slot has been filled.
    pub fn is_ready(&self) -> bool {
        self.value.read().expect("slot lock poisoned").is_some()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: Clone> Slot<T> {
    /// The filled value.
    pub fn get(&self) -> IoResult<T> {
        self.value
            .read()
            .expect("slot lock poisoned")
            .clone()
            .ok_or(IoError::OutputUnavailable(self.name))
    }
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            value: Arc::clone(&self.value),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("name", &self.name)
            .field("value", &*self.value.read().expect("slot lock poisoned"))
            .finish()
    }
}
