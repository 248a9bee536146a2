use std::collections::VecDeque;
use std::fmt;
use std::mem;

use tracing::{debug, warn};

use crate::config::{Access, FlushParams};
use crate::error::{BackendError, IoError, IoResult};
use crate::task::IoTask;
use crate::traits::Backend;

/// A recoverable problem recorded while reading a hierarchy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Path or name of the object that was skipped.
    pub object: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.object, self.message)
    }
}

/// Owns one backend and the FIFO queue of tasks waiting for it.
///
/// Domain objects enqueue tasks; nothing reaches storage until [`flush`]
/// drains the queue. A batch stops at the first failing task and the tasks
/// queued behind it are discarded, so a later flush never replays them.
///
/// [`flush`]: IoHandler::flush
pub struct IoHandler {
    backend: Box<dyn Backend>,
    access: Access,
    queue: VecDeque<IoTask>,
    epoch: u64,
    diagnostics: Vec<Diagnostic>,
}

impl IoHandler {
    pub fn new(backend: Box<dyn Backend>, access: Access) -> Self {
        Self {
            backend,
            access,
            queue: VecDeque::new(),
            epoch: 0,
            diagnostics: Vec::new(),
        }
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Append a task to the queue.
    pub fn enqueue(&mut self, task: IoTask) {
        self.queue.push_back(task);
    }

    /// Number of batches handed to the backend so far.
    ///
    /// A task enqueued while the epoch is `n` has run, failed or been
    /// discarded once the epoch exceeds `n`.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The tasks waiting for the next flush, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &IoTask> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Execute every queued task in order.
    ///
    /// On failure the queue is left empty and the error names the failing
    /// operation and its target.
    pub fn flush(&mut self, params: &FlushParams) -> IoResult<()> {
        let tasks = mem::take(&mut self.queue);
        let total = tasks.len();
        if total == 0 {
            return Ok(());
        }
        self.epoch += 1;
        debug!(backend = self.backend.name(), tasks = total, "flushing I/O queue");

        for (index, task) in tasks.iter().enumerate() {
            let operation = task.operation();
            let result = if params.check_access && operation.is_write() && self.access.is_read_only() {
                Err(BackendError::AccessViolation {
                    operation,
                    access: self.access,
                })
            } else {
                self.backend.execute(task)
            };

            if let Err(source) = result {
                let target = task.describe_target();
                warn!(
                    backend = self.backend.name(),
                    %operation,
                    %target,
                    discarded = total - index - 1,
                    error = %source,
                    "I/O task failed"
                );
                return Err(IoError::Task {
                    operation,
                    target,
                    source,
                });
            }
            task.complete();
        }

        self.backend
            .finish_batch(params)
            .map_err(|source| IoError::Batch {
                backend: self.backend.name(),
                source,
            })?;
        debug!(backend = self.backend.name(), tasks = total, "I/O queue flushed");
        Ok(())
    }

    /// Record a recoverable problem and log it.
    pub fn report(&mut self, object: impl Into<String>, message: impl Into<String>) {
        let diagnostic = Diagnostic {
            object: object.into(),
            message: message.into(),
        };
        warn!(object = %diagnostic.object, "{}", diagnostic.message);
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Remove and return the recorded diagnostics.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        mem::take(&mut self.diagnostics)
    }
}

impl fmt::Debug for IoHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoHandler")
            .field("backend", &self.backend.name())
            .field("access", &self.access)
            .field("pending", &self.queue.len())
            .field("diagnostics", &self.diagnostics.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::{AffectedObject, BackendResult, ReadError};
    use crate::operation::Operation;
    use crate::parameter::{CreatePath, ListPaths, OpenPath, WriteAttribute};
    use crate::writable::{FilePosition, Writable};

    /// Records executed operations; fails every `OPEN_PATH`.
    #[derive(Clone, Default)]
    struct Recorder {
        executed: Arc<Mutex<Vec<Operation>>>,
        batches: Arc<Mutex<usize>>,
    }

    impl Backend for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn execute(&mut self, task: &IoTask) -> BackendResult<()> {
            if task.operation() == Operation::OpenPath {
                return Err(ReadError::not_found(AffectedObject::Group, "no such group").into());
            }
            self.executed.lock().unwrap().push(task.operation());
            Ok(())
        }

        fn finish_batch(&mut self, _params: &FlushParams) -> BackendResult<()> {
            *self.batches.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn placed(path: &str) -> Writable {
        let node = Writable::new();
        node.set_position(FilePosition::root().join(path));
        node
    }

    // -----------------------------------------------------------------------
    // Queue order
    // -----------------------------------------------------------------------

    #[test]
    fn executes_in_fifo_order() {
        let recorder = Recorder::default();
        let mut handler = IoHandler::new(Box::new(recorder.clone()), Access::Create);
        let node = placed("a");
        handler.enqueue(IoTask::new(&node, CreatePath { path: "b".into() }));
        handler.enqueue(IoTask::new(&node, WriteAttribute::new("x", 1i32)));
        handler.enqueue(IoTask::new(&node, ListPaths::default()));
        assert_eq!(handler.len(), 3);

        handler.flush(&FlushParams::default()).unwrap();
        assert!(handler.is_empty());
        assert_eq!(
            *recorder.executed.lock().unwrap(),
            vec![
                Operation::CreatePath,
                Operation::WriteAttribute,
                Operation::ListPaths
            ]
        );
        assert_eq!(*recorder.batches.lock().unwrap(), 1);
    }

    #[test]
    fn empty_flush_is_a_no_op() {
        let recorder = Recorder::default();
        let mut handler = IoHandler::new(Box::new(recorder.clone()), Access::Create);
        handler.flush(&FlushParams::default()).unwrap();
        assert_eq!(*recorder.batches.lock().unwrap(), 0);
    }

    // -----------------------------------------------------------------------
    // Failures
    // -----------------------------------------------------------------------

    #[test]
    fn failure_discards_remaining_tasks() {
        let recorder = Recorder::default();
        let mut handler = IoHandler::new(Box::new(recorder.clone()), Access::Create);
        let node = placed("meshes");
        handler.enqueue(IoTask::new(&node, ListPaths::default()));
        handler.enqueue(IoTask::new(&node, OpenPath { path: "E".into() }));
        handler.enqueue(IoTask::new(&node, WriteAttribute::new("x", 1i32)));

        let err = handler.flush(&FlushParams::default()).unwrap_err();
        assert!(matches!(
            err,
            IoError::Task {
                operation: Operation::OpenPath,
                ..
            }
        ));
        assert_eq!(err.read_error().unwrap().affected, AffectedObject::Group);
        assert!(handler.is_empty());
        assert_eq!(*recorder.executed.lock().unwrap(), vec![Operation::ListPaths]);
        assert_eq!(*recorder.batches.lock().unwrap(), 0);

        // Nothing is replayed by the next flush.
        handler.flush(&FlushParams::default()).unwrap();
        assert_eq!(recorder.executed.lock().unwrap().len(), 1);
    }

    #[test]
    fn only_executed_tasks_complete() {
        let mut handler = IoHandler::new(Box::new(Recorder::default()), Access::Create);
        let node = placed("meshes");
        let tasks = [
            IoTask::new(&node, WriteAttribute::new("x", 1i32)),
            IoTask::new(&node, OpenPath { path: "E".into() }),
            IoTask::new(&node, WriteAttribute::new("y", 2i32)),
        ];
        let done: Vec<_> = tasks.iter().map(IoTask::completion).collect();
        for task in tasks {
            handler.enqueue(task);
        }
        assert_eq!(handler.epoch(), 0);

        assert!(handler.flush(&FlushParams::default()).is_err());
        assert_eq!(handler.epoch(), 1);
        let ready: Vec<bool> = done.iter().map(|slot| slot.is_ready()).collect();
        assert_eq!(ready, vec![true, false, false]);

        handler.flush(&FlushParams::default()).unwrap();
        assert_eq!(handler.epoch(), 1);
    }

    #[test]
    fn read_only_rejects_writes_at_flush() {
        let recorder = Recorder::default();
        let mut handler = IoHandler::new(Box::new(recorder.clone()), Access::ReadOnly);
        let node = placed("a");
        handler.enqueue(IoTask::new(&node, WriteAttribute::new("x", 1i32)));

        let err = handler.flush(&FlushParams::default()).unwrap_err();
        match err {
            IoError::Task {
                source: BackendError::AccessViolation { operation, access },
                ..
            } => {
                assert_eq!(operation, Operation::WriteAttribute);
                assert_eq!(access, Access::ReadOnly);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(recorder.executed.lock().unwrap().is_empty());
    }

    #[test]
    fn access_check_can_be_disabled() {
        let recorder = Recorder::default();
        let mut handler = IoHandler::new(Box::new(recorder.clone()), Access::ReadOnly);
        handler.enqueue(IoTask::new(&placed("a"), WriteAttribute::new("x", 1i32)));
        let params = FlushParams {
            check_access: false,
            ..Default::default()
        };
        handler.flush(&params).unwrap();
        assert_eq!(recorder.executed.lock().unwrap().len(), 1);
    }

    #[test]
    fn diagnostics_accumulate_until_taken() {
        let mut handler = IoHandler::new(Box::new(Recorder::default()), Access::ReadOnly);
        handler.report("/meshes/B", "skipped");
        assert_eq!(handler.diagnostics().len(), 1);
        assert_eq!(handler.diagnostics()[0].to_string(), "/meshes/B: skipped");
        assert_eq!(handler.take_diagnostics().len(), 1);
        assert!(handler.diagnostics().is_empty());
    }
}
