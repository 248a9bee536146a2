use crate::config::FlushParams;
use crate::error::BackendResult;
use crate::task::IoTask;

/// A storage backend executing queued tasks.
///
/// All implementations must satisfy these invariants:
/// - Tasks are executed in the order they are handed over.
/// - A successful create or open assigns the target's position and marks it
///   written before returning.
/// - Output slots of a task are filled before `execute` returns `Ok`.
/// - Failures are reported, never swallowed; the handler decides what to do
///   with the remaining tasks.
pub trait Backend: Send {
    /// Short backend name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Execute one task.
    fn execute(&mut self, task: &IoTask) -> BackendResult<()>;

    /// Called once after every task of a batch has executed successfully.
    ///
    /// Default implementation does nothing. Backends that defer physical
    /// writes may persist here when the parameters ask for it.
    fn finish_batch(&mut self, params: &FlushParams) -> BackendResult<()> {
        let _ = params;
        Ok(())
    }
}
