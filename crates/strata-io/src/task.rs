use crate::operation::Operation;
use crate::parameter::Parameter;
use crate::slot::Slot;
use crate::writable::Writable;

/// One deferred storage action: a target node plus a parameter record.
#[derive(Clone, Debug)]
pub struct IoTask {
    writable: Writable,
    parameter: Parameter,
    done: Slot<()>,
}

impl IoTask {
    /// A task on `target`. The task holds a handle to the node, so
    /// positions assigned by the backend are visible to the node's owner.
    pub fn new(target: &Writable, parameter: impl Into<Parameter>) -> Self {
        Self {
            writable: target.clone(),
            parameter: parameter.into(),
            done: Slot::new("done"),
        }
    }

    /// A slot filled once the backend has executed this task successfully.
    ///
    /// It stays empty if the task fails or is discarded with its batch.
    pub fn completion(&self) -> Slot<()> {
        self.done.clone()
    }

    pub(crate) fn complete(&self) {
        self.done.fill(());
    }

    pub fn writable(&self) -> &Writable {
        &self.writable
    }

    pub fn parameter(&self) -> &Parameter {
        &self.parameter
    }

    pub fn operation(&self) -> Operation {
        self.parameter.operation()
    }

    /// A printable location for diagnostics: the target's own position
    /// once placed, otherwise the parent's position joined with the
    /// parameter's subject.
    pub fn describe_target(&self) -> String {
        if let Some(pos) = self.writable.position() {
            return pos.to_string();
        }
        let subject = self.parameter.subject();
        match (self.writable.parent().and_then(|p| p.position()), subject) {
            (Some(base), Some(subject)) => base.join(subject).to_string(),
            (Some(base), None) => base.to_string(),
            (None, Some(subject)) => subject.to_string(),
            (None, None) => "<unplaced>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::{CreatePath, ListPaths, OpenDataset, WriteAttribute};
    use crate::writable::FilePosition;

    #[test]
    fn unplaced_target_uses_parent_position() {
        let parent = Writable::new();
        parent.set_position(FilePosition::root().join("meshes"));
        let child = Writable::new();
        child.set_parent(&parent);

        let task = IoTask::new(&child, CreatePath { path: "E".into() });
        assert_eq!(task.operation(), Operation::CreatePath);
        assert_eq!(task.describe_target(), "/meshes/E");
    }

    #[test]
    fn placed_target_uses_own_position() {
        let node = Writable::new();
        node.set_position(FilePosition::root().join("meshes/E"));
        let task = IoTask::new(&node, WriteAttribute::new("geometry", "cartesian"));
        assert_eq!(task.describe_target(), "/meshes/E");

        let task = IoTask::new(&node, ListPaths::default());
        assert_eq!(task.describe_target(), "/meshes/E");
    }

    #[test]
    fn dataset_subject_is_below_target() {
        let parent = Writable::new();
        parent.set_position(FilePosition::root().join("meshes/E"));
        let component = Writable::new();
        component.set_parent(&parent);
        let task = IoTask::new(&component, OpenDataset::new("y"));
        assert_eq!(task.describe_target(), "/meshes/E/y");
    }

    #[test]
    fn completion_is_shared_with_clones() {
        let task = IoTask::new(&Writable::new(), ListPaths::default());
        let done = task.completion();
        assert!(!done.is_ready());
        task.clone().complete();
        assert!(done.is_ready());
    }

    #[test]
    fn task_shares_node_with_owner() {
        let node = Writable::new();
        let task = IoTask::new(&node, ListPaths::default());
        task.writable().mark_written();
        assert!(node.written());
    }
}
