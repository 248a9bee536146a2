use std::collections::BTreeSet;

use tracing::debug;

use crate::container::{Container, Node};

/// Tracks which children of a container are confirmed during one re-read
/// pass.
///
/// Children reached through [`at`](Self::at) are confirmed. When the tracker
/// is finished or dropped, every child that was not confirmed is removed
/// from the container.
pub struct EraseStaleEntries<'a, T: Node> {
    container: &'a mut Container<T>,
    confirmed: BTreeSet<String>,
}

impl<'a, T: Node> EraseStaleEntries<'a, T> {
    pub fn new(container: &'a mut Container<T>) -> Self {
        Self {
            container,
            confirmed: BTreeSet::new(),
        }
    }

    /// The child called `name`, created if absent, confirmed for this pass.
    pub fn at(&mut self, name: &str) -> &mut T {
        self.confirmed.insert(name.to_string());
        self.container.entry(name)
    }

    /// Remove a child immediately.
    pub fn forget(&mut self, name: &str) {
        self.confirmed.remove(name);
        self.container.remove(name);
    }

    /// End the pass, erasing unconfirmed children.
    pub fn finish(self) {}
}

impl<T: Node> Drop for EraseStaleEntries<'_, T> {
    fn drop(&mut self) {
        let before = self.container.len();
        let confirmed = &self.confirmed;
        self.container.retain(|name, _| confirmed.contains(name));
        let erased = before - self.container.len();
        if erased > 0 {
            debug!(erased, "erased stale entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use strata_io::Writable;

    use super::*;
    use crate::container::tests::Leaf;

    fn container(names: &[&str]) -> Container<Leaf> {
        let mut c = Container::new(Writable::new());
        for name in names {
            c.entry(name);
        }
        c
    }

    #[test]
    fn unconfirmed_entries_are_erased() {
        let mut c = container(&["x", "y", "z"]);
        c.entry("x").tag = 1;
        {
            let mut tracker = EraseStaleEntries::new(&mut c);
            tracker.at("x");
            tracker.at("y");
            tracker.finish();
        }
        assert_eq!(c.names().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(c.get("x").unwrap().tag, 1);
    }

    #[test]
    fn new_entries_are_created_and_kept() {
        let mut c = container(&["x"]);
        {
            let mut tracker = EraseStaleEntries::new(&mut c);
            tracker.at("w").tag = 9;
        }
        assert_eq!(c.names().collect::<Vec<_>>(), vec!["w"]);
        assert_eq!(c.get("w").unwrap().tag, 9);
    }

    #[test]
    fn forget_removes_even_confirmed_entries() {
        let mut c = container(&["x", "y"]);
        {
            let mut tracker = EraseStaleEntries::new(&mut c);
            tracker.at("x");
            tracker.at("y");
            tracker.forget("y");
        }
        assert_eq!(c.names().collect::<Vec<_>>(), vec!["x"]);
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    proptest! {
        #[test]
        fn survivors_are_exactly_the_confirmed(
            existing in proptest::collection::btree_set("[a-f]", 0..6),
            confirmed in proptest::collection::vec("[a-h]", 0..8),
        ) {
            let existing: Vec<&str> = existing.iter().map(String::as_str).collect();
            let mut c = container(&existing);
            {
                let mut tracker = EraseStaleEntries::new(&mut c);
                for name in &confirmed {
                    tracker.at(name);
                }
            }

            let mut expected: Vec<&str> = existing
                .iter()
                .copied()
                .filter(|name| confirmed.iter().any(|n| n == name))
                .collect();
            for name in &confirmed {
                if !expected.contains(&name.as_str()) {
                    expected.push(name);
                }
            }
            prop_assert_eq!(c.names().collect::<Vec<_>>(), expected);
        }
    }
}
