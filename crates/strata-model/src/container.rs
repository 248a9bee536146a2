use strata_io::Writable;

/// A domain object that owns a [`Writable`].
pub trait Node: Default {
    fn writable(&self) -> &Writable;
}

/// Named children of one node, kept in insertion order.
///
/// Every child inserted through the container is linked below the
/// container's `Writable`.
#[derive(Debug)]
pub struct Container<T> {
    writable: Writable,
    entries: Vec<(String, T)>,
}

impl<T: Node> Container<T> {
    /// An empty container whose children hang below `writable`.
    pub fn new(writable: Writable) -> Self {
        Self {
            writable,
            entries: Vec::new(),
        }
    }

    pub fn writable(&self) -> &Writable {
        &self.writable
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.index_of(name).map(|i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.index_of(name).map(move |i| &mut self.entries[i].1)
    }

    /// The child called `name`, created empty if absent.
    pub fn entry(&mut self, name: &str) -> &mut T {
        let index = match self.index_of(name) {
            Some(index) => index,
            None => {
                let child = T::default();
                child.writable().set_parent(&self.writable);
                self.entries.push((name.to_string(), child));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].1
    }

    /// Insert or replace a child. Returns the replaced child.
    pub fn insert(&mut self, name: impl Into<String>, child: T) -> Option<T> {
        let name = name.into();
        child.writable().set_parent(&self.writable);
        match self.index_of(&name) {
            Some(index) => Some(std::mem::replace(&mut self.entries[index].1, child)),
            None => {
                self.entries.push((name, child));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<T> {
        let index = self.index_of(name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(name, child)| (name.as_str(), child))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.entries
            .iter_mut()
            .map(|(name, child)| (name.as_str(), child))
    }

    /// Keep only the children for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &T) -> bool) {
        self.entries.retain(|(name, child)| keep(name, child));
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct Leaf {
        pub(crate) writable: Writable,
        pub(crate) tag: u32,
    }

    impl Node for Leaf {
        fn writable(&self) -> &Writable {
            &self.writable
        }
    }

    #[test]
    fn keeps_insertion_order() {
        let mut c: Container<Leaf> = Container::new(Writable::new());
        c.entry("z");
        c.entry("a");
        c.entry("m");
        c.entry("a").tag = 4;
        assert_eq!(c.names().collect::<Vec<_>>(), vec!["z", "a", "m"]);
        assert_eq!(c.get("a").unwrap().tag, 4);
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn links_children_to_parent() {
        let parent = Writable::new();
        let mut c: Container<Leaf> = Container::new(parent.clone());
        assert!(c.entry("x").writable.parent().unwrap().same_node(&parent));

        let replaced = c.insert("x", Leaf { tag: 2, ..Default::default() });
        assert!(replaced.is_some());
        assert!(c.get("x").unwrap().writable.parent().unwrap().same_node(&parent));
        assert_eq!(c.get("x").unwrap().tag, 2);
    }

    #[test]
    fn remove_and_retain() {
        let mut c: Container<Leaf> = Container::new(Writable::new());
        for name in ["x", "y", "z"] {
            c.entry(name);
        }
        assert!(c.remove("y").is_some());
        assert!(c.remove("y").is_none());
        c.retain(|name, _| name != "z");
        assert_eq!(c.names().collect::<Vec<_>>(), vec!["x"]);
    }
}
