//! One row of a tuple query result

use super::node::Node;
use indexmap::IndexMap;
use std::fmt;

/// Ordered mapping from variable name to node. Names are unique and keep
/// their insertion order, so a binding can be addressed by name or offset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingSet {
    values: IndexMap<String, Node>,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`; rebinding an existing name keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, node: Node) {
        self.values.insert(name.into(), node);
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.values.get(name)
    }

    /// The bound node, or an empty node when `name` is unknown
    pub fn value(&self, name: &str) -> Node {
        self.values.get(name).cloned().unwrap_or_default()
    }

    pub fn at(&self, offset: usize) -> Option<&Node> {
        self.values.get_index(offset).map(|(_, node)| node)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.values.iter().map(|(name, node)| (name.as_str(), node))
    }
}

impl<S: Into<String>> FromIterator<(S, Node)> for BindingSet {
    fn from_iter<I: IntoIterator<Item = (S, Node)>>(iter: I) -> Self {
        let mut set = BindingSet::new();
        for (name, node) in iter {
            set.insert(name, node);
        }
        set
    }
}

impl fmt::Display for BindingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, node)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} -> {}", name, node)?;
        }
        write!(f, "}}")
    }
}
