//! RDF statements (quads)

use super::node::Node;
use std::fmt;

/// Subject, predicate, object and an optional context (named graph).
///
/// Used both as a concrete statement and as a pattern, where empty nodes
/// match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Statement {
    pub subject: Node,
    pub predicate: Node,
    pub object: Node,
    pub context: Node,
}

impl Statement {
    /// Statement in the default context
    pub fn new(subject: Node, predicate: Node, object: Node) -> Self {
        Self {
            subject,
            predicate,
            object,
            context: Node::Empty,
        }
    }

    pub fn new_quad(subject: Node, predicate: Node, object: Node, context: Node) -> Self {
        Self {
            subject,
            predicate,
            object,
            context,
        }
    }

    /// Pattern matching every statement
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_context(mut self, context: Node) -> Self {
        self.context = context;
        self
    }

    /// A statement can be stored when the subject is a resource or blank
    /// node, the predicate a resource, the object any term and the context
    /// empty, a resource or a blank node.
    pub fn is_valid(&self) -> bool {
        (self.subject.is_resource() || self.subject.is_blank())
            && self.predicate.is_resource()
            && self.object.is_valid()
            && !self.context.is_literal()
    }

    /// All four positions are empty
    pub fn is_wildcard(&self) -> bool {
        self.subject.is_empty() && self.predicate.is_empty() && self.object.is_empty() && self.context.is_empty()
    }

    /// Only the context is set, i.e. the pattern selects a whole named graph
    pub fn is_context_only(&self) -> bool {
        self.subject.is_empty() && self.predicate.is_empty() && self.object.is_empty() && self.context.is_valid()
    }

    /// Check this statement against `pattern`; empty pattern nodes are wildcards.
    pub fn matches(&self, pattern: &Statement) -> bool {
        self.subject.matches(&pattern.subject)
            && self.predicate.matches(&pattern.predicate)
            && self.object.matches(&pattern.object)
            && self.context.matches(&pattern.context)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}", self.subject, self.predicate, self.object)?;
        if self.context.is_valid() {
            write!(f, ", {}", self.context)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(iri: &str) -> Node {
        Node::resource(iri).unwrap()
    }

    #[test]
    fn test_validity() {
        let st = Statement::new(res("urn:a"), res("urn:p"), Node::literal("x"));
        assert!(st.is_valid());
        assert!(!Statement::new(Node::literal("x"), res("urn:p"), res("urn:b")).is_valid());
        assert!(!Statement::new(res("urn:a"), res("urn:p"), Node::Empty).is_valid());
        assert!(!st.clone().with_context(Node::literal("g")).is_valid());
        assert!(st.with_context(res("urn:g")).is_valid());
    }

    #[test]
    fn test_pattern_matching() {
        let st = Statement::new_quad(res("urn:a"), res("urn:p"), res("urn:b"), res("urn:g"));
        assert!(st.matches(&Statement::any()));
        assert!(st.matches(&Statement::new(res("urn:a"), Node::Empty, Node::Empty)));
        assert!(!st.matches(&Statement::new(res("urn:x"), Node::Empty, Node::Empty)));
        let in_graph = Statement::any().with_context(res("urn:g"));
        assert!(in_graph.is_context_only());
        assert!(st.matches(&in_graph));
    }
}
