//! In-memory quad store with positional scans
//!
//! Statements live in an insertion-ordered primary set plus one index per
//! position. A listing picks the smallest index that its pattern pins down
//! and walks it by position, so a cursor is just `(scan, position)`. Those
//! positions stay valid because the owning model holds its read lock for
//! as long as any cursor is open.

use crate::error::Result;
use crate::rdf::{Node, Statement};
use crate::sparql::QuadSource;
use indexmap::{IndexMap, IndexSet};

type Index = IndexMap<Node, IndexSet<Statement>>;

/// Which sequence a cursor walks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    All,
    Subject(Node),
    Predicate(Node),
    Object(Node),
    Context(Node),
}

/// Quad store indexed by subject, predicate, object and context
#[derive(Debug, Clone, Default)]
pub struct QuadStore {
    /// All statements (primary storage, insertion order)
    statements: IndexSet<Statement>,

    by_subject: Index,
    by_predicate: Index,
    by_object: Index,

    /// Named graphs only; the default graph is not indexed
    by_context: Index,
}

impl QuadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a statement; `false` if it was already present
    pub fn insert(&mut self, statement: Statement) -> bool {
        if self.statements.contains(&statement) {
            return false;
        }
        index_insert(&mut self.by_subject, &statement.subject, &statement);
        index_insert(&mut self.by_predicate, &statement.predicate, &statement);
        index_insert(&mut self.by_object, &statement.object, &statement);
        if statement.context.is_valid() {
            index_insert(&mut self.by_context, &statement.context, &statement);
        }
        self.statements.insert(statement);
        true
    }

    /// Remove a statement; `false` if it was not present
    pub fn remove(&mut self, statement: &Statement) -> bool {
        if !self.statements.shift_remove(statement) {
            return false;
        }
        index_remove(&mut self.by_subject, &statement.subject, statement);
        index_remove(&mut self.by_predicate, &statement.predicate, statement);
        index_remove(&mut self.by_object, &statement.object, statement);
        if statement.context.is_valid() {
            index_remove(&mut self.by_context, &statement.context, statement);
        }
        true
    }

    /// Drop a whole named graph, returning the number of removed statements
    pub fn remove_context(&mut self, context: &Node) -> usize {
        let members: Vec<Statement> = self
            .by_context
            .get(context)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        members.iter().filter(|st| self.remove(st)).count()
    }

    pub fn contains(&self, statement: &Statement) -> bool {
        self.statements.contains(statement)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Cheapest scan covering `pattern`
    pub fn plan(&self, pattern: &Statement) -> Scan {
        let mut best = (self.statements.len(), Scan::All);
        let candidates: [(&Node, &Index, fn(Node) -> Scan); 4] = [
            (&pattern.subject, &self.by_subject, Scan::Subject),
            (&pattern.predicate, &self.by_predicate, Scan::Predicate),
            (&pattern.object, &self.by_object, Scan::Object),
            (&pattern.context, &self.by_context, Scan::Context),
        ];
        for (node, index, make) in candidates {
            if node.is_empty() {
                continue;
            }
            let size = index.get(node).map_or(0, IndexSet::len);
            if size < best.0 || best.1 == Scan::All {
                best = (size, make(node.clone()));
            }
        }
        best.1
    }

    /// Statement at `position` of `scan`, `None` past the end
    pub fn scan_get(&self, scan: &Scan, position: usize) -> Option<&Statement> {
        match scan {
            Scan::All => self.statements.get_index(position),
            Scan::Subject(n) => self.by_subject.get(n)?.get_index(position),
            Scan::Predicate(n) => self.by_predicate.get(n)?.get_index(position),
            Scan::Object(n) => self.by_object.get(n)?.get_index(position),
            Scan::Context(n) => self.by_context.get(n)?.get_index(position),
        }
    }

    /// All statements matching `pattern`, in scan order
    pub fn matching(&self, pattern: &Statement) -> Vec<Statement> {
        let scan = self.plan(pattern);
        let mut out = Vec::new();
        let mut position = 0;
        while let Some(statement) = self.scan_get(&scan, position) {
            if statement.matches(pattern) {
                out.push(statement.clone());
            }
            position += 1;
        }
        out
    }

    pub fn context_count(&self) -> usize {
        self.by_context.len()
    }

    /// Named graph at `position` in first-use order
    pub fn context_at(&self, position: usize) -> Option<&Node> {
        self.by_context.get_index(position).map(|(node, _)| node)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Statement> {
        self.statements.iter()
    }
}

impl QuadSource for QuadStore {
    fn quads_matching(&self, pattern: &Statement) -> Result<Vec<Statement>> {
        Ok(self.matching(pattern))
    }
}

fn index_insert(index: &mut Index, key: &Node, statement: &Statement) {
    index.entry(key.clone()).or_default().insert(statement.clone());
}

fn index_remove(index: &mut Index, key: &Node, statement: &Statement) {
    if let Some(set) = index.get_mut(key) {
        set.shift_remove(statement);
        if set.is_empty() {
            index.shift_remove(key);
        }
    }
}
