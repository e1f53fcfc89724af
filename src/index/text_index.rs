//! Inverted token index over literal objects

use crate::iterator::{IteratorHandle, SimpleIteratorBackend};
use crate::rdf::{Node, Statement};
use std::collections::HashMap;

/// A resource matched by a text search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryHit {
    pub resource: Node,
    pub score: f64,
}

/// Token -> subject -> term frequency.
///
/// Only statements with a literal object are indexed; the subject is the
/// resource a search returns.
#[derive(Debug, Clone, Default)]
pub struct TextIndex {
    postings: HashMap<String, HashMap<Node, u32>>,
}

/// Lowercased alphanumeric runs
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

impl TextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the object text of `statement`. Returns `false` when the
    /// object is not a literal.
    pub fn insert(&mut self, statement: &Statement) -> bool {
        let Some(literal) = statement.object.as_literal() else {
            return false;
        };
        for token in tokenize(literal.value()) {
            *self
                .postings
                .entry(token)
                .or_default()
                .entry(statement.subject.clone())
                .or_default() += 1;
        }
        true
    }

    pub fn remove(&mut self, statement: &Statement) -> bool {
        let Some(literal) = statement.object.as_literal() else {
            return false;
        };
        for token in tokenize(literal.value()) {
            if let Some(subjects) = self.postings.get_mut(&token) {
                if let Some(count) = subjects.get_mut(&statement.subject) {
                    *count -= 1;
                    if *count == 0 {
                        subjects.remove(&statement.subject);
                    }
                }
                if subjects.is_empty() {
                    self.postings.remove(&token);
                }
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.postings.clear();
    }

    /// Number of distinct tokens
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Ranked hits for every resource containing at least one query token,
    /// scored by summed term frequency
    pub fn hits(&self, query: &str) -> Vec<QueryHit> {
        let mut scores: HashMap<&Node, u32> = HashMap::new();
        for token in tokenize(query) {
            if let Some(subjects) = self.postings.get(&token) {
                for (subject, count) in subjects {
                    *scores.entry(subject).or_default() += count;
                }
            }
        }
        let mut hits: Vec<QueryHit> = scores
            .into_iter()
            .map(|(resource, score)| QueryHit {
                resource: resource.clone(),
                score: f64::from(score),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.resource.to_n3().cmp(&b.resource.to_n3()))
        });
        hits
    }

    pub fn search(&self, query: &str) -> IteratorHandle<QueryHit> {
        IteratorHandle::new(SimpleIteratorBackend::new(self.hits(query)))
    }
}
