//! SPARQL query executor
//!
//! Evaluates spargebra algebra against a [`QuadSource`] with a nested-loop
//! strategy: every operator receives the solutions computed so far and
//! extends them, so a basic graph pattern only fetches the quads that are
//! compatible with the bindings it was handed.
//!
//! Outside `GRAPH` a triple pattern matches statements of every context.
//! Blank nodes in patterns behave like variables that are never projected.

use super::parser::{parse_query, ParsedQuery};
use super::{QuadSource, SparqlError, SparqlResult};
use crate::error::Result;
use crate::iterator::SimpleQueryResult;
use crate::rdf::{BindingSet, BlankNode, Node, Statement};
use indexmap::{IndexMap, IndexSet};
use spargebra::algebra::{Expression, Function, GraphPattern, OrderExpression};
use spargebra::term::{GroundTerm, NamedNodePattern, TermPattern, TriplePattern};
use spargebra::Query;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

type Solution = IndexMap<String, Node>;

/// Parse and evaluate `text` against `source`
pub fn execute<S: QuadSource + ?Sized>(text: &str, source: &S) -> Result<SimpleQueryResult> {
    let parsed = parse_query(text)?;
    execute_parsed(&parsed, source)
}

/// Evaluate an already parsed query
pub fn execute_parsed<S: QuadSource + ?Sized>(parsed: &ParsedQuery, source: &S) -> Result<SimpleQueryResult> {
    let evaluator = Evaluator { source };
    match &parsed.query {
        Query::Select { dataset, pattern, .. } => {
            reject_dataset(dataset.is_some())?;
            let solutions = evaluator.run(pattern)?;
            let names = projection(pattern).unwrap_or_else(|| visible_names(&solutions));
            let rows = solutions
                .iter()
                .map(|solution| {
                    names
                        .iter()
                        .map(|name| (name.clone(), solution.get(name).cloned().unwrap_or_default()))
                        .collect::<BindingSet>()
                })
                .collect::<Vec<_>>();
            debug!(rows = rows.len(), "select evaluated");
            Ok(SimpleQueryResult::bindings(names, rows))
        }
        Query::Ask { dataset, pattern, .. } => {
            reject_dataset(dataset.is_some())?;
            let answer = !evaluator.run(pattern)?.is_empty();
            Ok(SimpleQueryResult::boolean(answer))
        }
        Query::Construct {
            template,
            dataset,
            pattern,
            ..
        } => {
            reject_dataset(dataset.is_some())?;
            let solutions = evaluator.run(pattern)?;
            let graph = construct(template, &solutions)?;
            Ok(SimpleQueryResult::graph(graph))
        }
        Query::Describe { dataset, pattern, .. } => {
            reject_dataset(dataset.is_some())?;
            let solutions = evaluator.run(pattern)?;
            let mut described = IndexSet::new();
            for solution in &solutions {
                for node in solution.values() {
                    if node.is_resource() || node.is_blank() {
                        described.insert(node.clone());
                    }
                }
            }
            let mut graph = IndexSet::new();
            for resource in described {
                let pattern = Statement::new(resource, Node::Empty, Node::Empty);
                graph.extend(source.quads_matching(&pattern)?);
            }
            Ok(SimpleQueryResult::graph(graph.into_iter().collect()))
        }
    }
}

fn reject_dataset(has_dataset: bool) -> SparqlResult<()> {
    if has_dataset {
        return Err(SparqlError::Unsupported("FROM / FROM NAMED dataset clauses".to_string()));
    }
    Ok(())
}

/// Active graph of a pattern
#[derive(Clone)]
enum Scope {
    Any,
    Named(Node),
    Variable(String),
}

/// Triple pattern position after variable substitution
enum Slot {
    Fixed(Node),
    Variable(String),
}

struct Evaluator<'a, S: ?Sized> {
    source: &'a S,
}

impl<S: QuadSource + ?Sized> Evaluator<'_, S> {
    fn run(&self, pattern: &GraphPattern) -> Result<Vec<Solution>> {
        self.eval(pattern, &Scope::Any, vec![Solution::new()])
    }

    fn eval(&self, pattern: &GraphPattern, scope: &Scope, input: Vec<Solution>) -> Result<Vec<Solution>> {
        match pattern {
            GraphPattern::Bgp { patterns } => {
                let mut solutions = input;
                for triple in patterns {
                    solutions = self.match_triple(triple, scope, solutions)?;
                    if solutions.is_empty() {
                        break;
                    }
                }
                Ok(solutions)
            }
            GraphPattern::Join { left, right } => {
                let left = self.eval(left, scope, input)?;
                self.eval(right, scope, left)
            }
            GraphPattern::LeftJoin { left, right, expression } => {
                let mut out = Vec::new();
                for solution in self.eval(left, scope, input)? {
                    let mut extended = self.eval(right, scope, vec![solution.clone()])?;
                    if let Some(expression) = expression {
                        extended = filter(extended, expression)?;
                    }
                    if extended.is_empty() {
                        out.push(solution);
                    } else {
                        out.extend(extended);
                    }
                }
                Ok(out)
            }
            GraphPattern::Filter { expr, inner } => filter(self.eval(inner, scope, input)?, expr),
            GraphPattern::Union { left, right } => {
                let mut out = self.eval(left, scope, input.clone())?;
                out.extend(self.eval(right, scope, input)?);
                Ok(out)
            }
            GraphPattern::Graph { name, inner } => {
                let scope = match name {
                    NamedNodePattern::NamedNode(n) => Scope::Named(Node::Resource(n.clone().into())),
                    NamedNodePattern::Variable(v) => Scope::Variable(v.as_str().to_string()),
                };
                self.eval(inner, &scope, input)
            }
            GraphPattern::Extend {
                inner,
                variable,
                expression,
            } => {
                let mut out = Vec::new();
                for mut solution in self.eval(inner, scope, input)? {
                    if let Some(value) = term(expression, &solution)? {
                        solution.insert(variable.as_str().to_string(), value);
                    }
                    out.push(solution);
                }
                Ok(out)
            }
            GraphPattern::Minus { left, right } => {
                let right = self.eval(right, scope, vec![Solution::new()])?;
                let left = self.eval(left, scope, input)?;
                Ok(left
                    .into_iter()
                    .filter(|l| !right.iter().any(|r| shares_variable(l, r) && compatible(l, r)))
                    .collect())
            }
            GraphPattern::Values { variables, bindings } => {
                let mut rows = Vec::with_capacity(bindings.len());
                for values in bindings {
                    let mut row = Solution::new();
                    for (variable, value) in variables.iter().zip(values) {
                        if let Some(value) = value {
                            row.insert(variable.as_str().to_string(), ground(value)?);
                        }
                    }
                    rows.push(row);
                }
                Ok(join(&input, &rows))
            }
            GraphPattern::OrderBy { inner, expression } => {
                let solutions = self.eval(inner, scope, input)?;
                order(solutions, expression)
            }
            GraphPattern::Project { inner, variables } => {
                let names: Vec<&str> = variables.iter().map(|v| v.as_str()).collect();
                let projected = self
                    .eval(inner, scope, vec![Solution::new()])?
                    .into_iter()
                    .map(|solution| {
                        solution
                            .into_iter()
                            .filter(|(name, _)| names.contains(&name.as_str()))
                            .collect::<Solution>()
                    })
                    .collect::<Vec<_>>();
                Ok(join(&input, &projected))
            }
            GraphPattern::Distinct { inner } | GraphPattern::Reduced { inner } => {
                let solutions = self.eval(inner, scope, vec![Solution::new()])?;
                let mut seen = Vec::new();
                for solution in solutions {
                    if !seen.iter().any(|s: &Solution| same_solution(s, &solution)) {
                        seen.push(solution);
                    }
                }
                Ok(join(&input, &seen))
            }
            GraphPattern::Slice { inner, start, length } => {
                let solutions = self.eval(inner, scope, vec![Solution::new()])?;
                let sliced: Vec<Solution> = solutions
                    .into_iter()
                    .skip(*start)
                    .take(length.unwrap_or(usize::MAX))
                    .collect();
                Ok(join(&input, &sliced))
            }
            other => Err(SparqlError::Unsupported(format!("graph pattern {}", other)).into()),
        }
    }

    fn match_triple(&self, triple: &TriplePattern, scope: &Scope, input: Vec<Solution>) -> Result<Vec<Solution>> {
        let subject = term_slot(&triple.subject)?;
        let predicate = match &triple.predicate {
            NamedNodePattern::NamedNode(n) => Slot::Fixed(Node::Resource(n.clone().into())),
            NamedNodePattern::Variable(v) => Slot::Variable(v.as_str().to_string()),
        };
        let object = term_slot(&triple.object)?;
        let context = match scope {
            Scope::Any => None,
            Scope::Named(node) => Some(Slot::Fixed(node.clone())),
            Scope::Variable(name) => Some(Slot::Variable(name.clone())),
        };

        let mut out = Vec::new();
        for solution in input {
            let pattern = Statement::new_quad(
                resolve(&subject, &solution),
                resolve(&predicate, &solution),
                resolve(&object, &solution),
                context.as_ref().map(|c| resolve(c, &solution)).unwrap_or_default(),
            );
            for statement in self.source.quads_matching(&pattern)? {
                // GRAPH only sees named graphs
                if context.is_some() && statement.context.is_empty() {
                    continue;
                }
                let mut extended = solution.clone();
                let bound = bind(&mut extended, &subject, &statement.subject)
                    && bind(&mut extended, &predicate, &statement.predicate)
                    && bind(&mut extended, &object, &statement.object)
                    && context
                        .as_ref()
                        .map_or(true, |c| bind(&mut extended, c, &statement.context));
                if bound {
                    out.push(extended);
                }
            }
        }
        Ok(out)
    }
}

fn term_slot(pattern: &TermPattern) -> SparqlResult<Slot> {
    match pattern {
        TermPattern::NamedNode(n) => Ok(Slot::Fixed(Node::Resource(n.clone().into()))),
        TermPattern::Literal(l) => Ok(Slot::Fixed(Node::Literal(l.clone().into()))),
        TermPattern::BlankNode(b) => Ok(Slot::Variable(format!("_:{}", b.as_str()))),
        TermPattern::Variable(v) => Ok(Slot::Variable(v.as_str().to_string())),
        #[allow(unreachable_patterns)]
        other => Err(SparqlError::Unsupported(format!("term pattern {}", other))),
    }
}

fn resolve(slot: &Slot, solution: &Solution) -> Node {
    match slot {
        Slot::Fixed(node) => node.clone(),
        Slot::Variable(name) => solution.get(name).cloned().unwrap_or_default(),
    }
}

/// Bind `slot` to `value`; `false` when it clashes with an earlier binding
/// of the same variable within one triple pattern
fn bind(solution: &mut Solution, slot: &Slot, value: &Node) -> bool {
    match slot {
        Slot::Fixed(_) => true,
        Slot::Variable(name) => match solution.get(name) {
            Some(existing) => existing == value,
            None => {
                solution.insert(name.clone(), value.clone());
                true
            }
        },
    }
}

fn ground(term: &GroundTerm) -> SparqlResult<Node> {
    match term {
        GroundTerm::NamedNode(n) => Ok(Node::Resource(n.clone().into())),
        GroundTerm::Literal(l) => Ok(Node::Literal(l.clone().into())),
        #[allow(unreachable_patterns)]
        other => Err(SparqlError::Unsupported(format!("VALUES term {}", other))),
    }
}

fn compatible(left: &Solution, right: &Solution) -> bool {
    right
        .iter()
        .all(|(name, value)| left.get(name).map_or(true, |existing| existing == value))
}

fn shares_variable(left: &Solution, right: &Solution) -> bool {
    right.keys().any(|name| left.contains_key(name))
}

fn same_solution(left: &Solution, right: &Solution) -> bool {
    left.len() == right.len() && compatible(left, right)
}

fn join(left: &[Solution], right: &[Solution]) -> Vec<Solution> {
    let mut out = Vec::new();
    for l in left {
        for r in right {
            if compatible(l, r) {
                let mut merged = l.clone();
                for (name, value) in r {
                    merged.entry(name.clone()).or_insert_with(|| value.clone());
                }
                out.push(merged);
            }
        }
    }
    out
}

fn filter(solutions: Vec<Solution>, expression: &Expression) -> Result<Vec<Solution>> {
    let mut out = Vec::with_capacity(solutions.len());
    for solution in solutions {
        if truth(expression, &solution)? == Some(true) {
            out.push(solution);
        }
    }
    Ok(out)
}

/// Value of an expression; `None` for an unbound variable or a type error
fn term(expression: &Expression, solution: &Solution) -> SparqlResult<Option<Node>> {
    match expression {
        Expression::NamedNode(n) => Ok(Some(Node::Resource(n.clone().into()))),
        Expression::Literal(l) => Ok(Some(Node::Literal(l.clone().into()))),
        Expression::Variable(v) => Ok(solution.get(v.as_str()).cloned()),
        other => Ok(truth(other, solution)?.map(|b| Node::Literal(b.into()))),
    }
}

/// Three-valued effective boolean value
fn truth(expression: &Expression, solution: &Solution) -> SparqlResult<Option<bool>> {
    match expression {
        Expression::Bound(v) => Ok(Some(solution.contains_key(v.as_str()))),
        Expression::Not(inner) => Ok(truth(inner, solution)?.map(|b| !b)),
        Expression::And(left, right) => {
            let (l, r) = (truth(left, solution)?, truth(right, solution)?);
            Ok(match (l, r) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            })
        }
        Expression::Or(left, right) => {
            let (l, r) = (truth(left, solution)?, truth(right, solution)?);
            Ok(match (l, r) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            })
        }
        Expression::Equal(left, right) | Expression::SameTerm(left, right) => {
            match (term(left, solution)?, term(right, solution)?) {
                (Some(l), Some(r)) => Ok(Some(l == r)),
                _ => Ok(None),
            }
        }
        Expression::FunctionCall(function, args) => {
            let test: fn(&Node) -> bool = match function {
                Function::IsIri => Node::is_resource,
                Function::IsBlank => Node::is_blank,
                Function::IsLiteral => Node::is_literal,
                other => return Err(SparqlError::Unsupported(format!("function {}", other))),
            };
            match args.as_slice() {
                [arg] => Ok(term(arg, solution)?.map(|node| test(&node))),
                _ => Ok(None),
            }
        }
        Expression::NamedNode(_) | Expression::Literal(_) | Expression::Variable(_) => {
            Ok(term(expression, solution)?.and_then(|node| effective_boolean(&node)))
        }
        other => Err(SparqlError::Unsupported(format!("expression {}", other))),
    }
}

fn effective_boolean(node: &Node) -> Option<bool> {
    let literal = node.as_literal()?;
    if let Some(b) = literal.as_bool() {
        return Some(b);
    }
    if let Some(n) = literal.as_f64() {
        return Some(n != 0.0 && !n.is_nan());
    }
    if literal.is_plain() {
        return Some(!literal.value().is_empty());
    }
    None
}

fn order(mut solutions: Vec<Solution>, keys: &[OrderExpression]) -> Result<Vec<Solution>> {
    let mut keyed = Vec::with_capacity(solutions.len());
    for solution in solutions.drain(..) {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            let expression = match key {
                OrderExpression::Asc(e) | OrderExpression::Desc(e) => e,
            };
            values.push(term(expression, &solution)?);
        }
        keyed.push((values, solution));
    }
    keyed.sort_by(|(a, _), (b, _)| {
        for (i, key) in keys.iter().enumerate() {
            let ordering = compare(a[i].as_ref(), b[i].as_ref());
            let ordering = match key {
                OrderExpression::Asc(_) => ordering,
                OrderExpression::Desc(_) => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(keyed.into_iter().map(|(_, solution)| solution).collect())
}

/// Unbound < blank < IRI < literal; numeric literals compare by value
fn compare(a: Option<&Node>, b: Option<&Node>) -> Ordering {
    fn rank(node: Option<&Node>) -> u8 {
        match node {
            None | Some(Node::Empty) => 0,
            Some(Node::Blank(_)) => 1,
            Some(Node::Resource(_)) => 2,
            Some(Node::Literal(_)) => 3,
        }
    }
    match (a, b) {
        (Some(Node::Literal(x)), Some(Node::Literal(y))) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => x.value().cmp(y.value()),
        },
        (Some(x), Some(y)) if rank(a) == rank(b) => x.to_string().cmp(&y.to_string()),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Variables named by the outermost projection, looking through solution
/// modifiers
fn projection(pattern: &GraphPattern) -> Option<Vec<String>> {
    match pattern {
        GraphPattern::Project { variables, .. } => Some(variables.iter().map(|v| v.as_str().to_string()).collect()),
        GraphPattern::Distinct { inner }
        | GraphPattern::Reduced { inner }
        | GraphPattern::Slice { inner, .. }
        | GraphPattern::OrderBy { inner, .. } => projection(inner),
        _ => None,
    }
}

fn visible_names(solutions: &[Solution]) -> Vec<String> {
    let mut names = IndexSet::new();
    for solution in solutions {
        for name in solution.keys() {
            if !name.starts_with("_:") {
                names.insert(name.clone());
            }
        }
    }
    names.into_iter().collect()
}

fn construct(template: &[TriplePattern], solutions: &[Solution]) -> SparqlResult<Vec<Statement>> {
    let mut graph = IndexSet::new();
    for solution in solutions {
        let mut fresh: HashMap<String, Node> = HashMap::new();
        let mut instantiate = |pattern: &TermPattern| -> SparqlResult<Node> {
            Ok(match pattern {
                TermPattern::BlankNode(b) => fresh
                    .entry(b.as_str().to_string())
                    .or_insert_with(|| Node::Blank(BlankNode::random()))
                    .clone(),
                other => resolve(&term_slot(other)?, solution),
            })
        };
        for triple in template {
            let subject = instantiate(&triple.subject)?;
            let object = instantiate(&triple.object)?;
            let predicate = match &triple.predicate {
                NamedNodePattern::NamedNode(n) => Node::Resource(n.clone().into()),
                NamedNodePattern::Variable(v) => solution.get(v.as_str()).cloned().unwrap_or_default(),
            };
            let statement = Statement::new(subject, predicate, object);
            // rows leaving a template position unbound are skipped
            if statement.is_valid() {
                graph.insert(statement);
            }
        }
    }
    Ok(graph.into_iter().collect())
}
