use triplegate::iterator::{QueryResultIterator, SimpleQueryResult};
use triplegate::model::{MemoryModel, Model, SqlModel};
use triplegate::rdf::{BindingSet, Node, Statement};
use triplegate::{ErrorCode, QueryLanguage, ResultShape};

fn res(iri: &str) -> Node {
    Node::resource(iri).unwrap()
}

fn people() -> MemoryModel {
    let model = MemoryModel::new();
    for (person, name) in [("urn:alice", "Alice"), ("urn:bob", "Bob")] {
        model
            .add_statement(&Statement::new(res(person), res("urn:name"), Node::literal(name)))
            .unwrap();
        model
            .add_statement(&Statement::new(res(person), res("urn:type"), res("urn:Person")))
            .unwrap();
    }
    model
}

#[test]
fn test_empty_ask_is_false_with_one_row() {
    let model = SqlModel::in_memory().unwrap();
    let mut it = model
        .execute_query("SELECT 1 AS __ask_retval WHERE 0", &QueryLanguage::Sql)
        .unwrap();
    assert!(it.is_bool());
    assert!(!it.is_graph());
    assert!(!it.is_binding());
    assert!(!it.bool_value());
    assert!(it.next());
    assert!(!it.next());
    it.close();
    assert_eq!(model.open_iterators(), 0);
}

#[test]
fn test_graph_column_yields_statements() {
    let model = SqlModel::in_memory().unwrap();
    let mut it = model
        .execute_query("SELECT '<urn:s> <urn:p> <urn:o> .' AS \"callret-0\"", &QueryLanguage::Sql)
        .unwrap();
    assert!(it.is_graph());
    assert_eq!(it.shape(), Some(ResultShape::Graph));
    assert!(it.next());
    assert_eq!(it.current_statement(), Statement::new(res("urn:s"), res("urn:p"), res("urn:o")));
    assert!(!it.next());
    assert!(it.last_error().is_none());
    it.close();

    let it = model
        .execute_query("SELECT '<urn:s> <urn:p> <urn:o> .' AS \"callret-0\"", &QueryLanguage::Sql)
        .unwrap();
    let statements = it.iterate_statements().all_statements();
    assert_eq!(statements, vec![Statement::new(res("urn:s"), res("urn:p"), res("urn:o"))]);
}

#[test]
fn test_sparql_select_on_memory() {
    let model = people();
    let mut it = model
        .execute_query(
            "SELECT ?person ?name WHERE { ?person <urn:name> ?name } ORDER BY ?name",
            &QueryLanguage::Sparql,
        )
        .unwrap();
    assert!(it.is_binding());
    assert_eq!(it.binding_names(), vec!["person".to_string(), "name".to_string()]);
    let mut names = it.iterate_bindings("name");
    assert_eq!(names.all_nodes(), vec![Node::literal("Alice"), Node::literal("Bob")]);
    names.close();
    assert!(!it.next());
    drop(it);
    assert_eq!(model.open_iterators(), 0);
}

#[test]
fn test_sparql_ask_and_construct_on_memory() {
    let model = people();

    let ask = model
        .execute_query("ASK { <urn:alice> <urn:type> <urn:Person> }", &QueryLanguage::Sparql)
        .unwrap();
    assert!(ask.is_bool());
    assert!(ask.bool_value());
    drop(ask);

    let construct = model
        .execute_query(
            "CONSTRUCT { ?p <urn:label> ?n } WHERE { ?p <urn:name> ?n }",
            &QueryLanguage::Sparql,
        )
        .unwrap();
    assert!(construct.is_graph());
    let mut statements = construct.all_statements();
    statements.sort_by_key(|st| st.subject.to_n3());
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0].predicate, res("urn:label"));
    assert_eq!(statements[0].object, Node::literal("Alice"));
}

#[test]
fn test_bad_sparql_reports_parse_error() {
    let model = people();
    let err = model
        .execute_query("SELECT WHERE {", &QueryLanguage::Sparql)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ParsingFailed);
    assert_eq!(model.last_error().map(|e| e.code()), Some(ErrorCode::ParsingFailed));
    assert_eq!(model.open_iterators(), 0);

    let err = model
        .execute_query("SELECT 1", &QueryLanguage::Sql)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotSupported);
}

#[test]
fn test_statements_from_binding_columns() {
    let rows: Vec<BindingSet> = [("urn:alice", "Alice"), ("urn:bob", "Bob")]
        .into_iter()
        .map(|(who, name)| [("who", res(who)), ("name", Node::literal(name))].into_iter().collect())
        .collect();
    let result = QueryResultIterator::new(SimpleQueryResult::bindings(
        vec!["who".to_string(), "name".to_string()],
        rows,
    ));

    let template = Statement::new(Node::Empty, res("urn:name"), Node::Empty);
    let statements = result
        .iterate_statements_from_bindings("who", "", "name", "", template)
        .all_statements();
    assert_eq!(
        statements,
        vec![
            Statement::new(res("urn:alice"), res("urn:name"), Node::literal("Alice")),
            Statement::new(res("urn:bob"), res("urn:name"), Node::literal("Bob")),
        ]
    );
}

#[test]
fn test_wrong_shape_accessors_are_inert() {
    let mut graph = QueryResultIterator::new(SimpleQueryResult::graph(vec![Statement::new(
        res("urn:s"),
        res("urn:p"),
        res("urn:o"),
    )]));
    assert!(graph.next());
    assert_eq!(graph.binding_count(), 0);
    assert_eq!(graph.current_bindings(), BindingSet::new());
    assert!(!graph.bool_value());

    let invalid = QueryResultIterator::invalid();
    assert!(!invalid.is_valid());
    assert_eq!(invalid.shape(), None);
    assert!(invalid.iterate_statements().all_statements().is_empty());
}
