use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use tokio::net::TcpListener;
use triplegate::model::{MemoryModel, Model};
use triplegate::protocol::datastream::{get_statement, put_statement};
use triplegate::protocol::{ClientModel, ServerConfig, TransportServer};
use triplegate::rdf::{Node, Statement};
use triplegate::{BackendFeatures, ErrorCode, QueryLanguage};

fn res(iri: &str) -> Node {
    Node::resource(iri).unwrap()
}

fn start_server(features: u32) -> SocketAddr {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async move {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            let model: Arc<dyn Model> = Arc::new(MemoryModel::new());
            let server = TransportServer::new(ServerConfig::default(), model).with_features(features);
            let _ = server.serve(listener).await;
        });
    });
    rx.recv().unwrap()
}

fn connect(addr: SocketAddr) -> ClientModel {
    ClientModel::connect(&addr.to_string()).unwrap()
}

#[test]
fn test_statement_with_typed_literal_survives_encoding() {
    let statement = Statement::new_quad(
        res("http://example.org/s"),
        res("http://example.org/p"),
        Node::typed_literal("42", "http://www.w3.org/2001/XMLSchema#integer").unwrap(),
        res("http://example.org/g"),
    );
    let mut buf = BytesMut::new();
    put_statement(&mut buf, &statement);
    let mut bytes = buf.freeze();
    assert_eq!(get_statement(&mut bytes).unwrap(), statement);
    assert!(bytes.is_empty());
}

#[test]
fn test_remote_reads_and_writes() {
    let features = (BackendFeatures::ADD_STATEMENT | BackendFeatures::LIST_STATEMENTS).bits();
    let client = connect(start_server(features));
    assert_eq!(client.supported_features().unwrap(), features);
    assert!(client.is_empty().unwrap());

    let graph = res("urn:g");
    client
        .add_statement(&Statement::new(res("urn:a"), res("urn:p"), res("urn:b")))
        .unwrap();
    client
        .add_statement(&Statement::new(res("urn:a"), res("urn:p"), Node::literal("c")).with_context(graph.clone()))
        .unwrap();
    assert_eq!(client.statement_count().unwrap(), 2);

    let mut it = client
        .list_statements(&Statement::new(res("urn:a"), res("urn:p"), Node::Empty))
        .unwrap();
    let mut seen = Vec::new();
    while it.next() {
        seen.push(it.current());
    }
    assert!(it.last_error().is_none());
    it.close();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|st| st.subject == res("urn:a")));

    assert_eq!(client.list_contexts().unwrap().all_nodes(), vec![graph.clone()]);
    assert!(client
        .contains_statement(&Statement::new(res("urn:a"), res("urn:p"), res("urn:b")))
        .unwrap());
    assert!(!client
        .contains_any_statement(&Statement::new(res("urn:zzz"), Node::Empty, Node::Empty))
        .unwrap());

    client.remove_context(&graph).unwrap();
    assert_eq!(client.statement_count().unwrap(), 1);
    assert!(client.create_blank_node().unwrap().is_blank());
}

#[test]
fn test_remote_query_shapes() {
    let client = connect(start_server(0));
    client
        .add_statement(&Statement::new(res("urn:a"), res("urn:name"), Node::literal("A")))
        .unwrap();

    let select = client
        .execute_query("SELECT ?n WHERE { <urn:a> <urn:name> ?n }", &QueryLanguage::Sparql)
        .unwrap();
    assert!(select.is_binding());
    assert_eq!(select.binding_names(), vec!["n".to_string()]);
    let rows = select.all_bindings();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].value("n"), Node::literal("A"));

    let mut ask = client
        .execute_query("ASK { <urn:a> ?p ?o }", &QueryLanguage::Sparql)
        .unwrap();
    assert!(ask.is_bool());
    assert!(ask.bool_value());
    ask.close();

    let construct = client
        .execute_query("CONSTRUCT { ?s <urn:label> ?o } WHERE { ?s <urn:name> ?o }", &QueryLanguage::Sparql)
        .unwrap();
    assert!(construct.is_graph());
    assert_eq!(
        construct.all_statements(),
        vec![Statement::new(res("urn:a"), res("urn:label"), Node::literal("A"))]
    );

    let err = client.execute_query("SELECT WHERE {", &QueryLanguage::Sparql).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ParsingFailed);
    assert_eq!(client.last_error().map(|e| e.code()), Some(ErrorCode::ParsingFailed));
}

#[test]
fn test_write_with_open_iterator_is_rejected() {
    let client = connect(start_server(0));
    let st = Statement::new(res("urn:a"), res("urn:p"), res("urn:b"));
    client.add_statement(&st).unwrap();

    let it = client.list_statements(&Statement::any()).unwrap();
    let err = client
        .add_statement(&Statement::new(res("urn:c"), res("urn:p"), res("urn:d")))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    // dropping the handle closes the remote iterator
    drop(it);
    client
        .add_statement(&Statement::new(res("urn:c"), res("urn:p"), res("urn:d")))
        .unwrap();
    assert_eq!(client.statement_count().unwrap(), 2);
}

#[test]
fn test_invalid_statement_rejected_locally() {
    let client = connect(start_server(0));
    let err = client
        .add_statement(&Statement::new(Node::literal("s"), res("urn:p"), res("urn:o")))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert!(client.is_empty().unwrap());
}

#[test]
fn test_connect_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    assert!(ClientModel::connect(&addr.to_string()).is_err());
}
