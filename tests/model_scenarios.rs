use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use triplegate::model::{MemoryModel, Model, MultiCallProtectionModel, ProtectionMode, ReadOnlyModel, SqlConfig, SqlModel};
use triplegate::rdf::{Node, Statement};
use triplegate::ErrorCode;

fn res(iri: &str) -> Node {
    Node::resource(iri).unwrap()
}

fn seed(model: &dyn Model) {
    model
        .add_statement(&Statement::new(res("urn:a"), res("urn:p"), res("urn:b")))
        .unwrap();
    model
        .add_statement(&Statement::new(res("urn:a"), res("urn:p"), res("urn:c")))
        .unwrap();
}

fn count_a_p(model: &dyn Model) -> usize {
    let mut it = model
        .list_statements(&Statement::new(res("urn:a"), res("urn:p"), Node::Empty))
        .unwrap();
    let mut count = 0;
    while it.next() {
        let st = it.current();
        assert_eq!(st.subject, res("urn:a"));
        count += 1;
    }
    assert!(it.last_error().is_none());
    it.close();
    count
}

#[test]
fn test_partial_listing_in_memory() {
    let model = MemoryModel::new();
    seed(&model);
    assert_eq!(count_a_p(&model), 2);
    assert_eq!(model.open_iterators(), 0);
}

#[test]
fn test_partial_listing_in_sqlite() {
    let model = SqlModel::in_memory().unwrap();
    seed(&model);
    assert_eq!(count_a_p(&model), 2);
    assert_eq!(model.open_iterators(), 0);
}

#[test]
fn test_sqlite_file_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("quads.db");
    {
        let model = SqlModel::open(SqlConfig::file(&path)).unwrap();
        seed(&model);
    }
    let model = SqlModel::open(SqlConfig::file(&path).with_page_size(1)).unwrap();
    assert_eq!(model.statement_count().unwrap(), 2);
    assert_eq!(count_a_p(&model), 2);
}

#[test]
fn test_dropped_iterator_releases_lock() {
    let model = Arc::new(MemoryModel::new());
    seed(model.as_ref());

    {
        let mut it = model.list_statements(&Statement::any()).unwrap();
        assert!(it.next());
        assert_eq!(model.open_iterators(), 1);
    }
    assert_eq!(model.open_iterators(), 0);

    let writer = Arc::clone(&model);
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let added = writer.add_statement(&Statement::new(res("urn:d"), res("urn:p"), res("urn:e")));
        tx.send(added.is_ok()).unwrap();
    });
    assert!(rx.recv_timeout(Duration::from_secs(2)).expect("writer finished"));
    assert_eq!(model.statement_count().unwrap(), 3);
}

#[test]
fn test_writer_waits_for_open_iterator() {
    let model = Arc::new(SqlModel::in_memory().unwrap());
    seed(model.as_ref());

    let mut it = model.list_statements(&Statement::any()).unwrap();
    assert!(it.next());

    let writer = Arc::clone(&model);
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        writer
            .add_statement(&Statement::new(res("urn:d"), res("urn:p"), res("urn:e")))
            .unwrap();
        tx.send(()).unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    it.close();
    rx.recv_timeout(Duration::from_secs(2)).expect("write after close");
    handle.join().unwrap();
    assert_eq!(model.statement_count().unwrap(), 3);
}

#[test]
fn test_contexts_and_removal() {
    let model = MemoryModel::new();
    seed(&model);
    let graph = res("urn:g");
    model
        .add_statement(&Statement::new(res("urn:x"), res("urn:p"), Node::literal("in g")).with_context(graph.clone()))
        .unwrap();

    assert!(model.contains_context(&graph).unwrap());
    assert_eq!(model.list_statements_in_context(&graph).unwrap().all_statements().len(), 1);
    assert_eq!(model.list_contexts().unwrap().all_nodes(), vec![graph.clone()]);

    model.remove_context(&graph).unwrap();
    assert!(!model.contains_context(&graph).unwrap());
    assert_eq!(model.statement_count().unwrap(), 2);

    let err = model.remove_context(&Node::Empty).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
}

#[test]
fn test_read_only_wrapper_over_sqlite() {
    let inner = Arc::new(SqlModel::in_memory().unwrap());
    seed(inner.as_ref());
    let model = ReadOnlyModel::new(inner);

    assert_eq!(count_a_p(&model), 2);
    let err = model
        .add_statement(&Statement::new(res("urn:z"), res("urn:p"), res("urn:z")))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::PermissionDenied);
    assert_eq!(model.last_error().map(|e| e.code()), Some(ErrorCode::PermissionDenied));
}

#[test]
fn test_protection_serialises_threads() {
    let inner: Arc<dyn Model> = Arc::new(MemoryModel::new());
    let model = Arc::new(MultiCallProtectionModel::new(inner, ProtectionMode::Exclusive));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let model = Arc::clone(&model);
            thread::spawn(move || {
                for i in 0..25 {
                    let subject = res(&format!("urn:t{}/{}", t, i));
                    model.add_statement(&Statement::new(subject, res("urn:p"), res("urn:o"))).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(model.statement_count().unwrap(), 100);
    assert_eq!(model.open_iterators(), 0);
}
