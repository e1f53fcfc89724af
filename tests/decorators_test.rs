use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use triplegate::model::{
    AsyncModel, FilterModel, MemoryModel, Model, MultiCallProtectionModel, ProtectionMode, ReadOnlyModel, SqlModel,
};
use triplegate::rdf::{Node, Statement};
use triplegate::{ErrorCode, QueryLanguage};

fn res(iri: &str) -> Node {
    Node::resource(iri).unwrap()
}

fn st(subject: &str) -> Statement {
    Statement::new(res(subject), res("urn:p"), Node::literal("v"))
}

fn seeded() -> Arc<dyn Model> {
    let model = MemoryModel::new();
    model.add_statements(&[st("urn:a"), st("urn:b")]).unwrap();
    Arc::new(model)
}

#[test]
fn test_filter_swaps_parent() {
    let first = seeded();
    let second: Arc<dyn Model> = Arc::new(MemoryModel::new());
    let mut filter = FilterModel::new(Arc::clone(&first));
    assert_eq!(filter.statement_count().unwrap(), 2);

    filter.set_parent(Arc::clone(&second));
    assert!(filter.is_empty().unwrap());
    filter.add_statement(&st("urn:c")).unwrap();
    assert_eq!(second.statement_count().unwrap(), 1);
    assert_eq!(first.statement_count().unwrap(), 2);
}

#[test]
fn test_read_only_allows_every_read() {
    let model = ReadOnlyModel::new(seeded());
    assert_eq!(model.list_statements(&Statement::any()).unwrap().all_statements().len(), 2);
    assert!(model.contains_statement(&st("urn:a")).unwrap());
    let ask = model
        .execute_query("ASK { <urn:a> ?p ?o }", &QueryLanguage::Sparql)
        .unwrap();
    assert!(ask.bool_value());

    for denied in [
        model.remove_statement(&st("urn:a")),
        model.remove_all_statements(&Statement::any()),
        model.remove_context(&res("urn:g")),
    ] {
        assert_eq!(denied.unwrap_err().code(), ErrorCode::PermissionDenied);
    }
    assert_eq!(model.statement_count().unwrap(), 2);
}

#[test]
fn test_exclusive_iterator_blocks_other_threads() {
    let model = Arc::new(MultiCallProtectionModel::new(seeded(), ProtectionMode::Exclusive));
    let mut it = model.list_statements(&Statement::any()).unwrap();
    assert!(it.next());
    assert_eq!(model.open_iterators(), 1);

    let other = Arc::clone(&model);
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let count = other.statement_count().unwrap();
        tx.send(count).unwrap();
    });
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    it.close();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
    handle.join().unwrap();
}

#[test]
fn test_read_write_mode_nests_reads_on_one_thread() {
    let model = Arc::new(MultiCallProtectionModel::new(seeded(), ProtectionMode::ReadWrite));
    let it = model.list_statements(&Statement::any()).unwrap();
    assert_eq!(model.statement_count().unwrap(), 2);
    assert!(model.contains_statement(&st("urn:b")).unwrap());

    let other = Arc::clone(&model);
    let (tx, rx) = mpsc::channel();
    let writer = thread::spawn(move || {
        other.add_statement(&st("urn:c")).unwrap();
        tx.send(()).unwrap();
    });
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    drop(it);
    rx.recv_timeout(Duration::from_secs(2)).expect("write after drop");
    writer.join().unwrap();
    assert_eq!(model.open_iterators(), 0);
    assert_eq!(model.statement_count().unwrap(), 3);
}

#[tokio::test]
async fn test_async_model_over_sqlite() {
    let model = AsyncModel::new(Arc::new(SqlModel::in_memory().unwrap())).unwrap();
    model.add_statements(&[st("urn:a"), st("urn:b")]).await.unwrap();

    let mut it = model.list_statements(&Statement::any()).await.unwrap();
    let mut subjects = Vec::new();
    while it.next().await {
        subjects.push(it.current().subject.clone());
    }
    it.close();
    assert_eq!(subjects, vec![res("urn:a"), res("urn:b")]);

    let mut result = model
        .execute_query("SELECT 1 AS __ask_retval WHERE 0", &QueryLanguage::Sql)
        .await
        .unwrap();
    assert!(result.is_bool());
    assert!(!result.bool_value());
    result.close();

    model.remove_statement(&st("urn:a")).await.unwrap();
    assert_eq!(model.statement_count().await.unwrap(), 1);
    assert_eq!(model.open_iterators().await.unwrap(), 0);
}

#[tokio::test]
async fn test_async_model_reports_errors() {
    let model = AsyncModel::new(Arc::new(MemoryModel::new())).unwrap();
    let err = model
        .execute_query("SELECT 1", &QueryLanguage::Sql)
        .await
        .err()
        .expect("sql is not available in memory");
    assert_eq!(err.code(), ErrorCode::NotSupported);
    assert_eq!(model.last_error().map(|e| e.code()), Some(ErrorCode::NotSupported));
    assert!(model.is_empty().await.unwrap());
    assert!(model.last_error().is_none());
}
