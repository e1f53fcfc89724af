use proptest::prelude::*;
use triplegate::iterator::{IteratorHandle, QueryResultIterator, SimpleIteratorBackend, SimpleQueryResult};
use triplegate::rdf::{BindingSet, Literal, Node, Statement};
use triplegate::ErrorCode;

fn res(iri: &str) -> Node {
    Node::resource(iri).unwrap()
}

fn statements(count: usize) -> Vec<Statement> {
    (0..count)
        .map(|i| {
            Statement::new(
                res(&format!("urn:s{}", i)),
                res("urn:p"),
                Node::from(Literal::from(i as i64)),
            )
        })
        .collect()
}

fn spo_row(i: usize) -> BindingSet {
    [
        ("s", res(&format!("urn:s{}", i))),
        ("p", res("urn:p")),
        ("o", Node::literal(format!("o{}", i))),
    ]
    .into_iter()
    .collect()
}

proptest! {
    #[test]
    fn exhausted_iterator_stays_exhausted(len in 0usize..20, extra_calls in 1usize..5, closes in 1usize..4) {
        let mut it = IteratorHandle::new(SimpleIteratorBackend::new(statements(len)));
        let mut seen = 0;
        while it.next() {
            seen += 1;
        }
        prop_assert_eq!(seen, len);
        for _ in 0..extra_calls {
            prop_assert!(!it.next());
            prop_assert_eq!(it.current(), Statement::default());
        }
        for _ in 0..closes {
            it.close();
        }
        prop_assert!(!it.next());
        prop_assert!(it.last_error().is_none());
    }

    #[test]
    fn aliases_share_one_stream(len in 1usize..20, steps in 1usize..20) {
        let mut a = IteratorHandle::new(SimpleIteratorBackend::new(statements(len)));
        let b = a.clone();
        prop_assert_eq!(a.alias_count(), 2);
        for _ in 0..steps.min(len) {
            prop_assert!(a.next());
            prop_assert_eq!(a.current(), b.current());
        }
        let rest = b.all_elements();
        prop_assert_eq!(rest.len(), len - steps.min(len));
        prop_assert!(!a.next());
    }

    #[test]
    fn drain_returns_every_element_in_order(len in 0usize..40) {
        let expected = statements(len);
        let mut it = IteratorHandle::new(SimpleIteratorBackend::new(expected.clone()));
        prop_assert_eq!(it.all_elements(), expected);
        prop_assert!(!it.next());
    }

    #[test]
    fn exactly_one_result_shape(kind in 0u8..3, len in 0usize..5, answer in any::<bool>()) {
        let result = match kind {
            0 => SimpleQueryResult::bindings(
                vec!["s".into(), "p".into(), "o".into()],
                (0..len).map(spo_row).collect(),
            ),
            1 => SimpleQueryResult::graph(statements(len)),
            _ => SimpleQueryResult::boolean(answer),
        };
        let mut it = QueryResultIterator::new(result);
        let flags = [it.is_graph(), it.is_binding(), it.is_bool()];
        prop_assert_eq!(flags.iter().filter(|f| **f).count(), 1);

        it.next();
        if !it.is_bool() {
            prop_assert!(!it.bool_value());
        }
        if !it.is_graph() {
            prop_assert_eq!(it.current_statement(), Statement::default());
        }
        if !it.is_binding() {
            prop_assert_eq!(it.binding("s"), Node::Empty);
            prop_assert_eq!(it.binding_at(0), Node::Empty);
            prop_assert!(it.binding_names().is_empty());
        }
    }

    #[test]
    fn binding_by_name_and_offset_agree(len in 1usize..10) {
        let mut it = QueryResultIterator::new(SimpleQueryResult::bindings(
            vec!["s".into(), "p".into(), "o".into()],
            (0..len).map(spo_row).collect(),
        ));
        prop_assert_eq!(it.binding_names(), vec!["s".to_string(), "p".to_string(), "o".to_string()]);
        while it.next() {
            prop_assert_eq!(it.binding("s"), it.binding_at(0));
            prop_assert_eq!(it.binding("o"), it.binding_at(2));
            prop_assert_eq!(it.binding_at(3), Node::Empty);
        }
    }
}

#[test]
fn test_missing_binding_reports_invalid_argument() {
    let mut it = QueryResultIterator::new(SimpleQueryResult::bindings(
        vec!["s".into(), "p".into(), "o".into()],
        vec![spo_row(0)],
    ));
    assert!(it.next());
    assert!(it.last_error().is_none());
    assert_eq!(it.binding("missing"), Node::Empty);
    let err = it.last_error().expect("lookup error recorded");
    assert_eq!(err.code(), ErrorCode::InvalidArgument);

    // the error belongs to the lookup, not to the end of the stream
    assert!(!it.next());
    assert!(it.last_error().is_none());
}

#[test]
fn test_current_before_first_next_is_default() {
    let it = IteratorHandle::new(SimpleIteratorBackend::new(statements(3)));
    assert_eq!(it.current(), Statement::default());
    let invalid = IteratorHandle::<Node>::invalid();
    assert!(!invalid.is_valid());
    assert_eq!(invalid.current(), Node::Empty);
    assert!(invalid.all_elements().is_empty());
}
