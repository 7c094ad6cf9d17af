//! Tests for compiled queries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use serde_json::{json, Map, Value};

use super::*;
use crate::registry::{PredicateError, PredicateRegistry, PredicateResult};
use crate::{Config, Error};

/// Registry with `equals`, `greaterthan` and `in`, all counting their calls.
fn registry(calls: Arc<AtomicUsize>) -> PredicateRegistry {
    let mut registry = PredicateRegistry::new();

    let counter = calls.clone();
    registry
        .register("builtin.tests.equals", move |v: Option<&Value>, args: &[Value], _: &Map<String, Value>| -> PredicateResult {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(v == args.first())
        })
        .unwrap();

    let counter = calls.clone();
    registry
        .register("builtin.tests.greaterthan", move |v: Option<&Value>, args: &[Value], kwargs: &Map<String, Value>| -> PredicateResult {
            counter.fetch_add(1, Ordering::SeqCst);
            let (Some(a), Some(b)) = (v.and_then(Value::as_f64), args.first().and_then(Value::as_f64)) else {
                return Ok(false);
            };
            let inclusive = kwargs.get("inclusive").and_then(Value::as_bool).unwrap_or(false);
            Ok(if inclusive { a >= b } else { a > b })
        })
        .unwrap();

    registry
        .register("builtin.tests.in", move |v: Option<&Value>, args: &[Value], _: &Map<String, Value>| -> PredicateResult {
            calls.fetch_add(1, Ordering::SeqCst);
            match (v, args.first()) {
                (Some(v), Some(Value::Array(items))) => Ok(items.contains(v)),
                _ => Err::<bool, PredicateError>("in expects a list".into()),
            }
        })
        .unwrap();

    registry
}

fn pets() -> Vec<Value> {
    vec![
        json!({"type": "cat", "age": 3}),
        json!({"type": "dog", "age": 7}),
        json!({"type": "dog", "age": 1}),
    ]
}

fn many(results: &Results) -> &[Value] {
    match &results.selection {
        Selection::Many(values) => values,
        other => panic!("Expected many, got {:?}", other),
    }
}

#[test]
fn test_positional_bindings_scenario() {
    let registry = registry(Arc::default());
    let query = Query::builder("( type equals ? and age greaterthan ? )")
        .bind("dog")
        .bind(2)
        .build(&registry, &Config::default(), pets())
        .unwrap();
    let results = query.results().unwrap();
    assert_eq!(many(&results), &[json!({"type": "dog", "age": 7})]);
    assert_eq!(results.elapsed, None);
}

#[test]
fn test_named_bindings_scenario() {
    let registry = registry(Arc::default());
    let query = Query::builder("( type equals :t1 or type equals :t2 )")
        .bind_named("t1", "cat")
        .bind_named("t2", "dog")
        .build(&registry, &Config::default(), pets())
        .unwrap();
    assert_eq!(many(&query.results().unwrap()), pets().as_slice());
}

#[test]
fn test_bound_value_same_as_literal() {
    let registry = registry(Arc::default());
    let config = Config::default();
    let bound = Query::builder("age equals ?")
        .bind(7)
        .build(&registry, &config, pets())
        .unwrap();
    let literal = Query::new("age equals 7", &registry, &config, pets()).unwrap();
    assert_eq!(bound.results().unwrap(), literal.results().unwrap());
    assert_eq!(bound.root(), literal.root());
}

#[test]
fn test_negation() {
    let registry = registry(Arc::default());
    let query = Query::new("type not equals dog", &registry, &Config::default(), pets()).unwrap();
    assert_eq!(many(&query.results().unwrap()), &[json!({"type": "cat", "age": 3})]);
}

#[test]
fn test_empty_records_yield_default() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = registry(calls.clone());
    let query = Query::builder("type equals dog")
        .default_value(json!([]))
        .build(&registry, &Config::default(), Vec::new())
        .unwrap();
    let results = query.results().unwrap();
    assert_eq!(results.selection, Selection::Default(json!([])));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_no_match_yields_default() {
    let registry = registry(Arc::default());
    let query = Query::new("type equals fish", &registry, &Config::default(), pets()).unwrap();
    assert!(query.results().unwrap().selection.is_default());
    assert_eq!(query.results().unwrap().selection.into_value(), Value::Null);
}

#[test]
fn test_first_returns_single_record() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = registry(calls.clone());
    let query = Query::builder("type equals dog")
        .first(true)
        .build(&registry, &Config::default(), pets())
        .unwrap();
    let results = query.results().unwrap();
    assert_eq!(results.selection, Selection::One(json!({"type": "dog", "age": 7})));
    // cat, then the first dog; the second dog is never tested
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_first_without_match() {
    let registry = registry(Arc::default());
    let query = Query::builder("age greaterthan 10")
        .first(true)
        .default_value("none")
        .build(&registry, &Config::default(), pets())
        .unwrap();
    assert_eq!(query.results().unwrap().selection, Selection::Default(json!("none")));
}

#[test]
fn test_pluck() {
    let registry = registry(Arc::default());
    let config = Config::default();
    let query = Query::builder("type equals dog")
        .pluck(Pluck::Field("age".to_string()))
        .build(&registry, &config, pets())
        .unwrap();
    assert_eq!(many(&query.results().unwrap()), &[json!(7), json!(1)]);

    let query = Query::builder("type equals dog")
        .pluck(Pluck::Fields(vec!["age".to_string()]))
        .first(true)
        .build(&registry, &config, pets())
        .unwrap();
    assert_eq!(query.results().unwrap().selection, Selection::One(json!({"age": 7})));
}

#[test]
fn test_debug_reports_elapsed() {
    let registry = registry(Arc::default());
    let query = Query::builder("type equals dog")
        .debug(true)
        .build(&registry, &Config::default(), pets())
        .unwrap();
    assert!(query.results().unwrap().elapsed.is_some());
}

#[test]
fn test_results_memoized_and_idempotent() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = registry(calls.clone());
    let query = Query::new("type equals dog or age greaterthan 2", &registry, &Config::default(), pets()).unwrap();
    let first = query.results().unwrap();
    let after_first = calls.load(Ordering::SeqCst);
    let second = query.results().unwrap();
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), after_first);
}

#[test]
fn test_set_data_invalidates_memo() {
    let registry = registry(Arc::default());
    let mut query = Query::new("type equals dog", &registry, &Config::default(), pets()).unwrap();
    assert_eq!(query.matches().unwrap().len(), 2);

    query.set_data(vec![json!({"type": "dog"}), json!({"type": "cow"})]).unwrap();
    assert_eq!(query.matches().unwrap(), vec![&json!({"type": "dog"})]);
    assert_eq!(query.normalized(), "( type equals dog )");
}

#[test]
fn test_malformed_query_never_calls_predicates() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = registry(calls.clone());
    let config = Config::default();
    for bad in ["( type equals dog", "type equals `x", "", "type equals ? and age equals ?"] {
        let result = Query::builder(bad).bind(1).build(&registry, &config, pets());
        assert!(result.is_err(), "{:?} should fail to compile", bad);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_compile_errors() {
    let registry = registry(Arc::default());
    let config = Config::default();
    let build = |q: &str| Query::new(q, &registry, &config, pets()).map(|_| ());

    assert!(matches!(build("   "), Err(Error::EmptyQuery)));
    assert!(matches!(build("(type equals dog))"), Err(Error::UnbalancedParens(_))));
    assert!(matches!(build("type equals `a=1"), Err(Error::OddBackticks(_))));
    assert!(matches!(build("type equals ?"), Err(Error::BindingCount { expected: 1, supplied: 0 })));
    assert!(matches!(build("type equals :kind"), Err(Error::MissingBinding(_))));
    assert!(matches!(build("type acme.equals dog"), Err(Error::InvalidPredicateName(_))));
    assert!(matches!(
        build("( type equals dog or age equals 1 ) ( age equals 3 or age equals 2 )"),
        Err(Error::MissingCombinator(_))
    ));
    assert!(matches!(
        build("( type equals dog ) ( age greaterthan 2 )"),
        Err(Error::MissingCombinator(_))
    ));
    assert!(matches!(build("type equals dog and and age equals 1"), Err(Error::InvalidClause(_))));
    assert!(matches!(build("type equals dog or"), Err(Error::InvalidClause(_))));
    assert!(matches!(build("type equals :my-kind"), Err(Error::InvalidMarker(_))));
}

#[test]
fn test_unknown_predicate_is_runtime_error() {
    let registry = registry(Arc::default());
    let query = Query::new("type resembles dog", &registry, &Config::default(), pets()).unwrap();
    assert!(matches!(query.results(), Err(Error::UnknownPredicate(_))));
}

#[test]
fn test_unknown_predicate_not_hidden_by_short_circuit() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = registry(calls.clone());
    let config = Config::default();
    for text in ["type equals fish and age bogus 3", "age greaterthan 0 or type bogus x"] {
        let query = Query::new(text, &registry, &config, pets()).unwrap();
        assert!(
            matches!(query.results(), Err(Error::UnknownPredicate(_))),
            "{:?} should fail on the unknown predicate",
            text
        );
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_predicate_error_propagates() {
    let registry = registry(Arc::default());
    let query = Query::new("type in dog", &registry, &Config::default(), pets()).unwrap();
    match query.results() {
        Err(Error::Predicate { name, source }) => {
            assert_eq!(name.to_string(), "builtin.tests.in");
            assert_eq!(source.to_string(), "in expects a list");
        }
        other => panic!("Expected predicate error, got {:?}", other.map(|r| r.selection)),
    }
}

#[test]
fn test_keyword_arguments() {
    let registry = registry(Arc::default());
    let query = Query::new("age greaterthan 3 `inclusive=true`", &registry, &Config::default(), pets()).unwrap();
    assert_eq!(many(&query.results().unwrap()), &[json!({"type": "cat", "age": 3}), json!({"type": "dog", "age": 7})]);
}

#[test]
fn test_scalar_collection() {
    let registry = registry(Arc::default());
    let query = Query::builder("equals ? or greaterthan 10")
        .bind(3)
        .build(&registry, &Config::default(), vec![json!(1), json!(3), json!(12), json!(3)])
        .unwrap();
    assert!(query.is_scalar());
    assert_eq!(many(&query.results().unwrap()), &[json!(3), json!(12), json!(3)]);
}

#[test]
fn test_nested_attribute_path() {
    let registry = registry(Arc::default());
    let records = vec![
        json!({"name": "rex", "owner": {"name": "ann"}}),
        json!({"name": "tom", "owner": {"name": "bob"}}),
    ];
    let query = Query::new("owner.name equals bob", &registry, &Config::default(), records).unwrap();
    assert_eq!(query.matches().unwrap(), vec![&json!({"name": "tom", "owner": {"name": "bob"}})]);
}

#[test]
fn test_with_map_splits_options() {
    let registry = registry(Arc::default());
    let map = match json!({"t": "dog", "first": true, "pluck": "age", "op_or": "|"}) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    let query = Query::builder("type equals :t | age equals 3")
        .with_map(map)
        .unwrap()
        .build(&registry, &Config::default(), pets())
        .unwrap();
    assert_eq!(query.root().combinator, Combinator::Any);
    assert_eq!(query.results().unwrap().selection, Selection::One(json!(3)));
}

#[test]
fn test_with_map_keeps_earlier_options() {
    let registry = registry(Arc::default());
    let map = match json!({"t": "dog"}) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    let query = Query::builder("type equals :t")
        .first(true)
        .default_value("none")
        .with_map(map)
        .unwrap()
        .build(&registry, &Config::default(), pets())
        .unwrap();
    assert!(query.options().first);
    assert_eq!(query.options().default, json!("none"));
    assert_eq!(query.results().unwrap().selection, Selection::One(json!({"type": "dog", "age": 7})));
}

#[test]
fn test_set_data_follows_record_shape() {
    let registry = registry(Arc::default());
    let mut query = Query::new("greaterthan 2", &registry, &Config::default(), Vec::new()).unwrap();
    assert!(!query.is_scalar());

    query.set_data(vec![json!(1), json!(5), json!(3)]).unwrap();
    assert!(query.is_scalar());
    assert_eq!(many(&query.results().unwrap()), &[json!(5), json!(3)]);

    let mut query = Query::new("age greaterthan 2", &registry, &Config::default(), pets()).unwrap();
    query.set_data(vec![json!(1), json!(5)]).unwrap();
    // In scalar mode `age` becomes the predicate name
    assert!(matches!(query.results(), Err(Error::UnknownPredicate(_))));

    // An empty record set keeps the compiled shape
    query.set_data(Vec::new()).unwrap();
    assert!(query.is_scalar());
}

#[test]
fn test_wrapped_flag_and_explain() {
    let registry = registry(Arc::default());
    let config = Config::default();
    let implicit = Query::new("type equals dog and age greaterthan 2", &registry, &config, pets()).unwrap();
    assert!(implicit.is_wrapped());
    let explicit = Query::new("(type equals dog and age greaterthan 2)", &registry, &config, pets()).unwrap();
    assert!(!explicit.is_wrapped());
    assert_eq!(implicit.root(), explicit.root());
    assert_eq!(
        explicit.explain(),
        "group 0 (all)\n  type builtin.tests.equals \"dog\"\n  age builtin.tests.greaterthan 2\n"
    );
}

#[test]
fn test_concurrent_readers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = registry(calls.clone());
    let query = Query::new("type equals dog", &registry, &Config::default(), pets()).unwrap();
    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                assert_eq!(query.matches().unwrap().len(), 2);
            });
        }
    });
}
