//! Standard predicates registered by siftq.
//!
//! All tests live under `builtin.tests`; `sift.extra` holds the ones reached
//! through the `x.` prefix.

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::{Map, Value};
use sift::{PredicateError, PredicateRegistry, PredicateResult};

type Kwargs = Map<String, Value>;

/// Build the registry used by every siftq command.
pub fn standard_registry() -> sift::Result<PredicateRegistry> {
    let mut registry = PredicateRegistry::new();

    for name in ["equals", "eq", "=="] {
        registry.register(&format!("builtin.tests.{}", name), equals)?;
    }
    for name in ["ne", "!="] {
        registry.register(&format!("builtin.tests.{}", name), not_equals)?;
    }
    for name in ["greaterthan", "gt", ">"] {
        registry.register(&format!("builtin.tests.{}", name), compare(|o| o == Ordering::Greater))?;
    }
    for name in ["ge", ">="] {
        registry.register(&format!("builtin.tests.{}", name), compare(|o| o != Ordering::Less))?;
    }
    for name in ["lessthan", "lt", "<"] {
        registry.register(&format!("builtin.tests.{}", name), compare(|o| o == Ordering::Less))?;
    }
    for name in ["le", "<="] {
        registry.register(&format!("builtin.tests.{}", name), compare(|o| o != Ordering::Greater))?;
    }
    registry.register("builtin.tests.in", is_in)?;
    registry.register("builtin.tests.contains", contains)?;
    registry.register("builtin.tests.match", |v: Option<&Value>, args: &[Value], kwargs: &Kwargs| -> PredicateResult {
        regex_test(v, args, kwargs, true)
    })?;
    registry.register("builtin.tests.search", |v: Option<&Value>, args: &[Value], kwargs: &Kwargs| -> PredicateResult {
        regex_test(v, args, kwargs, false)
    })?;
    registry.register("builtin.tests.startswith", starts_with)?;
    registry.register("builtin.tests.endswith", ends_with)?;
    registry.register("builtin.tests.defined", |v: Option<&Value>, _: &[Value], _: &Kwargs| -> PredicateResult {
        Ok(v.is_some())
    })?;
    registry.register("builtin.tests.none", |v: Option<&Value>, _: &[Value], _: &Kwargs| -> PredicateResult {
        Ok(matches!(v, Some(Value::Null)))
    })?;
    registry.register("builtin.tests.truthy", |v: Option<&Value>, _: &[Value], _: &Kwargs| -> PredicateResult {
        Ok(v.is_some_and(truthy))
    })?;
    registry.register("sift.extra.between", between)?;

    Ok(registry)
}

fn arg<'a>(args: &'a [Value], index: usize, predicate: &str) -> Result<&'a Value, PredicateError> {
    args.get(index)
        .ok_or_else(|| format!("{} expects at least {} argument(s)", predicate, index + 1).into())
}

fn equals(v: Option<&Value>, args: &[Value], _: &Kwargs) -> PredicateResult {
    let expected = arg(args, 0, "equals")?;
    Ok(v.is_some_and(|v| loosely_equal(v, expected)))
}

fn not_equals(v: Option<&Value>, args: &[Value], kwargs: &Kwargs) -> PredicateResult {
    equals(v, args, kwargs).map(|eq| !eq)
}

/// Numbers compare by value regardless of integer/float representation.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare(
    accept: fn(Ordering) -> bool,
) -> impl Fn(Option<&Value>, &[Value], &Kwargs) -> PredicateResult + Send + Sync {
    move |v: Option<&Value>, args: &[Value], _: &Kwargs| -> PredicateResult {
        let bound = arg(args, 0, "comparison")?;
        Ok(v.and_then(|v| order(v, bound)).is_some_and(accept))
    }
}

fn starts_with(v: Option<&Value>, args: &[Value], _: &Kwargs) -> PredicateResult {
    let prefix = arg(args, 0, "startswith")?;
    Ok(matches!((v, prefix), (Some(Value::String(s)), Value::String(p)) if s.starts_with(p.as_str())))
}

fn ends_with(v: Option<&Value>, args: &[Value], _: &Kwargs) -> PredicateResult {
    let suffix = arg(args, 0, "endswith")?;
    Ok(matches!((v, suffix), (Some(Value::String(s)), Value::String(p)) if s.ends_with(p.as_str())))
}

fn between(v: Option<&Value>, args: &[Value], kwargs: &Kwargs) -> PredicateResult {
    let low = arg(args, 0, "between")?;
    let high = arg(args, 1, "between")?;
    let inclusive = kwargs.get("inclusive").and_then(Value::as_bool).unwrap_or(true);
    let Some(v) = v else {
        return Ok(false);
    };
    let (Some(lo), Some(hi)) = (order(v, low), order(v, high)) else {
        return Ok(false);
    };
    Ok(if inclusive {
        lo != Ordering::Less && hi != Ordering::Greater
    } else {
        lo == Ordering::Greater && hi == Ordering::Less
    })
}

fn is_in(v: Option<&Value>, args: &[Value], _: &Kwargs) -> PredicateResult {
    let Some(v) = v else {
        return Ok(false);
    };
    match arg(args, 0, "in")? {
        Value::Array(items) => Ok(items.iter().any(|item| loosely_equal(v, item))),
        Value::String(s) => Ok(v.as_str().is_some_and(|needle| s.contains(needle))),
        // Several bare arguments act as the list
        _ => Ok(args.iter().any(|item| loosely_equal(v, item))),
    }
}

fn contains(v: Option<&Value>, args: &[Value], _: &Kwargs) -> PredicateResult {
    let needle = arg(args, 0, "contains")?;
    Ok(match v {
        Some(Value::Array(items)) => items.iter().any(|item| loosely_equal(item, needle)),
        Some(Value::String(s)) => needle.as_str().is_some_and(|n| s.contains(n)),
        Some(Value::Object(map)) => needle.as_str().is_some_and(|key| map.contains_key(key)),
        _ => false,
    })
}

fn regex_test(v: Option<&Value>, args: &[Value], kwargs: &Kwargs, anchored: bool) -> PredicateResult {
    let pattern = match arg(args, 0, "match")? {
        Value::String(p) => p.clone(),
        other => other.to_string(),
    };
    let pattern = if anchored { format!("^(?:{})", pattern) } else { pattern };
    let flag = |key: &str| kwargs.get(key).and_then(Value::as_bool).unwrap_or(false);
    let regex = RegexBuilder::new(&pattern)
        .case_insensitive(flag("ignorecase"))
        .multi_line(flag("multiline"))
        .build()?;
    Ok(match v {
        Some(Value::String(s)) => regex.is_match(s),
        Some(Value::Number(n)) => regex.is_match(&n.to_string()),
        _ => false,
    })
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sift::{Config, Query, Selection};

    fn run(query: &str, records: Vec<Value>) -> Selection {
        let registry = standard_registry().unwrap();
        Query::new(query, &registry, &Config::default(), records)
            .unwrap()
            .results()
            .unwrap()
            .selection
    }

    fn hosts() -> Vec<Value> {
        vec![
            json!({"name": "web01", "port": 80, "tags": ["prod", "web"]}),
            json!({"name": "db01", "port": 5432, "tags": ["prod"]}),
            json!({"name": "web02", "port": 8080.0, "tags": []}),
        ]
    }

    #[test]
    fn test_registry_names() {
        let registry = standard_registry().unwrap();
        assert!(registry.contains(&sift::PredicateName::qualified("builtin.tests.equals").unwrap()));
        assert!(registry.contains(&sift::PredicateName::qualified("sift.extra.between").unwrap()));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            run("port gt 1000 and port lt 6000", hosts()),
            Selection::Many(vec![hosts()[1].clone()])
        );
        assert_eq!(run("port >= 8080", hosts()), Selection::Many(vec![hosts()[2].clone()]));
        assert_eq!(run("port == 8080", hosts()), Selection::Many(vec![hosts()[2].clone()]));
    }

    #[test]
    fn test_regex_and_kwargs() {
        assert_eq!(
            run("name match WEB `ignorecase=true`", hosts()),
            Selection::Many(vec![hosts()[0].clone(), hosts()[2].clone()])
        );
        assert_eq!(run("name match 01", hosts()), Selection::Default(Value::Null));
        assert_eq!(
            run("name search 01", hosts()),
            Selection::Many(vec![hosts()[0].clone(), hosts()[1].clone()])
        );
    }

    #[test]
    fn test_collections() {
        assert_eq!(
            run("tags contains web or name in [\"db01\"]", hosts()),
            Selection::Many(vec![hosts()[0].clone(), hosts()[1].clone()])
        );
        assert_eq!(run("tags not truthy", hosts()), Selection::Many(vec![hosts()[2].clone()]));
        assert_eq!(run("missing defined", hosts()), Selection::Default(Value::Null));
    }

    #[test]
    fn test_prefixed_between() {
        assert_eq!(
            run("port x.between 80 5432 `inclusive=false`", hosts()),
            Selection::Default(Value::Null)
        );
        assert_eq!(
            run("port x.between 80 5432", hosts()),
            Selection::Many(vec![hosts()[0].clone(), hosts()[1].clone()])
        );
    }

    #[test]
    fn test_invalid_regex_is_predicate_error() {
        let registry = standard_registry().unwrap();
        let query = Query::new("name match (", &registry, &Config::default(), hosts());
        // Unbalanced paren is a compile error before the regex is ever built
        assert!(matches!(query, Err(sift::Error::UnbalancedParens(_))));

        let query = Query::new("name match [", &registry, &Config::default(), hosts()).unwrap();
        assert!(matches!(query.results(), Err(sift::Error::Predicate { .. })));
    }
}
