//! Predicate registry.
//!
//! The engine implements no predicate itself. The host builds one registry
//! at start-up, registers its predicates under fully qualified names, and
//! passes it by reference to every query.

use std::collections::HashMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::query::PredicateName;
use crate::{Error, Result};

/// Error raised from inside a predicate; surfaced to the caller unchanged.
pub type PredicateError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of one predicate call.
pub type PredicateResult = std::result::Result<bool, PredicateError>;

/// A named boolean test.
///
/// `value` is the tested attribute (`None` when the record lacks it), `args`
/// the positional arguments written after the predicate name and `kwargs`
/// the keyword arguments from backtick segments.
pub trait Predicate: Send + Sync {
    fn test(&self, value: Option<&Value>, args: &[Value], kwargs: &Map<String, Value>) -> PredicateResult;
}

impl<F> Predicate for F
where
    F: Fn(Option<&Value>, &[Value], &Map<String, Value>) -> PredicateResult + Send + Sync,
{
    fn test(&self, value: Option<&Value>, args: &[Value], kwargs: &Map<String, Value>) -> PredicateResult {
        self(value, args, kwargs)
    }
}

/// Mapping from qualified predicate names to predicates.
#[derive(Default)]
pub struct PredicateRegistry {
    predicates: HashMap<PredicateName, Box<dyn Predicate>>,
}

impl PredicateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a predicate under a fully qualified `namespace.subspace.leaf`
    /// name, replacing any previous entry.
    pub fn register(&mut self, name: &str, predicate: impl Predicate + 'static) -> Result<()> {
        let name = PredicateName::qualified(name)?;
        tracing::trace!(predicate = %name, "registered predicate");
        self.predicates.insert(name, Box::new(predicate));
        Ok(())
    }

    /// Look up a predicate by qualified name.
    pub fn resolve(&self, name: &PredicateName) -> Result<&dyn Predicate> {
        self.predicates
            .get(name)
            .map(|p| p.as_ref())
            .ok_or_else(|| Error::UnknownPredicate(name.clone()))
    }

    /// Resolve and call a predicate, tagging failures with its name.
    pub fn invoke(
        &self,
        name: &PredicateName,
        value: Option<&Value>,
        args: &[Value],
        kwargs: &Map<String, Value>,
    ) -> Result<bool> {
        self.resolve(name)?
            .test(value, args, kwargs)
            .map_err(|source| Error::Predicate {
                name: name.clone(),
                source,
            })
    }

    pub fn contains(&self, name: &PredicateName) -> bool {
        self.predicates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&PredicateName> {
        let mut names: Vec<_> = self.predicates.keys().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateRegistry")
            .field("predicates", &self.names())
            .finish()
    }
}
