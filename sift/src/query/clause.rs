//! Predicate clause compiler.
//!
//! A clause is the run of terms collected between two operators or group
//! boundaries, e.g. `age not greaterthan 5 `inclusive=true``.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use super::binding::{KeywordArg, Term};
use crate::{Config, Error, Result};

/// Where a clause reads its tested value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// The record itself (scalar collections)
    Whole,
    /// Dotted path into a record: `owner.name`, `tags.0`
    Path(Vec<String>),
}

impl Attribute {
    /// Build a path attribute from dotted text.
    pub fn from_path(path: &str) -> Self {
        Attribute::Path(path.split('.').map(str::to_string).collect())
    }

    /// Resolve against a record. Array segments are indexed by number.
    pub fn lookup<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        let segments = match self {
            Attribute::Whole => return Some(record),
            Attribute::Path(segments) => segments,
        };
        segments.iter().try_fold(record, |value, segment| match value {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }
}

/// A fully qualified predicate name: `namespace.subspace.leaf`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PredicateName {
    pub namespace: String,
    pub subspace: String,
    pub leaf: String,
}

impl PredicateName {
    /// Parse a name that must already be fully qualified.
    pub fn qualified(name: &str) -> Result<Self> {
        let segments: Vec<&str> = name.split('.').collect();
        match segments.as_slice() {
            [namespace, subspace, leaf]
                if !namespace.is_empty() && !subspace.is_empty() && !leaf.is_empty() =>
            {
                Ok(Self {
                    namespace: namespace.to_string(),
                    subspace: subspace.to_string(),
                    leaf: leaf.to_string(),
                })
            }
            _ => Err(Error::InvalidPredicateName(name.to_string())),
        }
    }

    /// Qualify a name as written in a query.
    ///
    /// Unqualified names land in the default namespace and a leading short
    /// prefix is expanded to its namespace.
    pub fn resolve(name: &str, config: &Config) -> Result<Self> {
        let expanded = match name.split_once('.') {
            None => format!("{}.{}", config.default_namespace, name),
            Some((prefix, rest)) => match config.prefixes.get(prefix) {
                Some(namespace) => format!("{}.{}", namespace, rest),
                None => name.to_string(),
            },
        };
        Self::qualified(&expanded).map_err(|_| Error::InvalidPredicateName(name.to_string()))
    }
}

impl fmt::Display for PredicateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.namespace, self.subspace, self.leaf)
    }
}

impl Serialize for PredicateName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One compiled predicate test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clause {
    #[serde(serialize_with = "serialize_attribute")]
    pub attribute: Attribute,
    pub predicate: PredicateName,
    pub negate: bool,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

fn serialize_attribute<S: Serializer>(attr: &Attribute, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match attr {
        Attribute::Whole => serializer.serialize_none(),
        Attribute::Path(segments) => serializer.collect_str(&segments.join(".")),
    }
}

/// Compile one clause from the terms of a batch.
pub(crate) fn compile(terms: Vec<Term>, config: &Config, scalar: bool) -> Result<Clause> {
    let text = terms.iter().map(Term::to_string).collect::<Vec<_>>().join(" ");
    let mut terms = terms.into_iter();

    let attribute = if scalar {
        Attribute::Whole
    } else {
        let first = terms
            .next()
            .ok_or_else(|| Error::InvalidClause(text.clone()))?;
        let path = first
            .as_text()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::InvalidClause(format!("{}: attribute must be a name", text)))?;
        Attribute::from_path(path)
    };

    let mut name = terms
        .next()
        .ok_or_else(|| Error::InvalidClause(format!("{}: missing predicate", text)))?;
    let mut negate = false;
    if matches!(&name, Term::Word(w) if w == "not") {
        negate = true;
        name = terms
            .next()
            .ok_or_else(|| Error::InvalidClause(format!("{}: missing predicate after 'not'", text)))?;
    }
    let predicate = name
        .as_text()
        .ok_or_else(|| Error::InvalidPredicateName(name.to_string()))
        .and_then(|n| PredicateName::resolve(n, config))?;

    let mut args = Vec::new();
    let mut kwargs = Map::new();
    for term in terms {
        match term {
            Term::Word(word) => args.push(parse_literal(&word)),
            Term::Value(value) => args.push(value),
            Term::Keywords(entries) => {
                for entry in entries {
                    match entry {
                        KeywordArg::Named(key, value) => {
                            kwargs.insert(key, value);
                        }
                        KeywordArg::Positional(value) => args.push(value),
                    }
                }
            }
        }
    }

    Ok(Clause {
        attribute,
        predicate,
        negate,
        args,
        kwargs,
    })
}

/// Interpret a bare word as a JSON literal when it is one, else as a string.
pub fn parse_literal(word: &str) -> Value {
    serde_json::from_str(word).unwrap_or_else(|_| Value::String(word.to_string()))
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Attribute::Whole => write!(f, "<value>")?,
            Attribute::Path(segments) => write!(f, "{}", segments.join("."))?,
        }
        if self.negate {
            write!(f, " not")?;
        }
        write!(f, " {}", self.predicate)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        if !self.kwargs.is_empty() {
            write!(f, " {}", Value::Object(self.kwargs.clone()))?;
        }
        Ok(())
    }
}
