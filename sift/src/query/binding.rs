//! Binding resolver: replaces `?` and `:name` markers with literal values.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use super::clause::parse_literal;
use super::lexer::{marker, KeywordPair, Marker, Token};
use crate::{Error, Result};

/// Named bindings every query can use without supplying them.
fn engine_defaults() -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("true".to_string(), Value::Bool(true)),
        ("false".to_string(), Value::Bool(false)),
        ("null".to_string(), Value::Null),
        ("none".to_string(), Value::Null),
    ])
}

/// Caller-supplied binding values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    /// Values consumed in order by `?` markers
    pub positional: Vec<Value>,
    /// Values looked up by `:name` markers
    pub named: BTreeMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A token after binding resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Open,
    Close,
    And,
    Or,
    Term(Term),
}

/// A clause term: literal text from the query or a substituted value.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Word(String),
    Value(Value),
    Keywords(Vec<KeywordArg>),
}

impl Term {
    /// Text usable as a name (attribute path or predicate).
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Term::Word(word) => Some(word),
            Term::Value(Value::String(s)) => Some(s),
            _ => None,
        }
    }
}

/// One resolved keyword segment entry.
#[derive(Debug, Clone, PartialEq)]
pub enum KeywordArg {
    /// `key=value`
    Named(String, Value),
    /// Bare `key`, passed as an extra positional argument
    Positional(Value),
}

/// Resolve every marker in a token stream in a single left-to-right pass.
///
/// `defaults` are layered over the engine's own defaults; `bindings.named`
/// wins over both.
pub fn resolve(
    tokens: &[Token],
    bindings: &Bindings,
    defaults: &BTreeMap<String, Value>,
) -> Result<Vec<Bound>> {
    let expected = count_positional(tokens);
    if expected != bindings.positional.len() {
        return Err(Error::BindingCount {
            expected,
            supplied: bindings.positional.len(),
        });
    }

    let mut named = engine_defaults();
    named.extend(defaults.iter().map(|(k, v)| (k.clone(), v.clone())));
    named.extend(bindings.named.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut resolver = Resolver {
        positional: bindings.positional.iter(),
        named: &named,
    };

    tokens
        .iter()
        .map(|token| {
            Ok(match token {
                Token::Open => Bound::Open,
                Token::Close => Bound::Close,
                Token::And => Bound::And,
                Token::Or => Bound::Or,
                Token::Word(word) => Bound::Term(Term::Word(word.clone())),
                Token::Positional => Bound::Term(Term::Value(resolver.take(&Marker::Positional)?)),
                Token::Named(name) => {
                    Bound::Term(Term::Value(resolver.take(&Marker::Named(name.clone()))?))
                }
                Token::Keywords(pairs) => Bound::Term(Term::Keywords(
                    pairs
                        .iter()
                        .map(|pair| resolver.keyword(pair))
                        .collect::<Result<_>>()?,
                )),
            })
        })
        .collect()
}

struct Resolver<'a> {
    positional: std::slice::Iter<'a, Value>,
    named: &'a BTreeMap<String, Value>,
}

impl Resolver<'_> {
    fn take(&mut self, m: &Marker) -> Result<Value> {
        match m {
            // Counted up front, so running dry here means a miscount
            Marker::Positional => self.positional.next().cloned().ok_or(Error::BindingCount {
                expected: 0,
                supplied: 0,
            }),
            Marker::Named(name) => self
                .named
                .get(name)
                .cloned()
                .ok_or_else(|| Error::MissingBinding(name.clone())),
        }
    }

    fn keyword(&mut self, pair: &KeywordPair) -> Result<KeywordArg> {
        match (marker(&pair.key)?, &pair.value) {
            (Some(_), Some(_)) => Err(Error::InvalidKeyword(format!(
                "binding marker '{}' cannot be used as a keyword name",
                pair.key
            ))),
            (Some(m), None) => Ok(KeywordArg::Positional(self.take(&m)?)),
            (None, Some(value)) => {
                let value = match marker(value)? {
                    Some(m) => self.take(&m)?,
                    None => parse_literal(value),
                };
                Ok(KeywordArg::Named(pair.key.clone(), value))
            }
            (None, None) => Ok(KeywordArg::Positional(parse_literal(&pair.key))),
        }
    }
}

fn count_positional(tokens: &[Token]) -> usize {
    tokens
        .iter()
        .map(|token| match token {
            Token::Positional => 1,
            Token::Keywords(pairs) => pairs
                .iter()
                .flat_map(|pair| std::iter::once(&pair.key).chain(pair.value.as_ref()))
                .filter(|text| matches!(marker(text), Ok(Some(Marker::Positional))))
                .count(),
            _ => 0,
        })
        .sum()
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Word(word) => write!(f, "{}", word),
            Term::Value(value) => write!(f, "{}", value),
            Term::Keywords(args) => {
                let parts: Vec<String> = args
                    .iter()
                    .map(|arg| match arg {
                        KeywordArg::Named(key, value) => format!("{}={}", key, value),
                        KeywordArg::Positional(value) => value.to_string(),
                    })
                    .collect();
                write!(f, "`{}`", parts.join("&"))
            }
        }
    }
}
