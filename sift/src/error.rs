//! Error types for sift operations.

use crate::query::{GroupPath, PredicateName};
use crate::registry::PredicateError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid query option: {0}")]
    InvalidOption(String),

    #[error("Empty query")]
    EmptyQuery,

    #[error("Unbalanced parentheses in query: {0}")]
    UnbalancedParens(String),

    #[error("Odd number of backticks in query: {0}")]
    OddBackticks(String),

    #[error("Query expects {expected} positional binding(s), {supplied} supplied")]
    BindingCount { expected: usize, supplied: usize },

    #[error("Invalid binding marker '{0}': names use letters, digits and '_'")]
    InvalidMarker(String),

    #[error("No binding supplied for :{0}")]
    MissingBinding(String),

    #[error("Invalid keyword argument: {0}")]
    InvalidKeyword(String),

    #[error("Invalid predicate name: {0}")]
    InvalidPredicateName(String),

    #[error("Invalid clause: {0}")]
    InvalidClause(String),

    #[error("Group {0} mixes several items without an and/or operator")]
    MissingCombinator(GroupPath),

    #[error("Group {0} is empty")]
    EmptyGroup(GroupPath),

    #[error("Unknown predicate: {0}")]
    UnknownPredicate(PredicateName),

    #[error("Predicate {name} failed: {source}")]
    Predicate {
        name: PredicateName,
        #[source]
        source: PredicateError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
