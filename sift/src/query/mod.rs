//! Query micro-language for filtering record collections.
//!
//! # Syntax Overview
//!
//! A query is a boolean combination of clauses:
//!
//! - **Clause**: `attribute [not] predicate [args...]`, e.g. `age greaterthan 2`
//! - **Operators**: `and`/`AND`/`&&`, `or`/`OR`/`||` (configurable)
//! - **Groups**: `( ... )`, nested freely
//! - **Bindings**: `?` (positional) and `:name` (named)
//! - **Keyword args**: `` `key=value&flag` `` (percent-encoded)
//!
//! Predicate names without a namespace resolve to the default namespace;
//! in scalar collections the attribute is omitted.
//!
//! Pipeline: [`lexer`] → [`binding`] → [`parser`] (using the clause
//! compiler) → evaluator.

pub mod binding;
pub mod clause;
mod eval;
pub mod lexer;
mod options;
pub mod parser;
mod program;

pub use binding::Bindings;
pub use clause::{Attribute, Clause, PredicateName};
pub use options::{Pluck, QueryOptions, RESERVED_KEYS};
pub use parser::{Combinator, Group, GroupItem, GroupPath};
pub use program::{Query, QueryBuilder, Results, Selection};

#[cfg(test)]
mod tests;
