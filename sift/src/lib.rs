//! sift: a query micro-language for filtering in-memory record collections.
//!
//! Queries compile once against a [`PredicateRegistry`] supplied by the host
//! and then select matching records with nested AND/OR groups.

pub mod config;
pub mod error;
pub mod query;
pub mod registry;

pub use config::Config;
pub use error::{Error, Result};
pub use query::{
    Attribute, Bindings, Clause, Combinator, Group, GroupItem, GroupPath, Pluck, PredicateName, Query,
    QueryBuilder, QueryOptions, Results, Selection,
};
pub use registry::{Predicate, PredicateError, PredicateRegistry, PredicateResult};
