//! Compiled queries: construct once, execute against a record set.

use std::sync::OnceLock;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};

use super::binding::{self, Bindings, Bound};
use super::eval::Evaluator;
use super::lexer::{self, Operators, Token};
use super::options::{Pluck, QueryOptions};
use super::parser::{self, Group};
use crate::registry::PredicateRegistry;
use crate::{Config, Result};

/// What a query execution returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Selection {
    /// Every matched (and possibly plucked) record, in original order
    Many(Vec<Value>),
    /// The first match, when the `first` option is set
    One(Value),
    /// The `default` option: no records, or nothing matched
    Default(Value),
}

impl Selection {
    pub fn into_value(self) -> Value {
        match self {
            Selection::Many(values) => Value::Array(values),
            Selection::One(value) | Selection::Default(value) => value,
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Selection::Default(_))
    }
}

/// Result of [`Query::results`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Results {
    pub selection: Selection,
    /// Wall-clock evaluation time, when the `debug` option is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<Duration>,
}

/// Builder collecting the query text, bindings and options.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    query: String,
    bindings: Bindings,
    options: QueryOptions,
}

impl QueryBuilder {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            bindings: Bindings::new(),
            options: QueryOptions::default(),
        }
    }

    /// Append the value for the next `?` marker.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.bindings.positional.push(value.into());
        self
    }

    /// Append values for the next `?` markers.
    pub fn bind_all<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.bindings.positional.extend(values.into_iter().map(Into::into));
        self
    }

    /// Bind a value to `:name`.
    pub fn bind_named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.named.insert(name.into(), value.into());
        self
    }

    /// Apply a combined map: reserved keys set options, other keys bind names.
    ///
    /// Options the map does not mention keep their current values.
    pub fn with_map(mut self, map: Map<String, Value>) -> Result<Self> {
        let named = self.options.merge(map)?;
        self.bindings.named.extend(named);
        Ok(self)
    }

    pub fn options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.options.default = value.into();
        self
    }

    pub fn first(mut self, first: bool) -> Self {
        self.options.first = first;
        self
    }

    pub fn pluck(mut self, pluck: Pluck) -> Self {
        self.options.pluck = Some(pluck);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    /// Compile the query. Every syntax and binding error surfaces here,
    /// before any predicate runs.
    pub fn build<'r>(
        self,
        registry: &'r PredicateRegistry,
        config: &Config,
        records: Vec<Value>,
    ) -> Result<Query<'r>> {
        self.options.validate()?;

        let ops = Operators::new(
            self.options.op_and.clone().unwrap_or_else(|| config.and_ops.clone()),
            self.options.op_or.clone().unwrap_or_else(|| config.or_ops.clone()),
        );
        let lexed = lexer::tokenize(&self.query, &ops)?;
        let bound = binding::resolve(&lexed.tokens, &self.bindings, &config.default_bindings)?;

        let scalar = is_scalar(&records);
        let root = parser::build(bound.clone(), config, scalar)?;

        tracing::debug!(
            query = %self.query,
            normalized = %lexer::render(&lexed.tokens),
            groups = root.group_count(),
            scalar,
            "compiled query"
        );

        Ok(Query {
            raw: self.query,
            tokens: lexed.tokens,
            bound,
            config: config.clone(),
            wrapped: lexed.wrapped,
            scalar,
            root,
            options: self.options,
            registry,
            records,
            memo: OnceLock::new(),
        })
    }
}

/// Scalar collections hold no JSON object; clauses then test whole records.
fn is_scalar(records: &[Value]) -> bool {
    !records.is_empty() && records.iter().all(|r| !r.is_object())
}

/// An immutable compiled query bound to a record set.
#[derive(Debug)]
pub struct Query<'r> {
    raw: String,
    tokens: Vec<Token>,
    /// Resolved tokens, kept to recompile clauses when the record shape changes
    bound: Vec<Bound>,
    config: Config,
    wrapped: bool,
    scalar: bool,
    root: Group,
    options: QueryOptions,
    registry: &'r PredicateRegistry,
    records: Vec<Value>,
    /// Matched record indices for the current record set
    memo: OnceLock<Vec<usize>>,
}

impl<'r> Query<'r> {
    pub fn builder(query: impl Into<String>) -> QueryBuilder {
        QueryBuilder::new(query)
    }

    /// Compile a query without bindings or options.
    pub fn new(
        query: impl Into<String>,
        registry: &'r PredicateRegistry,
        config: &Config,
        records: Vec<Value>,
    ) -> Result<Self> {
        QueryBuilder::new(query).build(registry, config, records)
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Normalized tokens, before binding resolution.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Canonical text of the normalized query.
    pub fn normalized(&self) -> String {
        lexer::render(&self.tokens)
    }

    /// Whether the outer group was synthesized around the query text.
    pub fn is_wrapped(&self) -> bool {
        self.wrapped
    }

    /// Whether clauses test whole records rather than attributes.
    pub fn is_scalar(&self) -> bool {
        self.scalar
    }

    pub fn root(&self) -> &Group {
        &self.root
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }

    /// Replace the record set, discarding cached results.
    ///
    /// Switching between scalar and object records recompiles the clauses
    /// for the new shape. An empty record set keeps the current shape.
    pub fn set_data(&mut self, records: Vec<Value>) -> Result<()> {
        let scalar = is_scalar(&records);
        if !records.is_empty() && scalar != self.scalar {
            tracing::debug!(scalar, "record shape changed, recompiling clauses");
            self.root = parser::build(self.bound.clone(), &self.config, scalar)?;
            self.scalar = scalar;
        }
        tracing::debug!(records = records.len(), "rebinding query records");
        self.records = records;
        self.memo = OnceLock::new();
        Ok(())
    }

    /// Matched records, before `pluck` and `default` apply.
    pub fn matches(&self) -> Result<Vec<&Value>> {
        Ok(self
            .matched_indices()?
            .iter()
            .map(|&index| &self.records[index])
            .collect())
    }

    /// Execute the query and shape the result according to its options.
    pub fn results(&self) -> Result<Results> {
        let started = Instant::now();
        let selection = self.select()?;
        let elapsed = self.options.debug.then(|| started.elapsed());
        Ok(Results { selection, elapsed })
    }

    /// Render the group tree, one item per line.
    pub fn explain(&self) -> String {
        self.root.to_string()
    }

    fn select(&self) -> Result<Selection> {
        if self.records.is_empty() {
            return Ok(Selection::Default(self.options.default.clone()));
        }

        let indices = self.matched_indices()?;
        let project = |record: &Value| match &self.options.pluck {
            Some(pluck) => pluck.project(record),
            None => record.clone(),
        };

        if indices.is_empty() {
            return Ok(Selection::Default(self.options.default.clone()));
        }
        if self.options.first {
            return Ok(Selection::One(project(&self.records[indices[0]])));
        }
        Ok(Selection::Many(
            indices.iter().map(|&index| project(&self.records[index])).collect(),
        ))
    }

    fn matched_indices(&self) -> Result<&[usize]> {
        if let Some(indices) = self.memo.get() {
            tracing::debug!("using cached matches");
            return Ok(indices.as_slice());
        }

        let evaluator = Evaluator::new(self.registry, &self.records, &self.root)?;
        let indices = if self.options.first {
            evaluator.first(&self.root)?.into_iter().collect()
        } else {
            evaluator.matches(&self.root)?
        };
        Ok(self.memo.get_or_init(|| indices).as_slice())
    }
}
