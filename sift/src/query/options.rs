//! Per-query options and the reserved keys of a bindings map.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::clause::Attribute;
use crate::{Error, Result};

/// Keys of a bindings map that configure the query instead of binding names.
pub const RESERVED_KEYS: [&str; 6] = ["default", "first", "pluck", "debug", "op_and", "op_or"];

/// Options controlling how results are returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Returned when there are no records or nothing matches
    #[serde(default)]
    pub default: Value,
    /// Return only the first match, unwrapped
    #[serde(default)]
    pub first: bool,
    /// Project matched records
    #[serde(default)]
    pub pluck: Option<Pluck>,
    /// Report evaluation time alongside the result
    #[serde(default)]
    pub debug: bool,
    /// Replacement AND literals for this query
    #[serde(default)]
    pub op_and: Option<Vec<String>>,
    /// Replacement OR literals for this query
    #[serde(default)]
    pub op_or: Option<Vec<String>>,
}

/// Projection applied to each matched record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Pluck {
    /// A single field; the record becomes that field's value
    Field(String),
    /// Several fields; the record becomes an object of just those fields
    Fields(Vec<String>),
}

impl Pluck {
    /// Project one record. Missing fields become null.
    pub fn project(&self, record: &Value) -> Value {
        let get = |path: &str| {
            Attribute::from_path(path)
                .lookup(record)
                .cloned()
                .unwrap_or(Value::Null)
        };
        match self {
            Pluck::Field(path) => get(path),
            Pluck::Fields(paths) => Value::Object(
                paths
                    .iter()
                    .map(|path| (path.clone(), get(path)))
                    .collect(),
            ),
        }
    }

    fn validate(&self) -> Result<()> {
        let paths: &[String] = match self {
            Pluck::Field(path) => std::slice::from_ref(path),
            Pluck::Fields(paths) => paths,
        };
        if paths.is_empty() || paths.iter().any(|p| p.is_empty()) {
            return Err(Error::InvalidOption("pluck needs at least one non-empty field".to_string()));
        }
        Ok(())
    }
}

impl QueryOptions {
    /// Split a combined map into options and named bindings.
    ///
    /// Reserved keys set options; everything else is returned as a binding.
    pub fn split(map: Map<String, Value>) -> Result<(Self, Map<String, Value>)> {
        let mut options = QueryOptions::default();
        let named = options.merge(map)?;
        Ok((options, named))
    }

    /// Override only the options whose reserved keys appear in `map`.
    ///
    /// Returns the remaining entries as named bindings.
    pub fn merge(&mut self, map: Map<String, Value>) -> Result<Map<String, Value>> {
        let mut named = Map::new();
        for (key, value) in map {
            match key.as_str() {
                "default" => self.default = value,
                "first" => self.first = as_bool(&key, &value)?,
                "debug" => self.debug = as_bool(&key, &value)?,
                "pluck" => self.pluck = as_pluck(value)?,
                "op_and" => self.op_and = as_operators(&key, value)?,
                "op_or" => self.op_or = as_operators(&key, value)?,
                _ => {
                    named.insert(key, value);
                }
            }
        }
        self.validate()?;
        Ok(named)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(pluck) = &self.pluck {
            pluck.validate()?;
        }
        for ops in [&self.op_and, &self.op_or].into_iter().flatten() {
            if ops.is_empty() || ops.iter().any(|op| op.is_empty() || op.contains(char::is_whitespace)) {
                return Err(Error::InvalidOption(
                    "operators must be non-empty and contain no whitespace".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn as_bool(key: &str, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::InvalidOption(format!("{} must be a boolean, got {}", key, value)))
}

fn as_pluck(value: Value) -> Result<Option<Pluck>> {
    match value {
        Value::Null => Ok(None),
        Value::String(field) => Ok(Some(Pluck::Field(field))),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(field) => Ok(field),
                other => Err(Error::InvalidOption(format!("pluck fields must be strings, got {}", other))),
            })
            .collect::<Result<Vec<_>>>()
            .map(|fields| Some(Pluck::Fields(fields))),
        other => Err(Error::InvalidOption(format!("pluck must be a field or list of fields, got {}", other))),
    }
}

fn as_operators(key: &str, value: Value) -> Result<Option<Vec<String>>> {
    match value {
        Value::Null => Ok(None),
        Value::String(op) => Ok(Some(vec![op])),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(op) => Ok(op),
                other => Err(Error::InvalidOption(format!("{} entries must be strings, got {}", key, other))),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some),
        other => Err(Error::InvalidOption(format!("{} must be a string or list, got {}", key, other))),
    }
}
