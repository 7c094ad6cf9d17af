//! Command implementations for siftq.

use std::fs;
use std::io::Read;
use std::path::Path;

use serde_json::{Map, Value};
use sift::query::clause::parse_literal;
use sift::{Config, Pluck, Query, QueryBuilder};

use crate::predicates::standard_registry;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Sift(#[from] sift::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Options shared by `filter` and `explain`.
#[derive(Debug, Default)]
pub struct QueryArgs {
    pub query: String,
    pub file: Option<String>,
    pub bind: Vec<String>,
    pub named: Vec<String>,
    pub first: bool,
    pub pluck: Vec<String>,
    pub default: Option<String>,
    pub debug: bool,
    pub config: Option<String>,
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Pretty,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(OutputFormat::Json),
            "pretty" => Ok(OutputFormat::Pretty),
            other => Err(Error::Usage(format!("Unknown format '{}'. Use json or pretty", other))),
        }
    }
}

/// Filter records and print the selection.
pub fn filter(args: &QueryArgs, format: OutputFormat) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let registry = standard_registry()?;
    let records = read_records(args.file.as_deref())?;

    let query = builder(args)?.build(&registry, &config, records)?;
    let results = query.results()?;

    if let Some(elapsed) = results.elapsed {
        eprintln!("siftq: evaluated in {:?}", elapsed);
    }

    let value = results.selection.into_value();
    let output = match format {
        OutputFormat::Json => serde_json::to_string(&value)?,
        OutputFormat::Pretty => serde_json::to_string_pretty(&value)?,
    };
    println!("{}", output);
    Ok(())
}

/// Print the normalized query and its group tree without evaluating it.
pub fn explain(args: &QueryArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let registry = standard_registry()?;
    // Scalar detection needs the records when a file is given
    let records = match args.file {
        Some(_) => read_records(args.file.as_deref())?,
        None => Vec::new(),
    };

    let query = builder(args)?.build(&registry, &config, records)?;
    println!("{}", query.normalized());
    print!("{}", query.explain());
    if query.is_scalar() {
        println!("(scalar records)");
    }
    Ok(())
}

/// List registered predicates.
pub fn predicates() -> Result<()> {
    let registry = standard_registry()?;
    for name in registry.names() {
        println!("{}", name);
    }
    Ok(())
}

fn builder(args: &QueryArgs) -> Result<QueryBuilder> {
    let mut builder = Query::builder(args.query.as_str())
        .bind_all(args.bind.iter().map(|v| parse_literal(v)))
        .first(args.first)
        .debug(args.debug);

    let mut named = Map::new();
    for entry in &args.named {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| Error::Usage(format!("Named binding '{}' must look like KEY=VALUE", entry)))?;
        named.insert(key.to_string(), parse_literal(value));
    }
    if !named.is_empty() {
        builder = builder.with_map(named)?;
    }

    // Flags win over reserved keys passed through --named
    if args.first {
        builder = builder.first(true);
    }
    if args.debug {
        builder = builder.debug(true);
    }

    match args.pluck.as_slice() {
        [] => {}
        [field] => builder = builder.pluck(Pluck::Field(field.clone())),
        fields => builder = builder.pluck(Pluck::Fields(fields.to_vec())),
    }
    if let Some(default) = &args.default {
        builder = builder.default_value(parse_literal(default));
    }
    Ok(builder)
}

fn load_config(path: Option<&str>) -> Result<Config> {
    Ok(match path {
        Some(path) => Config::load_from(Path::new(path))?,
        None => Config::load()?,
    })
}

/// Read a JSON array of records from a file, or stdin when no file (or `-`) is given.
fn read_records(file: Option<&str>) -> Result<Vec<Value>> {
    let contents = match file {
        Some(path) if path != "-" => fs::read_to_string(path)?,
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    match serde_json::from_str(&contents)? {
        Value::Array(records) => {
            tracing::debug!(records = records.len(), source = file.unwrap_or("-"), "read records");
            Ok(records)
        }
        other => Err(Error::Usage(format!(
            "Records must be a JSON array, got {}",
            kind(&other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
