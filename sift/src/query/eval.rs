//! Group tree evaluator.
//!
//! Candidates are record indices in ascending order, so every result keeps
//! the original record order and can never hold duplicates.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::clause::{Clause, PredicateName};
use super::parser::{Combinator, Group, GroupItem};
use crate::registry::{Predicate, PredicateRegistry};
use crate::Result;

pub(crate) struct Evaluator<'a> {
    records: &'a [Value],
    predicates: HashMap<&'a PredicateName, &'a dyn Predicate>,
}

impl<'a> Evaluator<'a> {
    /// Resolve every predicate the tree names before any record is tested,
    /// so an unknown name fails even where evaluation would short-circuit.
    pub fn new(registry: &'a PredicateRegistry, records: &'a [Value], root: &'a Group) -> Result<Self> {
        let mut predicates: HashMap<&'a PredicateName, &'a dyn Predicate> = HashMap::new();
        if !records.is_empty() {
            for clause in root.clauses() {
                if !predicates.contains_key(&clause.predicate) {
                    predicates.insert(&clause.predicate, registry.resolve(&clause.predicate)?);
                }
            }
        }
        Ok(Self { records, predicates })
    }

    /// Indices of every matching record.
    pub fn matches(&self, root: &Group) -> Result<Vec<usize>> {
        self.group(root, (0..self.records.len()).collect())
    }

    /// Index of the first matching record, testing records one at a time.
    pub fn first(&self, root: &Group) -> Result<Option<usize>> {
        for index in 0..self.records.len() {
            if !self.group(root, vec![index])?.is_empty() {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn group(&self, group: &Group, candidates: Vec<usize>) -> Result<Vec<usize>> {
        match group.combinator {
            Combinator::All => self.all(group, candidates),
            Combinator::Any => self.any(group, candidates),
        }
    }

    /// Each item narrows what the previous items left.
    fn all(&self, group: &Group, candidates: Vec<usize>) -> Result<Vec<usize>> {
        let mut remaining = candidates;
        for item in &group.items {
            if remaining.is_empty() {
                break;
            }
            remaining = self.item(item, remaining)?;
        }
        Ok(remaining)
    }

    /// Each item only sees records no earlier item matched.
    fn any(&self, group: &Group, candidates: Vec<usize>) -> Result<Vec<usize>> {
        let mut matched: Vec<usize> = Vec::new();
        let mut undecided = candidates;
        for item in &group.items {
            if undecided.is_empty() {
                break;
            }
            let hits = self.item(item, undecided.clone())?;
            if hits.is_empty() {
                continue;
            }
            let hit_set: HashSet<usize> = hits.iter().copied().collect();
            undecided.retain(|index| !hit_set.contains(index));
            matched.extend(hits);
        }
        matched.sort_unstable();
        Ok(matched)
    }

    fn item(&self, item: &GroupItem, candidates: Vec<usize>) -> Result<Vec<usize>> {
        match item {
            GroupItem::Clause(clause) => self.clause(clause, candidates),
            GroupItem::Group(group) => self.group(group, candidates),
        }
    }

    fn clause(&self, clause: &Clause, candidates: Vec<usize>) -> Result<Vec<usize>> {
        let predicate = self
            .predicates
            .get(&clause.predicate)
            .copied()
            .ok_or_else(|| crate::Error::UnknownPredicate(clause.predicate.clone()))?;
        let mut hits = Vec::with_capacity(candidates.len());
        for index in candidates {
            let value = clause.attribute.lookup(&self.records[index]);
            let outcome = predicate
                .test(value, &clause.args, &clause.kwargs)
                .map_err(|source| crate::Error::Predicate {
                    name: clause.predicate.clone(),
                    source,
                })?;
            tracing::trace!(clause = %clause, record = index, outcome, "evaluated clause");
            if outcome != clause.negate {
                hits.push(index);
            }
        }
        Ok(hits)
    }
}
