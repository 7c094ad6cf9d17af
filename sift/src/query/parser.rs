//! Group tree builder.
//!
//! Consumes a bound token stream with an explicit stack and produces the
//! nested AND/OR group tree.

use std::fmt;

use serde::{Serialize, Serializer};

use super::binding::{Bound, Term};
use super::clause::{self, Clause};
use crate::{Config, Error, Result};

/// Structural position of a group: sibling indices from the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupPath(Vec<usize>);

impl GroupPath {
    /// The root group, `0`.
    pub fn root() -> Self {
        GroupPath(vec![0])
    }

    /// Path of this group's `index`-th child group.
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        GroupPath(indices)
    }

    /// Path of the enclosing group; the root has none.
    pub fn parent(&self) -> Option<Self> {
        if self.0.len() <= 1 {
            return None;
        }
        Some(GroupPath(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn depth(&self) -> usize {
        self.0.len() - 1
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }
}

impl fmt::Display for GroupPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(usize::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl Serialize for GroupPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How a group combines its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    /// AND: every item must match
    All,
    /// OR: any item may match
    Any,
}

impl fmt::Display for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Combinator::All => write!(f, "all"),
            Combinator::Any => write!(f, "any"),
        }
    }
}

/// A nested AND/OR collection of clauses and sub-groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub path: GroupPath,
    pub combinator: Combinator,
    /// Items in the order they were written
    pub items: Vec<GroupItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupItem {
    Clause(Clause),
    Group(Group),
}

impl Group {
    /// Number of groups in this subtree, including this one.
    pub fn group_count(&self) -> usize {
        1 + self
            .items
            .iter()
            .map(|item| match item {
                GroupItem::Group(group) => group.group_count(),
                GroupItem::Clause(_) => 0,
            })
            .sum::<usize>()
    }

    /// All clauses in this subtree, depth first in textual order.
    pub fn clauses(&self) -> Vec<&Clause> {
        let mut out = Vec::new();
        for item in &self.items {
            match item {
                GroupItem::Clause(clause) => out.push(clause),
                GroupItem::Group(group) => out.extend(group.clauses()),
            }
        }
        out
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indent = "  ".repeat(self.path.depth());
        writeln!(f, "{}group {} ({})", indent, self.path, self.combinator)?;
        for item in &self.items {
            match item {
                GroupItem::Clause(clause) => writeln!(f, "{}  {}", indent, clause)?,
                GroupItem::Group(group) => group.write_tree(f)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f)
    }
}

/// A group still being parsed.
struct Frame {
    path: GroupPath,
    combinator: Option<Combinator>,
    items: Vec<GroupItem>,
    batch: Vec<Term>,
    next_child: usize,
    /// Nothing written since the group opened or since the last operator
    dangling: bool,
}

impl Frame {
    fn new(path: GroupPath) -> Self {
        Self {
            path,
            combinator: None,
            items: Vec::new(),
            batch: Vec::new(),
            next_child: 0,
            dangling: true,
        }
    }

    /// Compile the pending batch, if any, into a clause item.
    fn flush(&mut self, config: &Config, scalar: bool) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let terms = std::mem::take(&mut self.batch);
        self.items.push(GroupItem::Clause(clause::compile(terms, config, scalar)?));
        Ok(())
    }

    fn finish(self) -> Result<Group> {
        let combinator = match (self.combinator, self.items.len()) {
            (_, 0) => return Err(Error::EmptyGroup(self.path)),
            (Some(combinator), _) => combinator,
            (None, 1) => Combinator::Any,
            (None, _) => return Err(Error::MissingCombinator(self.path)),
        };
        Ok(Group {
            path: self.path,
            combinator,
            items: self.items,
        })
    }
}

/// Build the group tree from a bound token stream.
pub(crate) fn build(tokens: Vec<Bound>, config: &Config, scalar: bool) -> Result<Group> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<Group> = None;

    for token in tokens {
        match token {
            Bound::Open => {
                if root.is_some() {
                    return Err(Error::UnbalancedParens("input continues after the outer group".to_string()));
                }
                let path = match stack.last_mut() {
                    Some(parent) => {
                        // Keep clauses written before the sub-group ahead of it
                        parent.flush(config, scalar)?;
                        let path = parent.path.child(parent.next_child);
                        parent.next_child += 1;
                        path
                    }
                    None => GroupPath::root(),
                };
                stack.push(Frame::new(path));
            }
            Bound::Close => {
                let mut frame = stack
                    .pop()
                    .ok_or_else(|| Error::UnbalancedParens("unexpected ')'".to_string()))?;
                if frame.dangling && !frame.items.is_empty() {
                    return Err(Error::InvalidClause(format!("group {} ends with an operator", frame.path)));
                }
                frame.flush(config, scalar)?;
                let group = frame.finish()?;
                match stack.last_mut() {
                    Some(parent) => {
                        parent.items.push(GroupItem::Group(group));
                        parent.dangling = false;
                    }
                    None => root = Some(group),
                }
            }
            Bound::And | Bound::Or => {
                let combinator = if token == Bound::And {
                    Combinator::All
                } else {
                    Combinator::Any
                };
                let frame = stack
                    .last_mut()
                    .ok_or_else(|| Error::UnbalancedParens("operator outside of any group".to_string()))?;
                if frame.dangling {
                    return Err(Error::InvalidClause(format!(
                        "operator without a preceding clause in group {}",
                        frame.path
                    )));
                }
                frame.dangling = true;
                match frame.combinator {
                    None => frame.combinator = Some(combinator),
                    Some(existing) if existing != combinator => {
                        tracing::debug!(group = %frame.path, kept = %existing, "mixed operators in group, first one wins");
                    }
                    Some(_) => {}
                }
                frame.flush(config, scalar)?;
            }
            Bound::Term(term) => {
                let frame = stack
                    .last_mut()
                    .ok_or_else(|| Error::InvalidClause(format!("{}: outside of any group", term)))?;
                frame.batch.push(term);
                frame.dangling = false;
            }
        }
    }

    if !stack.is_empty() {
        return Err(Error::UnbalancedParens("unclosed group".to_string()));
    }
    root.ok_or(Error::EmptyQuery)
}
