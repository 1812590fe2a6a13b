//! Edit operations and the line-anchored operations table.

use std::fmt;

use indexmap::IndexMap;
use sempatch_host::ast::{Method, Stmt};

/// Anchor line for operations that apply to the method body rather than to a
/// concrete statement.
pub const METHOD_BODY_ANCHOR: usize = 0;

/// Block a statement is inserted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    MethodBody,
    TrueBranch,
    FalseBranch,
}

/// Edge of the block an insertion attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertAnchor {
    Top,
    Bottom,
}

/// A single code edit to perform at a matched location.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Delete the anchor statement.
    Delete,
    /// Insert a statement before the anchor statement.
    Prepend(Stmt),
    /// Insert a statement after the anchor statement.
    Append(Stmt),
    /// Replace the anchor statement.
    Replace(Stmt),
    /// Insert a statement at an edge of a block.
    InsertIntoBlock {
        block: BlockType,
        anchor: InsertAnchor,
        stmt: Stmt,
    },
    /// Replace the method header with the given method's header.
    MethodHeaderReplace(Method),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Delete => write!(f, "delete"),
            Operation::Prepend(s) => write!(f, "prepend {s}"),
            Operation::Append(s) => write!(f, "append {s}"),
            Operation::Replace(s) => write!(f, "replace with {s}"),
            Operation::InsertIntoBlock {
                block,
                anchor,
                stmt,
            } => {
                let block = match block {
                    BlockType::MethodBody => "method body",
                    BlockType::TrueBranch => "true branch",
                    BlockType::FalseBranch => "false branch",
                };
                let anchor = match anchor {
                    InsertAnchor::Top => "top",
                    InsertAnchor::Bottom => "bottom",
                };
                write!(f, "insert {stmt} at {anchor} of {block}")
            }
            Operation::MethodHeaderReplace(m) => {
                write!(f, "replace method header with {}", m.full_signature())
            }
        }
    }
}

/// Operations keyed by the source line they anchor to.
///
/// Insertion order within one line is significant: the anchor resolver and
/// the delete synthesis append in a fixed order, and the pair collapse below
/// relies on seeing exactly the pairs they produce.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchoredOperationsMap {
    entries: IndexMap<usize, Vec<Operation>>,
}

impl AnchoredOperationsMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: usize, op: Operation) {
        self.entries.entry(line).or_default().push(op);
    }

    pub fn get(&self, line: usize) -> Option<&[Operation]> {
        self.entries.get(&line).map(|v| v.as_slice())
    }

    pub fn lines(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|v| v.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[Operation])> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Remove and return every operation anchored at `line`.
    pub fn take(&mut self, line: usize) -> Vec<Operation> {
        self.entries.shift_remove(&line).unwrap_or_default()
    }

    /// Collapse `{Delete, Append(x)}` / `{Delete, Prepend(x)}` pairs (in
    /// either order) into a single `Replace(x)` per anchor line.
    pub fn collapse_replacements(&mut self) {
        for ops in self.entries.values_mut() {
            if ops.len() != 2 {
                continue;
            }
            let replacement = match (&ops[0], &ops[1]) {
                (Operation::Delete, Operation::Prepend(s))
                | (Operation::Delete, Operation::Append(s))
                | (Operation::Prepend(s), Operation::Delete)
                | (Operation::Append(s), Operation::Delete) => Operation::Replace(s.clone()),
                _ => continue,
            };
            *ops = vec![replacement];
        }
    }
}
