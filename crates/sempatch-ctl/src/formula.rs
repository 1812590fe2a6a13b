//! CTL-VW formulas.
//!
//! Computation tree logic extended with variable quantification and witness
//! collection: the boolean kernel and CTL modalities, `ExistsVar`/`SetEnv`
//! for variables, and atoms that match propositions, statements and branch
//! conditions against model states.

use std::fmt;

use crate::ops::Operation;
use crate::pattern::PatternNode;

/// Pseudo-variable carrying the edit-operation payload of an atom.
pub const OPERATIONS_VAR: &str = "_v";

/// Labels attached to model states by the CFG adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropLabel {
    After,
    TrueBranch,
    FalseBranch,
}

impl fmt::Display for PropLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropLabel::After => write!(f, "after"),
            PropLabel::TrueBranch => write!(f, "trueBranch"),
            PropLabel::FalseBranch => write!(f, "falseBranch"),
        }
    }
}

/// Literal values `SetEnv` can bind.
#[derive(Debug, Clone, PartialEq)]
pub enum SetEnvValue {
    Operations(Vec<Operation>),
}

/// Statement-matching atom.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementPattern {
    pub pattern: PatternNode,
    /// Metavariable names the pattern references.
    pub metavars: Vec<String>,
    /// Source text of the statement, for display.
    pub repr: String,
}

/// Kinds of branching statements a `BranchPattern` can match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchMatchKind {
    If,
}

/// Branch-condition-matching atom.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchPattern {
    pub pattern: PatternNode,
    pub kind: BranchMatchKind,
    pub metavars: Vec<String>,
    pub repr: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    True,
    Not(Box<Formula>),
    And(Box<Formula>, Box<Formula>),
    Or(Box<Formula>, Box<Formula>),
    AllNext(Box<Formula>),
    ExistsNext(Box<Formula>),
    AllUntil(Box<Formula>, Box<Formula>),
    ExistsUntil(Box<Formula>, Box<Formula>),
    ExistsVar(String, Box<Formula>),
    SetEnv(String, SetEnvValue),
    Proposition(PropLabel),
    Statement(StatementPattern),
    Branch(BranchPattern),
}

impl Formula {
    pub fn not(f: Formula) -> Formula {
        Formula::Not(Box::new(f))
    }

    pub fn and(lhs: Formula, rhs: Formula) -> Formula {
        Formula::And(Box::new(lhs), Box::new(rhs))
    }

    pub fn or(lhs: Formula, rhs: Formula) -> Formula {
        Formula::Or(Box::new(lhs), Box::new(rhs))
    }

    pub fn all_next(f: Formula) -> Formula {
        Formula::AllNext(Box::new(f))
    }

    pub fn exists_next(f: Formula) -> Formula {
        Formula::ExistsNext(Box::new(f))
    }

    pub fn all_until(lhs: Formula, rhs: Formula) -> Formula {
        Formula::AllUntil(Box::new(lhs), Box::new(rhs))
    }

    pub fn exists_until(lhs: Formula, rhs: Formula) -> Formula {
        Formula::ExistsUntil(Box::new(lhs), Box::new(rhs))
    }

    pub fn exists_var(name: impl Into<String>, f: Formula) -> Formula {
        Formula::ExistsVar(name.into(), Box::new(f))
    }

    /// The operations slot: `ExistsVar("_v", SetEnv("_v", ops))`.
    pub fn operations_slot(ops: Vec<Operation>) -> Formula {
        Formula::exists_var(
            OPERATIONS_VAR,
            Formula::SetEnv(OPERATIONS_VAR.into(), SetEnvValue::Operations(ops)),
        )
    }

    /// Conjoin this formula with an operations slot.
    pub fn with_operations(self, ops: Vec<Operation>) -> Formula {
        Formula::and(self, Formula::operations_slot(ops))
    }

    /// Whether this formula is an operations slot with an empty payload.
    pub fn is_empty_operations_slot(&self) -> bool {
        match self {
            Formula::ExistsVar(name, inner) if name == OPERATIONS_VAR => match inner.as_ref() {
                Formula::SetEnv(var, SetEnvValue::Operations(ops)) => {
                    var == OPERATIONS_VAR && ops.is_empty()
                }
                _ => false,
            },
            _ => false,
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => write!(f, "True"),
            Formula::Not(inner) => write!(f, "Not({inner})"),
            Formula::And(l, r) => write!(f, "And({l}, {r})"),
            Formula::Or(l, r) => write!(f, "Or({l}, {r})"),
            Formula::AllNext(inner) => write!(f, "AX({inner})"),
            Formula::ExistsNext(inner) => write!(f, "EX({inner})"),
            Formula::AllUntil(l, r) => write!(f, "AU({l}, {r})"),
            Formula::ExistsUntil(l, r) => write!(f, "EU({l}, {r})"),
            Formula::ExistsVar(name, inner) => write!(f, "E({name}, {inner})"),
            Formula::SetEnv(name, SetEnvValue::Operations(ops)) => {
                let ops: Vec<String> = ops.iter().map(|o| o.to_string()).collect();
                write!(f, "SetEnv({name}, [{}])", ops.join("; "))
            }
            Formula::Proposition(label) => write!(f, "Prop({label})"),
            Formula::Statement(sp) => write!(f, "Stmt({})", sp.repr),
            Formula::Branch(bp) => write!(f, "Branch({})", bp.repr),
        }
    }
}
