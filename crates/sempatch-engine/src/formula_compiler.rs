//! Compile the deletions-view CFG into a CTL-VW formula.
//!
//! Each anchorable node contributes an atom conjoined with an operations
//! slot holding the edits anchored to its source line; dots compile to
//! until-formulas; metavariables are quantified at their first use along
//! each path. Operations are claimed from the anchored-operations side
//! table when atoms are emitted, never by mutating previously built
//! formulas. Branch suffixes are compiled once per path (the join node is
//! reached through both arms of the `Or`), so claims are idempotent: both
//! copies of a suffix atom carry the same operations.

use std::collections::HashSet;

use indexmap::IndexMap;
use sempatch_ctl::constraints::MetavarConstraint;
use sempatch_ctl::formula::{
    BranchMatchKind, BranchPattern, Formula, PropLabel, StatementPattern,
};
use sempatch_ctl::ops::{AnchoredOperationsMap, BlockType, InsertAnchor, Operation};
use sempatch_dsl::dsl;
use sempatch_host::ast::{Expr, Stmt};
use sempatch_host::cfg::{NodeId, NodeKind};

use crate::cfg_adapter::{RuleCfg, TagLabel};
use crate::errors::CompileError;
use crate::patterns::{build_expr_pattern, build_stmt_pattern, statement_repr};

pub struct FormulaCompiler<'a> {
    cfg: &'a RuleCfg,
    metavars: &'a IndexMap<String, MetavarConstraint>,
    ops: &'a AnchoredOperationsMap,
    quantified: Vec<String>,
    /// Nodes on the current recursion path, for cycle detection. Rejoining
    /// a node through the other arm of a branch is fine; revisiting a node
    /// still on the path is not.
    path: HashSet<NodeId>,
    /// Operations claimed by some atom, as (line, index-within-line).
    claimed: HashSet<(usize, usize)>,
}

impl<'a> FormulaCompiler<'a> {
    pub fn new(
        cfg: &'a RuleCfg,
        metavars: &'a IndexMap<String, MetavarConstraint>,
        ops: &'a AnchoredOperationsMap,
    ) -> Self {
        Self {
            cfg,
            metavars,
            ops,
            quantified: Vec::new(),
            path: HashSet::new(),
            claimed: HashSet::new(),
        }
    }

    pub fn compile(mut self) -> Result<Formula, CompileError> {
        let begin = self.cfg.begin();
        let first = *self
            .cfg
            .successors(begin)
            .first()
            .ok_or(CompileError::MissingSuccessor { node: begin })?;

        let formula = match self.compile_node(first)? {
            Some(f) => f,
            // An empty match context matches nothing.
            None => Formula::not(Formula::True),
        };

        for (line, ops) in self.ops.iter() {
            for index in 0..ops.len() {
                if !self.claimed.contains(&(line, index)) {
                    return Err(CompileError::DanglingOperations);
                }
            }
        }

        Ok(optimize_fully(formula))
    }

    fn claim(&mut self, line: usize, pred: impl Fn(&Operation) -> bool) -> Vec<Operation> {
        let Some(ops) = self.ops.get(line) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for (index, op) in ops.iter().enumerate() {
            if pred(op) {
                out.push(op.clone());
                self.claimed.insert((line, index));
            }
        }
        out
    }

    fn compile_node(&mut self, id: NodeId) -> Result<Option<Formula>, CompileError> {
        let kind = self
            .cfg
            .node(id)
            .ok_or(CompileError::UnexpectedNodeKind { node: id })?
            .kind;
        if kind == NodeKind::Exit {
            return Ok(None);
        }
        if !self.path.insert(id) {
            return Err(CompileError::CfgCycle { node: id });
        }
        let result = self.compile_node_inner(id, kind);
        self.path.remove(&id);
        result
    }

    fn compile_node_inner(
        &mut self,
        id: NodeId,
        kind: NodeKind,
    ) -> Result<Option<Formula>, CompileError> {
        let succs = self.cfg.successors(id).to_vec();
        if succs.is_empty() {
            return Err(CompileError::MissingSuccessor { node: id });
        }
        match (kind, succs.len()) {
            (NodeKind::Statement, 1) => self.compile_statement(id, succs[0]),
            (NodeKind::BlockBegin, 1) => self.compile_block_begin(id, succs[0]),
            (NodeKind::Converge, 1) => self.compile_converge(succs[0]),
            (NodeKind::Branch, 2) => self.compile_branch(id, succs[0], succs[1]),
            (NodeKind::Branch, n) => Err(CompileError::BranchSuccessorCount { node: id, count: n }),
            _ => Err(CompileError::UnexpectedNodeKind { node: id }),
        }
    }

    fn compile_statement(
        &mut self,
        id: NodeId,
        next: NodeId,
    ) -> Result<Option<Formula>, CompileError> {
        let stmt = self
            .cfg
            .node(id)
            .and_then(|n| n.stmt.clone())
            .ok_or(CompileError::UnexpectedNodeKind { node: id })?;

        if dsl::is_dots_statement(&stmt) {
            return self.compile_dots(&stmt, next);
        }

        let line = stmt.line();
        let built = build_stmt_pattern(&stmt, self.metavars);
        let ops = self.claim(line, |_| true);

        let atom = Formula::Statement(StatementPattern {
            pattern: built.pattern,
            metavars: built.metavars.clone(),
            repr: statement_repr(&stmt),
        });
        let mut formula = atom.with_operations(ops);

        let new_vars = self.mark_quantified(&built.metavars);
        if let Some(inner) = self.compile_node(next)? {
            formula = Formula::and(formula, Formula::all_next(inner));
        }
        Ok(Some(quantify(formula, new_vars)))
    }

    fn compile_dots(&mut self, stmt: &Stmt, next: NodeId) -> Result<Option<Formula>, CompileError> {
        let spec = parse_dots_constraints(stmt)?;

        let Some(inner) = self.compile_node(next)? else {
            return Ok(Some(Formula::True));
        };

        let mut lhs = Formula::True;
        if !spec.any {
            for expr in &spec.not_equal {
                let built = build_expr_pattern(expr, self.metavars);
                let guard = Formula::not(Formula::Statement(StatementPattern {
                    pattern: built.pattern,
                    metavars: built.metavars,
                    repr: expr.to_string(),
                }));
                lhs = if matches!(lhs, Formula::True) {
                    guard
                } else {
                    Formula::and(lhs, guard)
                };
            }
        }

        Ok(Some(if spec.exists {
            Formula::exists_until(lhs, inner)
        } else {
            Formula::all_until(lhs, inner)
        }))
    }

    fn compile_block_begin(
        &mut self,
        id: NodeId,
        next: NodeId,
    ) -> Result<Option<Formula>, CompileError> {
        let tag = self
            .cfg
            .tag(id)
            .cloned()
            .ok_or(CompileError::UnexpectedNodeKind { node: id })?;
        let label = tag
            .label
            .proposition()
            .ok_or(CompileError::UnexpectedNodeKind { node: id })?;
        let block_type = match tag.label {
            TagLabel::TrueBranch => BlockType::TrueBranch,
            TagLabel::FalseBranch => BlockType::FalseBranch,
            _ => return Err(CompileError::UnexpectedNodeKind { node: id }),
        };
        let anchor_line = tag.anchor.line();

        let top = self.claim(anchor_line, |op| {
            matches!(
                op,
                Operation::InsertIntoBlock { block, anchor: InsertAnchor::Top, .. }
                    if *block == block_type
            )
        });
        let bottom = self.claim(anchor_line, |op| {
            matches!(
                op,
                Operation::InsertIntoBlock { block, anchor: InsertAnchor::Bottom, .. }
                    if *block == block_type
            )
        });

        let inner = self
            .compile_node(next)?
            .ok_or(CompileError::MissingSuccessor { node: next })?;

        let formula = Formula::and(
            Formula::Proposition(label).with_operations(top),
            Formula::all_next(inner),
        )
        .with_operations(bottom);
        Ok(Some(formula))
    }

    fn compile_converge(&mut self, next: NodeId) -> Result<Option<Formula>, CompileError> {
        let head = Formula::Proposition(PropLabel::After).with_operations(Vec::new());
        match self.compile_node(next)? {
            None => Ok(Some(head)),
            Some(inner) => Ok(Some(
                Formula::and(head, Formula::all_next(inner)).with_operations(Vec::new()),
            )),
        }
    }

    fn compile_branch(
        &mut self,
        id: NodeId,
        first: NodeId,
        second: NodeId,
    ) -> Result<Option<Formula>, CompileError> {
        let stmt = self
            .cfg
            .node(id)
            .and_then(|n| n.stmt.clone())
            .ok_or(CompileError::UnexpectedNodeKind { node: id })?;
        let Stmt::If { cond, .. } = &stmt else {
            return Err(CompileError::UnexpectedNodeKind { node: id });
        };
        let line = stmt.line();

        let built = build_expr_pattern(cond, self.metavars);
        let ops = self.claim(line, |op| !matches!(op, Operation::InsertIntoBlock { .. }));

        let atom = Formula::Branch(BranchPattern {
            pattern: built.pattern,
            kind: BranchMatchKind::If,
            metavars: built.metavars.clone(),
            repr: cond.to_string(),
        });
        let mut formula = atom.with_operations(ops);

        let new_vars = self.mark_quantified(&built.metavars);

        let lhs = self
            .compile_node(first)?
            .ok_or(CompileError::MissingSuccessor { node: first })?;
        let rhs = self
            .compile_node(second)?
            .ok_or(CompileError::MissingSuccessor { node: second })?;

        formula = Formula::and(formula, Formula::all_next(Formula::or(lhs, rhs)));
        Ok(Some(quantify(formula, new_vars)))
    }

    /// Record first uses; returns the newly quantified names (sorted, since
    /// pattern builders sort their metavariable lists).
    fn mark_quantified(&mut self, used: &[String]) -> Vec<String> {
        let new_vars: Vec<String> = used
            .iter()
            .filter(|v| !self.quantified.contains(v))
            .cloned()
            .collect();
        self.quantified.extend(new_vars.iter().cloned());
        new_vars
    }
}

/// Wrap a formula in `ExistsVar` quantifiers, innermost-last.
fn quantify(mut formula: Formula, new_vars: Vec<String>) -> Formula {
    for var in new_vars.into_iter().rev() {
        formula = Formula::exists_var(var, formula);
    }
    formula
}

struct DotsSpec {
    exists: bool,
    any: bool,
    not_equal: Vec<Expr>,
}

fn parse_dots_constraints(stmt: &Stmt) -> Result<DotsSpec, CompileError> {
    let args =
        dsl::invocation_args(stmt, dsl::DOTS_STATEMENT).ok_or(CompileError::UnknownDotsConstraint {
            detail: "malformed dots statement".into(),
        })?;

    let mut spec = DotsSpec {
        exists: false,
        any: false,
        not_equal: Vec::new(),
    };
    for arg in args {
        match arg {
            Expr::Invocation {
                target: None,
                name,
                args,
            } if name == dsl::WHEN_ANY && args.is_empty() => spec.any = true,
            Expr::Invocation {
                target: None,
                name,
                args,
            } if name == dsl::WHEN_EXISTS && args.is_empty() => spec.exists = true,
            Expr::Invocation {
                target: None,
                name,
                args,
            } if name == dsl::WHEN_NOT_EQUAL && args.len() == 1 => {
                let inner = dsl::unwrap_expression_match(&args[0]).unwrap_or(&args[0]);
                spec.not_equal.push(inner.clone());
            }
            other => {
                return Err(CompileError::UnknownDotsConstraint {
                    detail: other.to_string(),
                })
            }
        }
    }
    Ok(spec)
}

/// One rewrite pass: drop empty operations slots.
pub fn optimize(formula: &Formula) -> Formula {
    match formula {
        Formula::And(lhs, rhs) => {
            if rhs.is_empty_operations_slot() {
                return optimize(lhs);
            }
            Formula::and(optimize(lhs), optimize(rhs))
        }
        Formula::Not(inner) => Formula::not(optimize(inner)),
        Formula::Or(lhs, rhs) => Formula::or(optimize(lhs), optimize(rhs)),
        Formula::AllNext(inner) => Formula::all_next(optimize(inner)),
        Formula::ExistsNext(inner) => Formula::exists_next(optimize(inner)),
        Formula::AllUntil(lhs, rhs) => Formula::all_until(optimize(lhs), optimize(rhs)),
        Formula::ExistsUntil(lhs, rhs) => Formula::exists_until(optimize(lhs), optimize(rhs)),
        Formula::ExistsVar(name, inner) => Formula::exists_var(name.clone(), optimize(inner)),
        other => other.clone(),
    }
}

/// Apply the optimizer to a fixed point.
pub fn optimize_fully(mut formula: Formula) -> Formula {
    loop {
        let next = optimize(&formula);
        if next == formula {
            return formula;
        }
        formula = next;
    }
}
