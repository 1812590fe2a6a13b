//! Build match patterns from rule-method statements.
//!
//! Identifiers and type names that are declared metavariables become holes;
//! the dots-arguments marker becomes an argument gap; expression-match
//! wrappers are unwrapped to the expression they carry.

use indexmap::IndexMap;
use sempatch_ctl::constraints::MetavarConstraint;
use sempatch_ctl::pattern::PatternNode;
use sempatch_dsl::dsl;
use sempatch_host::ast::{Expr, Stmt};

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPattern {
    pub pattern: PatternNode,
    /// Metavariable names the pattern references, sorted.
    pub metavars: Vec<String>,
}

pub fn build_stmt_pattern(
    stmt: &Stmt,
    metavars: &IndexMap<String, MetavarConstraint>,
) -> BuiltPattern {
    let mut b = Builder::new(metavars);
    let pattern = b.stmt(stmt);
    b.finish(pattern)
}

pub fn build_expr_pattern(
    expr: &Expr,
    metavars: &IndexMap<String, MetavarConstraint>,
) -> BuiltPattern {
    let mut b = Builder::new(metavars);
    let pattern = b.expr(expr);
    b.finish(pattern)
}

/// Display text of a statement, with expression-match wrappers unwrapped.
pub fn statement_repr(stmt: &Stmt) -> String {
    if let Stmt::Expr { expr, .. } = stmt {
        if let Some(inner) = dsl::unwrap_expression_match(expr) {
            return inner.to_string();
        }
    }
    stmt.to_string()
}

struct Builder<'a> {
    metavars: &'a IndexMap<String, MetavarConstraint>,
    used: Vec<String>,
}

impl<'a> Builder<'a> {
    fn new(metavars: &'a IndexMap<String, MetavarConstraint>) -> Self {
        Self {
            metavars,
            used: Vec::new(),
        }
    }

    fn finish(mut self, pattern: PatternNode) -> BuiltPattern {
        self.used.sort();
        BuiltPattern {
            pattern,
            metavars: self.used,
        }
    }

    fn mark(&mut self, name: &str) {
        if !self.used.iter().any(|u| u == name) {
            self.used.push(name.to_owned());
        }
    }

    fn stmt(&mut self, stmt: &Stmt) -> PatternNode {
        match stmt {
            Stmt::Local { ty, name, init, .. } => {
                let ty_pattern = if self.metavars.contains_key(ty) {
                    self.mark(ty);
                    PatternNode::Hole(ty.clone())
                } else {
                    PatternNode::TypeName(ty.clone())
                };
                let name_pattern = if self.metavars.contains_key(name) {
                    self.mark(name);
                    PatternNode::Hole(name.clone())
                } else {
                    PatternNode::Ident(name.clone())
                };
                PatternNode::Local {
                    ty: Box::new(ty_pattern),
                    name: Box::new(name_pattern),
                    init: init.as_ref().map(|e| Box::new(self.expr(e))),
                }
            }
            Stmt::Return { value, .. } => PatternNode::Return {
                value: value.as_ref().map(|e| Box::new(self.expr(e))),
            },
            Stmt::Expr { expr, .. } => {
                let expr = dsl::unwrap_expression_match(expr).unwrap_or(expr);
                self.expr(expr)
            }
            Stmt::If { cond, .. } => self.expr(cond),
        }
    }

    fn expr(&mut self, expr: &Expr) -> PatternNode {
        match expr {
            Expr::Ident(name) => {
                if self.metavars.contains_key(name) {
                    self.mark(name);
                    PatternNode::Hole(name.clone())
                } else {
                    PatternNode::Ident(name.clone())
                }
            }
            Expr::Lit(lit) => PatternNode::Lit(lit.clone()),
            Expr::FieldRead { target, name } => PatternNode::FieldRead {
                target: Box::new(self.expr(target)),
                name: name.clone(),
            },
            Expr::Invocation { target, name, args } => {
                let name_pattern = if self.metavars.contains_key(name) {
                    self.mark(name);
                    PatternNode::Hole(name.clone())
                } else {
                    PatternNode::Ident(name.clone())
                };
                let args = args
                    .iter()
                    .map(|a| match a {
                        Expr::Ident(n) if n == dsl::DOTS_ARGUMENTS => PatternNode::ArgsGap,
                        other => self.expr(other),
                    })
                    .collect();
                PatternNode::Invocation {
                    target: target.as_ref().map(|t| Box::new(self.expr(t))),
                    name: Box::new(name_pattern),
                    args,
                }
            }
            Expr::Unary { op, operand } => PatternNode::Unary {
                op: *op,
                operand: Box::new(self.expr(operand)),
            },
            Expr::Binary { op, lhs, rhs } => PatternNode::Binary {
                op: *op,
                lhs: Box::new(self.expr(lhs)),
                rhs: Box::new(self.expr(rhs)),
            },
            Expr::Assign { lhs, rhs } => PatternNode::Assign {
                lhs: Box::new(self.expr(lhs)),
                rhs: Box::new(self.expr(rhs)),
            },
        }
    }
}
