//! Code patterns with metavariable holes, and the structural matcher.
//!
//! A pattern mirrors the shape of a host statement or expression, except
//! that metavariable positions are `Hole`s and `...` in an argument list is
//! an `ArgsGap` matching any argument sequence. Matching a pattern against a
//! concrete element either fails or produces an environment of metavariable
//! bindings, with repeated uses of a variable forced to equal bindings.

use indexmap::IndexMap;
use sempatch_host::ast::{BinaryOp, Expr, Lit, Stmt, UnaryOp};

use crate::constraints::MetavarConstraint;
use crate::env::{BoundValue, Environment};

#[derive(Debug, Clone, PartialEq)]
pub enum PatternNode {
    /// Metavariable hole.
    Hole(String),
    /// `...` in an argument list: matches any argument sequence.
    ArgsGap,
    Ident(String),
    Lit(Lit),
    TypeName(String),
    FieldRead {
        target: Box<PatternNode>,
        name: String,
    },
    Invocation {
        target: Option<Box<PatternNode>>,
        name: Box<PatternNode>,
        args: Vec<PatternNode>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<PatternNode>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<PatternNode>,
        rhs: Box<PatternNode>,
    },
    Assign {
        lhs: Box<PatternNode>,
        rhs: Box<PatternNode>,
    },
    Local {
        ty: Box<PatternNode>,
        name: Box<PatternNode>,
        init: Option<Box<PatternNode>>,
    },
    Return {
        value: Option<Box<PatternNode>>,
    },
}

/// Match a statement-level pattern against a statement.
pub fn match_stmt(
    pattern: &PatternNode,
    stmt: &Stmt,
    constraints: &IndexMap<String, MetavarConstraint>,
) -> Option<Environment> {
    let mut m = Matcher::new(constraints);
    if m.stmt(pattern, stmt) {
        Some(m.into_env())
    } else {
        None
    }
}

/// Match an expression-level pattern against an expression.
pub fn match_expr(
    pattern: &PatternNode,
    expr: &Expr,
    constraints: &IndexMap<String, MetavarConstraint>,
) -> Option<Environment> {
    let mut m = Matcher::new(constraints);
    if m.expr(pattern, expr) {
        Some(m.into_env())
    } else {
        None
    }
}

struct Matcher<'a> {
    constraints: &'a IndexMap<String, MetavarConstraint>,
    bindings: IndexMap<String, BoundValue>,
}

impl<'a> Matcher<'a> {
    fn new(constraints: &'a IndexMap<String, MetavarConstraint>) -> Self {
        Self {
            constraints,
            bindings: IndexMap::new(),
        }
    }

    fn into_env(self) -> Environment {
        let mut env = Environment::new();
        for (name, value) in self.bindings {
            env.set(name, value);
        }
        env
    }

    fn hole(&mut self, name: &str, candidate: BoundValue, declared_ty: Option<&str>) -> bool {
        let Some(constraint) = self.constraints.get(name) else {
            return false;
        };
        let Some(bound) = constraint.matches(&candidate, declared_ty) else {
            return false;
        };
        match self.bindings.get(name) {
            Some(existing) => constraint.merge(existing, &bound),
            None => {
                self.bindings.insert(name.to_owned(), bound);
                true
            }
        }
    }

    fn stmt(&mut self, pattern: &PatternNode, stmt: &Stmt) -> bool {
        match (pattern, stmt) {
            (PatternNode::Local { ty, name, init }, Stmt::Local {
                ty: sty,
                name: sname,
                init: sinit,
                ..
            }) => {
                let ty_ok = match ty.as_ref() {
                    PatternNode::TypeName(t) => t == sty,
                    PatternNode::Hole(h) => {
                        self.hole(h, BoundValue::TypeName(sty.clone()), None)
                    }
                    _ => false,
                };
                if !ty_ok {
                    return false;
                }
                let name_ok = match name.as_ref() {
                    PatternNode::Ident(n) => n == sname,
                    PatternNode::Hole(h) => self.hole(
                        h,
                        BoundValue::Expr(Expr::Ident(sname.clone())),
                        Some(sty),
                    ),
                    _ => false,
                };
                if !name_ok {
                    return false;
                }
                match (init, sinit) {
                    (None, None) => true,
                    (Some(p), Some(e)) => self.expr(p, e),
                    _ => false,
                }
            }
            (PatternNode::Return { value }, Stmt::Return { value: svalue, .. }) => {
                match (value, svalue) {
                    (None, None) => true,
                    (Some(p), Some(e)) => self.expr(p, e),
                    _ => false,
                }
            }
            (PatternNode::Local { .. } | PatternNode::Return { .. }, _) => false,
            // An expression-shaped pattern matches an expression statement.
            (p, Stmt::Expr { expr, .. }) => self.expr(p, expr),
            _ => false,
        }
    }

    fn expr(&mut self, pattern: &PatternNode, expr: &Expr) -> bool {
        match (pattern, expr) {
            (PatternNode::Hole(name), e) => {
                self.hole(name, BoundValue::Expr(e.clone()), None)
            }
            (PatternNode::Ident(n), Expr::Ident(m)) => n == m,
            (PatternNode::Lit(a), Expr::Lit(b)) => a == b,
            (PatternNode::FieldRead { target, name }, Expr::FieldRead {
                target: etarget,
                name: ename,
            }) => name == ename && self.expr(target, etarget),
            (
                PatternNode::Invocation { target, name, args },
                Expr::Invocation {
                    target: etarget,
                    name: ename,
                    args: eargs,
                },
            ) => {
                let target_ok = match (target, etarget) {
                    (None, None) => true,
                    (Some(p), Some(e)) => self.expr(p, e),
                    _ => false,
                };
                if !target_ok {
                    return false;
                }
                if !self.expr(name, &Expr::Ident(ename.clone())) {
                    return false;
                }
                self.args(args, eargs)
            }
            (PatternNode::Unary { op, operand }, Expr::Unary {
                op: eop,
                operand: eoperand,
            }) => op == eop && self.expr(operand, eoperand),
            (PatternNode::Binary { op, lhs, rhs }, Expr::Binary {
                op: eop,
                lhs: elhs,
                rhs: erhs,
            }) => op == eop && self.expr(lhs, elhs) && self.expr(rhs, erhs),
            (PatternNode::Assign { lhs, rhs }, Expr::Assign {
                lhs: elhs,
                rhs: erhs,
            }) => self.expr(lhs, elhs) && self.expr(rhs, erhs),
            _ => false,
        }
    }

    /// Gap-aware argument-sequence matching with backtracking.
    fn args(&mut self, patterns: &[PatternNode], args: &[Expr]) -> bool {
        match patterns.split_first() {
            None => args.is_empty(),
            Some((PatternNode::ArgsGap, rest)) => {
                for skip in 0..=args.len() {
                    let snapshot = self.bindings.clone();
                    if self.args(rest, &args[skip..]) {
                        return true;
                    }
                    self.bindings = snapshot;
                }
                false
            }
            Some((p, rest)) => match args.split_first() {
                Some((a, arest)) => {
                    let snapshot = self.bindings.clone();
                    if self.expr(p, a) && self.args(rest, arest) {
                        true
                    } else {
                        self.bindings = snapshot;
                        false
                    }
                }
                None => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::EnvEntry;

    fn constraints(pairs: &[(&str, MetavarConstraint)]) -> IndexMap<String, MetavarConstraint> {
        pairs
            .iter()
            .map(|(n, c)| (n.to_string(), c.clone()))
            .collect()
    }

    fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::Invocation {
            target: None,
            name: name.into(),
            args,
        }
    }

    fn call_pattern(name: &str, args: Vec<PatternNode>) -> PatternNode {
        PatternNode::Invocation {
            target: None,
            name: Box::new(PatternNode::Ident(name.into())),
            args,
        }
    }

    #[test]
    fn hole_binds_and_repeated_use_must_agree() {
        let cs = constraints(&[("x", MetavarConstraint::Identifier)]);
        let pattern = call_pattern(
            "f",
            vec![PatternNode::Hole("x".into()), PatternNode::Hole("x".into())],
        );

        let same = call("f", vec![Expr::Ident("a".into()), Expr::Ident("a".into())]);
        let env = match_expr(&pattern, &same, &cs).expect("should match");
        assert_eq!(
            env.get("x"),
            Some(&EnvEntry::Bound(BoundValue::Expr(Expr::Ident("a".into()))))
        );

        let diff = call("f", vec![Expr::Ident("a".into()), Expr::Ident("b".into())]);
        assert!(match_expr(&pattern, &diff, &cs).is_none());
    }

    #[test]
    fn hole_in_invocation_name_position_binds_the_callee() {
        let cs = constraints(&[("f", MetavarConstraint::Identifier)]);
        let pattern = PatternNode::Invocation {
            target: None,
            name: Box::new(PatternNode::Hole("f".into())),
            args: vec![PatternNode::Lit(Lit::Int(1))],
        };
        let env = match_expr(&pattern, &call("foo", vec![Expr::Lit(Lit::Int(1))]), &cs)
            .expect("should match");
        assert_eq!(
            env.get("f"),
            Some(&EnvEntry::Bound(BoundValue::Expr(Expr::Ident("foo".into()))))
        );
    }

    #[test]
    fn args_gap_matches_any_argument_sequence() {
        let cs = constraints(&[]);
        let pattern = call_pattern(
            "f",
            vec![PatternNode::ArgsGap, PatternNode::Ident("z".into())],
        );
        let target = call(
            "f",
            vec![
                Expr::Ident("a".into()),
                Expr::Ident("b".into()),
                Expr::Ident("z".into()),
            ],
        );
        assert!(match_expr(&pattern, &target, &cs).is_some());
        assert!(match_expr(&pattern, &call("f", vec![Expr::Ident("z".into())]), &cs).is_some());
        assert!(match_expr(&pattern, &call("f", vec![]), &cs).is_none());
    }

    #[test]
    fn local_pattern_binds_type_and_name_holes() {
        let cs = constraints(&[
            ("T", MetavarConstraint::Type),
            ("x", MetavarConstraint::Identifier),
        ]);
        let pattern = PatternNode::Local {
            ty: Box::new(PatternNode::Hole("T".into())),
            name: Box::new(PatternNode::Hole("x".into())),
            init: None,
        };
        let stmt = Stmt::Local {
            ty: "List".into(),
            name: "items".into(),
            init: None,
            line: 1,
        };
        let env = match_stmt(&pattern, &stmt, &cs).expect("should match");
        assert_eq!(
            env.get("T"),
            Some(&EnvEntry::Bound(BoundValue::TypeName("List".into())))
        );
        assert_eq!(
            env.get("x"),
            Some(&EnvEntry::Bound(BoundValue::Expr(Expr::Ident(
                "items".into()
            ))))
        );
    }

    #[test]
    fn expression_pattern_matches_expression_statement() {
        let cs = constraints(&[]);
        let pattern = call_pattern("foo", vec![]);
        let stmt = Stmt::Expr {
            expr: call("foo", vec![]),
            line: 3,
        };
        assert!(match_stmt(&pattern, &stmt, &cs).is_some());
        let other = Stmt::Return {
            value: None,
            line: 3,
        };
        assert!(match_stmt(&pattern, &other, &cs).is_none());
    }

    #[test]
    fn structural_mismatch_fails() {
        let cs = constraints(&[]);
        let pattern = call_pattern("foo", vec![PatternNode::Ident("a".into())]);
        assert!(match_expr(&pattern, &call("bar", vec![Expr::Ident("a".into())]), &cs).is_none());
        assert!(match_expr(&pattern, &call("foo", vec![]), &cs).is_none());
    }
}
