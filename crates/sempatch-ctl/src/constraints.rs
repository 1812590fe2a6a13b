//! Metavariable constraints.
//!
//! A constraint decides whether a candidate program element can bind a
//! metavariable, and produces the binding when it can. The same variable
//! bound at two atoms must carry equal bindings; equality is structural on
//! the underlying AST.

use regex::Regex;
use sempatch_host::ast::Expr;

use crate::env::BoundValue;

#[derive(Debug, Clone, PartialEq)]
pub enum MetavarConstraint {
    /// Any name reference.
    Identifier,
    /// Any type reference.
    Type,
    /// Literals only.
    Constant,
    /// Any expression.
    Expression,
    /// Identifiers declared with the given type name.
    TypedIdentifier(String),
    /// Defers to `inner`, additionally requiring the stringified binding to
    /// match the regex.
    Regex {
        pattern: String,
        inner: Box<MetavarConstraint>,
    },
}

impl MetavarConstraint {
    /// Try to bind a candidate value under this constraint.
    ///
    /// `declared_ty` is the declared type at the binding site, when the site
    /// is a declaration; it is what `TypedIdentifier` checks against.
    pub fn matches(&self, candidate: &BoundValue, declared_ty: Option<&str>) -> Option<BoundValue> {
        match self {
            MetavarConstraint::Identifier => match candidate {
                BoundValue::Expr(Expr::Ident(_)) => Some(candidate.clone()),
                _ => None,
            },
            MetavarConstraint::Type => match candidate {
                BoundValue::TypeName(_) => Some(candidate.clone()),
                _ => None,
            },
            MetavarConstraint::Constant => match candidate {
                BoundValue::Expr(Expr::Lit(_)) => Some(candidate.clone()),
                _ => None,
            },
            MetavarConstraint::Expression => match candidate {
                BoundValue::Expr(_) => Some(candidate.clone()),
                _ => None,
            },
            MetavarConstraint::TypedIdentifier(ty) => match candidate {
                // At declaration sites the declared type must agree; plain
                // references carry no type information, so consistency is
                // enforced through binding equality alone.
                BoundValue::Expr(Expr::Ident(_)) => {
                    if declared_ty.is_some_and(|d| d != ty) {
                        None
                    } else {
                        Some(candidate.clone())
                    }
                }
                _ => None,
            },
            MetavarConstraint::Regex { pattern, inner } => {
                let bound = inner.matches(candidate, declared_ty)?;
                let re = Regex::new(pattern).ok()?;
                if re.is_match(&bound.to_string()) {
                    Some(bound)
                } else {
                    None
                }
            }
        }
    }

    /// Whether a candidate agrees with an existing binding of the same
    /// variable.
    pub fn merge(&self, existing: &BoundValue, candidate: &BoundValue) -> bool {
        existing == candidate
    }

    /// Short kind name used in reports.
    pub fn kind_name(&self) -> String {
        match self {
            MetavarConstraint::Identifier => "identifier".into(),
            MetavarConstraint::Type => "type".into(),
            MetavarConstraint::Constant => "constant".into(),
            MetavarConstraint::Expression => "expression".into(),
            MetavarConstraint::TypedIdentifier(ty) => ty.clone(),
            MetavarConstraint::Regex { pattern, inner } => {
                format!("{} matching \"{}\"", inner.kind_name(), pattern)
            }
        }
    }
}
