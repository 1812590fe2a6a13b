//! Metavariable environments.
//!
//! An environment is an ordered set of metavariable bindings. Bindings are
//! positive (the variable equals a value) or negative (the variable must not
//! equal any of a set of values). Environments compose by compatible union;
//! negation is what introduces negative bindings.

use std::fmt;

use indexmap::IndexMap;
use sempatch_host::ast::Expr;

use crate::ops::Operation;

/// A value a metavariable can be bound to.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    /// An expression element (identifiers and constants included).
    Expr(Expr),
    /// A type name.
    TypeName(String),
    /// An edit-operation payload carried through the `"_v"` pseudo-variable.
    Operations(Vec<Operation>),
}

impl fmt::Display for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundValue::Expr(e) => write!(f, "{e}"),
            BoundValue::TypeName(t) => write!(f, "{t}"),
            BoundValue::Operations(ops) => {
                let ops: Vec<String> = ops.iter().map(|o| o.to_string()).collect();
                write!(f, "[{}]", ops.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnvEntry {
    /// The variable is bound to this value.
    Bound(BoundValue),
    /// The variable must not equal any of these values.
    Forbidden(Vec<BoundValue>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    entries: IndexMap<String, EnvEntry>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Singleton environment binding one variable.
    pub fn bound(name: impl Into<String>, value: BoundValue) -> Self {
        let mut env = Self::new();
        env.set(name, value);
        env
    }

    pub fn set(&mut self, name: impl Into<String>, value: BoundValue) {
        self.entries.insert(name.into(), EnvEntry::Bound(value));
    }

    pub fn forbid(&mut self, name: impl Into<String>, value: BoundValue) {
        self.entries
            .insert(name.into(), EnvEntry::Forbidden(vec![value]));
    }

    pub fn get(&self, name: &str) -> Option<&EnvEntry> {
        self.entries.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EnvEntry)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy of this environment without `name`.
    pub fn without(&self, name: &str) -> Environment {
        let mut out = self.clone();
        out.entries.shift_remove(name);
        out
    }

    /// Compatible union. `None` when the two environments disagree on a
    /// variable bound by both, or when a binding hits a negative binding of
    /// the same value.
    pub fn compose(&self, other: &Environment) -> Option<Environment> {
        let mut out = self.clone();
        for (name, entry) in &other.entries {
            let merged = match (out.entries.get(name), entry) {
                (None, e) => e.clone(),
                (Some(EnvEntry::Bound(a)), EnvEntry::Bound(b)) => {
                    if a != b {
                        return None;
                    }
                    EnvEntry::Bound(a.clone())
                }
                (Some(EnvEntry::Bound(a)), EnvEntry::Forbidden(vs)) => {
                    if vs.contains(a) {
                        return None;
                    }
                    EnvEntry::Bound(a.clone())
                }
                (Some(EnvEntry::Forbidden(vs)), EnvEntry::Bound(b)) => {
                    if vs.contains(b) {
                        return None;
                    }
                    EnvEntry::Bound(b.clone())
                }
                (Some(EnvEntry::Forbidden(vs)), EnvEntry::Forbidden(ws)) => {
                    let mut all = vs.clone();
                    for w in ws {
                        if !all.contains(w) {
                            all.push(w.clone());
                        }
                    }
                    EnvEntry::Forbidden(all)
                }
            };
            out.entries.insert(name.clone(), merged);
        }
        Some(out)
    }

    /// Environments describing the complement of this one.
    ///
    /// Each positive binding contributes one environment forbidding its
    /// value; each negative binding contributes one environment per
    /// forbidden value, binding it positively. The empty environment has an
    /// unsatisfiable complement, so the result is empty.
    pub fn negate(&self) -> Vec<Environment> {
        let mut out = Vec::new();
        for (name, entry) in &self.entries {
            match entry {
                EnvEntry::Bound(v) => {
                    let mut env = Environment::new();
                    env.forbid(name.clone(), v.clone());
                    out.push(env);
                }
                EnvEntry::Forbidden(vs) => {
                    for v in vs {
                        out.push(Environment::bound(name.clone(), v.clone()));
                    }
                }
            }
        }
        out
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, entry)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match entry {
                EnvEntry::Bound(v) => write!(f, "{name} -> {v}")?,
                EnvEntry::Forbidden(vs) => {
                    let vs: Vec<String> = vs.iter().map(|v| v.to_string()).collect();
                    write!(f, "{name} != {{{}}}", vs.join(", "))?;
                }
            }
        }
        write!(f, "}}")
    }
}
