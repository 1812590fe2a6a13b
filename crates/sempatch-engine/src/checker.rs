//! CTL-VW model checker.
//!
//! Evaluates a compiled formula against the adapted CFG of a candidate
//! target method. Results are sets of (state, environment, witness-forest)
//! triples; environments compose by compatible union and negation produces
//! negative bindings. Until-operators run as least fixpoints over result
//! sets, which handles cyclic target graphs.

use indexmap::IndexMap;
use sempatch_ctl::constraints::MetavarConstraint;
use sempatch_ctl::env::{BoundValue, EnvEntry, Environment};
use sempatch_ctl::formula::{Formula, SetEnvValue, OPERATIONS_VAR};
use sempatch_ctl::ops::Operation;
use sempatch_ctl::pattern::{match_expr, match_stmt};
use sempatch_ctl::witness::Witness;
use sempatch_host::ast::Stmt;
use sempatch_host::cfg::{NodeId, NodeKind};

use crate::cfg_adapter::RuleCfg;

/// One satisfying assignment at one model state.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub state: NodeId,
    pub env: Environment,
    pub witnesses: Vec<Witness>,
}

pub type ResultSet = Vec<CheckResult>;

/// A matched location together with the edits to perform there.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSite {
    pub state: NodeId,
    pub env: Environment,
    pub operations: Vec<Operation>,
}

pub struct ModelChecker<'a> {
    model: &'a RuleCfg,
    metavars: &'a IndexMap<String, MetavarConstraint>,
}

impl<'a> ModelChecker<'a> {
    pub fn new(model: &'a RuleCfg, metavars: &'a IndexMap<String, MetavarConstraint>) -> Self {
        Self { model, metavars }
    }

    pub fn check(&self, formula: &Formula) -> ResultSet {
        self.sat(formula)
    }

    fn states(&self) -> Vec<NodeId> {
        self.model.node_ids().collect()
    }

    fn sat(&self, formula: &Formula) -> ResultSet {
        match formula {
            Formula::True => self
                .states()
                .into_iter()
                .map(|state| CheckResult {
                    state,
                    env: Environment::new(),
                    witnesses: Vec::new(),
                })
                .collect(),

            Formula::Proposition(label) => self
                .states()
                .into_iter()
                .filter(|&s| {
                    self.model
                        .tag(s)
                        .and_then(|t| t.label.proposition())
                        .is_some_and(|p| p == *label)
                })
                .map(|state| CheckResult {
                    state,
                    env: Environment::new(),
                    witnesses: Vec::new(),
                })
                .collect(),

            Formula::Statement(sp) => {
                let mut out = Vec::new();
                for state in self.states() {
                    let Some(node) = self.model.node(state) else {
                        continue;
                    };
                    if node.kind != NodeKind::Statement {
                        continue;
                    }
                    let Some(stmt) = &node.stmt else { continue };
                    if let Some(env) = match_stmt(&sp.pattern, stmt, self.metavars) {
                        out.push(CheckResult {
                            state,
                            env,
                            witnesses: Vec::new(),
                        });
                    }
                }
                out
            }

            Formula::Branch(bp) => {
                let mut out = Vec::new();
                for state in self.states() {
                    let Some(node) = self.model.node(state) else {
                        continue;
                    };
                    if node.kind != NodeKind::Branch {
                        continue;
                    }
                    let Some(Stmt::If { cond, .. }) = &node.stmt else {
                        continue;
                    };
                    if let Some(env) = match_expr(&bp.pattern, cond, self.metavars) {
                        out.push(CheckResult {
                            state,
                            env,
                            witnesses: Vec::new(),
                        });
                    }
                }
                out
            }

            Formula::Not(inner) => self.negate(&self.sat(inner)),
            Formula::And(lhs, rhs) => join(&self.sat(lhs), &self.sat(rhs)),
            Formula::Or(lhs, rhs) => {
                let mut out = self.sat(lhs);
                for r in self.sat(rhs) {
                    push_unique(&mut out, r);
                }
                out
            }

            Formula::AllNext(inner) => self.pre_all(&self.sat(inner)),
            Formula::ExistsNext(inner) => self.pre_exists(&self.sat(inner)),

            Formula::AllUntil(lhs, rhs) => self.sat_until(lhs, rhs, true),
            Formula::ExistsUntil(lhs, rhs) => self.sat_until(lhs, rhs, false),

            Formula::ExistsVar(name, inner) => {
                let mut out = Vec::new();
                for r in self.sat(inner) {
                    let projected = match r.env.get(name) {
                        Some(EnvEntry::Bound(value)) => CheckResult {
                            state: r.state,
                            env: r.env.without(name),
                            witnesses: vec![Witness::new(r.state, name.clone(), value.clone())
                                .with_nested(r.witnesses.clone())],
                        },
                        Some(EnvEntry::Forbidden(_)) => CheckResult {
                            state: r.state,
                            env: r.env.without(name),
                            witnesses: r.witnesses.clone(),
                        },
                        None => r,
                    };
                    push_unique(&mut out, projected);
                }
                out
            }

            Formula::SetEnv(name, SetEnvValue::Operations(ops)) => self
                .states()
                .into_iter()
                .map(|state| CheckResult {
                    state,
                    env: Environment::bound(name.clone(), BoundValue::Operations(ops.clone())),
                    witnesses: Vec::new(),
                })
                .collect(),
        }
    }

    /// Complement of a result set. A state with no satisfying assignment
    /// holds unconditionally; a state satisfying the operand only under
    /// bindings holds under the composed negations of those bindings; a
    /// state satisfying it under the empty environment never holds.
    fn negate(&self, inner: &ResultSet) -> ResultSet {
        let mut out = Vec::new();
        for state in self.states() {
            let satisfying: Vec<&CheckResult> =
                inner.iter().filter(|r| r.state == state).collect();
            if satisfying.is_empty() {
                out.push(CheckResult {
                    state,
                    env: Environment::new(),
                    witnesses: Vec::new(),
                });
                continue;
            }
            let mut acc = vec![Environment::new()];
            for r in &satisfying {
                let negs = r.env.negate();
                let mut next = Vec::new();
                for env in &acc {
                    for neg in &negs {
                        if let Some(composed) = env.compose(neg) {
                            if !next.contains(&composed) {
                                next.push(composed);
                            }
                        }
                    }
                }
                acc = next;
                if acc.is_empty() {
                    break;
                }
            }
            for env in acc {
                push_unique(
                    &mut out,
                    CheckResult {
                        state,
                        env,
                        witnesses: Vec::new(),
                    },
                );
            }
        }
        out
    }

    /// States with at least one successor satisfying the operand.
    fn pre_exists(&self, rs: &ResultSet) -> ResultSet {
        let mut out = Vec::new();
        for state in self.states() {
            for &succ in self.model.successors(state) {
                for r in rs.iter().filter(|r| r.state == succ) {
                    push_unique(
                        &mut out,
                        CheckResult {
                            state,
                            env: r.env.clone(),
                            witnesses: r.witnesses.clone(),
                        },
                    );
                }
            }
        }
        out
    }

    /// States all of whose successors satisfy the operand under compatible
    /// environments. States without successors do not satisfy `AllNext`.
    fn pre_all(&self, rs: &ResultSet) -> ResultSet {
        let mut out = Vec::new();
        'states: for state in self.states() {
            let succs = self.model.successors(state);
            if succs.is_empty() {
                continue;
            }
            let mut groups: Vec<Vec<&CheckResult>> = Vec::new();
            for &succ in succs {
                let group: Vec<&CheckResult> = rs.iter().filter(|r| r.state == succ).collect();
                if group.is_empty() {
                    continue 'states;
                }
                groups.push(group);
            }
            for (env, witnesses) in combine(&groups) {
                push_unique(
                    &mut out,
                    CheckResult {
                        state,
                        env,
                        witnesses,
                    },
                );
            }
        }
        out
    }

    /// Least fixpoint for the until-operators.
    fn sat_until(&self, lhs: &Formula, rhs: &Formula, universal: bool) -> ResultSet {
        let side = self.sat(lhs);
        let mut cur: ResultSet = Vec::new();
        for r in self.sat(rhs) {
            push_unique(&mut cur, r);
        }
        loop {
            let pre = if universal {
                self.pre_all(&cur)
            } else {
                self.pre_exists(&cur)
            };
            let step = join(&side, &pre);
            let mut changed = false;
            for r in step {
                if !cur.contains(&r) {
                    cur.push(r);
                    changed = true;
                }
            }
            if !changed {
                return cur;
            }
        }
    }
}

fn push_unique(set: &mut ResultSet, result: CheckResult) {
    if !set.contains(&result) {
        set.push(result);
    }
}

/// Per-state conjunction with environment composition.
fn join(a: &ResultSet, b: &ResultSet) -> ResultSet {
    let mut out = Vec::new();
    for ra in a {
        for rb in b.iter().filter(|r| r.state == ra.state) {
            if let Some(env) = ra.env.compose(&rb.env) {
                let mut witnesses = ra.witnesses.clone();
                for w in &rb.witnesses {
                    if !witnesses.contains(w) {
                        witnesses.push(w.clone());
                    }
                }
                push_unique(
                    &mut out,
                    CheckResult {
                        state: ra.state,
                        env,
                        witnesses,
                    },
                );
            }
        }
    }
    out
}

/// Cartesian combination of per-successor result groups under compatible
/// environment composition.
fn combine(groups: &[Vec<&CheckResult>]) -> Vec<(Environment, Vec<Witness>)> {
    let mut acc: Vec<(Environment, Vec<Witness>)> = vec![(Environment::new(), Vec::new())];
    for group in groups {
        let mut next = Vec::new();
        for (env, witnesses) in &acc {
            for r in group {
                if let Some(composed) = env.compose(&r.env) {
                    let mut w = witnesses.clone();
                    for nw in &r.witnesses {
                        if !w.contains(nw) {
                            w.push(nw.clone());
                        }
                    }
                    if !next.contains(&(composed.clone(), w.clone())) {
                        next.push((composed, w));
                    }
                }
            }
        }
        if next.is_empty() {
            return Vec::new();
        }
        acc = next;
    }
    acc
}

/// Extract matched locations and their edit payloads from a result set.
///
/// Operation payloads travel as `"_v"` witnesses; the bindings on the path
/// from the result root down to each payload give the site's environment.
pub fn collect_match_sites(results: &ResultSet) -> Vec<MatchSite> {
    fn walk(witnesses: &[Witness], inherited: &Environment, out: &mut Vec<MatchSite>) {
        for w in witnesses {
            if w.metavar == OPERATIONS_VAR {
                if let BoundValue::Operations(ops) = &w.binding {
                    let site = MatchSite {
                        state: w.state,
                        env: inherited.clone(),
                        operations: ops.clone(),
                    };
                    if !out.contains(&site) {
                        out.push(site);
                    }
                }
                walk(&w.nested, inherited, out);
            } else {
                let mut env = inherited.clone();
                env.set(w.metavar.clone(), w.binding.clone());
                walk(&w.nested, &env, out);
            }
        }
    }

    let mut out = Vec::new();
    for r in results {
        walk(&r.witnesses, &Environment::new(), &mut out);
    }
    out
}
