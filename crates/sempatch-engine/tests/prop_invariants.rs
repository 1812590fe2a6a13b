//! Property tests over generated patches: the pipeline either compiles and
//! upholds the formula invariants, or fails with a structural error — never
//! a panic, never a malformed formula.

use proptest::prelude::*;

use sempatch_ctl::formula::{Formula, SetEnvValue, OPERATIONS_VAR};
use sempatch_ctl::ops::Operation;
use sempatch_engine::formula_compiler::optimize_fully;
use sempatch_engine::{compile_rule, CompileError};

/// Straight-line patch bodies: statements from a small vocabulary, each
/// optionally marked as addition or deletion, with dots lines interspersed.
/// No branches, so every added statement is referenced by exactly one
/// operation (branch-free formulas never duplicate suffixes).
fn patch_strategy() -> impl Strategy<Value = String> {
    let stmt = prop::sample::select(vec![
        "a();", "b();", "c(x);", "d(x, y);", "log();", "reset(y);",
    ]);
    let marker = prop::sample::select(vec!["", "+ ", "- "]);
    let line = (marker, stmt).prop_map(|(m, s)| format!("{m}{s}"));
    let body_line = prop_oneof![4 => line, 1 => Just("...".to_string())];
    prop::collection::vec(body_line, 1..8).prop_map(|lines| {
        format!("@@ identifier x, y; @@\n{}\n", lines.join("\n"))
    })
}

fn quantified_once(formula: &Formula, bound: &mut Vec<String>) -> bool {
    match formula {
        Formula::ExistsVar(name, inner) => {
            if name == OPERATIONS_VAR {
                return quantified_once(inner, bound);
            }
            if bound.contains(name) {
                return false;
            }
            bound.push(name.clone());
            let ok = quantified_once(inner, bound);
            bound.pop();
            ok
        }
        Formula::Not(i) | Formula::AllNext(i) | Formula::ExistsNext(i) => {
            quantified_once(i, bound)
        }
        Formula::And(l, r)
        | Formula::Or(l, r)
        | Formula::AllUntil(l, r)
        | Formula::ExistsUntil(l, r) => quantified_once(l, bound) && quantified_once(r, bound),
        _ => true,
    }
}

/// Statements added somewhere by the formula's operations plus the
/// method-level operations, as display text.
fn added_statement_texts(formula: &Formula, body_ops: &[Operation]) -> Vec<String> {
    let mut out = Vec::new();
    fn from_op(op: &Operation, out: &mut Vec<String>) {
        match op {
            Operation::Prepend(s)
            | Operation::Append(s)
            | Operation::Replace(s)
            | Operation::InsertIntoBlock { stmt: s, .. } => out.push(s.to_string()),
            Operation::Delete | Operation::MethodHeaderReplace(_) => {}
        }
    }
    fn walk(f: &Formula, out: &mut Vec<String>) {
        match f {
            Formula::SetEnv(_, SetEnvValue::Operations(ops)) => {
                for op in ops {
                    from_op(op, out);
                }
            }
            Formula::Not(i)
            | Formula::AllNext(i)
            | Formula::ExistsNext(i)
            | Formula::ExistsVar(_, i) => walk(i, out),
            Formula::And(l, r)
            | Formula::Or(l, r)
            | Formula::AllUntil(l, r)
            | Formula::ExistsUntil(l, r) => {
                walk(l, out);
                walk(r, out);
            }
            _ => {}
        }
    }
    walk(formula, &mut out);
    for op in body_ops {
        from_op(op, &mut out);
    }
    out
}

fn plus_line_texts(patch: &str) -> Vec<String> {
    patch
        .lines()
        .filter_map(|l| l.trim_start().strip_prefix('+'))
        .map(|l| l.trim().to_string())
        .collect()
}

proptest! {
    #[test]
    fn pipeline_never_panics_and_upholds_invariants(patch in patch_strategy()) {
        match compile_rule(&patch) {
            Ok(rule) => {
                // Optimization is a fixed point on compiler output.
                prop_assert_eq!(optimize_fully(rule.formula.clone()), rule.formula.clone());

                // Metavariables quantified at most once per path.
                prop_assert!(
                    quantified_once(&rule.formula, &mut Vec::new()),
                    "formula: {}", rule.formula
                );

                // Every `+` line materializes as exactly one added
                // statement across the rule's operations.
                let mut added = added_statement_texts(&rule.formula, &rule.body_operations);
                let mut expected = plus_line_texts(&patch);
                added.sort();
                expected.sort();
                prop_assert_eq!(added, expected, "patch: {:?}", patch);
            }
            Err(
                CompileError::UnanchorableStatement { .. }
                | CompileError::EmptyMatchContext
                | CompileError::DanglingOperations,
            ) => {
                // Structurally unanchorable patches are rejected cleanly.
            }
            Err(other) => {
                return Err(TestCaseError::fail(format!(
                    "unexpected error for {patch:?}: {other}"
                )));
            }
        }
    }

    #[test]
    fn separator_always_preserves_line_counts(patch in patch_strategy()) {
        let tokens = sempatch_dsl::lex(&patch).expect("lexes");
        let rewritten = sempatch_dsl::rewrite(&tokens).expect("rewrites");
        let views = sempatch_dsl::separate(&rewritten.text);
        prop_assert_eq!(
            views.deletions.lines().count(),
            views.additions.lines().count()
        );
    }
}
