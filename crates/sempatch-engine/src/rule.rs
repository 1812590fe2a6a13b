//! Rule assembly: the full pipeline from patch text to a `Rule`.
//!
//! Lex, rewrite and separate the patch, parse both views, resolve anchors
//! over the additions view, synthesize deletions, and compile the formula
//! over the deletions-view CFG.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use sempatch_ctl::constraints::MetavarConstraint;
use sempatch_ctl::formula::Formula;
use sempatch_ctl::ops::{AnchoredOperationsMap, Operation, METHOD_BODY_ANCHOR};
use sempatch_dsl::problems::{self, Problem};
use sempatch_dsl::{dsl, lex, rewrite, separate};
use sempatch_host::ast::{Block, Class, Lit, Method, Stmt};
use sempatch_host::cfg::ControlFlowBuilder;

use crate::anchors::{contained_common_lines, resolve_anchors};
use crate::cfg_adapter::adapt;
use crate::errors::CompileError;
use crate::formula_compiler::FormulaCompiler;

/// A compiled semantic patch rule.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: Option<String>,
    /// Original patch text.
    pub source: String,
    /// Deletions-view rule method: the match context.
    pub rule_method: Method,
    pub formula: Formula,
    pub metavars: IndexMap<String, MetavarConstraint>,
    /// Whole methods added by the patch.
    pub added_methods: Vec<Method>,
    /// Method-level operations: block-edge insertions into the method body
    /// and header replacement. These anchor to the method, not a statement.
    pub body_operations: Vec<Operation>,
    /// Non-fatal diagnostics from the problem detector.
    pub warnings: Vec<Problem>,
}

/// Compile a patch into a rule.
pub fn compile_rule(source: &str) -> Result<Rule, CompileError> {
    let mut warnings = Vec::new();

    let text_problems = problems::detect_text(source);
    if problems::has_errors(&text_problems) {
        return Err(CompileError::Problems {
            problems: text_problems,
        });
    }
    warnings.extend(text_problems);

    let tokens = lex(source)?;
    let token_problems = problems::detect_tokens(&tokens);
    if problems::has_errors(&token_problems) {
        return Err(CompileError::Problems {
            problems: token_problems,
        });
    }
    warnings.extend(token_problems);

    let rewritten = rewrite(&tokens)?;
    debug!(
        lines = rewritten.text.lines().count(),
        on_method_header = rewritten.matches_on_method_header,
        "rewrote patch"
    );

    let views = separate(&rewritten.text);
    let dels_class = parse_view(&views.deletions, "deletions")?;
    let adds_class = parse_view(&views.additions, "additions")?;

    let name = rule_name(&dels_class);
    let metavars = build_metavars(&dels_class)?;

    if dels_class.methods.len() > 2 {
        return Err(CompileError::MultipleRuleMethods);
    }
    let dels_rule_method = dsl::rule_method(&dels_class)
        .cloned()
        .ok_or(CompileError::EmptyMatchContext)?;

    let dels_lines = statement_lines(&dels_rule_method.body);
    let adds_rule_method = find_adds_rule_method(&adds_class, &dels_rule_method, &dels_lines)?;
    let adds_lines = statement_lines(&adds_rule_method.body);

    let mut common: HashSet<usize> = dels_lines.intersection(&adds_lines).copied().collect();

    let mut ops_map = resolve_anchors(&adds_rule_method, &common)?;

    for line in contained_common_lines(&adds_rule_method, &common) {
        common.remove(&line);
    }

    if context_statements(&dels_rule_method).is_empty() && !ops_map.is_empty() {
        return Err(CompileError::EmptyMatchContext);
    }

    // Deleted lines: context statements absent from the common set. Dots
    // carry no concrete statement to delete.
    for stmt in all_statements(&dels_rule_method.body) {
        let line = stmt.line();
        if !common.contains(&line) && !dsl::is_dots_statement(stmt) {
            ops_map.push(line, Operation::Delete);
        }
    }

    ops_map.collapse_replacements();

    if dels_rule_method.full_signature() != adds_rule_method.full_signature() {
        ops_map.push(
            METHOD_BODY_ANCHOR,
            Operation::MethodHeaderReplace(scrub_deletion_anchors(&adds_rule_method)),
        );
    }

    let body_operations = ops_map.take(METHOD_BODY_ANCHOR);
    debug!(
        anchored_lines = ops_map.lines().count(),
        body_operations = body_operations.len(),
        "resolved anchors"
    );

    let cfg = adapt(ControlFlowBuilder::new().build(&dels_rule_method))?;
    let formula = FormulaCompiler::new(&cfg, &metavars, &ops_map).compile()?;
    debug!(formula = %formula, "compiled formula");

    let dels_signatures: Vec<String> = dels_class.methods.iter().map(|m| m.signature()).collect();
    let added_methods: Vec<Method> = adds_class
        .methods
        .iter()
        .filter(|m| m.name != dsl::METAVARS_METHOD)
        .filter(|m| m.line != adds_rule_method.line)
        .filter(|m| !dels_signatures.contains(&m.signature()))
        .map(scrub_deletion_anchors)
        .collect();

    Ok(Rule {
        name,
        source: source.to_owned(),
        rule_method: dels_rule_method,
        formula,
        metavars,
        added_methods,
        body_operations,
        warnings,
    })
}

fn parse_view(source: &str, view: &'static str) -> Result<Class, CompileError> {
    let classes =
        sempatch_host::parse(source, view).map_err(|e| CompileError::Parse { view, source: e })?;
    classes
        .into_iter()
        .next()
        .ok_or(CompileError::EmptyMatchContext)
}

fn rule_name(class: &Class) -> Option<String> {
    class.field(dsl::RULE_NAME_FIELD).and_then(|f| match &f.value {
        Lit::Str(s) => Some(s.clone()),
        _ => None,
    })
}

fn build_metavars(class: &Class) -> Result<IndexMap<String, MetavarConstraint>, CompileError> {
    let mut out = IndexMap::new();
    let Some(method) = class.method(dsl::METAVARS_METHOD) else {
        return Ok(out);
    };

    let mut current: Option<String> = None;
    for stmt in &method.body.stmts {
        match stmt {
            Stmt::Expr {
                expr:
                    sempatch_host::ast::Expr::Invocation {
                        target: None,
                        name,
                        args,
                    },
                ..
            } => {
                if dsl::GENERIC_METAVAR_KINDS.contains(&name.as_str()) {
                    let var = match args.as_slice() {
                        [sempatch_host::ast::Expr::Ident(var)] => var.clone(),
                        _ => {
                            return Err(CompileError::UnknownMetavarKind {
                                kind: stmt.to_string(),
                            })
                        }
                    };
                    let constraint = match name.as_str() {
                        "identifier" => MetavarConstraint::Identifier,
                        "type" => MetavarConstraint::Type,
                        "constant" => MetavarConstraint::Constant,
                        _ => MetavarConstraint::Expression,
                    };
                    out.insert(var.clone(), constraint);
                    current = Some(var);
                } else if name == dsl::CONSTRAINT_INVOCATION {
                    let (kind, pattern) = match args.as_slice() {
                        [sempatch_host::ast::Expr::Lit(Lit::Str(kind)), sempatch_host::ast::Expr::Lit(Lit::Str(pattern))] => {
                            (kind.clone(), pattern.clone())
                        }
                        _ => {
                            return Err(CompileError::UnknownConstraintKind {
                                kind: stmt.to_string(),
                            })
                        }
                    };
                    if kind != dsl::REGEX_CONSTRAINT {
                        return Err(CompileError::UnknownConstraintKind { kind });
                    }
                    let var = current.clone().ok_or(CompileError::UnknownConstraintKind {
                        kind: "constraint before any metavariable".into(),
                    })?;
                    let inner = out
                        .get(&var)
                        .cloned()
                        .ok_or(CompileError::UnknownConstraintKind {
                            kind: format!("constraint on undeclared metavariable {var}"),
                        })?;
                    out.insert(
                        var,
                        MetavarConstraint::Regex {
                            pattern,
                            inner: Box::new(inner),
                        },
                    );
                } else {
                    return Err(CompileError::UnknownMetavarKind { kind: name.clone() });
                }
            }
            Stmt::Local { ty, name, init: None, .. } => {
                out.insert(name.clone(), MetavarConstraint::TypedIdentifier(ty.clone()));
                current = Some(name.clone());
            }
            other => {
                return Err(CompileError::UnknownMetavarKind {
                    kind: other.to_string(),
                })
            }
        }
    }
    Ok(out)
}

fn find_adds_rule_method(
    class: &Class,
    dels_method: &Method,
    dels_lines: &HashSet<usize>,
) -> Result<Method, CompileError> {
    for method in &class.methods {
        if method.signature() == dels_method.signature()
            || (class.methods.len() == 2 && method.name != dsl::METAVARS_METHOD)
        {
            return Ok(method.clone());
        }
        for stmt in all_statements(&method.body) {
            if dsl::is_deletion_anchor(stmt) || dels_lines.contains(&stmt.line()) {
                return Ok(method.clone());
            }
        }
    }
    Err(CompileError::AdditionsRuleMethodNotFound)
}

/// All statements in a block, recursively, in source order.
fn all_statements(block: &Block) -> Vec<&Stmt> {
    let mut out = Vec::new();
    fn walk<'a>(block: &'a Block, out: &mut Vec<&'a Stmt>) {
        for stmt in &block.stmts {
            out.push(stmt);
            if let Stmt::If {
                then_block,
                else_block,
                ..
            } = stmt
            {
                walk(then_block, out);
                if let Some(e) = else_block {
                    walk(e, out);
                }
            }
        }
    }
    walk(block, &mut out);
    out
}

/// Lines of all statements, excluding deletion anchors.
fn statement_lines(block: &Block) -> HashSet<usize> {
    all_statements(block)
        .into_iter()
        .filter(|s| !dsl::is_deletion_anchor(s))
        .map(|s| s.line())
        .collect()
}

/// The match-context statements: the rule-method body, looking through the
/// implicit-dots wrapper when present.
fn context_statements(method: &Method) -> &[Stmt] {
    match method.body.stmts.as_slice() {
        [wrapper] => dsl::implicit_dots_body(wrapper)
            .map(|b| b.stmts.as_slice())
            .unwrap_or(&method.body.stmts),
        stmts => stmts,
    }
}

fn scrub_deletion_anchors(method: &Method) -> Method {
    fn scrub_block(block: &Block) -> Block {
        Block {
            stmts: block
                .stmts
                .iter()
                .filter(|s| !dsl::is_deletion_anchor(s))
                .map(|s| match s {
                    Stmt::If {
                        cond,
                        then_block,
                        else_block,
                        line,
                    } => Stmt::If {
                        cond: cond.clone(),
                        then_block: scrub_block(then_block),
                        else_block: else_block.as_ref().map(scrub_block),
                        line: *line,
                    },
                    other => other.clone(),
                })
                .collect(),
        }
    }
    Method {
        modifiers: method.modifiers.clone(),
        ret_ty: method.ret_ty.clone(),
        name: method.name.clone(),
        params: method.params.clone(),
        body: scrub_block(&method.body),
        line: method.line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sempatch_ctl::formula::SetEnvValue;

    fn formula_operations(formula: &Formula) -> Vec<Operation> {
        let mut out = Vec::new();
        fn walk(f: &Formula, out: &mut Vec<Operation>) {
            match f {
                Formula::SetEnv(_, SetEnvValue::Operations(ops)) => out.extend(ops.clone()),
                Formula::Not(i) | Formula::AllNext(i) | Formula::ExistsNext(i) => walk(i, out),
                Formula::ExistsVar(_, i) => walk(i, out),
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
        out
    }

    #[test]
    fn simple_replace_rule() {
        let rule = compile_rule("@@ identifier x; @@\n- foo(x);\n+ bar(x);\n").unwrap();
        assert_eq!(rule.metavars.get("x"), Some(&MetavarConstraint::Identifier));
        assert_eq!(
            rule.formula.to_string(),
            "E(x, And(Stmt(foo(x);), E(_v, SetEnv(_v, [replace with bar(x);]))))"
        );
        assert!(rule.body_operations.is_empty());
    }

    #[test]
    fn dots_and_append_rule() {
        let rule = compile_rule("@@ @@\na();\n...\n+ b();\nc();\n").unwrap();
        assert_eq!(
            rule.formula.to_string(),
            "And(Stmt(a();), AX(AU(True, And(Stmt(c();), E(_v, SetEnv(_v, [prepend b();]))))))"
        );
    }

    #[test]
    fn if_branch_addition_prepends_to_following_context() {
        let rule = compile_rule("@@ @@\nif (cond) {\n+ log();\nwork();\n}\n").unwrap();
        let ops = formula_operations(&rule.formula);
        assert_eq!(ops.len(), 1);
        assert!(matches!(&ops[0], Operation::Prepend(s) if s.to_string() == "log();"));
        // The prepend rides the work() atom inside the true branch.
        let s = rule.formula.to_string();
        assert!(
            s.contains("And(Stmt(work();), E(_v, SetEnv(_v, [prepend log();])))"),
            "{s}"
        );
    }

    #[test]
    fn lone_if_branch_addition_inserts_at_branch_top() {
        let rule = compile_rule("@@ @@\nif (cond) {\n+ log();\n...\n}\n").unwrap();
        let s = rule.formula.to_string();
        assert!(
            s.contains("And(Prop(trueBranch), E(_v, SetEnv(_v, [insert log(); at top of true branch])))"),
            "{s}"
        );
    }

    #[test]
    fn metavariable_quantified_once_across_two_uses() {
        let rule = compile_rule("@@ identifier f; @@\nf(1);\nf(2);\n").unwrap();
        let s = rule.formula.to_string();
        assert_eq!(s.matches("E(f,").count(), 1, "{s}");
        assert!(s.starts_with("E(f, And(Stmt(f(1);)"), "{s}");
    }

    #[test]
    fn delete_around_dots_yields_two_deletes() {
        let rule = compile_rule("@@ @@\n- a();\n...\n- b();\n").unwrap();
        let ops = formula_operations(&rule.formula);
        assert_eq!(ops, vec![Operation::Delete, Operation::Delete]);
        assert!(rule.formula.to_string().contains("AU(True"), "{}", rule.formula);
    }

    #[test]
    fn regex_constrained_metavariable() {
        let rule =
            compile_rule("@@ identifier x; x when matches \"^get.*\"; @@\n- x();\n").unwrap();
        assert_eq!(
            rule.metavars.get("x"),
            Some(&MetavarConstraint::Regex {
                pattern: "^get.*".into(),
                inner: Box::new(MetavarConstraint::Identifier),
            })
        );
    }

    #[test]
    fn empty_body_yields_not_true_and_no_operations() {
        let rule = compile_rule("@@ @@\n").unwrap();
        assert_eq!(rule.formula, Formula::not(Formula::True));
        assert!(formula_operations(&rule.formula).is_empty());
        assert!(rule.body_operations.is_empty());
        assert!(!rule.warnings.is_empty());
    }

    #[test]
    fn context_only_patch_embeds_no_operations() {
        let rule = compile_rule("@@ @@\na();\nb();\n").unwrap();
        assert!(formula_operations(&rule.formula).is_empty());
        assert!(rule.body_operations.is_empty());
    }

    #[test]
    fn rule_name_is_captured() {
        let rule = compile_rule("@ fix_foo @\nidentifier x;\n@@\n- foo(x);\n").unwrap();
        assert_eq!(rule.name.as_deref(), Some("fix_foo"));
    }

    #[test]
    fn typed_metavariable_declaration() {
        let rule = compile_rule("@@ List l; @@\n- l.clear();\n").unwrap();
        assert_eq!(
            rule.metavars.get("l"),
            Some(&MetavarConstraint::TypedIdentifier("List".into()))
        );
    }

    #[test]
    fn method_header_change_becomes_body_operation() {
        let rule =
            compile_rule("@@ @@\n- void target() {\n+ int target() {\nwork();\n}\n").unwrap();
        assert_eq!(rule.body_operations.len(), 1);
        match &rule.body_operations[0] {
            Operation::MethodHeaderReplace(m) => {
                assert_eq!(m.full_signature(), "int target()");
            }
            other => panic!("unexpected operation: {other:?}"),
        }
    }

    #[test]
    fn added_methods_are_collected() {
        let rule = compile_rule(
            "@@ @@\nvoid target() {\n- foo();\n+ bar();\n}\n+ void helper() {\n+ aux();\n+ }\n",
        )
        .unwrap();
        assert_eq!(rule.added_methods.len(), 1);
        assert_eq!(rule.added_methods[0].name, "helper");
        let ops = formula_operations(&rule.formula);
        assert!(ops
            .iter()
            .any(|o| matches!(o, Operation::Replace(s) if s.to_string() == "bar();")));
    }

    #[test]
    fn pure_addition_patch_is_empty_match_context() {
        let err = compile_rule("@@ @@\n+ a();\n").unwrap_err();
        assert!(matches!(err, CompileError::EmptyMatchContext));
    }

    #[test]
    fn unanchorable_addition_between_dots() {
        let err = compile_rule("@@ @@\na();\n...\n+ b();\n...\nc();\n").unwrap_err();
        assert!(matches!(err, CompileError::UnanchorableStatement { .. }));
    }

    #[test]
    fn disjunction_is_rejected_by_the_problem_gate() {
        let err = compile_rule("@@ @@\n(\na();\n|\nb();\n)\n").unwrap_err();
        assert!(matches!(err, CompileError::Problems { .. }));
    }

    #[test]
    fn multiple_context_methods_are_rejected() {
        let err = compile_rule("@@ @@\nvoid a() {\nfoo();\n}\nvoid b() {\nbar();\n}\n")
            .unwrap_err();
        assert!(matches!(err, CompileError::MultipleRuleMethods));
    }

    #[test]
    fn non_generic_kind_reads_as_typed_identifier() {
        let rule = compile_rule("@@ frobnicate x; @@\n- x();\n").unwrap();
        assert_eq!(
            rule.metavars.get("x"),
            Some(&MetavarConstraint::TypedIdentifier("frobnicate".into()))
        );
    }

    #[test]
    fn deleted_dots_line_contributes_no_delete() {
        let rule = compile_rule("@@ @@\na();\n- ...\nb();\n").unwrap();
        let ops = formula_operations(&rule.formula);
        assert!(ops.is_empty(), "{ops:?}");
        assert!(rule.formula.to_string().contains("AU(True"));
    }

    #[test]
    fn warnings_are_carried_on_success() {
        let rule = compile_rule("@@ @@\n").unwrap();
        assert!(rule
            .warnings
            .iter()
            .any(|w| w.message.contains("matches nothing")));
    }
}
