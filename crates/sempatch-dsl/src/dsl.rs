//! The marker vocabulary of the rewritten rule DSL, plus recognizers over
//! the host AST for each marker form.

use std::sync::OnceLock;

use regex::Regex;
use sempatch_host::ast::{Block, Class, Expr, Method, Stmt};

/// Name of the class the rewriter emits.
pub const RULE_CLASS: &str = "RewrittenSmPLRule";
/// Field holding the rule name, when the patch declares one.
pub const RULE_NAME_FIELD: &str = "__SmPLRuleName__";
/// Method whose body encodes metavariable declarations.
pub const METAVARS_METHOD: &str = "__SmPLMetavars__";
/// Statement-level dots.
pub const DOTS_STATEMENT: &str = "__SmPLDots__";
/// Placeholder standing in for deleted lines in the additions view.
pub const DELETION_ANCHOR: &str = "__SmPLDeletion__";
/// Wrapper making a bare expression line parse as a statement.
pub const EXPRESSION_MATCH: &str = "__SmPLExpressionMatch__";
/// Condition of the synthesized wrapper around header-less patch bodies.
pub const IMPLICIT_DOTS: &str = "__SmPLImplicitDots__";
/// Dots inside an invocation's argument list.
pub const DOTS_ARGUMENTS: &str = "__SmPLDotsArguments__";
/// Parameter-list dots: declared type and name of the synthetic parameter.
pub const DOTS_PARAMETER_TYPE: &str = "__SmPLDotsParamType__";
pub const DOTS_PARAMETER_NAME: &str = "__SmPLDotsParams__";
/// Synthesized method header parts for header-less patches.
pub const UNSPECIFIED_RETURN_TYPE: &str = "__SmPLUnspecified__";
pub const UNSPECIFIED_METHOD_NAME: &str = "__SmPLRuleMethod__";
/// Dots-constraint marker invocations.
pub const WHEN_ANY: &str = "whenAny";
pub const WHEN_EXISTS: &str = "whenExists";
pub const WHEN_NOT_EQUAL: &str = "whenNotEqual";
/// Constraint attachment in the metavariables method.
pub const CONSTRAINT_INVOCATION: &str = "constraint";
pub const REGEX_CONSTRAINT: &str = "regex-match";

/// Metavariable kinds declared by keyword rather than by type name.
pub const GENERIC_METAVAR_KINDS: [&str; 4] = ["identifier", "type", "constant", "expression"];

/// The arguments of a statement that is a bare invocation of `name`.
pub fn invocation_args<'a>(stmt: &'a Stmt, name: &str) -> Option<&'a [Expr]> {
    match stmt {
        Stmt::Expr {
            expr:
                Expr::Invocation {
                    target: None,
                    name: n,
                    args,
                },
            ..
        } if n == name => Some(args),
        _ => None,
    }
}

pub fn is_dots_statement(stmt: &Stmt) -> bool {
    invocation_args(stmt, DOTS_STATEMENT).is_some()
}

pub fn is_deletion_anchor(stmt: &Stmt) -> bool {
    invocation_args(stmt, DELETION_ANCHOR).is_some()
}

/// Unwrap `__SmPLExpressionMatch__(e)` to `e`, at statement or expression
/// level.
pub fn unwrap_expression_match(expr: &Expr) -> Option<&Expr> {
    match expr {
        Expr::Invocation {
            target: None,
            name,
            args,
        } if name == EXPRESSION_MATCH && args.len() == 1 => Some(&args[0]),
        _ => None,
    }
}

/// The body of the synthesized `if (__SmPLImplicitDots__()) { … }` wrapper,
/// when `stmt` is that wrapper.
pub fn implicit_dots_body(stmt: &Stmt) -> Option<&Block> {
    match stmt {
        Stmt::If {
            cond:
                Expr::Invocation {
                    target: None,
                    name,
                    args,
                },
            then_block,
            else_block: None,
            ..
        } if name == IMPLICIT_DOTS && args.is_empty() => Some(then_block),
        _ => None,
    }
}

/// Whether an expression is the implicit-dots marker call.
pub fn is_implicit_dots_call(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Invocation {
            target: None,
            name,
            args,
        } if name == IMPLICIT_DOTS && args.is_empty()
    )
}

/// The rule method of a rewritten class: the one method that is not the
/// metavariables method.
pub fn rule_method(class: &Class) -> Option<&Method> {
    class.methods.iter().find(|m| m.name != METAVARS_METHOD)
}

/// Whether a line of patch code declares a method header.
pub fn is_method_header_line(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"(?s)^(public\s+|private\s+|protected\s+|static\s+)*[A-Za-z_][A-Za-z0-9_]*\s+[A-Za-z_][A-Za-z0-9_]*\s*\(.*",
        )
        .expect("method header regex is valid")
    });
    re.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_header_lines_are_recognized() {
        assert!(is_method_header_line("void foo() {"));
        assert!(is_method_header_line("public static int bar(int x) {"));
        assert!(!is_method_header_line("foo(x);"));
        assert!(!is_method_header_line("if (x) {"));
        assert!(!is_method_header_line("x = y;"));
    }

    #[test]
    fn dots_statement_recognizer() {
        let stmt = Stmt::Expr {
            expr: Expr::Invocation {
                target: None,
                name: DOTS_STATEMENT.into(),
                args: vec![],
            },
            line: 1,
        };
        assert!(is_dots_statement(&stmt));
        assert!(!is_deletion_anchor(&stmt));
    }
}
