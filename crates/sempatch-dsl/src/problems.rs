//! Pre-compilation diagnostics over patch text and token streams.
//!
//! Problems with `Error` severity abort compilation before any rewriting;
//! warnings are carried through to the produced rule.

use std::fmt;

use crate::lexer::{Position, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    pub severity: ProblemSeverity,
    pub message: String,
    pub position: Option<Position>,
}

impl Problem {
    pub fn error(message: impl Into<String>, position: Option<Position>) -> Self {
        Self {
            severity: ProblemSeverity::Error,
            message: message.into(),
            position,
        }
    }

    pub fn warning(message: impl Into<String>, position: Option<Position>) -> Self {
        Self {
            severity: ProblemSeverity::Warning,
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            ProblemSeverity::Warning => "warning",
            ProblemSeverity::Error => "error",
        };
        match self.position {
            Some(p) => write!(f, "{sev} at {}:{}: {}", p.line, p.column, self.message),
            None => write!(f, "{sev}: {}", self.message),
        }
    }
}

/// Checks on the raw patch text.
pub fn detect_text(input: &str) -> Vec<Problem> {
    let mut problems = Vec::new();
    let trimmed = input.trim();
    if trimmed.is_empty() {
        problems.push(Problem::error("empty patch input", None));
        return problems;
    }
    if !trimmed.starts_with('@') {
        problems.push(Problem::error(
            "patch must begin with a rule header (`@@` or `@ name @`)",
            None,
        ));
    }
    problems
}

/// Checks on the token stream.
pub fn detect_tokens(tokens: &[Token]) -> Vec<Problem> {
    let mut problems = Vec::new();
    for token in tokens {
        match token.kind {
            TokenKind::OptDotsBegin | TokenKind::OptDotsEnd => {
                problems.push(Problem::error(
                    "optional dots (`<... ...>`) are not supported",
                    Some(token.pos),
                ));
            }
            TokenKind::DisjunctionBegin
            | TokenKind::DisjunctionContinue
            | TokenKind::DisjunctionEnd => {
                problems.push(Problem::error(
                    "pattern disjunction is not supported",
                    Some(token.pos),
                ));
            }
            _ => {}
        }
    }
    if !tokens
        .iter()
        .any(|t| matches!(t.kind, TokenKind::Code | TokenKind::Dots))
    {
        problems.push(Problem::warning(
            "patch body is empty; the rule matches nothing",
            None,
        ));
    }
    problems
}

pub fn has_errors(problems: &[Problem]) -> bool {
    problems
        .iter()
        .any(|p| p.severity == ProblemSeverity::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    #[test]
    fn optional_dots_are_an_error() {
        let tokens = lex("@@ @@\n<...\nfoo();\n...>\n").unwrap();
        let problems = detect_tokens(&tokens);
        assert!(has_errors(&problems));
        assert!(problems[0].message.contains("optional dots"));
    }

    #[test]
    fn disjunction_is_an_error() {
        let tokens = lex("@@ @@\n(\na();\n|\nb();\n)\n").unwrap();
        assert!(has_errors(&detect_tokens(&tokens)));
    }

    #[test]
    fn empty_body_is_a_warning_only() {
        let tokens = lex("@@ identifier x; @@\n").unwrap();
        let problems = detect_tokens(&tokens);
        assert!(!has_errors(&problems));
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].severity, ProblemSeverity::Warning);
    }

    #[test]
    fn text_without_header_is_an_error() {
        assert!(has_errors(&detect_text("foo(x);")));
        assert!(!has_errors(&detect_text("@@ @@\nfoo(x);")));
    }
}
