//! Token stream → host-language source of a `RewrittenSmPLRule` class.
//!
//! The rewriter keeps `+`/`-` prefixes on body lines verbatim so the
//! separator can split views afterwards, replaces dots with marker
//! invocations, wraps bare expression lines so they parse as statements,
//! and synthesizes a method wrapper when the patch does not declare its own
//! method header. Output is compact: empty lines are dropped, so every
//! emitted line holds exactly one statement.

use crate::dsl;
use crate::errors::RewriteError;
use crate::lexer::{Token, TokenKind};

#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenSource {
    pub text: String,
    pub matches_on_method_header: bool,
}

/// Rewrite a lexed patch into host-language source.
pub fn rewrite(tokens: &[Token]) -> Result<RewrittenSource, RewriteError> {
    let mut out = String::new();
    out.push_str(&format!("class {} {{\n", dsl::RULE_CLASS));

    let mut pos = 0;

    if tokens.get(pos).map(|t| t.kind) == Some(TokenKind::Rulename) {
        out.push_str(&format!(
            "String {} = \"{}\";\n",
            dsl::RULE_NAME_FIELD,
            tokens[pos].text.trim()
        ));
        pos += 1;
    }

    out.push_str(&format!("void {}() {{\n", dsl::METAVARS_METHOD));
    while tokens.get(pos).map(|t| t.kind) == Some(TokenKind::MetavarType) {
        let kind = tokens[pos].text.trim().to_owned();
        pos += 1;
        while let Some(token) = tokens.get(pos) {
            match token.kind {
                TokenKind::MetavarIdentifier => {
                    let name = token.text.trim();
                    if dsl::GENERIC_METAVAR_KINDS.contains(&kind.as_str()) {
                        out.push_str(&format!("{kind}({name});\n"));
                    } else {
                        out.push_str(&format!("{kind} {name};\n"));
                    }
                }
                TokenKind::WhenMatches => {
                    out.push_str(&format!(
                        "{}(\"{}\", {});\n",
                        dsl::CONSTRAINT_INVOCATION,
                        dsl::REGEX_CONSTRAINT,
                        token.text.trim()
                    ));
                }
                _ => break,
            }
            pos += 1;
        }
    }
    out.push_str("}\n");

    let (body_lines, matches_on_method_header) = rewrite_body(&tokens[pos..])?;

    if matches_on_method_header {
        for line in &body_lines {
            out.push_str(line);
            out.push('\n');
        }
    } else {
        out.push_str(&format!(
            "{} {}({} {}) {{\n",
            dsl::UNSPECIFIED_RETURN_TYPE,
            dsl::UNSPECIFIED_METHOD_NAME,
            dsl::DOTS_PARAMETER_TYPE,
            dsl::DOTS_PARAMETER_NAME
        ));
        out.push_str(&format!("if ({}()) {{\n", dsl::IMPLICIT_DOTS));
        for line in &body_lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("}\n}\n");
    }

    out.push_str("}\n");

    Ok(RewrittenSource {
        text: out,
        matches_on_method_header,
    })
}

fn rewrite_body(tokens: &[Token]) -> Result<(Vec<String>, bool), RewriteError> {
    let mut lines: Vec<String> = Vec::new();
    let mut line = String::new();

    let mut is_addition = false;
    let mut is_deletion = false;
    let mut is_method_header = false;
    let mut matches_on_method_header = false;
    let mut dots_would_be_statement = true;

    let mut i = 0;
    while i < tokens.len() {
        let token = &tokens[i];
        match token.kind {
            TokenKind::Newline => {
                if !is_addition {
                    wrap_expression_line(&mut line, is_deletion);
                }
                if !line.trim().is_empty() {
                    lines.push(std::mem::take(&mut line));
                } else {
                    line.clear();
                }
                is_addition = false;
                is_deletion = false;
                is_method_header = false;
                dots_would_be_statement = true;
            }
            TokenKind::Addition => {
                is_addition = true;
                line.push_str("+ ");
            }
            TokenKind::Deletion => {
                is_deletion = true;
                line.push_str("- ");
            }
            TokenKind::Code => {
                let text = token.text.trim();
                if !text.is_empty() {
                    dots_would_be_statement = false;
                }
                if !is_addition && dsl::is_method_header_line(text) {
                    is_method_header = true;
                    matches_on_method_header = true;
                }
                line.push_str(text);
            }
            TokenKind::Dots => {
                if dots_would_be_statement {
                    line.push_str(&format!("{}(", dsl::DOTS_STATEMENT));
                    i = append_dots_constraints(tokens, i, &mut line);
                    line.push_str(");");
                } else if is_method_header {
                    line.push_str(&format!(
                        "{} {}",
                        dsl::DOTS_PARAMETER_TYPE,
                        dsl::DOTS_PARAMETER_NAME
                    ));
                } else {
                    line.push_str(dsl::DOTS_ARGUMENTS);
                }
            }
            TokenKind::OptDotsBegin | TokenKind::OptDotsEnd => {
                return Err(RewriteError::Unsupported {
                    construct: "optional dots".into(),
                });
            }
            TokenKind::DisjunctionBegin
            | TokenKind::DisjunctionContinue
            | TokenKind::DisjunctionEnd => {
                return Err(RewriteError::Unsupported {
                    construct: "pattern disjunction".into(),
                });
            }
            TokenKind::WhenAny | TokenKind::WhenExists | TokenKind::WhenNotEqual => {
                return Err(RewriteError::StrayDotsConstraint);
            }
            TokenKind::Rulename
            | TokenKind::MetavarType
            | TokenKind::MetavarIdentifier
            | TokenKind::WhenMatches => {
                return Err(RewriteError::MisplacedToken { kind: token.kind });
            }
        }
        i += 1;
    }

    if !line.trim().is_empty() {
        if !is_addition {
            wrap_expression_line(&mut line, is_deletion);
        }
        lines.push(line);
    }

    Ok((lines, matches_on_method_header))
}

/// Consume the `when …` constraint lines following a dots token, appending
/// their marker calls to the dots invocation. Returns the index of the last
/// consumed token.
fn append_dots_constraints(tokens: &[Token], dots_index: usize, line: &mut String) -> usize {
    let mut i = dots_index + 1;
    let mut last = dots_index;
    let mut sep = "";
    while i < tokens.len() {
        match tokens[i].kind {
            TokenKind::Newline => {
                i += 1;
            }
            TokenKind::WhenAny => {
                line.push_str(&format!("{sep}{}()", dsl::WHEN_ANY));
                sep = ", ";
                last = i;
                i += 1;
            }
            TokenKind::WhenExists => {
                line.push_str(&format!("{sep}{}()", dsl::WHEN_EXISTS));
                sep = ", ";
                last = i;
                i += 1;
            }
            TokenKind::WhenNotEqual => {
                let arg = tokens[i].text.trim().trim_end_matches(';').trim();
                let wrapped = match expression_fragment(arg) {
                    Some(expr) => format!("{}({})", dsl::EXPRESSION_MATCH, expr),
                    None => arg.to_owned(),
                };
                line.push_str(&format!("{sep}{}({})", dsl::WHEN_NOT_EQUAL, wrapped));
                sep = ", ";
                last = i;
                i += 1;
            }
            _ => break,
        }
    }
    last
}

/// The expression source of a patch line that is a bare expression rather
/// than a statement, or `None` when the line already parses as a statement.
fn expression_fragment(line: &str) -> Option<&str> {
    let mut s = line.trim();
    if let Some(rest) = s.strip_prefix('-') {
        s = rest.trim();
    }
    if s.is_empty()
        || s == "{"
        || s == "}"
        || s.starts_with("if")
        || s.ends_with('{')
        || s.ends_with(';')
    {
        None
    } else {
        Some(s)
    }
}

fn wrap_expression_line(line: &mut String, is_deletion: bool) {
    if let Some(expr) = expression_fragment(line) {
        let prefix = if is_deletion { "- " } else { "" };
        *line = format!("{prefix}{}({});", dsl::EXPRESSION_MATCH, expr);
    }
}
