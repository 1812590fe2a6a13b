use miette::Diagnostic;
use thiserror::Error;

use crate::lexer::TokenKind;

#[derive(Debug, Error, Diagnostic)]
pub enum LexError {
    #[error("empty patch input")]
    #[diagnostic(code(sempatch::lex::empty))]
    Empty,

    #[error("Unexpected input: expected {expected}")]
    #[diagnostic(code(sempatch::lex::unexpected))]
    Unexpected {
        expected: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },
}

impl LexError {
    pub fn unexpected(expected: impl Into<String>, offset: usize, source: &str) -> Self {
        LexError::Unexpected {
            expected: expected.into(),
            span: (offset.min(source.len().saturating_sub(1)), 1).into(),
            src: miette::NamedSource::new("patch", source.to_owned()),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum RewriteError {
    #[error("{construct} is not supported")]
    #[diagnostic(
        code(sempatch::rewrite::unsupported),
        help("optional dots and pattern disjunction are recognized but have no defined semantics yet")
    )]
    Unsupported { construct: String },

    #[error("dots constraint outside a dots context")]
    #[diagnostic(code(sempatch::rewrite::stray_constraint))]
    StrayDotsConstraint,

    #[error("misplaced {kind:?} token in rule body")]
    #[diagnostic(code(sempatch::rewrite::misplaced))]
    MisplacedToken { kind: TokenKind },
}
