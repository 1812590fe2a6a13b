use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("Syntax error: {message}")]
    #[diagnostic(code(sempatch::host::syntax))]
    Syntax {
        message: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source_code]
        src: miette::NamedSource<String>,
    },

    #[error("Malformed {construct}")]
    #[diagnostic(code(sempatch::host::structure))]
    Structure { construct: String },
}

impl ParseError {
    pub fn syntax(
        message: impl Into<String>,
        start: usize,
        end: usize,
        source: &str,
        filename: &str,
    ) -> Self {
        ParseError::Syntax {
            message: message.into(),
            span: (start, end.saturating_sub(start).max(1)).into(),
            src: miette::NamedSource::new(filename, source.to_owned()),
        }
    }

    pub fn structure(construct: impl Into<String>) -> Self {
        ParseError::Structure {
            construct: construct.into(),
        }
    }
}
