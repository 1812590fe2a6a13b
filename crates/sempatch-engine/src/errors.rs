use thiserror::Error;

use sempatch_dsl::problems::Problem;
use sempatch_dsl::{LexError, RewriteError};
use sempatch_host::ParseError;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error("{view} view: {source}")]
    Parse {
        view: &'static str,
        source: ParseError,
    },

    #[error("patch rejected: {}", format_problems(.problems))]
    Problems { problems: Vec<Problem> },

    // Patch structure.
    #[error("empty match context")]
    EmptyMatchContext,

    #[error("referring to multiple methods in the match context is not supported")]
    MultipleRuleMethods,

    #[error("unable to determine the rule method of the additions view")]
    AdditionsRuleMethodNotFound,

    #[error("unanchorable statement at line {line}")]
    UnanchorableStatement { line: usize },

    #[error("unknown metavariable kind '{kind}'")]
    UnknownMetavarKind { kind: String },

    #[error("unknown constraint type '{kind}'")]
    UnknownConstraintKind { kind: String },

    #[error("unknown dots constraint form: {detail}")]
    UnknownDotsConstraint { detail: String },

    // Internal invariants.
    #[error("control flow graph must not be simplified")]
    NotAdaptable,

    #[error("branch node {node} has {count} successors")]
    BranchSuccessorCount { node: usize, count: usize },

    #[error("control flow node {node} has no outgoing path")]
    MissingSuccessor { node: usize },

    #[error("unexpected control flow node kind at node {node}")]
    UnexpectedNodeKind { node: usize },

    #[error("cycle in rule method control flow at node {node}")]
    CfgCycle { node: usize },

    #[error("operations left unattached after formula compilation")]
    DanglingOperations,
}

fn format_problems(problems: &[Problem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
