pub mod dsl;
pub mod errors;
pub mod lexer;
pub mod problems;
pub mod rewriter;
pub mod separator;

pub use errors::{LexError, RewriteError};
pub use lexer::{lex, Position, Token, TokenKind};
pub use problems::{Problem, ProblemSeverity};
pub use rewriter::{rewrite, RewrittenSource};
pub use separator::{separate, SeparatedViews};
