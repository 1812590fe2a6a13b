pub mod anchors;
pub mod cfg_adapter;
pub mod checker;
pub mod errors;
pub mod formula_compiler;
pub mod patterns;
pub mod report;
pub mod rule;

pub use checker::{collect_match_sites, CheckResult, MatchSite, ModelChecker, ResultSet};
pub use errors::CompileError;
pub use rule::{compile_rule, Rule};
