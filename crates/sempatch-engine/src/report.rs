//! Serializable summaries of rules and match results, for tooling that
//! wants JSON rather than the in-memory structures.

use serde::Serialize;

use sempatch_ctl::env::EnvEntry;

use crate::checker::MatchSite;
use crate::rule::Rule;

#[derive(Debug, Clone, Serialize)]
pub struct RuleSummary {
    pub name: Option<String>,
    pub metavars: Vec<MetavarSummary>,
    pub formula: String,
    pub added_methods: Vec<String>,
    pub body_operations: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetavarSummary {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub state: usize,
    pub bindings: Vec<BindingSummary>,
    pub operations: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BindingSummary {
    pub metavar: String,
    pub value: String,
}

pub fn summarize_rule(rule: &Rule) -> RuleSummary {
    RuleSummary {
        name: rule.name.clone(),
        metavars: rule
            .metavars
            .iter()
            .map(|(name, constraint)| MetavarSummary {
                name: name.clone(),
                kind: constraint.kind_name(),
            })
            .collect(),
        formula: rule.formula.to_string(),
        added_methods: rule
            .added_methods
            .iter()
            .map(|m| m.full_signature())
            .collect(),
        body_operations: rule
            .body_operations
            .iter()
            .map(|o| o.to_string())
            .collect(),
        warnings: rule.warnings.iter().map(|w| w.to_string()).collect(),
    }
}

pub fn summarize_matches(sites: &[MatchSite]) -> Vec<MatchSummary> {
    sites
        .iter()
        .map(|site| MatchSummary {
            state: site.state,
            bindings: site
                .env
                .iter()
                .map(|(name, entry)| BindingSummary {
                    metavar: name.to_owned(),
                    value: match entry {
                        EnvEntry::Bound(v) => v.to_string(),
                        EnvEntry::Forbidden(vs) => {
                            let vs: Vec<String> = vs.iter().map(|v| v.to_string()).collect();
                            format!("!= {{{}}}", vs.join(", "))
                        }
                    },
                })
                .collect(),
            operations: site.operations.iter().map(|o| o.to_string()).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{collect_match_sites, ModelChecker};
    use crate::rule::compile_rule;

    #[test]
    fn rule_summary_reports_metavars_and_formula() {
        let rule = compile_rule("@ fix @\nidentifier x;\n@@\n- foo(x);\n+ bar(x);\n").unwrap();
        let summary = summarize_rule(&rule);
        assert_eq!(summary.name.as_deref(), Some("fix"));
        assert_eq!(summary.metavars.len(), 1);
        assert_eq!(summary.metavars[0].kind, "identifier");
        assert!(summary.formula.contains("Stmt(foo(x);)"));
    }

    #[test]
    fn match_summary_serializes_to_json() {
        let rule = compile_rule("@@ identifier x; @@\n- foo(x);\n+ bar(x);\n").unwrap();
        let source = "class T {\nvoid m() {\nfoo(a);\n}\n}\n";
        let classes = sempatch_host::parse(source, "target").unwrap();
        let model = crate::cfg_adapter::adapt(
            sempatch_host::cfg::ControlFlowBuilder::new().build(&classes[0].methods[0]),
        )
        .unwrap();
        let checker = ModelChecker::new(&model, &rule.metavars);
        let sites = collect_match_sites(&checker.check(&rule.formula));
        let summaries = summarize_matches(&sites);

        let json = serde_json::to_string(&summaries).unwrap();
        assert!(json.contains("\"metavar\":\"x\""));
        assert!(json.contains("\"value\":\"a\""));
        assert!(json.contains("replace with bar(x);"));
    }
}
