//! Adapt a generic control flow graph for formula compilation and matching.
//!
//! The adapter rejects simplified graphs, removes the outermost block-begin
//! and all block-end brackets, elides the synthetic implicit-dots wrapper,
//! and tags branches, their join nodes and their branch-body block-begins.

use std::collections::HashMap;

use sempatch_ctl::formula::PropLabel;
use sempatch_dsl::dsl;
use sempatch_host::ast::{Block, Stmt};
use sempatch_host::cfg::{ControlFlowGraph, NodeId, NodeKind};

use crate::errors::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagLabel {
    Branch,
    TrueBranch,
    FalseBranch,
    After,
}

impl TagLabel {
    pub fn proposition(self) -> Option<PropLabel> {
        match self {
            TagLabel::After => Some(PropLabel::After),
            TagLabel::TrueBranch => Some(PropLabel::TrueBranch),
            TagLabel::FalseBranch => Some(PropLabel::FalseBranch),
            TagLabel::Branch => None,
        }
    }
}

/// Label plus the `if` statement the node belongs to, used as the anchor
/// for block-edge insertions.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTag {
    pub label: TagLabel,
    pub anchor: Stmt,
}

/// An adapted graph: the generic CFG stripped of brackets, plus node tags.
#[derive(Debug, Clone)]
pub struct RuleCfg {
    graph: ControlFlowGraph,
    tags: HashMap<NodeId, NodeTag>,
}

impl RuleCfg {
    pub fn begin(&self) -> NodeId {
        self.graph.begin()
    }

    pub fn exit(&self) -> NodeId {
        self.graph.exit()
    }

    pub fn node(&self, id: NodeId) -> Option<&sempatch_host::cfg::CfgNode> {
        self.graph.node(id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_ids()
    }

    pub fn successors(&self, id: NodeId) -> &[NodeId] {
        self.graph.successors(id)
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.graph.nodes_of_kind(kind)
    }

    pub fn tag(&self, id: NodeId) -> Option<&NodeTag> {
        self.tags.get(&id)
    }
}

/// Adapt an unsimplified CFG.
pub fn adapt(mut graph: ControlFlowGraph) -> Result<RuleCfg, CompileError> {
    if graph.nodes_of_kind(NodeKind::BlockBegin).is_empty() {
        return Err(CompileError::NotAdaptable);
    }

    remove_outermost_block_begin(&mut graph);
    for be in graph.nodes_of_kind(NodeKind::BlockEnd) {
        graph.remove_node_preserving_paths(be);
    }
    elide_implicit_dots_wrapper(&mut graph);

    let mut tags = HashMap::new();
    for branch in graph.nodes_of_kind(NodeKind::Branch) {
        tag_branch(&graph, branch, &mut tags)?;
    }

    Ok(RuleCfg { graph, tags })
}

fn remove_outermost_block_begin(graph: &mut ControlFlowGraph) {
    let begin = graph.begin();
    if let Some(&first) = graph.successors(begin).first() {
        if graph.node(first).is_some_and(|n| n.kind == NodeKind::BlockBegin) {
            graph.remove_node_preserving_paths(first);
        }
    }
}

/// Remove the `if (__SmPLImplicitDots__()) { … }` wrapper synthesized by the
/// rewriter: the branch, its block-begin and its join node, so that the
/// compiled formula starts at the first real match-context node.
fn elide_implicit_dots_wrapper(graph: &mut ControlFlowGraph) {
    let begin = graph.begin();
    let Some(&first) = graph.successors(begin).first() else {
        return;
    };
    let Some(node) = graph.node(first) else {
        return;
    };
    if node.kind != NodeKind::Branch {
        return;
    }
    let is_wrapper = matches!(
        &node.stmt,
        Some(Stmt::If { cond, .. }) if dsl::is_implicit_dots_call(cond)
    );
    if !is_wrapper {
        return;
    }

    let converge = graph.converge_of(first);
    let block_begins: Vec<NodeId> = graph
        .successors(first)
        .iter()
        .copied()
        .filter(|&s| graph.node(s).is_some_and(|n| n.kind == NodeKind::BlockBegin))
        .collect();

    // The wrapper's else path is never taken; drop its edge so removal does
    // not thread a begin→exit shortcut around the body.
    if let Some(conv) = converge {
        graph.remove_edge(first, conv);
    }
    graph.remove_node_preserving_paths(first);
    for bb in block_begins {
        graph.remove_node_preserving_paths(bb);
    }
    if let Some(conv) = converge {
        graph.remove_node_preserving_paths(conv);
    }
}

fn tag_branch(
    graph: &ControlFlowGraph,
    branch: NodeId,
    tags: &mut HashMap<NodeId, NodeTag>,
) -> Result<(), CompileError> {
    let node = graph
        .node(branch)
        .ok_or(CompileError::UnexpectedNodeKind { node: branch })?;
    let succs = node.successors().to_vec();
    if succs.len() != 2 {
        return Err(CompileError::BranchSuccessorCount {
            node: branch,
            count: succs.len(),
        });
    }

    let if_stmt = node
        .stmt
        .clone()
        .ok_or(CompileError::UnexpectedNodeKind { node: branch })?;
    let (then_block, else_block) = match &if_stmt {
        Stmt::If {
            then_block,
            else_block,
            ..
        } => (then_block.clone(), else_block.clone()),
        _ => return Err(CompileError::UnexpectedNodeKind { node: branch }),
    };

    tags.insert(
        branch,
        NodeTag {
            label: TagLabel::Branch,
            anchor: if_stmt.clone(),
        },
    );
    if let Some(conv) = graph.converge_of(branch) {
        tags.insert(
            conv,
            NodeTag {
                label: TagLabel::After,
                anchor: if_stmt.clone(),
            },
        );
    }

    let kind_of = |id: NodeId| graph.node(id).map(|n| n.kind);
    let (n1, n2) = (succs[0], succs[1]);

    match (kind_of(n1), kind_of(n2)) {
        (Some(NodeKind::BlockBegin), Some(NodeKind::Converge)) => {
            tags.insert(
                n1,
                NodeTag {
                    label: TagLabel::TrueBranch,
                    anchor: if_stmt,
                },
            );
        }
        (Some(NodeKind::Converge), Some(NodeKind::BlockBegin)) => {
            tags.insert(
                n2,
                NodeTag {
                    label: TagLabel::TrueBranch,
                    anchor: if_stmt,
                },
            );
        }
        (Some(NodeKind::BlockBegin), Some(NodeKind::BlockBegin)) => {
            // Both branch bodies have blocks; classify by the line of the
            // first statement reachable inside each block. The rewriter
            // guarantees one statement per line, so line membership in the
            // then/else block decides the label. Two empty blocks are
            // labelled in successor order.
            let n1_line = first_statement_line(graph, n1);
            let n1_is_true = match n1_line {
                Some(line) => block_has_line(&then_block, line),
                None => match first_statement_line(graph, n2) {
                    Some(line2) => {
                        else_block.map(|b| block_has_line(&b, line2)).unwrap_or(false)
                    }
                    None => true,
                },
            };
            let (true_bb, false_bb) = if n1_is_true { (n1, n2) } else { (n2, n1) };
            tags.insert(
                true_bb,
                NodeTag {
                    label: TagLabel::TrueBranch,
                    anchor: if_stmt.clone(),
                },
            );
            tags.insert(
                false_bb,
                NodeTag {
                    label: TagLabel::FalseBranch,
                    anchor: if_stmt,
                },
            );
        }
        _ => return Err(CompileError::UnexpectedNodeKind { node: branch }),
    }
    Ok(())
}

/// Line of the first statement-bearing node reachable from a block-begin
/// along single-successor edges.
fn first_statement_line(graph: &ControlFlowGraph, block_begin: NodeId) -> Option<usize> {
    let mut cur = *graph.successors(block_begin).first()?;
    loop {
        let node = graph.node(cur)?;
        match node.kind {
            NodeKind::Statement | NodeKind::Branch => {
                return node.stmt.as_ref().map(|s| s.line());
            }
            NodeKind::Converge | NodeKind::Exit => return None,
            _ => cur = *node.successors().first()?,
        }
    }
}

fn block_has_line(block: &Block, line: usize) -> bool {
    block.stmts.iter().any(|s| s.line() == line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sempatch_host::cfg::ControlFlowBuilder;

    fn rule_cfg_of(source: &str) -> RuleCfg {
        let classes = sempatch_host::parse(source, "test.java").expect("parse failed");
        let method = classes[0].methods[0].clone();
        adapt(ControlFlowBuilder::new().build(&method)).expect("adapt failed")
    }

    #[test]
    fn rejects_simplified_graphs() {
        let classes =
            sempatch_host::parse("class A {\nvoid m() {\na();\n}\n}\n", "t").unwrap();
        let mut graph = ControlFlowBuilder::new().build(&classes[0].methods[0]);
        for bb in graph.nodes_of_kind(NodeKind::BlockBegin) {
            graph.remove_node_preserving_paths(bb);
        }
        for be in graph.nodes_of_kind(NodeKind::BlockEnd) {
            graph.remove_node_preserving_paths(be);
        }
        assert!(matches!(adapt(graph), Err(CompileError::NotAdaptable)));
    }

    #[test]
    fn removes_outer_block_and_all_block_ends() {
        let cfg = rule_cfg_of("class A {\nvoid m() {\na();\nb();\n}\n}\n");
        assert!(cfg.nodes_of_kind(NodeKind::BlockEnd).is_empty());
        let first = cfg.successors(cfg.begin())[0];
        assert_eq!(cfg.node(first).unwrap().kind, NodeKind::Statement);
    }

    #[test]
    fn tags_branch_converge_and_branch_bodies() {
        let cfg =
            rule_cfg_of("class A {\nvoid m() {\nif (c()) {\na();\n} else {\nb();\n}\n}\n}\n");
        let branch = cfg.nodes_of_kind(NodeKind::Branch)[0];
        assert_eq!(cfg.tag(branch).unwrap().label, TagLabel::Branch);

        let succs = cfg.successors(branch).to_vec();
        let labels: Vec<TagLabel> = succs
            .iter()
            .map(|&s| cfg.tag(s).unwrap().label)
            .collect();
        assert!(labels.contains(&TagLabel::TrueBranch));
        assert!(labels.contains(&TagLabel::FalseBranch));

        // The true branch must be the block containing a() (line 4).
        let true_bb = succs
            .iter()
            .find(|&&s| cfg.tag(s).unwrap().label == TagLabel::TrueBranch)
            .copied()
            .unwrap();
        assert_eq!(first_statement_line_pub(&cfg, true_bb), Some(4));

        let conv = cfg
            .nodes_of_kind(NodeKind::Converge)
            .into_iter()
            .find(|&c| cfg.tag(c).is_some())
            .unwrap();
        assert_eq!(cfg.tag(conv).unwrap().label, TagLabel::After);
    }

    fn first_statement_line_pub(cfg: &RuleCfg, bb: NodeId) -> Option<usize> {
        let mut cur = *cfg.successors(bb).first()?;
        loop {
            let node = cfg.node(cur)?;
            match node.kind {
                NodeKind::Statement | NodeKind::Branch => {
                    return node.stmt.as_ref().map(|s| s.line())
                }
                NodeKind::Converge | NodeKind::Exit => return None,
                _ => cur = *node.successors().first()?,
            }
        }
    }

    #[test]
    fn else_less_branch_tags_only_true_branch() {
        let cfg = rule_cfg_of("class A {\nvoid m() {\nif (c()) {\na();\n}\n}\n}\n");
        let branch = cfg.nodes_of_kind(NodeKind::Branch)[0];
        let succs = cfg.successors(branch);
        assert_eq!(cfg.tag(succs[0]).unwrap().label, TagLabel::TrueBranch);
        assert_eq!(cfg.tag(succs[1]).unwrap().label, TagLabel::After);
    }

    #[test]
    fn implicit_dots_wrapper_is_elided() {
        let cfg = rule_cfg_of(
            "class A {\nvoid m() {\nif (__SmPLImplicitDots__()) {\na();\nb();\n}\n}\n}\n",
        );
        assert!(cfg.nodes_of_kind(NodeKind::Branch).is_empty());
        let first = cfg.successors(cfg.begin())[0];
        let node = cfg.node(first).unwrap();
        assert_eq!(node.kind, NodeKind::Statement);
        assert_eq!(node.stmt.as_ref().unwrap().line(), 4);
    }

    #[test]
    fn empty_wrapper_elides_to_begin_exit() {
        let cfg = rule_cfg_of("class A {\nvoid m() {\nif (__SmPLImplicitDots__()) {\n}\n}\n}\n");
        assert_eq!(cfg.successors(cfg.begin()), &[cfg.exit()]);
    }
}
