//! Generic control flow graphs over host-language methods.
//!
//! The graph is unsimplified: block brackets (`BlockBegin`/`BlockEnd`) and
//! post-branch `Converge` nodes are materialized, which is what the patch
//! engine's CFG adapter expects to consume. Nodes live in an arena indexed by
//! integer ids; the id counter is scoped to the builder, so two builds of the
//! same method produce identical graphs.

use std::collections::HashMap;

use crate::ast::{Block, Method, Stmt};

/// A unique identifier for a control flow node.
pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Begin,
    Exit,
    Statement,
    Branch,
    BlockBegin,
    BlockEnd,
    Converge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CfgNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// `Statement` nodes carry their statement; `Branch` nodes carry the
    /// whole `if` statement so consumers can reach both the condition and
    /// the branch blocks.
    pub stmt: Option<Stmt>,
    next: Vec<NodeId>,
    prev: Vec<NodeId>,
}

impl CfgNode {
    pub fn successors(&self) -> &[NodeId] {
        &self.next
    }

    pub fn predecessors(&self) -> &[NodeId] {
        &self.prev
    }
}

#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    nodes: Vec<Option<CfgNode>>,
    begin: NodeId,
    exit: NodeId,
    convergence: HashMap<NodeId, NodeId>,
}

impl ControlFlowGraph {
    pub fn begin(&self) -> NodeId {
        self.begin
    }

    pub fn exit(&self) -> NodeId {
        self.exit
    }

    pub fn node(&self, id: NodeId) -> Option<&CfgNode> {
        self.nodes.get(id).and_then(|n| n.as_ref())
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().flatten().map(|n| n.id)
    }

    pub fn successors(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.successors()).unwrap_or(&[])
    }

    pub fn predecessors(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.predecessors()).unwrap_or(&[])
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes
            .iter()
            .flatten()
            .filter(|n| n.kind == kind)
            .map(|n| n.id)
            .collect()
    }

    /// The unique join node of a branch, recorded at build time.
    pub fn converge_of(&self, branch: NodeId) -> Option<NodeId> {
        self.convergence.get(&branch).copied()
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        if let Some(n) = self.nodes.get_mut(from).and_then(|n| n.as_mut()) {
            if !n.next.contains(&to) {
                n.next.push(to);
            }
        }
        if let Some(n) = self.nodes.get_mut(to).and_then(|n| n.as_mut()) {
            if !n.prev.contains(&from) {
                n.prev.push(from);
            }
        }
    }

    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) {
        if let Some(n) = self.nodes.get_mut(from).and_then(|n| n.as_mut()) {
            n.next.retain(|&x| x != to);
        }
        if let Some(n) = self.nodes.get_mut(to).and_then(|n| n.as_mut()) {
            n.prev.retain(|&x| x != from);
        }
    }

    /// Remove a node, adding `incoming × outgoing` edges to preserve paths.
    pub fn remove_node_preserving_paths(&mut self, id: NodeId) {
        let (prev, next) = match self.node(id) {
            Some(n) => (n.prev.clone(), n.next.clone()),
            None => return,
        };
        for &p in &prev {
            if let Some(n) = self.nodes.get_mut(p).and_then(|n| n.as_mut()) {
                n.next.retain(|&x| x != id);
            }
        }
        for &s in &next {
            if let Some(n) = self.nodes.get_mut(s).and_then(|n| n.as_mut()) {
                n.prev.retain(|&x| x != id);
            }
        }
        self.nodes[id] = None;
        for &p in &prev {
            for &s in &next {
                if p != s {
                    self.add_edge(p, s);
                }
            }
        }
    }
}

/// Builds a control flow graph for a method body.
///
/// Each builder owns its node-id counter; ids are assigned in visit order
/// starting from zero, which keeps graphs deterministic across builds.
#[derive(Debug, Default)]
pub struct ControlFlowBuilder {
    next_id: NodeId,
}

impl ControlFlowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(mut self, method: &Method) -> ControlFlowGraph {
        let mut graph = ControlFlowGraph {
            nodes: Vec::new(),
            begin: 0,
            exit: 0,
            convergence: HashMap::new(),
        };

        let begin = self.add(&mut graph, NodeKind::Begin, None);
        let exit = self.add(&mut graph, NodeKind::Exit, None);
        graph.begin = begin;
        graph.exit = exit;

        if let Some(end) = self.build_block(&mut graph, &method.body, begin) {
            graph.add_edge(end, exit);
        }
        graph
    }

    fn add(&mut self, graph: &mut ControlFlowGraph, kind: NodeKind, stmt: Option<Stmt>) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        graph.nodes.push(Some(CfgNode {
            id,
            kind,
            stmt,
            next: Vec::new(),
            prev: Vec::new(),
        }));
        id
    }

    /// Wire a block starting from `pred`; returns the block-end node if the
    /// end of the block is reachable. Statements after a `return` in the same
    /// block are left unwired.
    fn build_block(
        &mut self,
        graph: &mut ControlFlowGraph,
        block: &Block,
        pred: NodeId,
    ) -> Option<NodeId> {
        let bb = self.add(graph, NodeKind::BlockBegin, None);
        graph.add_edge(pred, bb);

        let mut cur = Some(bb);
        for stmt in &block.stmts {
            let Some(c) = cur else { break };
            match stmt {
                Stmt::If {
                    then_block,
                    else_block,
                    ..
                } => {
                    let branch = self.add(graph, NodeKind::Branch, Some(stmt.clone()));
                    graph.add_edge(c, branch);

                    let then_end = self.build_block(graph, then_block, branch);
                    let else_end = else_block
                        .as_ref()
                        .map(|b| self.build_block(graph, b, branch));

                    let conv = self.add(graph, NodeKind::Converge, None);
                    graph.convergence.insert(branch, conv);

                    if let Some(e) = then_end {
                        graph.add_edge(e, conv);
                    }
                    match else_end {
                        Some(Some(e)) => graph.add_edge(e, conv),
                        Some(None) => {}
                        None => graph.add_edge(branch, conv),
                    }
                    cur = Some(conv);
                }
                Stmt::Return { .. } => {
                    let n = self.add(graph, NodeKind::Statement, Some(stmt.clone()));
                    graph.add_edge(c, n);
                    let exit = graph.exit;
                    graph.add_edge(n, exit);
                    cur = None;
                }
                _ => {
                    let n = self.add(graph, NodeKind::Statement, Some(stmt.clone()));
                    graph.add_edge(c, n);
                    cur = Some(n);
                }
            }
        }

        let be = self.add(graph, NodeKind::BlockEnd, None);
        match cur {
            Some(c) => {
                graph.add_edge(c, be);
                Some(be)
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn method_of(source: &str) -> Method {
        let classes = parse(source, "test.java").expect("parse failed");
        classes[0].methods[0].clone()
    }

    fn kinds_along_single_path(g: &ControlFlowGraph) -> Vec<NodeKind> {
        let mut kinds = Vec::new();
        let mut cur = g.begin();
        loop {
            let node = g.node(cur).unwrap();
            kinds.push(node.kind);
            if node.kind == NodeKind::Exit {
                break;
            }
            assert_eq!(node.successors().len(), 1, "expected a single path");
            cur = node.successors()[0];
        }
        kinds
    }

    #[test]
    fn straight_line_method_produces_bracketed_chain() {
        let m = method_of("class A {\nvoid m() {\na();\nb();\n}\n}\n");
        let g = ControlFlowBuilder::new().build(&m);
        assert_eq!(
            kinds_along_single_path(&g),
            vec![
                NodeKind::Begin,
                NodeKind::BlockBegin,
                NodeKind::Statement,
                NodeKind::Statement,
                NodeKind::BlockEnd,
                NodeKind::Exit,
            ]
        );
    }

    #[test]
    fn if_statement_produces_branch_with_two_successors_and_converge() {
        let m = method_of("class A {\nvoid m() {\nif (c()) {\na();\n} else {\nb();\n}\n}\n}\n");
        let g = ControlFlowBuilder::new().build(&m);
        let branches = g.nodes_of_kind(NodeKind::Branch);
        assert_eq!(branches.len(), 1);
        let branch = branches[0];
        assert_eq!(g.successors(branch).len(), 2);
        let conv = g.converge_of(branch).expect("converge recorded");
        assert_eq!(g.node(conv).unwrap().kind, NodeKind::Converge);
    }

    #[test]
    fn else_less_if_links_branch_directly_to_converge() {
        let m = method_of("class A {\nvoid m() {\nif (c()) {\na();\n}\n}\n}\n");
        let g = ControlFlowBuilder::new().build(&m);
        let branch = g.nodes_of_kind(NodeKind::Branch)[0];
        let succs = g.successors(branch);
        assert_eq!(succs.len(), 2);
        assert_eq!(g.node(succs[0]).unwrap().kind, NodeKind::BlockBegin);
        assert_eq!(g.node(succs[1]).unwrap().kind, NodeKind::Converge);
        assert_eq!(g.converge_of(branch), Some(succs[1]));
    }

    #[test]
    fn return_statement_links_to_exit() {
        let m = method_of("class A {\nint m() {\nreturn x;\n}\n}\n");
        let g = ControlFlowBuilder::new().build(&m);
        let stmts = g.nodes_of_kind(NodeKind::Statement);
        assert_eq!(stmts.len(), 1);
        assert_eq!(g.successors(stmts[0]), &[g.exit()]);
    }

    #[test]
    fn node_ids_are_deterministic_across_builds() {
        let m = method_of("class A {\nvoid m() {\nif (c()) {\na();\n}\nb();\n}\n}\n");
        let g1 = ControlFlowBuilder::new().build(&m);
        let g2 = ControlFlowBuilder::new().build(&m);
        let ids1: Vec<_> = g1.node_ids().collect();
        let ids2: Vec<_> = g2.node_ids().collect();
        assert_eq!(ids1, ids2);
    }

    #[test]
    fn remove_node_preserves_paths() {
        let m = method_of("class A {\nvoid m() {\na();\n}\n}\n");
        let mut g = ControlFlowBuilder::new().build(&m);
        for be in g.nodes_of_kind(NodeKind::BlockEnd) {
            g.remove_node_preserving_paths(be);
        }
        let stmt = g.nodes_of_kind(NodeKind::Statement)[0];
        assert_eq!(g.successors(stmt), &[g.exit()]);
    }
}
