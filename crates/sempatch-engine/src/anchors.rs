//! Anchor resolution: map every addition to the statement or block edge it
//! attaches to.
//!
//! The walk runs over the additions view of the rule method. Statements that
//! are deletion anchors or sit on common lines can anchor additions;
//! additions before the first anchor of a block buffer until one appears, or
//! fall back to a block-edge insertion. Crossing dots invalidates the next
//! concrete anchor: buffered additions are committed to the block bottom
//! instead, and a buffered bottom addition followed by more dots is
//! unanchorable.

use std::collections::HashSet;

use sempatch_ctl::ops::{
    AnchoredOperationsMap, BlockType, InsertAnchor, Operation, METHOD_BODY_ANCHOR,
};
use sempatch_dsl::dsl;
use sempatch_host::ast::{Block, Method, Stmt};

use crate::errors::CompileError;

/// Resolve anchors for all additions in the rule method.
pub fn resolve_anchors(
    rule_method: &Method,
    common_lines: &HashSet<usize>,
) -> Result<AnchoredOperationsMap, CompileError> {
    let mut map = AnchoredOperationsMap::new();
    let stmts = match rule_method.body.stmts.as_slice() {
        [wrapper] => dsl::implicit_dots_body(wrapper)
            .map(|b| b.stmts.as_slice())
            .unwrap_or(&rule_method.body.stmts),
        stmts => stmts,
    };
    walk_block(
        stmts,
        common_lines,
        METHOD_BODY_ANCHOR,
        BlockType::MethodBody,
        &mut map,
    )?;
    Ok(map)
}

fn walk_block(
    stmts: &[Stmt],
    common_lines: &HashSet<usize>,
    block_anchor: usize,
    context: BlockType,
    map: &mut AnchoredOperationsMap,
) -> Result<(), CompileError> {
    // Additions waiting for an anchor, and additions that crossed dots and
    // can only attach to a block edge.
    let mut unanchored: Vec<(InsertAnchor, Stmt)> = Vec::new();
    let mut committed: Vec<(InsertAnchor, Stmt)> = Vec::new();
    let mut element_anchor = 0usize;
    let mut after_dots = false;

    for stmt in stmts {
        let line = stmt.line();
        if dsl::is_deletion_anchor(stmt) || common_lines.contains(&line) {
            if dsl::is_dots_statement(stmt) {
                if unanchored
                    .iter()
                    .any(|(anchor, _)| *anchor == InsertAnchor::Bottom)
                {
                    return Err(CompileError::UnanchorableStatement { line });
                }
                committed.append(&mut unanchored);
                after_dots = true;
                element_anchor = 0;
            } else {
                after_dots = false;
                element_anchor = line;
                for (_, s) in unanchored.drain(..) {
                    map.push(element_anchor, Operation::Prepend(s));
                }
            }

            if let Stmt::If {
                then_block,
                else_block,
                ..
            } = stmt
            {
                walk_block(
                    &then_block.stmts,
                    common_lines,
                    line,
                    BlockType::TrueBranch,
                    map,
                )?;
                if let Some(else_block) = else_block {
                    walk_block(
                        &else_block.stmts,
                        common_lines,
                        line,
                        BlockType::FalseBranch,
                        map,
                    )?;
                }
            }
        } else {
            // An addition.
            if element_anchor != 0 {
                map.push(element_anchor, Operation::Append(stmt.clone()));
            } else {
                let position = if after_dots {
                    InsertAnchor::Bottom
                } else {
                    InsertAnchor::Top
                };
                unanchored.push((position, stmt.clone()));
            }
        }
    }

    unanchored.append(&mut committed);
    for (position, stmt) in unanchored {
        map.push(
            block_anchor,
            Operation::InsertIntoBlock {
                block: context,
                anchor: position,
                stmt,
            },
        );
    }
    Ok(())
}

/// Common lines that are enclosed by statements which are not themselves on
/// common lines (a context line inside a deleted `if`, for instance). Such
/// lines cannot stay in the common set: their enclosing structure is being
/// rewritten around them.
pub fn contained_common_lines(rule_method: &Method, common_lines: &HashSet<usize>) -> HashSet<usize> {
    let mut out = HashSet::new();
    let root_line = rule_method.line;
    scan_contained(
        &rule_method.body,
        root_line,
        root_line,
        common_lines,
        &mut out,
    );
    out
}

fn scan_contained(
    block: &Block,
    parent_line: usize,
    root_line: usize,
    common_lines: &HashSet<usize>,
    out: &mut HashSet<usize>,
) {
    for stmt in &block.stmts {
        let line = stmt.line();
        if common_lines.contains(&line)
            && parent_line != root_line
            && !common_lines.contains(&parent_line)
        {
            out.insert(line);
        }
        if let Stmt::If {
            then_block,
            else_block,
            ..
        } = stmt
        {
            scan_contained(then_block, line, root_line, common_lines, out);
            if let Some(else_block) = else_block {
                scan_contained(else_block, line, root_line, common_lines, out);
            }
        }
    }
}
