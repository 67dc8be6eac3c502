//! End-to-end selection (compiler + VM)
//!
//! Compile selector text once and run the program over a tree. Callers that
//! query many trees with the same selector should call [`compile`] once and
//! keep the [`Program`](crate::vm::Program) instead.

use crate::compiler::compile;
use crate::parser::CompileError;
use crate::tree::{NodeId, Tree};

/// Select nodes from every top-level node of a tree
///
/// Each node is matched against its full path from its top-level ancestor.
/// Results come back in pre-order.
pub fn select(tree: &Tree, selector: &str) -> Result<Vec<NodeId>, CompileError> {
    let program = compile(selector)?;
    Ok(program.select_all(tree))
}

/// Select nodes from the subtree under `root`, with paths starting at `root`
pub fn select_from(tree: &Tree, root: NodeId, selector: &str) -> Result<Vec<NodeId>, CompileError> {
    let program = compile(selector)?;
    Ok(program.select(tree, root))
}
