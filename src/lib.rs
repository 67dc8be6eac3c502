//! Nodematch: CSS-like node selectors over element trees
//!
//! Selectors describe the whole path from a top-level node down to the
//! selected node. They are compiled to a small instruction set and run on a
//! Pike VM, one node per step. Python bindings are available behind the
//! `pyo3` feature.

pub mod ast; // Selector AST and its construction from parse trees
pub mod compiler; // AST lowering to VM programs
#[cfg(feature = "html")]
pub mod html; // HTML markup to trees via html5ever
pub mod parser; // Selector grammar and raw parse trees
pub mod predicate; // Node predicates (tag, id, class, attributes)
pub mod searcher; // End-to-end selection (compiler + VM)
pub mod tree; // Arena tree of element nodes
pub mod vm; // Instruction set, programs and the Pike VM

// Python bindings
#[cfg(feature = "pyo3")]
pub mod python;

// Re-exports for convenience
pub use ast::Ast;
pub use compiler::{compile, generate};
#[cfg(feature = "html")]
pub use html::{HtmlError, HtmlOptions, parse_html, parse_html_with};
pub use parser::{CompileError, MAX_NESTING, Stage};
pub use predicate::{AttrOp, Predicate};
pub use searcher::{select, select_from};
pub use tree::{Node, NodeId, Tree, TreeError};
pub use vm::{Instruction, Program, ProgramError, VM};
