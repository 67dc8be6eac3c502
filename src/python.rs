//! Python bindings for nodematch
//!
//! This module provides PyO3-based Python bindings for the Rust core.

use pyo3::exceptions::{PyIndexError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use crate::compiler::compile;
use crate::html::{HtmlError, parse_html};
use crate::parser::CompileError;
use crate::tree::{NodeId, Tree};
use crate::vm::Program;

/// Convert CompileError to Python exception
impl From<CompileError> for PyErr {
    fn from(err: CompileError) -> PyErr {
        match err {
            CompileError::Syntax { .. } | CompileError::TooDeep { .. } => {
                PyValueError::new_err(err.to_string())
            }
            CompileError::Internal { .. } => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

impl From<HtmlError> for PyErr {
    fn from(err: HtmlError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

/// A compiled selector.
#[pyclass(name = "Program", frozen)]
pub struct PyProgram {
    inner: Program,
}

#[pymethods]
impl PyProgram {
    /// Select matching elements from a document, in document order.
    fn select(&self, document: &PyDocument) -> Vec<PyElement> {
        self.inner
            .select_all(&document.inner)
            .into_iter()
            .map(|id| PyElement::new(&document.inner, id))
            .collect()
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    /// Assembly listing of the program.
    fn dump(&self) -> String {
        self.inner.to_string()
    }

    fn __repr__(&self) -> String {
        format!("<Program len={}>", self.inner.len())
    }
}

/// A parsed HTML document.
#[pyclass(name = "Document", frozen)]
pub struct PyDocument {
    inner: Arc<Tree>,
}

#[pymethods]
impl PyDocument {
    /// Compile `selector` and select matching elements.
    fn select(&self, selector: &str) -> PyResult<Vec<PyElement>> {
        let program = compile(selector)?;
        Ok(program
            .select_all(&self.inner)
            .into_iter()
            .map(|id| PyElement::new(&self.inner, id))
            .collect())
    }

    fn element(&self, id: NodeId) -> PyResult<PyElement> {
        if id < self.inner.len() {
            Ok(PyElement::new(&self.inner, id))
        } else {
            Err(PyIndexError::new_err(format!(
                "element index out of range: {}",
                id
            )))
        }
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __repr__(&self) -> String {
        format!("<Document elements={}>", self.inner.len())
    }
}

/// An element of a parsed document.
#[pyclass(name = "Element", frozen)]
pub struct PyElement {
    tree: Arc<Tree>,
    id: NodeId,
}

impl PyElement {
    fn new(tree: &Arc<Tree>, id: NodeId) -> Self {
        Self {
            tree: Arc::clone(tree),
            id,
        }
    }

    fn node(&self) -> &crate::tree::Node {
        &self.tree.nodes[self.id]
    }
}

#[pymethods]
impl PyElement {
    /// Position of the element in its document.
    #[getter]
    fn node_id(&self) -> NodeId {
        self.id
    }

    /// Position among its siblings, None for the top-level element.
    #[getter]
    fn index(&self) -> Option<usize> {
        self.tree.index(self.id)
    }

    #[getter]
    fn tag(&self) -> String {
        self.node().tag.clone()
    }

    #[getter]
    fn id(&self) -> String {
        self.node().id.clone()
    }

    #[getter]
    fn classes(&self) -> Vec<String> {
        self.node().class.clone()
    }

    #[getter]
    fn attrs(&self) -> HashMap<String, String> {
        self.node()
            .attr
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    #[getter]
    fn text(&self) -> String {
        self.node().text.clone()
    }

    /// Markup of the element and everything inside it.
    #[getter]
    fn raw(&self) -> String {
        self.node().raw.clone()
    }

    #[getter]
    fn tag_path(&self) -> Vec<String> {
        self.tree
            .tag_path(self.id)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn parent(&self) -> Option<PyElement> {
        self.tree
            .parent_id(self.id)
            .map(|id| PyElement::new(&self.tree, id))
    }

    fn children(&self) -> Vec<PyElement> {
        self.tree
            .children(self.id)
            .iter()
            .map(|&id| PyElement::new(&self.tree, id))
            .collect()
    }

    fn __repr__(&self) -> String {
        let node = self.node();
        let mut repr = format!("<Element {}", node.tag);
        if !node.id.is_empty() {
            repr.push_str(&format!(" id='{}'", node.id));
        }
        if !node.class.is_empty() {
            repr.push_str(&format!(" class='{}'", node.class.join(" ")));
        }
        repr.push('>');
        repr
    }
}

/// Compile a selector into a reusable program.
///
/// Raises:
///     ValueError: If the selector is malformed
///
/// Example:
///     >>> program = nodematch.compile("html body div.note")
///     >>> program.select(nodematch.parse_html(markup))
#[pyfunction]
#[pyo3(name = "compile")]
fn py_compile(selector: &str) -> PyResult<PyProgram> {
    Ok(PyProgram {
        inner: compile(selector)?,
    })
}

/// Parse an HTML document.
#[pyfunction]
#[pyo3(name = "parse_html")]
fn py_parse_html(markup: &str) -> PyResult<PyDocument> {
    Ok(PyDocument {
        inner: Arc::new(parse_html(markup)?),
    })
}

#[pymodule]
fn nodematch(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyProgram>()?;
    m.add_class::<PyDocument>()?;
    m.add_class::<PyElement>()?;
    m.add_function(wrap_pyfunction!(py_compile, m)?)?;
    m.add_function(wrap_pyfunction!(py_parse_html, m)?)?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}
