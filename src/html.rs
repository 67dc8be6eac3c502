//! HTML documents as selector trees
//!
//! Markup is parsed by html5ever into its reference `RcDom`, which is then
//! converted into a [`Tree`]. Only elements become nodes; text is attached
//! to the enclosing element and comments, doctypes and processing
//! instructions are dropped.

use html5ever::parse_document;
use html5ever::serialize::{SerializeOpts, TraversalScope, serialize};
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom, SerializableHandle};
use thiserror::Error;
use tracing::debug;

use crate::tree::{Node, NodeId, Tree, TreeError};

/// Error while building a tree from markup
#[derive(Debug, Error)]
pub enum HtmlError {
    #[error("HTML error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTML error: {0}")]
    Tree(#[from] TreeError),
}

/// Options for [`parse_html_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtmlOptions {
    /// Fill [`Node::raw`] with each element's serialized markup. Every
    /// element stores its whole subtree, so the total grows with depth.
    pub raw: bool,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self { raw: true }
    }
}

/// Parse an HTML document
///
/// html5ever follows the HTML5 tree construction rules, so the result always
/// has a single top-level `html` element with `head` and `body` children,
/// even for fragments.
pub fn parse_html(markup: &str) -> Result<Tree, HtmlError> {
    parse_html_with(markup, HtmlOptions::default())
}

/// [`parse_html`] with explicit options
pub fn parse_html_with(markup: &str, options: HtmlOptions) -> Result<Tree, HtmlError> {
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut markup.as_bytes())?;

    let tree = convert(&dom.document, options)?;

    debug!(nodes = tree.len(), raw = options.raw, "parsed HTML document");
    Ok(tree)
}

/// Walk the DOM in document order with an explicit stack, so nesting depth
/// is not limited by the call stack
fn convert(document: &Handle, options: HtmlOptions) -> Result<Tree, HtmlError> {
    let mut tree = Tree::new();
    let mut stack: Vec<(Handle, Option<NodeId>)> = vec![(document.clone(), None)];

    while let Some((handle, parent)) = stack.pop() {
        let parent = match &handle.data {
            NodeData::Document => parent,
            NodeData::Element { name, attrs, .. } => {
                let mut node = Node::new(&name.local);
                for attr in attrs.borrow().iter() {
                    node.set_attr(&attr.name.local, &attr.value);
                }
                if options.raw {
                    node.raw = outer_html(&handle)?;
                }

                let id = match parent {
                    Some(parent) => tree.append_child(parent, node)?,
                    None => tree.add_node(node),
                };
                Some(id)
            }
            NodeData::Text { contents } => {
                if let Some(node) = parent.and_then(|id| tree.get_node_mut(id)) {
                    node.push_text(&contents.borrow());
                }
                continue;
            }
            _ => continue,
        };

        // Reversed so children are converted in document order
        stack.extend(
            handle
                .children
                .borrow()
                .iter()
                .rev()
                .map(|child| (child.clone(), parent)),
        );
    }
    Ok(tree)
}

/// Serialize an element together with its subtree
fn outer_html(handle: &Handle) -> Result<String, HtmlError> {
    let mut bytes = Vec::new();
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::IncludeNode,
        ..Default::default()
    };
    serialize(&mut bytes, &SerializableHandle::from(handle.clone()), opts)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
