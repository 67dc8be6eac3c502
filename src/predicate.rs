//! Node predicates and their compilation from parse trees
//!
//! A predicate tests a single node: its tag, id, classes or attributes.
//! Predicates are plain data so compiled programs can be inspected, compared
//! and shared between threads.

use std::fmt;

use crate::parser::{CompileError, ParseNode, Rule, Stage};
use crate::tree::Node;

/// Comparison applied to an attribute value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    /// `=`: exact equality
    Equals,
    /// `~=`: the value is one of the whitespace-separated tokens of the
    /// attribute
    Includes,
}

impl AttrOp {
    fn apply(self, actual: &str, expected: &str) -> bool {
        match self {
            AttrOp::Equals => actual == expected,
            AttrOp::Includes => actual.split_ascii_whitespace().any(|token| token == expected),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every node
    Any,
    Tag(String),
    Id(String),
    Class(String),
    /// Attribute name, operator, literal. A missing attribute compares as
    /// the empty string.
    Attr(String, AttrOp, String),
    Not(Box<Predicate>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Evaluate the predicate against a node
    pub fn test(&self, node: &Node) -> bool {
        match self {
            Predicate::Any => true,
            Predicate::Tag(tag) => node.tag == *tag,
            Predicate::Id(id) => node.id == *id,
            Predicate::Class(class) => node.has_class(class),
            Predicate::Attr(name, op, value) => op.apply(node.attr(name).unwrap_or(""), value),
            Predicate::Not(inner) => !inner.test(node),
            Predicate::And(preds) => preds.iter().all(|p| p.test(node)),
            Predicate::Or(preds) => preds.iter().any(|p| p.test(node)),
        }
    }

    /// Conjunction, dropping `Any` and flattening nested `And`s
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (x, Predicate::Any) | (Predicate::Any, x) => x,
            (Predicate::And(mut xs), Predicate::And(ys)) => {
                xs.extend(ys);
                Predicate::And(xs)
            }
            (Predicate::And(mut xs), y) => {
                xs.push(y);
                Predicate::And(xs)
            }
            (x, Predicate::And(ys)) => {
                let mut xs = Vec::with_capacity(ys.len() + 1);
                xs.push(x);
                xs.extend(ys);
                Predicate::And(xs)
            }
            (x, y) => Predicate::And(vec![x, y]),
        }
    }

    /// Disjunction, flattening nested `Or`s. `Any` absorbs the other side.
    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Any, _) | (_, Predicate::Any) => Predicate::Any,
            (Predicate::Or(mut xs), Predicate::Or(ys)) => {
                xs.extend(ys);
                Predicate::Or(xs)
            }
            (Predicate::Or(mut xs), y) => {
                xs.push(y);
                Predicate::Or(xs)
            }
            (x, Predicate::Or(ys)) => {
                let mut xs = Vec::with_capacity(ys.len() + 1);
                xs.push(x);
                xs.extend(ys);
                Predicate::Or(xs)
            }
            (x, y) => Predicate::Or(vec![x, y]),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Any => write!(f, "[]"),
            Predicate::Tag(tag) => write!(f, "{}", tag),
            Predicate::Id(id) => write!(f, "#{}", id),
            Predicate::Class(class) => write!(f, ".{}", class),
            Predicate::Attr(name, AttrOp::Equals, value) => write!(f, "[{}={:?}]", name, value),
            Predicate::Attr(name, AttrOp::Includes, value) => {
                write!(f, "[{}~={:?}]", name, value)
            }
            Predicate::Not(inner) => write!(f, "!{}", inner),
            Predicate::And(preds) => write_joined(f, preds, " && "),
            Predicate::Or(preds) => write_joined(f, preds, " || "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, preds: &[Predicate], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, pred) in preds.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", pred)?;
    }
    write!(f, ")")
}

/// Compile a predict-shaped parse node into a predicate
///
/// Accepts the forms the simplification pass can leave behind: a full
/// `predict_with_attr`, a lone attribute block, a run of basic predicates,
/// or a single basic predicate.
pub fn compile_predict(node: &ParseNode, input: &str) -> Result<Predicate, CompileError> {
    match node.rule {
        Rule::predict_with_attr | Rule::basic_predicts => {
            node.subs.iter().try_fold(Predicate::Any, |acc, sub| {
                Ok(acc.and(compile_predict(sub, input)?))
            })
        }
        Rule::tag_predict | Rule::identifier => Ok(Predicate::Tag(node.text(input).to_string())),
        Rule::id_predict => Ok(Predicate::Id(identifier(node, input)?.to_string())),
        Rule::class_predict => Ok(Predicate::Class(identifier(node, input)?.to_string())),
        Rule::attr_predict => match node.subs.as_slice() {
            [] => Ok(Predicate::Any),
            [expr] => compile_attr_expr(expr, input),
            _ => Err(CompileError::internal(Stage::PredicateCompiler, node.rule)),
        },
        rule => Err(CompileError::internal(Stage::PredicateCompiler, rule)),
    }
}

/// Compile the contents of an attribute block
fn compile_attr_expr(node: &ParseNode, input: &str) -> Result<Predicate, CompileError> {
    match node.rule {
        Rule::attr_or_expr => fold_attr_exprs(node, input, Predicate::or),
        Rule::attr_and_expr => fold_attr_exprs(node, input, Predicate::and),
        Rule::attr_group_expr => match node.subs.as_slice() {
            [inner] => compile_attr_expr(inner, input),
            _ => Err(CompileError::internal(Stage::PredicateCompiler, node.rule)),
        },
        Rule::attr_elementary_expr => compile_comparison(node, input),
        rule => Err(CompileError::internal(Stage::PredicateCompiler, rule)),
    }
}

fn fold_attr_exprs(
    node: &ParseNode,
    input: &str,
    combine: fn(Predicate, Predicate) -> Predicate,
) -> Result<Predicate, CompileError> {
    let mut subs = node.subs.iter();
    let Some(first) = subs.next() else {
        return Err(CompileError::internal(Stage::PredicateCompiler, node.rule));
    };
    subs.try_fold(compile_attr_expr(first, input)?, |acc, sub| {
        Ok(combine(acc, compile_attr_expr(sub, input)?))
    })
}

/// `name op value`
fn compile_comparison(node: &ParseNode, input: &str) -> Result<Predicate, CompileError> {
    let [name, op, value] = node.subs.as_slice() else {
        return Err(CompileError::internal(Stage::PredicateCompiler, node.rule));
    };
    let name = name.text(input).to_string();
    let value = literal(value, input)?.to_string();

    match op.text(input) {
        "=" => Ok(Predicate::Attr(name, AttrOp::Equals, value)),
        "!=" => Ok(Predicate::Not(Box::new(Predicate::Attr(
            name,
            AttrOp::Equals,
            value,
        )))),
        "~=" => Ok(Predicate::Attr(name, AttrOp::Includes, value)),
        other => Err(CompileError::internal(Stage::PredicateCompiler, other)),
    }
}

/// Text of a value, without its quotes
fn literal<'i>(node: &ParseNode, input: &'i str) -> Result<&'i str, CompileError> {
    match node.rule {
        Rule::single_quoted | Rule::double_quoted | Rule::back_quoted => {
            let quoted = node.text(input);
            Ok(&quoted[1..quoted.len() - 1])
        }
        Rule::text => Ok(node.text(input)),
        Rule::value => match node.subs.as_slice() {
            [inner] => literal(inner, input),
            _ => Err(CompileError::internal(Stage::PredicateCompiler, node.rule)),
        },
        rule => Err(CompileError::internal(Stage::PredicateCompiler, rule)),
    }
}

/// The identifier following `#` or `.`
fn identifier<'i>(node: &ParseNode, input: &'i str) -> Result<&'i str, CompileError> {
    match node.subs.as_slice() {
        [ident] if ident.rule == Rule::identifier => Ok(ident.text(input)),
        _ => Err(CompileError::internal(Stage::PredicateCompiler, node.rule)),
    }
}
