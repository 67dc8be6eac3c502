//! Selector AST
//!
//! Built from the simplified parse tree, consumed by the code generator.

use crate::parser::{CompileError, ParseNode, Rule, Stage};
use crate::predicate::{Predicate, compile_predict};

#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    /// Left matches a node, right matches its direct child
    Concat(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    /// Zero or more
    Star(Box<Ast>),
    /// One or more
    Plus(Box<Ast>),
    /// Zero or one
    Option(Box<Ast>),
    /// Exactly one node satisfying the predicate
    Predicate(Predicate),
}

/// Build the AST for a simplified parse tree
pub fn build_ast(node: &ParseNode, input: &str) -> Result<Ast, CompileError> {
    match node.rule {
        Rule::concat_expr => fold(node, input, Ast::Concat),
        Rule::or_expr => fold(node, input, Ast::Or),
        Rule::basic_expr => quantified(node, input),
        Rule::group_expr => build_ast(only_sub(node)?, input),
        Rule::predict_with_attr
        | Rule::attr_predict
        | Rule::basic_predicts
        | Rule::id_predict
        | Rule::class_predict
        | Rule::tag_predict
        | Rule::identifier => Ok(Ast::Predicate(compile_predict(node, input)?)),
        rule => Err(CompileError::internal(Stage::AstBuilder, rule)),
    }
}

/// Fold an n-ary list of operands into a left-leaning binary tree
fn fold(
    node: &ParseNode,
    input: &str,
    combine: fn(Box<Ast>, Box<Ast>) -> Ast,
) -> Result<Ast, CompileError> {
    let mut subs = node.subs.iter();
    let Some(first) = subs.next() else {
        return Err(CompileError::internal(Stage::AstBuilder, node.rule));
    };
    subs.try_fold(build_ast(first, input)?, |acc, sub| {
        Ok(combine(Box::new(acc), Box::new(build_ast(sub, input)?)))
    })
}

/// An operand followed by its quantifier marker
fn quantified(node: &ParseNode, input: &str) -> Result<Ast, CompileError> {
    let [operand, quantifier] = node.subs.as_slice() else {
        return Err(CompileError::internal(Stage::AstBuilder, node.rule));
    };
    let operand = Box::new(build_ast(operand, input)?);
    match quantifier.rule {
        Rule::star => Ok(Ast::Star(operand)),
        Rule::plus => Ok(Ast::Plus(operand)),
        Rule::option => Ok(Ast::Option(operand)),
        rule => Err(CompileError::internal(Stage::AstBuilder, rule)),
    }
}

fn only_sub(node: &ParseNode) -> Result<&ParseNode, CompileError> {
    match node.subs.as_slice() {
        [sub] => Ok(sub),
        _ => Err(CompileError::internal(Stage::AstBuilder, node.rule)),
    }
}
