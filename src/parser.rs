//! Selector language parser
//!
//! Runs the pest grammar in `selector.pest` over selector text and turns the
//! resulting pairs into a raw parse tree of labeled byte spans.

use pest::Parser;
use pest::error::InputLocation;
use pest::iterators::Pair;
use pest_derive::Parser;
use std::fmt;
use thiserror::Error;

#[derive(Parser)]
#[grammar = "selector.pest"]
struct SelectorParser;

/// Deepest parenthesis nesting accepted in a selector, attribute groups
/// included. The grammar and the compiler recurse once per level.
pub const MAX_NESTING: usize = 32;

/// Compilation stage that rejected a parse tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AstBuilder,
    PredicateCompiler,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::AstBuilder => write!(f, "AST builder"),
            Stage::PredicateCompiler => write!(f, "predicate compiler"),
        }
    }
}

/// Error type for selector compilation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The selector is malformed: no parse covers the whole input
    #[error("Selector error: syntax error at offset {position}, unmatched input {remainder:?}")]
    Syntax { position: usize, remainder: String },

    /// The grammar produced a parse tree the compiler does not understand.
    /// This is a bug, not a problem with the selector.
    #[error("Selector error: internal error: {stage} cannot handle {rule}")]
    Internal { stage: Stage, rule: String },

    /// Parentheses nest deeper than [`MAX_NESTING`]
    #[error("Selector error: parentheses nest deeper than {limit} at offset {position}")]
    TooDeep { position: usize, limit: usize },
}

impl CompileError {
    pub(crate) fn internal(stage: Stage, rule: impl fmt::Debug) -> Self {
        CompileError::Internal {
            stage,
            rule: format!("{:?}", rule),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::Internal { .. })
    }
}

/// A node of the raw parse tree: a grammar rule and the span it matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseNode {
    pub rule: Rule,
    /// Byte offset into the selector text
    pub start: usize,
    /// Length in bytes
    pub len: usize,
    pub subs: Vec<ParseNode>,
}

impl ParseNode {
    fn from_pair(pair: Pair<'_, Rule>) -> Self {
        let span = pair.as_span();
        Self {
            rule: pair.as_rule(),
            start: span.start(),
            len: span.end() - span.start(),
            subs: pair.into_inner().map(ParseNode::from_pair).collect(),
        }
    }

    /// The slice of `input` this node spans
    pub fn text<'i>(&self, input: &'i str) -> &'i str {
        &input[self.start..self.start + self.len]
    }

    /// Collapse every node whose only child spans exactly the same text into
    /// that child, recursively. This strips the wrapper rules that encode
    /// precedence in the grammar.
    pub fn simplify(mut self) -> Self {
        while self.subs.len() == 1 && self.subs[0].start == self.start && self.subs[0].len == self.len
        {
            if let Some(sub) = self.subs.pop() {
                self = sub;
            }
        }
        self.subs = self.subs.into_iter().map(ParseNode::simplify).collect();
        self
    }
}

/// Parse selector text into a raw parse tree
///
/// The parse must cover the whole input; otherwise the error reports where
/// the unmatched remainder begins.
pub fn parse_selector(input: &str) -> Result<ParseNode, CompileError> {
    check_nesting(input)?;

    let mut pairs = SelectorParser::parse(Rule::expr, input).map_err(|err| {
        let position = match err.location {
            InputLocation::Pos(pos) => pos,
            InputLocation::Span((start, _)) => start,
        };
        syntax_error(input, position)
    })?;

    let Some(pair) = pairs.next() else {
        return Err(syntax_error(input, 0));
    };

    let end = pair.as_span().end();
    if end != input.len() {
        return Err(syntax_error(input, end));
    }

    Ok(ParseNode::from_pair(pair))
}

/// Reject selectors whose parentheses nest deeper than [`MAX_NESTING`]
/// before the grammar sees them. Quoted values are skipped; unbalanced
/// input is left for the grammar to report.
fn check_nesting(input: &str) -> Result<(), CompileError> {
    let mut depth = 0usize;
    let mut quote = None;
    for (position, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '(') => {
                depth += 1;
                if depth > MAX_NESTING {
                    return Err(CompileError::TooDeep {
                        position,
                        limit: MAX_NESTING,
                    });
                }
            }
            (None, ')') => depth = depth.saturating_sub(1),
            (None, _) => {}
        }
    }
    Ok(())
}

fn syntax_error(input: &str, position: usize) -> CompileError {
    let position = position.min(input.len());
    CompileError::Syntax {
        position,
        remainder: input.get(position..).unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> ParseNode {
        parse_selector(input).unwrap().simplify()
    }

    #[test]
    fn test_parse_tag() {
        let node = parse("div");

        // tag_predict and every wrapper above it collapse into the identifier
        assert_eq!(node.rule, Rule::identifier);
        assert_eq!(node.text("div"), "div");
        assert!(node.subs.is_empty());
    }

    #[test]
    fn test_parse_concat() {
        let input = "html body  div";
        let node = parse(input);

        assert_eq!(node.rule, Rule::concat_expr);
        let texts: Vec<&str> = node.subs.iter().map(|sub| sub.text(input)).collect();
        assert_eq!(texts, vec!["html", "body", "div"]);
    }

    #[test]
    fn test_parse_alternation_binds_loosest() {
        let input = "a b|c";
        let node = parse(input);

        assert_eq!(node.rule, Rule::or_expr);
        assert_eq!(node.subs.len(), 2);
        assert_eq!(node.subs[0].rule, Rule::concat_expr);
        assert_eq!(node.subs[1].rule, Rule::identifier);
    }

    #[test]
    fn test_parse_alternation_with_spaces() {
        let input = "a | b";
        let node = parse(input);

        assert_eq!(node.rule, Rule::or_expr);
        assert_eq!(node.subs[1].text(input), "b");
    }

    #[test]
    fn test_parse_quantifiers() {
        for (input, marker) in [("a*", Rule::star), ("a+", Rule::plus), ("a?", Rule::option)] {
            let node = parse(input);
            assert_eq!(node.rule, Rule::basic_expr);
            assert_eq!(node.subs[0].rule, Rule::identifier);
            assert_eq!(node.subs[1].rule, marker);
        }
        assert_eq!(parse("(a b)*").subs[0].rule, Rule::group_expr);
    }

    #[test]
    fn test_parse_compound_predict() {
        let input = "div#x.y[]";
        let node = parse(input);

        assert_eq!(node.rule, Rule::predict_with_attr);
        assert_eq!(node.subs[0].rule, Rule::basic_predicts);
        assert_eq!(node.subs[1].rule, Rule::attr_predict);

        let kinds: Vec<Rule> = node.subs[0].subs.iter().map(|sub| sub.rule).collect();
        assert_eq!(kinds, vec![Rule::identifier, Rule::id_predict, Rule::class_predict]);
    }

    #[test]
    fn test_parse_attr_expr() {
        let input = r#"[a='1' && (b!="2" || c~=`3`)]"#;
        let node = parse(input);

        assert_eq!(node.rule, Rule::attr_predict);
        let and = &node.subs[0];
        assert_eq!(and.rule, Rule::attr_and_expr);
        assert_eq!(and.subs[0].rule, Rule::attr_elementary_expr);
        assert_eq!(and.subs[1].rule, Rule::attr_group_expr);
        assert_eq!(and.subs[1].subs[0].rule, Rule::attr_or_expr);

        let cmp = &and.subs[0];
        assert_eq!(cmp.subs[0].text(input), "a");
        assert_eq!(cmp.subs[1].text(input), "=");
        assert_eq!(cmp.subs[2].rule, Rule::single_quoted);
    }

    #[test]
    fn test_parse_bare_value() {
        let input = "[href=/index.html]";
        let node = parse(input);
        let cmp = &node.subs[0];

        assert_eq!(cmp.subs[2].rule, Rule::text);
        assert_eq!(cmp.subs[2].text(input), "/index.html");
    }

    #[test]
    fn test_partial_parse_reports_remainder() {
        let err = parse_selector("a b |").unwrap_err();
        assert_eq!(
            err,
            CompileError::Syntax {
                position: 3,
                remainder: " |".to_string()
            }
        );
        assert!(!err.is_internal());
    }

    #[test]
    fn test_trailing_garbage() {
        let err = parse_selector("div)").unwrap_err();
        assert_eq!(
            err,
            CompileError::Syntax {
                position: 3,
                remainder: ")".to_string()
            }
        );
    }

    #[test]
    fn test_empty_selector() {
        let err = parse_selector("").unwrap_err();
        assert!(matches!(err, CompileError::Syntax { position: 0, .. }));
    }

    #[test]
    fn test_unparseable() {
        assert!(matches!(
            parse_selector("|a"),
            Err(CompileError::Syntax { .. })
        ));
        assert!(matches!(
            parse_selector("[a]"),
            Err(CompileError::Syntax { .. })
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |depth: usize| format!("{}a{}", "(".repeat(depth), ")".repeat(depth));

        assert!(parse_selector(&nested(MAX_NESTING)).is_ok());
        assert_eq!(
            parse_selector(&nested(MAX_NESTING + 1)).unwrap_err(),
            CompileError::TooDeep {
                position: MAX_NESTING,
                limit: MAX_NESTING
            }
        );
        assert!(matches!(
            parse_selector(&nested(20_000)),
            Err(CompileError::TooDeep { .. })
        ));
    }

    #[test]
    fn test_nesting_limit_counts_attr_groups_but_not_quotes() {
        let attr = format!("[{}a=b{}]", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert!(matches!(
            parse_selector(&attr),
            Err(CompileError::TooDeep { .. })
        ));

        let quoted = format!("[a='{}']", "(".repeat(MAX_NESTING + 1));
        assert!(parse_selector(&quoted).is_ok());
    }

    #[test]
    fn test_simplify_keeps_distinct_spans() {
        let input = "(a)";
        let node = parse(input);

        assert_eq!(node.rule, Rule::group_expr);
        assert_eq!(node.subs[0].rule, Rule::identifier);
        assert_eq!(node.subs[0].start, 1);
    }
}
