use std::rc::Rc;

use crate::{
    ast::{Node, NodeId, NodeIds, NodeKind, Tree},
    span::Span,
    tokenizer::{self, Token, TokenType},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    #[error("Unterminated expression: \"(\" at {0} is never closed")]
    Unterminated(Span),
    #[error("Unexpected \")\" at {0} with no matching \"(\"")]
    UnexpectedClose(Span),
}

#[derive(Debug)]
struct ParseContext<'a> {
    ids: &'a NodeIds,
}

impl ParseContext<'_> {
    fn next_id(&self) -> NodeId {
        self.ids.allocate()
    }
}

pub fn parse_source(source: &str) -> Result<Tree, SyntaxError> {
    parse(&tokenizer::tokens(source))
}

/// Like [`parse_source`], drawing node ids from `ids`.
pub fn parse_source_with(source: &str, ids: &NodeIds) -> Result<Tree, SyntaxError> {
    parse_with(&tokenizer::tokens(source), ids)
}

/// Parses every top-level form into the children of an implicit root expression.
///
/// Node ids start at zero; use [`parse_with`] to keep ids distinct across trees.
pub fn parse(tokens: &[Token]) -> Result<Tree, SyntaxError> {
    parse_with(tokens, &NodeIds::new())
}

pub fn parse_with(tokens: &[Token], ids: &NodeIds) -> Result<Tree, SyntaxError> {
    let context = ParseContext { ids };
    let root_id = context.next_id();

    let (children, rest) = sequence(&context, tokens)?;
    if let Some(token) = rest.first() {
        return Err(SyntaxError::UnexpectedClose(token.span));
    }

    let span = match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => first.span + last.span,
        _ => Span::default(),
    };

    Ok(Tree::new(Rc::new(Node::new(
        root_id,
        NodeKind::Expression(children),
        span,
    ))))
}

/// Collects nodes until a `)` or the end of input, leaving the `)` unconsumed.
fn sequence<'a>(
    context: &ParseContext<'_>,
    tokens: &'a [Token],
) -> Result<(Vec<Rc<Node>>, &'a [Token]), SyntaxError> {
    let mut children = Vec::new();
    let mut tokens = tokens;

    while let Some(token) = tokens.first() {
        match token.token_type() {
            TokenType::RightParen => break,
            TokenType::LeftParen => {
                let (node, rest) = expression(context, tokens)?;
                children.push(node);
                tokens = rest;
            }
            TokenType::Atom => {
                children.push(Rc::new(atom(context, token)));
                tokens = &tokens[1..];
            }
        }
    }

    Ok((children, tokens))
}

fn expression<'a>(
    context: &ParseContext<'_>,
    tokens: &'a [Token],
) -> Result<(Rc<Node>, &'a [Token]), SyntaxError> {
    let Some((open, tokens)) = tokens.split_first() else {
        unreachable!("expression is only entered on \"(\"");
    };
    let id = context.next_id();

    let (children, rest) = sequence(context, tokens)?;
    let Some((close, rest)) = rest.split_first() else {
        return Err(SyntaxError::Unterminated(open.span));
    };

    let node = Node::new(id, NodeKind::Expression(children), open.span + close.span);
    Ok((Rc::new(node), rest))
}

fn atom(context: &ParseContext<'_>, token: &Token) -> Node {
    let kind = match number(&token.text) {
        Some(n) => NodeKind::Number(n),
        None => NodeKind::Identifier(token.text.clone()),
    };
    Node::new(context.next_id(), kind, token.span)
}

/// Decimal and exponent literals only; `inf` and `NaN` stay identifiers.
fn number(text: &str) -> Option<f64> {
    if text
        .chars()
        .any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E'))
    {
        return None;
    }
    text.parse().ok()
}
