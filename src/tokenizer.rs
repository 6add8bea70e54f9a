use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    LeftParen,
    RightParen,
    Atom,
}

impl Token {
    pub fn token_type(&self) -> TokenType {
        match self.text.as_str() {
            "(" => TokenType::LeftParen,
            ")" => TokenType::RightParen,
            _ => TokenType::Atom,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Position {
    line: usize,
    column: usize,
}

impl Position {
    fn advance(&mut self, consumed: &str) {
        for c in consumed.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

/// Splits source text into parens and whitespace-separated atoms.
///
/// Never fails; unbalanced input is left for the parser to reject.
pub fn tokens(source: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut remaining = source;
    let mut position = Position { line: 1, column: 1 };

    loop {
        if let Some((skipped, rest)) = whitespace(remaining) {
            position.advance(skipped);
            remaining = rest;
        }

        let Some((text, rest)) = token(remaining) else {
            break;
        };

        tokens.push(Token {
            text: text.to_string(),
            span: Span::on_line(position.line, position.column, text.chars().count()),
        });
        position.advance(text);
        remaining = rest;
    }

    tokens
}

fn token(source: &str) -> Option<(&str, &str)> {
    maximal(&[left_paren, right_paren, atom], source)
}

fn maximal<'a>(
    parsers: &[for<'b> fn(&'b str) -> Option<(&'b str, &'b str)>],
    source: &'a str,
) -> Option<(&'a str, &'a str)> {
    let mut min_left = source.len() + 1;
    let mut max_match = None;

    let matching_parsers = parsers.iter().filter_map(|parser| parser(source));
    for (m, rest) in matching_parsers {
        let left = rest.len();
        if left < min_left {
            min_left = left;
            max_match = Some((m, rest));
        }
    }

    max_match
}

fn whitespace(source: &str) -> Option<(&str, &str)> {
    let len = source
        .chars()
        .take_while(|c| c.is_whitespace())
        .map(char::len_utf8)
        .sum();
    if len > 0 {
        Some(source.split_at(len))
    } else {
        None
    }
}

fn left_paren(source: &str) -> Option<(&str, &str)> {
    source.starts_with('(').then(|| source.split_at(1))
}

fn right_paren(source: &str) -> Option<(&str, &str)> {
    source.starts_with(')').then(|| source.split_at(1))
}

fn atom(source: &str) -> Option<(&str, &str)> {
    let len = source
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != '(' && *c != ')')
        .map(char::len_utf8)
        .sum();
    if len > 0 {
        Some(source.split_at(len))
    } else {
        None
    }
}
