//! Filter expression parsing.
//!
//! # Syntax
//!
//! - `(key=value)`, `(key~=value)`, `(key>=value)`, `(key<=value)`
//! - `(key=*)` - header is present
//! - `(key=a*b*c)` - substring match, `*` is a wildcard
//! - `(&(..)(..))`, `(|(..)(..))`, `(!(..))`
//! - `\` escapes `(`, `)`, `*` and `\` inside values

use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

use super::Filter;

/// A filter expression could not be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} at position {position}")]
pub struct FilterParseError {
    /// What went wrong.
    pub message: String,
    /// Byte offset into the expression.
    pub position: usize,
}

/// Comparison operator of a simple item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equal,
    Approx,
    GreaterEq,
    LessEq,
}

/// One piece of a value: literal text or an unescaped `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ValuePiece {
    Text(String),
    Wildcard,
}

/// Parse a complete filter expression.
pub fn parse(expression: &str) -> Result<Filter, FilterParseError> {
    let mut parser = Parser {
        input: expression,
        chars: expression.char_indices().peekable(),
    };
    parser.skip_whitespace();
    let filter = parser.parse_filter()?;
    parser.skip_whitespace();
    if let Some((pos, c)) = parser.chars.peek().copied() {
        return Err(parser.error_at(pos, format!("unexpected '{}' after filter", c)));
    }
    Ok(filter)
}

struct Parser<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn position(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(pos, _)| *pos)
            .unwrap_or(self.input.len())
    }

    fn error_at(&self, position: usize, message: impl Into<String>) -> FilterParseError {
        FilterParseError {
            message: message.into(),
            position,
        }
    }

    fn error_here(&mut self, message: impl Into<String>) -> FilterParseError {
        let pos = self.position();
        self.error_at(pos, message)
    }

    fn skip_whitespace(&mut self) {
        while self.chars.peek().is_some_and(|(_, c)| c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), FilterParseError> {
        match self.chars.peek().copied() {
            Some((_, c)) if c == expected => {
                self.chars.next();
                Ok(())
            }
            Some((pos, c)) => {
                Err(self.error_at(pos, format!("expected '{}', found '{}'", expected, c)))
            }
            None => Err(self.error_here(format!("expected '{}', found end of input", expected))),
        }
    }

    fn parse_filter(&mut self) -> Result<Filter, FilterParseError> {
        self.expect('(')?;
        self.skip_whitespace();

        let filter = match self.chars.peek().map(|(_, c)| *c) {
            Some('&') => {
                self.chars.next();
                Filter::And(self.parse_list()?)
            }
            Some('|') => {
                self.chars.next();
                Filter::Or(self.parse_list()?)
            }
            Some('!') => {
                self.chars.next();
                self.skip_whitespace();
                let inner = self.parse_filter()?;
                self.skip_whitespace();
                Filter::Not(Box::new(inner))
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.error_here("unexpected end of input")),
        };

        self.expect(')')?;
        Ok(filter)
    }

    fn parse_list(&mut self) -> Result<Vec<Filter>, FilterParseError> {
        let mut items = Vec::new();
        self.skip_whitespace();
        while self.chars.peek().is_some_and(|(_, c)| *c == '(') {
            items.push(self.parse_filter()?);
            self.skip_whitespace();
        }
        if items.is_empty() {
            return Err(self.error_here("expected at least one operand"));
        }
        Ok(items)
    }

    fn parse_item(&mut self) -> Result<Filter, FilterParseError> {
        let key = self.parse_key()?;
        let op = self.parse_operator()?;
        let pieces = self.parse_value()?;

        let has_wildcard = pieces.iter().any(|p| *p == ValuePiece::Wildcard);
        if op == Operator::Equal && has_wildcard {
            if pieces == [ValuePiece::Wildcard] {
                return Ok(Filter::Present { key });
            }
            return Ok(Filter::Substring {
                key,
                parts: split_on_wildcards(pieces),
            });
        }

        let value = pieces
            .into_iter()
            .map(|p| match p {
                ValuePiece::Text(t) => t,
                ValuePiece::Wildcard => "*".to_string(),
            })
            .collect::<String>();

        Ok(match op {
            Operator::Equal => Filter::Equal { key, value },
            Operator::Approx => Filter::Approx { key, value },
            Operator::GreaterEq => Filter::GreaterEq { key, value },
            Operator::LessEq => Filter::LessEq { key, value },
        })
    }

    fn parse_key(&mut self) -> Result<String, FilterParseError> {
        let start = self.position();
        let mut key = String::new();
        while let Some((_, c)) = self.chars.peek().copied() {
            if matches!(c, '=' | '~' | '<' | '>' | '(' | ')') {
                break;
            }
            key.push(c);
            self.chars.next();
        }
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(self.error_at(start, "missing attribute name"));
        }
        Ok(key)
    }

    fn parse_operator(&mut self) -> Result<Operator, FilterParseError> {
        let Some((pos, c)) = self.chars.next() else {
            return Err(self.error_here("expected operator, found end of input"));
        };
        let op = match c {
            '=' => return Ok(Operator::Equal),
            '~' => Operator::Approx,
            '>' => Operator::GreaterEq,
            '<' => Operator::LessEq,
            other => {
                return Err(self.error_at(pos, format!("invalid operator '{}'", other)));
            }
        };
        self.expect('=')?;
        Ok(op)
    }

    fn parse_value(&mut self) -> Result<Vec<ValuePiece>, FilterParseError> {
        let mut pieces = Vec::new();
        let mut text = String::new();

        loop {
            match self.chars.peek().copied() {
                None => return Err(self.error_here("unterminated value, expected ')'")),
                Some((_, ')')) => break,
                Some((pos, '(')) => {
                    return Err(self.error_at(pos, "unescaped '(' in value"));
                }
                Some((_, '\\')) => {
                    self.chars.next();
                    match self.chars.next() {
                        Some((_, escaped)) => text.push(escaped),
                        None => return Err(self.error_here("dangling escape at end of input")),
                    }
                }
                Some((_, '*')) => {
                    self.chars.next();
                    if !text.is_empty() {
                        pieces.push(ValuePiece::Text(std::mem::take(&mut text)));
                    }
                    pieces.push(ValuePiece::Wildcard);
                }
                Some((_, c)) => {
                    self.chars.next();
                    text.push(c);
                }
            }
        }

        if !text.is_empty() {
            pieces.push(ValuePiece::Text(text));
        }
        Ok(pieces)
    }
}

/// Turn `[Text(a), *, Text(b), *]` into `["a", "b", ""]`.
fn split_on_wildcards(pieces: Vec<ValuePiece>) -> Vec<String> {
    let mut parts = vec![String::new()];
    for piece in pieces {
        match piece {
            ValuePiece::Text(t) => {
                if let Some(last) = parts.last_mut() {
                    last.push_str(&t);
                }
            }
            ValuePiece::Wildcard => parts.push(String::new()),
        }
    }
    parts
}
