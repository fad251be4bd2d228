// src/depends/parser.rs

//! Recursive descent parser for `depends` expressions.
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | primary
//! primary := NAME ( "." CONDITION )? | "(" or ")"
//! ```

use crate::depends::predicate::{Predicate, TaskCondition};
use crate::errors::{DagweaveError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

/// Parse a non-empty `depends` expression.
pub fn parse(expr: &str) -> Result<Predicate> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(syntax(expr, 0, "empty expression"));
    }

    let mut parser = Parser {
        expr,
        tokens,
        pos: 0,
    };
    let predicate = parser.parse_or()?;

    if let Some((offset, token)) = parser.tokens.get(parser.pos) {
        return Err(syntax(expr, *offset, &format!("unexpected {token:?}")));
    }

    Ok(predicate)
}

/// Parse an optional `depends`; blank means "no explicit predecessors".
pub fn parse_optional(expr: Option<&str>) -> Result<Option<Predicate>> {
    match expr {
        Some(s) if !s.trim().is_empty() => parse(s).map(Some),
        _ => Ok(None),
    }
}

fn tokenize(expr: &str) -> Result<Vec<(usize, Token)>> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        match ch {
            c if c.is_whitespace() => {}
            '(' => tokens.push((i, Token::LParen)),
            ')' => tokens.push((i, Token::RParen)),
            '!' => tokens.push((i, Token::Not)),
            '&' => match chars.next() {
                Some((_, '&')) => tokens.push((i, Token::And)),
                _ => return Err(syntax(expr, i, "expected '&&'")),
            },
            '|' => match chars.next() {
                Some((_, '|')) => tokens.push((i, Token::Or)),
                _ => return Err(syntax(expr, i, "expected '||'")),
            },
            c if is_name_char(c) => {
                let mut end = i + c.len_utf8();
                while let Some(&(j, next)) = chars.peek() {
                    if is_name_char(next) || next == '.' {
                        end = j + next.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push((i, Token::Name(expr[i..end].to_string())));
            }
            other => {
                return Err(syntax(expr, i, &format!("unexpected character '{other}'")));
            }
        }
    }

    Ok(tokens)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

struct Parser<'a> {
    expr: &'a str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser<'_> {
    fn parse_or(&mut self) -> Result<Predicate> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::Or) {
            let right = self.parse_and()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Predicate> {
        let mut left = self.parse_unary()?;
        while self.eat(&Token::And) {
            let right = self.parse_unary()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Predicate> {
        if self.eat(&Token::Not) {
            let inner = self.parse_unary()?;
            return Ok(Predicate::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Predicate> {
        let Some((offset, token)) = self.tokens.get(self.pos).cloned() else {
            return Err(syntax(self.expr, self.expr.len(), "unexpected end of expression"));
        };
        self.pos += 1;

        match token {
            Token::Name(name) => atom(self.expr, offset, &name),
            Token::LParen => {
                let inner = self.parse_or()?;
                if !self.eat(&Token::RParen) {
                    let at = self
                        .tokens
                        .get(self.pos)
                        .map(|(o, _)| *o)
                        .unwrap_or(self.expr.len());
                    return Err(syntax(self.expr, at, "expected ')'"));
                }
                Ok(inner)
            }
            other => Err(syntax(
                self.expr,
                offset,
                &format!("expected a task name or '(', found {other:?}"),
            )),
        }
    }

    fn eat(&mut self, expected: &Token) -> bool {
        match self.tokens.get(self.pos) {
            Some((_, token)) if token == expected => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }
}

fn atom(expr: &str, offset: usize, raw: &str) -> Result<Predicate> {
    let (task, condition) = match raw.split_once('.') {
        None => (raw, TaskCondition::Succeeded),
        Some((task, suffix)) => {
            let condition = TaskCondition::from_suffix(suffix).ok_or_else(|| {
                syntax(
                    expr,
                    offset,
                    &format!(
                        "unknown task condition '{suffix}'; expected Succeeded, Failed, Skipped or Completed"
                    ),
                )
            })?;
            (task, condition)
        }
    };

    if task.is_empty() {
        return Err(syntax(expr, offset, "empty task name"));
    }

    Ok(Predicate::Atom {
        task: task.to_string(),
        condition,
    })
}

fn syntax(expr: &str, position: usize, message: &str) -> DagweaveError {
    DagweaveError::DependencySyntax {
        expression: expr.to_string(),
        position,
        message: message.to_string(),
    }
}
