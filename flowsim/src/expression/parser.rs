//! Recursive descent parser for reference expressions.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! expr       := or
//! or         := and ( "||" and )*
//! and        := comparison ( "&&" comparison )*
//! comparison := unary ( ( "==" | "!=" | "<" | "<=" | ">" | ">=" ) unary )?
//! unary      := "!" unary | primary
//! primary    := literal | path | object | array | "(" expr ")"
//! path       := ident ( "." ( ident | int ) | "[" ( int | string ) "]" )*
//! object     := "{" ( key ":" value ( "," key ":" value )* ","? )? "}"
//! value      := expr | bare text up to the next top-level "," or "}"
//! array      := "[" ( expr ( "," expr )* ","? )? "]"
//! ```

use super::ast::{classify_path, BinaryOp, Expr, PathSegment};
use super::lexer::{Lexer, Token, TokenKind};
use crate::errors::ExpressionError;
use serde_json::{Number, Value};

/// Parses expression text into an [`Expr`].
pub struct ExprParser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl<'a> ExprParser<'a> {
    /// Parses `input` completely.
    ///
    /// # Errors
    ///
    /// Returns a parse error if the text is not a single well-formed
    /// expression.
    pub fn parse_str(input: &'a str) -> Result<Expr, ExpressionError> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut parser = Self {
            src: input,
            tokens,
            position: 0,
        };
        parser.parse()
    }

    fn parse(&mut self) -> Result<Expr, ExpressionError> {
        if self.check(&TokenKind::Eof) {
            return Err(self.error("empty expression"));
        }
        let expr = self.parse_or()?;
        if !self.check(&TokenKind::Eof) {
            return Err(self.error(&format!("unexpected token {:?}", self.peek().kind)));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.check(&TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_comparison()?;
        while self.check(&TokenKind::And) {
            self.advance();
            let right = self.parse_comparison()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_unary()?;
        let op = match self.peek().kind {
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::Ne => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_unary()?;
        Ok(binary(op, left, right))
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.check(&TokenKind::Not) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let token = self.advance().clone();
        match token.kind {
            TokenKind::Number(value, raw) => Ok(Expr::Literal(number_value(value, &raw))),
            TokenKind::Str(s) => Ok(Expr::Text(s)),
            TokenKind::Ident(name) => self.parse_path(name, token.start),
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                self.expect(&TokenKind::RParen, "expected ')'")?;
                Ok(inner)
            }
            TokenKind::LBrace => self.parse_object(),
            TokenKind::LBracket => self.parse_array(),
            other => Err(ExpressionError::parse(
                token.start,
                format!("unexpected token {other:?}"),
            )),
        }
    }

    fn parse_path(&mut self, head: String, start: usize) -> Result<Expr, ExpressionError> {
        let mut segments = vec![PathSegment::Key(head)];
        let mut end = self.previous_end();

        loop {
            if self.check(&TokenKind::Dot) {
                self.advance();
                let token = self.advance().clone();
                match token.kind {
                    TokenKind::Ident(name) => segments.push(PathSegment::Key(name)),
                    TokenKind::Number(value, raw) => segments.push(index_segment(value, &raw)),
                    _ => return Err(ExpressionError::parse(token.start, "expected path segment")),
                }
            } else if self.check(&TokenKind::LBracket) {
                self.advance();
                let token = self.advance().clone();
                match token.kind {
                    TokenKind::Number(value, raw) => segments.push(index_segment(value, &raw)),
                    TokenKind::Str(key) => segments.push(PathSegment::Key(key)),
                    _ => return Err(ExpressionError::parse(token.start, "expected index or key")),
                }
                self.expect(&TokenKind::RBracket, "expected ']'")?;
            } else {
                break;
            }
            end = self.previous_end();
        }

        let raw = self.src.get(start..end).unwrap_or_default();
        Ok(classify_path(segments, raw))
    }

    fn parse_object(&mut self) -> Result<Expr, ExpressionError> {
        let mut entries = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let token = self.advance().clone();
            let key = match token.kind {
                TokenKind::Ident(k) | TokenKind::Str(k) | TokenKind::Number(_, k) => k,
                _ => return Err(ExpressionError::parse(token.start, "expected object key")),
            };
            self.expect(&TokenKind::Colon, "expected ':' after object key")?;
            let value = self.parse_entry_value()?;
            entries.push((key, value));

            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "expected '}'")?;
        Ok(Expr::Object(entries))
    }

    /// An object value that is not a well-formed expression, such as
    /// `2024-01-01`, is kept as its trimmed source text.
    fn parse_entry_value(&mut self) -> Result<Expr, ExpressionError> {
        let mark = self.position;
        if let Ok(value) = self.parse_or() {
            if self.check(&TokenKind::Comma) || self.check(&TokenKind::RBrace) {
                return Ok(value);
            }
        }
        self.position = mark;
        self.parse_bare_value()
    }

    fn parse_bare_value(&mut self) -> Result<Expr, ExpressionError> {
        let start = self.peek().start;
        let mut depth = 0usize;
        loop {
            match self.peek().kind {
                TokenKind::Eof => break,
                TokenKind::Comma | TokenKind::RBrace if depth == 0 => break,
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1);
                }
                _ => {}
            }
            self.advance();
        }
        let text = self.src.get(start..self.previous_end()).unwrap_or_default().trim();
        if text.is_empty() || depth > 0 {
            return Err(self.error("expected object value"));
        }
        Ok(Expr::Text(text.to_string()))
    }

    fn parse_array(&mut self) -> Result<Expr, ExpressionError> {
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBracket) {
            items.push(self.parse_or()?);
            if self.check(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "expected ']'")?;
        Ok(Expr::Array(items))
    }

    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.position.min(last)]
    }

    fn advance(&mut self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        let index = self.position.min(last);
        self.position += 1;
        &self.tokens[index]
    }

    fn previous_end(&self) -> usize {
        self.position
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.end)
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn expect(&mut self, kind: &TokenKind, message: &str) -> Result<(), ExpressionError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(message))
        }
    }

    fn error(&self, message: &str) -> ExpressionError {
        ExpressionError::parse(self.peek().start, message)
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn index_segment(value: f64, raw: &str) -> PathSegment {
    raw.parse::<usize>()
        .map_or_else(|_| PathSegment::Key(format!("{value}")), PathSegment::Index)
}

/// Integers stay integers so `5` round-trips as `5`, not `5.0`.
fn number_value(value: f64, raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::from(int);
    }
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}
