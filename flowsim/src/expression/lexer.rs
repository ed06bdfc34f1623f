//! Tokenizer for reference expressions, object/array literals and
//! conditions.

use crate::errors::ExpressionError;

/// A lexical token with its byte span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token kind.
    pub kind: TokenKind,
    /// Start offset (inclusive).
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
}

/// Token kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or path segment.
    Ident(String),
    /// Numeric literal with its source text.
    Number(f64, String),
    /// Quoted string literal, unescaped.
    Str(String),
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `!`
    Not,
    /// `==` or `===`
    Eq,
    /// `!=` or `!==`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    And,
    /// `||`
    Or,
    /// End of input.
    Eof,
}

/// Splits an expression into tokens.
pub struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer over `src`.
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().collect(),
            pos: 0,
        }
    }

    /// Tokenizes the whole input. The last token is always `Eof`.
    ///
    /// # Errors
    ///
    /// Returns a parse error on unexpected characters or unterminated strings.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ExpressionError> {
        let mut tokens: Vec<Token> = Vec::new();

        loop {
            self.skip_whitespace();
            let start = self.offset();
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    start,
                    end: start,
                });
                return Ok(tokens);
            };

            // A segment after `.` is an integer index, never a decimal.
            let after_dot = matches!(tokens.last(), Some(t) if t.kind == TokenKind::Dot);

            let kind = match c {
                '.' => self.single(TokenKind::Dot),
                ',' => self.single(TokenKind::Comma),
                ':' => self.single(TokenKind::Colon),
                '(' => self.single(TokenKind::LParen),
                ')' => self.single(TokenKind::RParen),
                '[' => self.single(TokenKind::LBracket),
                ']' => self.single(TokenKind::RBracket),
                '{' => self.single(TokenKind::LBrace),
                '}' => self.single(TokenKind::RBrace),
                '"' | '\'' => self.string(c)?,
                '=' => self.equals(start)?,
                '!' => {
                    self.advance();
                    if self.eat('=') {
                        self.eat('=');
                        TokenKind::Ne
                    } else {
                        TokenKind::Not
                    }
                }
                '<' => {
                    self.advance();
                    if self.eat('=') {
                        TokenKind::Le
                    } else {
                        TokenKind::Lt
                    }
                }
                '>' => {
                    self.advance();
                    if self.eat('=') {
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                '&' => self.pair('&', TokenKind::And, start)?,
                '|' => self.pair('|', TokenKind::Or, start)?,
                c if c.is_ascii_digit() => self.number(after_dot)?,
                '-' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.number(false)?,
                c if is_ident_start(c) => self.ident(),
                other => {
                    return Err(ExpressionError::parse(
                        start,
                        format!("unexpected character '{other}'"),
                    ))
                }
            };

            tokens.push(Token {
                kind,
                start,
                end: self.offset(),
            });
        }
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map_or(self.src.len(), |(offset, _)| *offset)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|(_, c)| *c)
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).map(|(_, c)| *c)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn equals(&mut self, start: usize) -> Result<TokenKind, ExpressionError> {
        self.advance();
        if !self.eat('=') {
            return Err(ExpressionError::parse(start, "expected '=='"));
        }
        self.eat('=');
        Ok(TokenKind::Eq)
    }

    fn pair(&mut self, c: char, kind: TokenKind, start: usize) -> Result<TokenKind, ExpressionError> {
        self.advance();
        if self.eat(c) {
            Ok(kind)
        } else {
            Err(ExpressionError::parse(start, format!("expected '{c}{c}'")))
        }
    }

    fn string(&mut self, quote: char) -> Result<TokenKind, ExpressionError> {
        let start = self.offset();
        self.advance();
        let mut out = String::new();

        loop {
            match self.advance() {
                None => return Err(ExpressionError::parse(start, "unterminated string")),
                Some(c) if c == quote => return Ok(TokenKind::Str(out)),
                Some('\\') => match self.advance() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(other) => out.push(other),
                    None => return Err(ExpressionError::parse(start, "unterminated escape")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn number(&mut self, integer_only: bool) -> Result<TokenKind, ExpressionError> {
        let start = self.offset();
        if self.peek() == Some('-') {
            self.advance();
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if !integer_only
            && self.peek() == Some('.')
            && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())
        {
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if !integer_only && matches!(self.peek(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1 + sign;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            }
        }

        let raw = &self.src[start..self.offset()];
        raw.parse::<f64>()
            .map(|value| TokenKind::Number(value, raw.to_string()))
            .map_err(|_| ExpressionError::parse(start, format!("invalid number '{raw}'")))
    }

    fn ident(&mut self) -> TokenKind {
        let start = self.offset();
        while self.peek().is_some_and(is_ident_continue) {
            self.advance();
        }
        TokenKind::Ident(self.src[start..self.offset()].to_string())
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '-'
}
