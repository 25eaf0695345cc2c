/// Recursive-descent parser for TQL.
///
/// ```text
/// statement := INSERT INTO entity SELECT field (',' field)* EOF
/// field     := expr [AS path]
/// expr      := sum [cmp sum]
/// sum       := product (('+' | '-') product)*
/// product   := unary (('*' | '/') unary)*
/// unary     := '-' unary | primary
/// primary   := number | string | '(' expr ')' | ident ('.' ident)+
/// path      := ident ('.' ident)*
/// entity    := ident | integer
/// ```
use std::fmt;

use twin_value::{ArithOp, Node};

use crate::ast::*;
use crate::lexer::{LexError, Lexer, SpannedToken, Token};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        Self {
            line: e.line,
            col: e.col,
            message: e.message,
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

pub struct Parser {
    tokens: Vec<SpannedToken>,
    pos: usize,
}

impl Parser {
    /// Parse a complete `insert into ... select ...` statement.
    pub fn parse(input: &str) -> Result<Statement, ParseError> {
        let mut parser = Self::new(input)?;
        parser.parse_statement()
    }

    fn new(input: &str) -> Result<Self, ParseError> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self { tokens, pos: 0 })
    }

    // -- Helpers --

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn current_span(&self) -> (usize, usize) {
        let t = &self.tokens[self.pos];
        (t.line, t.col)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error_here(&self, message: String) -> ParseError {
        let (line, col) = self.current_span();
        ParseError { line, col, message }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(format!("expected {expected}, got {}", self.peek())))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Ident(s) => {
                self.advance();
                Ok(s)
            }
            other => Err(self.error_here(format!("expected identifier, got {other}"))),
        }
    }

    /// An identifier, or a plain integer for array indices and all-digit
    /// entity ids.
    fn expect_segment(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Integer(n) => {
                self.advance();
                Ok(n.to_string())
            }
            _ => self.expect_ident(),
        }
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    // -- Statement --

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        self.expect(&Token::Insert)?;
        self.expect(&Token::Into)?;
        let target = self.expect_segment()?;
        self.expect(&Token::Select)?;

        if self.at(&Token::Eof) {
            return Err(self.error_here("expected at least one select field".to_string()));
        }

        let mut fields = vec![self.parse_field()?];
        while self.eat(&Token::Comma) {
            fields.push(self.parse_field()?);
        }
        self.expect(&Token::Eof)?;

        Ok(Statement { target, fields })
    }

    fn parse_field(&mut self) -> Result<SelectField, ParseError> {
        let (line, col) = self.current_span();
        let expr = self.parse_expr()?;
        let alias = if self.eat(&Token::As) {
            Some(self.parse_path()?)
        } else {
            None
        };
        Ok(SelectField {
            expr,
            alias,
            line,
            col,
        })
    }

    fn parse_path(&mut self) -> Result<String, ParseError> {
        let mut segments = vec![self.expect_ident()?];
        while self.eat(&Token::Dot) {
            segments.push(self.expect_segment()?);
        }
        Ok(segments.join("."))
    }

    // -- Expressions --

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_sum()?;
        let op = match self.peek() {
            Token::Eq => CmpOp::Eq,
            Token::NotEq => CmpOp::Ne,
            Token::Gt => CmpOp::Gt,
            Token::Lt => CmpOp::Lt,
            Token::GtEq => CmpOp::Ge,
            Token::LtEq => CmpOp::Le,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_sum()?;
        Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_sum(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_product()?;
        loop {
            let op = match self.peek() {
                Token::Plus => ArithOp::Add,
                Token::Minus => ArithOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_product()?;
            lhs = Expr::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_product(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => ArithOp::Mul,
                Token::Slash => ArithOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Arith {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Token::Integer(n) => {
                self.advance();
                Ok(Expr::Literal(Node::Int(n)))
            }
            Token::Float(v) => {
                self.advance();
                Ok(Expr::Literal(Node::Float(v)))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Literal(Node::String(s)))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(entity) => {
                let (line, col) = self.current_span();
                self.advance();
                if !self.eat(&Token::Dot) {
                    return Err(ParseError {
                        line,
                        col,
                        message: format!(
                            "field reference '{entity}' must be qualified as entity.property"
                        ),
                    });
                }
                let mut segments = vec![self.expect_segment()?];
                while self.eat(&Token::Dot) {
                    segments.push(self.expect_segment()?);
                }
                Ok(Expr::Ref(FieldRef {
                    entity,
                    path: segments.join("."),
                }))
            }
            other => Err(self.error_here(format!("expected expression, got {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
