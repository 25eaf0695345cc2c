/// Lexer for TQL.
///
/// Identifiers may begin with a digit and contain interior hyphens so that
/// UUID entity ids (`7ffed0dc-3ed5-4137-9c16-a2c9c74e0bf6`) lex as a single
/// token. A hyphen only joins a word that does not follow a `.` and only when
/// another identifier character follows it. Property segments therefore stop
/// at `-`, so `a.x-1`, `a.x - b.y` and `a.x-b.y` all lex as subtraction.
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords (case-insensitive)
    Insert,
    Into,
    Select,
    As,

    // Literals
    Ident(String),
    Integer(i64),
    Float(f64),
    Str(String),

    // Punctuation and operators
    Dot,
    Comma,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,

    // Special
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Insert => write!(f, "insert"),
            Token::Into => write!(f, "into"),
            Token::Select => write!(f, "select"),
            Token::As => write!(f, "as"),
            Token::Ident(s) => write!(f, "{s}"),
            Token::Integer(n) => write!(f, "{n}"),
            Token::Float(v) => write!(f, "{v}"),
            Token::Str(s) => write!(f, "'{s}'"),
            Token::Dot => write!(f, "."),
            Token::Comma => write!(f, ","),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Eq => write!(f, "="),
            Token::NotEq => write!(f, "!="),
            Token::Gt => write!(f, ">"),
            Token::Lt => write!(f, "<"),
            Token::GtEq => write!(f, ">="),
            Token::LtEq => write!(f, "<="),
            Token::Eof => write!(f, "EOF"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub line: usize,
    pub col: usize,
}

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    col: usize,
    after_dot: bool,
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
            after_dot: false,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<SpannedToken>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            self.after_dot = tok.token == Token::Dot;
            let is_eof = tok.token == Token::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_byte_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.input.get(self.pos).copied()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(b)
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek_byte() {
            if b.is_ascii_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, line: usize, col: usize, message: impl Into<String>) -> LexError {
        LexError {
            line,
            col,
            message: message.into(),
        }
    }

    fn next_token(&mut self) -> Result<SpannedToken, LexError> {
        self.skip_whitespace();

        let line = self.line;
        let col = self.col;

        let Some(b) = self.peek_byte() else {
            return Ok(SpannedToken {
                token: Token::Eof,
                line,
                col,
            });
        };

        // Two-byte operators
        let pair = match (b, self.peek_byte_at(1)) {
            (b'!', Some(b'=')) | (b'<', Some(b'>')) => Some(Token::NotEq),
            (b'>', Some(b'=')) => Some(Token::GtEq),
            (b'<', Some(b'=')) => Some(Token::LtEq),
            (b'=', Some(b'=')) => Some(Token::Eq),
            _ => None,
        };
        if let Some(token) = pair {
            self.advance();
            self.advance();
            return Ok(SpannedToken { token, line, col });
        }

        let single = match b {
            b'.' => Some(Token::Dot),
            b',' => Some(Token::Comma),
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b'+' => Some(Token::Plus),
            b'-' => Some(Token::Minus),
            b'*' => Some(Token::Star),
            b'/' => Some(Token::Slash),
            b'=' => Some(Token::Eq),
            b'>' => Some(Token::Gt),
            b'<' => Some(Token::Lt),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(SpannedToken { token, line, col });
        }

        if b == b'\'' || b == b'"' {
            let token = self.lex_string(b, line, col)?;
            return Ok(SpannedToken { token, line, col });
        }

        if is_ident_byte(b) {
            let token = self.lex_word(line, col)?;
            return Ok(SpannedToken { token, line, col });
        }

        Err(self.error(line, col, format!("unexpected character: '{}'", b as char)))
    }

    fn lex_word(&mut self, line: usize, col: usize) -> Result<Token, LexError> {
        let start = self.pos;
        while let Some(c) = self.peek_byte() {
            let joins_hyphen =
                !self.after_dot && c == b'-' && self.peek_byte_at(1).is_some_and(is_ident_byte);
            if is_ident_byte(c) || joins_hyphen {
                self.advance();
            } else {
                break;
            }
        }
        let word = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error(line, col, "invalid UTF-8 in identifier"))?
            .to_string();

        if word.bytes().all(|c| c.is_ascii_digit()) {
            return self.lex_number(word, line, col);
        }

        let token = match word.to_ascii_lowercase().as_str() {
            "insert" => Token::Insert,
            "into" => Token::Into,
            "select" => Token::Select,
            "as" => Token::As,
            _ => Token::Ident(word),
        };
        Ok(token)
    }

    /// `digits` has been consumed. A following `.digits` makes a float; a
    /// following `.word` means the digits were an entity id.
    fn lex_number(&mut self, digits: String, line: usize, col: usize) -> Result<Token, LexError> {
        if self.peek_byte() == Some(b'.') {
            match self.peek_byte_at(1) {
                Some(d) if d.is_ascii_digit() => {
                    self.advance(); // .
                    let start = self.pos;
                    while let Some(d) = self.peek_byte() {
                        if d.is_ascii_digit() {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                    let fraction = std::str::from_utf8(&self.input[start..self.pos])
                        .map_err(|_| self.error(line, col, "invalid number"))?;
                    let value = format!("{digits}.{fraction}")
                        .parse::<f64>()
                        .map_err(|e| self.error(line, col, format!("invalid number: {e}")))?;
                    return Ok(Token::Float(value));
                }
                Some(c) if is_ident_byte(c) => return Ok(Token::Ident(digits)),
                _ => {}
            }
        }

        digits
            .parse::<i64>()
            .map(Token::Integer)
            .map_err(|e| self.error(line, col, format!("invalid integer {digits}: {e}")))
    }

    fn lex_string(&mut self, quote: u8, line: usize, col: usize) -> Result<Token, LexError> {
        self.advance(); // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.advance() {
                None => return Err(self.error(line, col, "unterminated string literal")),
                Some(b) if b == quote => break,
                Some(b'\\') => match self.advance() {
                    Some(b'n') => bytes.push(b'\n'),
                    Some(b't') => bytes.push(b'\t'),
                    Some(b'r') => bytes.push(b'\r'),
                    Some(other) => bytes.push(other),
                    None => return Err(self.error(line, col, "unterminated string literal")),
                },
                Some(b) => bytes.push(b),
            }
        }
        String::from_utf8(bytes)
            .map(Token::Str)
            .map_err(|_| self.error(line, col, "invalid UTF-8 in string literal"))
    }
}

#[derive(Debug, Clone)]
pub struct LexError {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

impl std::error::Error for LexError {}
