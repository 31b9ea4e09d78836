//! Tokenizer for the script dialect.

use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    /// Identifiers and keywords alike; the parser tells them apart.
    Ident(String),
    Sym(&'static str),
    Eof,
}

/// Longest symbols first so that `===` is never read as `==` `=`.
const SYMBOLS: &[&str] = &[
    "===", "!==",
    "=>", "==", "!=", "<=", ">=", "&&", "||", "+=", "-=", "*=",
    "(", ")", "{", "}", "[", "]", ";", ",", ".", ":", "?",
    "+", "-", "*", "/", "%", "<", ">", "=", "!",
];

/// A token and the byte offset where it starts.
#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, CompileError> {
    let mut lexer = Lexer { src: source, pos: 0, out: Vec::new() };
    lexer.run()?;
    Ok(lexer.out)
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    out: Vec<Spanned>,
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> CompileError {
        CompileError::Syntax { offset, message: message.into() }
    }

    fn push(&mut self, token: Token, offset: usize) {
        self.out.push(Spanned { token, offset });
    }

    fn run(&mut self) -> Result<(), CompileError> {
        loop {
            self.skip_trivia()?;
            let start = self.pos;
            let Some(c) = self.peek() else {
                self.push(Token::Eof, start);
                return Ok(());
            };

            if c.is_ascii_digit() || (c == '.' && self.rest()[1..].starts_with(|d: char| d.is_ascii_digit())) {
                let token = self.number()?;
                self.push(token, start);
            } else if c == '"' || c == '\'' {
                let token = self.string(c)?;
                self.push(token, start);
            } else if c.is_alphabetic() || c == '_' || c == '$' {
                while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$') {
                    self.bump();
                }
                let ident = self.src[start..self.pos].to_owned();
                self.push(Token::Ident(ident), start);
            } else if let Some(sym) = SYMBOLS.iter().find(|s| self.rest().starts_with(**s)) {
                self.pos += sym.len();
                self.push(Token::Sym(*sym), start);
            } else {
                return Err(self.error(start, format!("unexpected character {:?}", c)));
            }
        }
    }

    fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            let rest = self.rest();
            if rest.starts_with("//") {
                let end = rest.find('\n').unwrap_or(rest.len());
                self.pos += end;
            } else if rest.starts_with("/*") {
                let Some(end) = rest[2..].find("*/") else {
                    return Err(self.error(self.pos, "unterminated comment"));
                };
                self.pos += end + 4;
            } else if self.peek().is_some_and(char::is_whitespace) {
                self.bump();
            } else {
                return Ok(());
            }
        }
    }

    fn number(&mut self) -> Result<Token, CompileError> {
        let start = self.pos;
        let mut is_float = false;

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') {
            is_float = true;
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(self.error(start, "malformed exponent"));
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }

        let text = &self.src[start..self.pos];
        if !is_float {
            if let Ok(v) = text.parse::<i64>() {
                return Ok(Token::Int(v));
            }
        }
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| self.error(start, format!("malformed number {:?}", text)))
    }

    fn string(&mut self, quote: char) -> Result<Token, CompileError> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();

        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error(start, "unterminated string")),
                Some(c) if c == quote => return Ok(Token::Str(out)),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some(c) => out.push(c),
                    None => return Err(self.error(start, "unterminated string")),
                },
                Some(c) => out.push(c),
            }
        }
    }
}
