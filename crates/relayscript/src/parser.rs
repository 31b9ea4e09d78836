//! Recursive-descent parser for the script dialect.
//!
//! Every level of nesting, including each link of a left-associative operator
//! chain, counts against the depth budget. The evaluator walks the tree
//! recursively, so a bounded tree means a bounded evaluation stack.

use relaypack::Value;

use crate::ast::BinOp;
use crate::ast::Body;
use crate::ast::Expr;
use crate::ast::FunctionDef;
use crate::ast::LogicOp;
use crate::ast::Stmt;
use crate::ast::UnOp;
use crate::error::CompileError;
use crate::eval::number;
use crate::lexer::Spanned;
use crate::lexer::Token;

type Result<T> = std::result::Result<T, CompileError>;

const KEYWORDS: &[&str] = &[
    "async", "await", "const", "else", "false", "function", "if", "let", "new",
    "null", "return", "throw", "true", "typeof", "undefined", "var",
];

const ERROR_CONSTRUCTORS: &[&str] = &["Error", "TypeError", "RangeError"];

/// Parses a whole program, which must be exactly one function literal.
pub fn parse_program(tokens: Vec<Spanned>, max_depth: usize) -> Result<FunctionDef> {
    let mut p = Parser { tokens, pos: 0, depth: 0, max_depth };

    if let Some(def) = p.try_function()? {
        p.eat_sym(";");
        p.expect_eof()?;
        return Ok(def);
    }

    // Not a function literal; report a syntax error if it is not even an expression.
    let expr = p.expression()?;
    p.eat_sym(";");
    p.expect_eof()?;
    Err(CompileError::NotAFunction(describe(&expr)))
}

fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Lit(Value::String(_)) => "a string".into(),
        Expr::Lit(Value::Int(_) | Value::Float(_)) => "a number".into(),
        Expr::Lit(Value::Bool(_)) => "a boolean".into(),
        Expr::Lit(Value::Unit) => "undefined".into(),
        Expr::Ident(name) => format!("identifier `{}`", name),
        Expr::Array(_) => "an array".into(),
        Expr::Object(_) => "an object".into(),
        _ => "an expression".into(),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl Parser {
    // ------------------------------------------------------------------------
    //  Cursor
    // ------------------------------------------------------------------------

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).map(|s| &s.token).unwrap_or(&Token::Eof)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).or(self.tokens.last()).map(|s| s.offset).unwrap_or(0)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T> {
        Err(CompileError::Syntax { offset: self.offset(), message: message.into() })
    }

    fn peek_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Token::Sym(s) if *s == sym)
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if self.peek_sym(sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: &str) -> Result<()> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            self.error(format!("expected `{}`, found {}", sym, show(self.peek())))
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s == keyword)
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_eof(&self) -> Result<()> {
        match self.peek() {
            Token::Eof => Ok(()),
            other => self.error(format!("unexpected {} after the function", show(other))),
        }
    }

    /// Consumes a non-keyword identifier.
    fn ident(&mut self) -> Result<String> {
        match self.peek() {
            Token::Ident(name) if !KEYWORDS.contains(&name.as_str()) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            other => self.error(format!("expected an identifier, found {}", show(other))),
        }
    }

    fn peek_ident(&self) -> Option<&str> {
        match self.peek() {
            Token::Ident(name) if !KEYWORDS.contains(&name.as_str()) => Some(name),
            _ => None,
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(CompileError::TooDeep(self.max_depth));
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    // ------------------------------------------------------------------------
    //  Functions
    // ------------------------------------------------------------------------

    /// Parses a function literal if one starts here, otherwise rewinds and returns `None`.
    fn try_function(&mut self) -> Result<Option<FunctionDef>> {
        let start = self.pos;
        self.enter()?;
        let def = self.try_function_inner(start)?;
        self.leave(1);
        if def.is_none() {
            self.pos = start;
        }
        Ok(def)
    }

    fn try_function_inner(&mut self, start: usize) -> Result<Option<FunctionDef>> {
        self.eat_keyword("async");

        if self.eat_keyword("function") {
            let name = self.peek_ident().map(str::to_owned);
            if name.is_some() {
                self.pos += 1;
            }
            let params = self.params()?;
            let body = Body::Block(self.block()?);
            return Ok(Some(FunctionDef { name, params, body }));
        }

        // `x => ...`
        if self.peek_ident().is_some() && matches!(self.peek_at(1), Token::Sym("=>")) {
            let params = vec![self.ident()?];
            self.expect_sym("=>")?;
            let body = self.arrow_body()?;
            return Ok(Some(FunctionDef { name: None, params, body }));
        }

        if self.peek_sym("(") {
            // `(a, b) => ...`
            let before = self.pos;
            if let Some(params) = self.try_arrow_params() {
                if self.eat_sym("=>") {
                    let body = self.arrow_body()?;
                    return Ok(Some(FunctionDef { name: None, params, body }));
                }
            }

            // `(function () { ... })`
            self.pos = before;
            if self.pos == start {
                self.pos += 1;
                if let Some(def) = self.try_function()? {
                    if self.eat_sym(")") {
                        return Ok(Some(def));
                    }
                }
            }
        }

        Ok(None)
    }

    fn try_arrow_params(&mut self) -> Option<Vec<String>> {
        let before = self.pos;
        let params = self.params().ok();
        if params.is_none() {
            self.pos = before;
        }
        params
    }

    fn params(&mut self) -> Result<Vec<String>> {
        self.expect_sym("(")?;
        let mut params = Vec::new();
        while !self.peek_sym(")") {
            params.push(self.ident()?);
            if !self.eat_sym(",") {
                break;
            }
        }
        self.expect_sym(")")?;
        Ok(params)
    }

    fn arrow_body(&mut self) -> Result<Body> {
        if self.peek_sym("{") {
            Ok(Body::Block(self.block()?))
        } else {
            Ok(Body::Expr(self.assignment()?))
        }
    }

    // ------------------------------------------------------------------------
    //  Statements
    // ------------------------------------------------------------------------

    fn block(&mut self) -> Result<Vec<Stmt>> {
        self.expect_sym("{")?;
        let mut stmts = Vec::new();
        loop {
            if self.eat_sym("}") {
                return Ok(stmts);
            }
            if matches!(self.peek(), Token::Eof) {
                return self.error("unterminated block");
            }
            stmts.push(self.statement()?);
        }
    }

    fn statement(&mut self) -> Result<Stmt> {
        self.enter()?;
        let stmt = self.statement_inner()?;
        self.leave(1);
        Ok(stmt)
    }

    fn statement_inner(&mut self) -> Result<Stmt> {
        if self.peek_sym("{") {
            return Ok(Stmt::Block(self.block()?));
        }
        if self.eat_sym(";") {
            return Ok(Stmt::Block(Vec::new()));
        }

        if self.eat_keyword("let") || self.eat_keyword("const") || self.eat_keyword("var") {
            let name = self.ident()?;
            let init = if self.eat_sym("=") { Some(self.expression()?) } else { None };
            self.eat_sym(";");
            return Ok(Stmt::Let(name, init));
        }

        if self.eat_keyword("return") {
            let value = if self.peek_sym(";") || self.peek_sym("}") || matches!(self.peek(), Token::Eof) {
                None
            } else {
                Some(self.expression()?)
            };
            self.eat_sym(";");
            return Ok(Stmt::Return(value));
        }

        if self.eat_keyword("if") {
            self.expect_sym("(")?;
            let cond = self.expression()?;
            self.expect_sym(")")?;
            let then = Box::new(self.statement()?);
            let otherwise = if self.eat_keyword("else") { Some(Box::new(self.statement()?)) } else { None };
            return Ok(Stmt::If(cond, then, otherwise));
        }

        if self.eat_keyword("throw") {
            let value = self.expression()?;
            self.eat_sym(";");
            return Ok(Stmt::Throw(value));
        }

        let expr = self.expression()?;
        self.eat_sym(";");
        Ok(Stmt::Expr(expr))
    }

    // ------------------------------------------------------------------------
    //  Expressions
    // ------------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr> {
        self.enter()?;
        let expr = self.assignment()?;
        self.leave(1);
        Ok(expr)
    }

    fn assignment(&mut self) -> Result<Expr> {
        if let Some(name) = self.peek_ident() {
            let op = match self.peek_at(1) {
                Token::Sym("=") => Some(None),
                Token::Sym("+=") => Some(Some(BinOp::Add)),
                Token::Sym("-=") => Some(Some(BinOp::Sub)),
                Token::Sym("*=") => Some(Some(BinOp::Mul)),
                _ => None,
            };
            if let Some(op) = op {
                let name = name.to_owned();
                self.pos += 2;
                self.enter()?;
                let rhs = self.assignment()?;
                self.leave(1);
                let value = match op {
                    None => rhs,
                    Some(op) => Expr::Binary(op, Box::new(Expr::Ident(name.clone())), Box::new(rhs)),
                };
                return Ok(Expr::Assign(name, Box::new(value)));
            }
        }

        let expr = self.conditional()?;
        if self.peek_sym("=") {
            return self.error("invalid assignment target");
        }
        Ok(expr)
    }

    fn conditional(&mut self) -> Result<Expr> {
        let cond = self.logical_or()?;
        if !self.eat_sym("?") {
            return Ok(cond);
        }
        self.enter()?;
        let then = self.assignment()?;
        self.expect_sym(":")?;
        let otherwise = self.assignment()?;
        self.leave(1);
        Ok(Expr::Cond(Box::new(cond), Box::new(then), Box::new(otherwise)))
    }

    fn logical_or(&mut self) -> Result<Expr> {
        let mut lhs = self.logical_and()?;
        let mut levels = 0;
        while self.eat_sym("||") {
            self.enter()?;
            levels += 1;
            let rhs = self.logical_and()?;
            lhs = Expr::Logical(LogicOp::Or, Box::new(lhs), Box::new(rhs));
        }
        self.leave(levels);
        Ok(lhs)
    }

    fn logical_and(&mut self) -> Result<Expr> {
        let mut lhs = self.binary(0)?;
        let mut levels = 0;
        while self.eat_sym("&&") {
            self.enter()?;
            levels += 1;
            let rhs = self.binary(0)?;
            lhs = Expr::Logical(LogicOp::And, Box::new(lhs), Box::new(rhs));
        }
        self.leave(levels);
        Ok(lhs)
    }

    /// Precedence climbing over the binary operator table, loosest first.
    fn binary(&mut self, level: usize) -> Result<Expr> {
        const LEVELS: &[&[(&str, BinOp)]] = &[
            &[("===", BinOp::Eq), ("!==", BinOp::Ne), ("==", BinOp::Eq), ("!=", BinOp::Ne)],
            &[("<=", BinOp::Le), (">=", BinOp::Ge), ("<", BinOp::Lt), (">", BinOp::Gt)],
            &[("+", BinOp::Add), ("-", BinOp::Sub)],
            &[("*", BinOp::Mul), ("/", BinOp::Div), ("%", BinOp::Rem)],
        ];

        let Some(ops) = LEVELS.get(level) else {
            return self.unary();
        };

        let mut lhs = self.binary(level + 1)?;
        let mut levels = 0;
        loop {
            let Some(&(_, op)) = ops.iter().find(|(sym, _)| self.peek_sym(sym)) else { break };
            self.pos += 1;
            self.enter()?;
            levels += 1;
            let rhs = self.binary(level + 1)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        self.leave(levels);
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = if self.eat_sym("!") {
            Some(UnOp::Not)
        } else if self.eat_sym("-") {
            Some(UnOp::Neg)
        } else if self.eat_sym("+") {
            Some(UnOp::Plus)
        } else if self.eat_keyword("typeof") {
            Some(UnOp::TypeOf)
        } else {
            None
        };

        let is_await = op.is_none() && self.eat_keyword("await");
        if op.is_none() && !is_await {
            return self.postfix();
        }

        self.enter()?;
        let operand = self.unary()?;
        self.leave(1);
        Ok(match op {
            Some(op) => Expr::Unary(op, Box::new(operand)),
            None => Expr::Await(Box::new(operand)),
        })
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        let mut levels = 0;
        loop {
            if self.eat_sym(".") {
                self.enter()?;
                levels += 1;
                let key = match self.advance() {
                    Token::Ident(name) => name,
                    other => return self.error(format!("expected a property name, found {}", show(&other))),
                };
                expr = Expr::Member(Box::new(expr), Box::new(Expr::Lit(Value::String(key))));
            } else if self.eat_sym("[") {
                self.enter()?;
                levels += 1;
                let key = self.expression()?;
                self.expect_sym("]")?;
                expr = Expr::Member(Box::new(expr), Box::new(key));
            } else if self.peek_sym("(") {
                self.enter()?;
                levels += 1;
                let args = self.arguments()?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                break;
            }
        }
        self.leave(levels);
        Ok(expr)
    }

    fn arguments(&mut self) -> Result<Vec<Expr>> {
        self.expect_sym("(")?;
        let mut args = Vec::new();
        while !self.peek_sym(")") {
            args.push(self.expression()?);
            if !self.eat_sym(",") {
                break;
            }
        }
        self.expect_sym(")")?;
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Int(v) => Ok(Expr::Lit(Value::Int(v))),
            Token::Float(v) => Ok(Expr::Lit(number(v))),
            Token::Str(s) => Ok(Expr::Lit(Value::String(s))),
            Token::Ident(word) => {
                match word.as_str() {
                    "true" => return Ok(Expr::Lit(Value::Bool(true))),
                    "false" => return Ok(Expr::Lit(Value::Bool(false))),
                    "null" | "undefined" => return Ok(Expr::Lit(Value::Unit)),
                    "new" => return self.new_error(),
                    "function" | "async" => {
                        return self.error("function literals are only allowed at the top level");
                    }
                    w if KEYWORDS.contains(&w) => return self.error(format!("unexpected keyword `{}`", w)),
                    _ => {}
                }
                if ERROR_CONSTRUCTORS.contains(&word.as_str()) && self.peek_sym("(") {
                    let args = self.arguments()?;
                    return Ok(Expr::NewError(word, args));
                }
                Ok(Expr::Ident(word))
            }
            Token::Sym("(") => {
                let expr = self.expression()?;
                self.expect_sym(")")?;
                Ok(expr)
            }
            Token::Sym("[") => {
                let mut items = Vec::new();
                while !self.peek_sym("]") {
                    items.push(self.expression()?);
                    if !self.eat_sym(",") {
                        break;
                    }
                }
                self.expect_sym("]")?;
                Ok(Expr::Array(items))
            }
            Token::Sym("{") => self.object(),
            other => {
                // Point the error at the offending token, not the one after it.
                self.pos = self.pos.saturating_sub(1);
                self.error(format!("unexpected {}", show(&other)))
            }
        }
    }

    fn object(&mut self) -> Result<Expr> {
        let mut props = Vec::new();
        while !self.peek_sym("}") {
            let key = match self.advance() {
                Token::Ident(name) => name,
                Token::Str(s) => s,
                Token::Int(v) => v.to_string(),
                other => return self.error(format!("expected a property key, found {}", show(&other))),
            };
            let value = if self.eat_sym(":") {
                self.expression()?
            } else {
                Expr::Ident(key.clone())
            };
            props.push((key, value));
            if !self.eat_sym(",") {
                break;
            }
        }
        self.expect_sym("}")?;
        Ok(Expr::Object(props))
    }

    fn new_error(&mut self) -> Result<Expr> {
        let name = self.ident()?;
        if !ERROR_CONSTRUCTORS.contains(&name.as_str()) {
            return self.error(format!("`new` is only supported for error types, not `{}`", name));
        }
        let args = if self.peek_sym("(") { self.arguments()? } else { Vec::new() };
        Ok(Expr::NewError(name, args))
    }
}

fn show(token: &Token) -> String {
    match token {
        Token::Int(v) => format!("number {}", v),
        Token::Float(v) => format!("number {}", v),
        Token::Str(s) => format!("string {:?}", s),
        Token::Ident(name) => format!("`{}`", name),
        Token::Sym(sym) => format!("`{}`", sym),
        Token::Eof => "end of input".into(),
    }
}
