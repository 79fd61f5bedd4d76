//! Recursive-descent parser for the script dialect
//!
//! Statements:
//! ```text
//! local a = 1, b;            return [expr];
//! if (cond) stmt [else stmt] while (cond) stmt
//! foreach ([k,] v in expr) stmt
//! function name(a, b) { }    { stmts }
//! target <- expr;            target = expr;   target += expr;
//! ```
//!
//! Semicolons are optional; a statement also ends at a line break.

use crate::ast::{AssignOp, BinaryOp, Expr, FunctionDef, Literal, Stmt, UnaryOp};
use crate::error::CompileError;
use crate::lexer::{Token, TokenKind, tokenize};
use std::rc::Rc;

const KEYWORDS: &[&str] = &[
    "local", "return", "if", "else", "while", "foreach", "in", "break", "continue", "function",
    "true", "false", "null", "this", "typeof",
];

/// Parse a whole buffer into the body of its main function
pub fn parse(source: &str, name: &str) -> Result<FunctionDef, CompileError> {
    let mut parser = Parser::new(tokenize(source)?);
    let body = parser.parse_statements_until(None)?;
    Ok(FunctionDef {
        name: Some(name.into()),
        params: Vec::new(),
        body,
    })
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn parse_statements_until(&mut self, end: Option<&str>) -> Result<Vec<Stmt>, CompileError> {
        let mut stmts = Vec::new();
        loop {
            match (&self.current().kind, end) {
                (TokenKind::Eof, None) => return Ok(stmts),
                (TokenKind::Eof, Some(p)) => {
                    return Err(self.error_here(format!("expected '{}'", p)));
                }
                (TokenKind::Punct(p), Some(e)) if *p == e => return Ok(stmts),
                _ => stmts.push(self.parse_statement()?),
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, CompileError> {
        if self.eat_punct(";") {
            return Ok(Stmt::Empty);
        }
        if self.check_punct("{") {
            return Ok(Stmt::Block(self.parse_block()?));
        }

        let stmt = if self.eat_keyword("local") {
            self.parse_local()?
        } else if self.eat_keyword("return") {
            if self.is_end_of_statement() {
                Stmt::Return(None)
            } else {
                Stmt::Return(Some(self.parse_expression()?))
            }
        } else if self.eat_keyword("if") {
            return self.parse_if();
        } else if self.eat_keyword("while") {
            self.expect_punct("(")?;
            let cond = self.parse_expression()?;
            self.expect_punct(")")?;
            let body = Box::new(self.parse_statement()?);
            return Ok(Stmt::While { cond, body });
        } else if self.eat_keyword("foreach") {
            return self.parse_foreach();
        } else if self.eat_keyword("break") {
            Stmt::Break
        } else if self.eat_keyword("continue") {
            Stmt::Continue
        } else if self.check_keyword("function") && self.peek_is_ident(1) {
            self.advance();
            let name = self.expect_ident()?;
            let func = self.parse_function_rest(Some(name.clone()))?;
            return Ok(Stmt::Expr(Expr::Assign {
                op: AssignOp::NewSlot,
                target: Box::new(Expr::Ident(name)),
                value: Box::new(Expr::Function(func)),
            }));
        } else {
            Stmt::Expr(self.parse_expression()?)
        };

        self.end_statement()?;
        Ok(stmt)
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, CompileError> {
        self.expect_punct("{")?;
        let stmts = self.parse_statements_until(Some("}"))?;
        self.expect_punct("}")?;
        Ok(stmts)
    }

    fn parse_local(&mut self) -> Result<Stmt, CompileError> {
        let mut bindings = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let init = if self.eat_punct("=") {
                Some(self.parse_expression()?)
            } else {
                None
            };
            bindings.push((name, init));
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(Stmt::Local(bindings))
    }

    fn parse_if(&mut self) -> Result<Stmt, CompileError> {
        self.expect_punct("(")?;
        let cond = self.parse_expression()?;
        self.expect_punct(")")?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.eat_keyword("else") {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_foreach(&mut self) -> Result<Stmt, CompileError> {
        self.expect_punct("(")?;
        let first = self.expect_ident()?;
        let (key, value) = if self.eat_punct(",") {
            (Some(first), self.expect_ident()?)
        } else {
            (None, first)
        };
        if !self.eat_keyword("in") {
            return Err(self.error_here("expected 'in'"));
        }
        let iterable = self.parse_expression()?;
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::Foreach {
            key,
            value,
            iterable,
            body,
        })
    }

    /// Parameter list and body, after `function [name]`
    fn parse_function_rest(&mut self, name: Option<Rc<str>>) -> Result<Rc<FunctionDef>, CompileError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        if !self.check_punct(")") {
            loop {
                params.push(self.expect_ident()?);
                if !self.eat_punct(",") {
                    break;
                }
            }
        }
        self.expect_punct(")")?;
        let body = self.parse_block()?;
        Ok(Rc::new(FunctionDef { name, params, body }))
    }

    // Expressions, lowest precedence first

    fn parse_expression(&mut self) -> Result<Expr, CompileError> {
        let target = self.parse_ternary()?;
        let op = match &self.current().kind {
            TokenKind::Punct("<-") => AssignOp::NewSlot,
            TokenKind::Punct("=") => AssignOp::Set,
            TokenKind::Punct("+=") => AssignOp::AddSet,
            TokenKind::Punct("-=") => AssignOp::SubSet,
            _ => return Ok(target),
        };
        if !matches!(
            target,
            Expr::Ident(_) | Expr::Root(_) | Expr::Member(..) | Expr::Index(..)
        ) {
            return Err(self.error_here("can't assign expression"));
        }
        self.advance();
        let value = self.parse_expression()?;
        Ok(Expr::Assign {
            op,
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_ternary(&mut self) -> Result<Expr, CompileError> {
        let cond = self.parse_or()?;
        if !self.eat_punct("?") {
            return Ok(cond);
        }
        let then_value = self.parse_expression()?;
        self.expect_punct(":")?;
        let else_value = self.parse_expression()?;
        Ok(Expr::Ternary(
            Box::new(cond),
            Box::new(then_value),
            Box::new(else_value),
        ))
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_and()?;
        while self.eat_punct("||") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut left = self.parse_equality()?;
        while self.eat_punct("&&") {
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary_level(
            &[("==", BinaryOp::Eq), ("!=", BinaryOp::Ne)],
            Self::parse_comparison,
        )
    }

    fn parse_comparison(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary_level(
            &[
                ("<", BinaryOp::Lt),
                ("<=", BinaryOp::Le),
                (">", BinaryOp::Gt),
                (">=", BinaryOp::Ge),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary_level(
            &[("+", BinaryOp::Add), ("-", BinaryOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CompileError> {
        self.parse_binary_level(
            &[
                ("*", BinaryOp::Mul),
                ("/", BinaryOp::Div),
                ("%", BinaryOp::Mod),
            ],
            Self::parse_unary,
        )
    }

    /// Left-associative binary operators sharing one precedence level
    fn parse_binary_level(
        &mut self,
        ops: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, CompileError>,
    ) -> Result<Expr, CompileError> {
        let mut left = next(self)?;
        'outer: loop {
            for (symbol, op) in ops {
                if self.eat_punct(symbol) {
                    let right = next(self)?;
                    left = Expr::Binary(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = if self.eat_punct("-") {
            UnaryOp::Neg
        } else if self.eat_punct("!") {
            UnaryOp::Not
        } else if self.eat_keyword("typeof") {
            UnaryOp::TypeOf
        } else {
            return self.parse_postfix();
        };
        let operand = self.parse_unary()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_punct(".") {
                let name = match &self.current().kind {
                    TokenKind::Ident(name) => Rc::from(name.as_str()),
                    _ => return Err(self.error_here("expected identifier after '.'")),
                };
                self.advance();
                expr = Expr::Member(Box::new(expr), name);
            } else if self.eat_punct("[") {
                let index = self.parse_expression()?;
                self.expect_punct("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat_punct("(") {
                let args = self.parse_comma_list(")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else {
                return Ok(expr);
            }
        }
    }

    /// Comma separated expressions up to and including `close`
    fn parse_comma_list(&mut self, close: &str) -> Result<Vec<Expr>, CompileError> {
        let mut items = Vec::new();
        loop {
            if self.eat_punct(close) {
                return Ok(items);
            }
            items.push(self.parse_expression()?);
            if !self.eat_punct(",") {
                self.expect_punct(close)?;
                return Ok(items);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CompileError> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expr::Literal(Literal::Integer(n)))
            }
            TokenKind::Float(f) => {
                self.advance();
                Ok(Expr::Literal(Literal::Float(f)))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(s.into())))
            }
            TokenKind::Punct("(") => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            TokenKind::Punct("::") => {
                self.advance();
                Ok(Expr::Root(self.expect_ident()?))
            }
            TokenKind::Punct("{") => self.parse_table(),
            TokenKind::Punct("[") => {
                self.advance();
                Ok(Expr::Array(self.parse_comma_list("]")?))
            }
            TokenKind::Ident(ref word) => match word.as_str() {
                "null" => {
                    self.advance();
                    Ok(Expr::Literal(Literal::Null))
                }
                "true" | "false" => {
                    self.advance();
                    Ok(Expr::Literal(Literal::Bool(word == "true")))
                }
                "this" => {
                    self.advance();
                    Ok(Expr::This)
                }
                "function" => {
                    self.advance();
                    Ok(Expr::Function(self.parse_function_rest(None)?))
                }
                _ if KEYWORDS.contains(&word.as_str()) => {
                    Err(self.error_here(format!("unexpected keyword '{}'", word)))
                }
                _ => {
                    self.advance();
                    Ok(Expr::Ident(word.as_str().into()))
                }
            },
            _ => Err(self.error_here("expression expected")),
        }
    }

    /// `{ key = value, [expr] = value, "json": value, function name() {} }`
    fn parse_table(&mut self) -> Result<Expr, CompileError> {
        self.expect_punct("{")?;
        let mut entries = Vec::new();
        while !self.eat_punct("}") {
            let token = self.current().clone();
            let (key, value) = match token.kind {
                TokenKind::Punct("[") => {
                    self.advance();
                    let key = self.parse_expression()?;
                    self.expect_punct("]")?;
                    self.expect_punct("=")?;
                    (key, self.parse_expression()?)
                }
                TokenKind::String(ref s) => {
                    self.advance();
                    self.expect_punct(":")?;
                    (
                        Expr::Literal(Literal::String(s.as_str().into())),
                        self.parse_expression()?,
                    )
                }
                TokenKind::Ident(ref word) if word == "function" => {
                    self.advance();
                    let name = self.expect_ident()?;
                    let func = self.parse_function_rest(Some(name.clone()))?;
                    (Expr::Literal(Literal::String(name)), Expr::Function(func))
                }
                TokenKind::Ident(_) => {
                    let name = self.expect_ident()?;
                    self.expect_punct("=")?;
                    (
                        Expr::Literal(Literal::String(name)),
                        self.parse_expression()?,
                    )
                }
                TokenKind::Eof => return Err(self.error_here("expected '}'")),
                _ => return Err(self.error_here("expected table slot")),
            };
            entries.push((key, value));
            self.eat_punct(",");
        }
        Ok(Expr::Table(entries))
    }

    // Token helpers

    fn current(&self) -> &Token {
        // The token list always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn check_punct(&self, p: &str) -> bool {
        matches!(&self.current().kind, TokenKind::Punct(q) if *q == p)
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.check_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), CompileError> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.error_here(format!(
                "expected '{}' but found '{}'",
                p,
                self.current().describe()
            )))
        }
    }

    fn check_keyword(&self, kw: &str) -> bool {
        matches!(&self.current().kind, TokenKind::Ident(w) if w == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.check_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn peek_is_ident(&self, n: usize) -> bool {
        matches!(
            self.tokens.get(self.pos + n).map(|t| &t.kind),
            Some(TokenKind::Ident(w)) if !KEYWORDS.contains(&w.as_str())
        )
    }

    fn expect_ident(&mut self) -> Result<Rc<str>, CompileError> {
        match &self.current().kind {
            TokenKind::Ident(name) if !KEYWORDS.contains(&name.as_str()) => {
                let name: Rc<str> = name.as_str().into();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here(format!(
                "expected identifier but found '{}'",
                self.current().describe()
            ))),
        }
    }

    /// A statement ends at `;`, `}`, end of input or a line break
    fn is_end_of_statement(&self) -> bool {
        let token = self.current();
        match token.kind {
            TokenKind::Eof | TokenKind::Punct(";") | TokenKind::Punct("}") => true,
            _ => self.pos > 0 && self.tokens[self.pos - 1].line < token.line,
        }
    }

    fn end_statement(&mut self) -> Result<(), CompileError> {
        if self.eat_punct(";") || self.is_end_of_statement() {
            Ok(())
        } else {
            Err(self.error_here("end of statement expected (; or lf)"))
        }
    }

    fn error_here(&self, message: impl Into<String>) -> CompileError {
        let token = self.current();
        CompileError::new(message, token.line, token.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_return_literal() {
        let main = parse("return 123", "buffer").unwrap();
        assert_eq!(main.body.len(), 1);
        assert!(matches!(
            main.body[0],
            Stmt::Return(Some(Expr::Literal(Literal::Integer(123))))
        ));
    }

    #[test]
    fn test_parse_bare_return() {
        let main = parse("return", "buffer").unwrap();
        assert!(matches!(main.body[0], Stmt::Return(None)));
    }

    #[test]
    fn test_parse_table_constructor() {
        let main = parse("return { x = 123, y = true }", "buffer").unwrap();
        match &main.body[0] {
            Stmt::Return(Some(Expr::Table(entries))) => assert_eq!(entries.len(), 2),
            other => panic!("Expected table return, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_new_slot_and_function() {
        let main = parse("a <- 123; return function(b) { return this.a + b; }", "buffer").unwrap();
        assert_eq!(main.body.len(), 2);
        assert!(matches!(
            main.body[0],
            Stmt::Expr(Expr::Assign {
                op: AssignOp::NewSlot,
                ..
            })
        ));
        match &main.body[1] {
            Stmt::Return(Some(Expr::Function(f))) => assert_eq!(f.params.len(), 1),
            other => panic!("Expected function return, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_precedence() {
        let main = parse("return 1 + 2 * 3", "buffer").unwrap();
        match &main.body[0] {
            Stmt::Return(Some(Expr::Binary(BinaryOp::Add, _, rhs))) => {
                assert!(matches!(**rhs, Expr::Binary(BinaryOp::Mul, _, _)));
            }
            other => panic!("Expected addition at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_statements_split_on_newlines() {
        let main = parse("local a = 1\nlocal b = 2\nreturn a + b", "buffer").unwrap();
        assert_eq!(main.body.len(), 3);
    }

    #[test]
    fn test_missing_separator_is_error() {
        let err = parse("local a = 1 local b = 2", "buffer").unwrap_err();
        assert!(err.message.contains("end of statement"));
    }

    #[test]
    fn test_assign_to_literal_is_error() {
        let err = parse("1 = 2", "buffer").unwrap_err();
        assert_eq!(err.message, "can't assign expression");
    }

    #[test]
    fn test_unclosed_block_is_error() {
        let err = parse("if (true) { return 1", "buffer").unwrap_err();
        assert_eq!(err.message, "expected '}'");
    }

    #[test]
    fn test_keyword_is_not_identifier() {
        assert!(parse("local return = 1", "buffer").is_err());
    }
}
