//! Tokenizer for the script dialect

use crate::error::CompileError;

/// Multi-character punctuators first so the longest match wins
const PUNCTUATORS: &[&str] = &[
    "<-", "<=", ">=", "==", "!=", "&&", "||", "+=", "-=", "::", "+", "-", "*", "/", "%", "<", ">",
    "=", "!", ".", ",", ";", ":", "(", ")", "[", "]", "{", "}", "?",
];

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Integer(i64),
    Float(f64),
    String(String),
    /// Identifiers and keywords
    Ident(String),
    Punct(&'static str),
    Eof,
}

/// A token with source position information
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// Line number (0-indexed)
    pub line: usize,
    /// Column number (0-indexed)
    pub column: usize,
}

impl Token {
    /// Human readable rendering for error messages
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Integer(n) => n.to_string(),
            TokenKind::Float(f) => f.to_string(),
            TokenKind::String(s) => format!("\"{}\"", s),
            TokenKind::Ident(s) => s.clone(),
            TokenKind::Punct(p) => (*p).to_string(),
            TokenKind::Eof => "end of script".to_string(),
        }
    }
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Cursor {
    fn new(source: &str) -> Self {
        Cursor {
            chars: source.chars().collect(),
            pos: 0,
            line: 0,
            column: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn error(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(message, self.line, self.column)
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    let mut cursor = Cursor::new(source);
    let mut tokens = Vec::new();

    loop {
        skip_trivia(&mut cursor)?;
        let line = cursor.line;
        let column = cursor.column;

        let Some(ch) = cursor.peek() else {
            tokens.push(Token {
                kind: TokenKind::Eof,
                line,
                column,
            });
            return Ok(tokens);
        };

        let kind = if ch.is_ascii_digit() {
            lex_number(&mut cursor)?
        } else if ch == '"' {
            TokenKind::String(lex_string(&mut cursor)?)
        } else if ch == '\'' {
            lex_char(&mut cursor)?
        } else if ch.is_alphabetic() || ch == '_' {
            let mut ident = String::new();
            while let Some(c) = cursor.peek() {
                if c.is_alphanumeric() || c == '_' {
                    ident.push(c);
                    cursor.bump();
                } else {
                    break;
                }
            }
            TokenKind::Ident(ident)
        } else if let Some(p) = PUNCTUATORS.iter().copied().find(|p| cursor.starts_with(p)) {
            for _ in 0..p.len() {
                cursor.bump();
            }
            TokenKind::Punct(p)
        } else {
            return Err(cursor.error(format!("unexpected character '{}'", ch)));
        };

        tokens.push(Token { kind, line, column });
    }
}

/// Skip whitespace and `//`, `#` and `/* */` comments
fn skip_trivia(cursor: &mut Cursor) -> Result<(), CompileError> {
    loop {
        match cursor.peek() {
            Some(c) if c.is_whitespace() => {
                cursor.bump();
            }
            Some('#') => skip_line(cursor),
            Some('/') if cursor.peek_at(1) == Some('/') => skip_line(cursor),
            Some('/') if cursor.peek_at(1) == Some('*') => {
                let err = cursor.error("missing \"*/\" in comment");
                cursor.bump();
                cursor.bump();
                loop {
                    if cursor.starts_with("*/") {
                        cursor.bump();
                        cursor.bump();
                        break;
                    }
                    if cursor.bump().is_none() {
                        return Err(err);
                    }
                }
            }
            _ => return Ok(()),
        }
    }
}

fn skip_line(cursor: &mut Cursor) {
    while let Some(c) = cursor.peek() {
        if c == '\n' {
            break;
        }
        cursor.bump();
    }
}

fn lex_number(cursor: &mut Cursor) -> Result<TokenKind, CompileError> {
    let start = cursor.error("malformed number");

    if cursor.starts_with("0x") || cursor.starts_with("0X") {
        cursor.bump();
        cursor.bump();
        let mut digits = String::new();
        while let Some(c) = cursor.peek() {
            if c.is_ascii_hexdigit() {
                digits.push(c);
                cursor.bump();
            } else {
                break;
            }
        }
        return i64::from_str_radix(&digits, 16)
            .map(TokenKind::Integer)
            .map_err(|_| start);
    }

    let mut text = String::new();
    let mut is_float = false;
    while let Some(c) = cursor.peek() {
        if c.is_ascii_digit() {
            text.push(c);
            cursor.bump();
        } else if c == '.' && !is_float && cursor.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
            is_float = true;
            text.push(c);
            cursor.bump();
        } else if (c == 'e' || c == 'E')
            && (cursor.peek_at(1).is_some_and(|d| d.is_ascii_digit())
                || (matches!(cursor.peek_at(1), Some('+') | Some('-'))
                    && cursor.peek_at(2).is_some_and(|d| d.is_ascii_digit())))
        {
            is_float = true;
            text.push(c);
            cursor.bump();
            if let Some(sign) = cursor.peek().filter(|s| *s == '+' || *s == '-') {
                text.push(sign);
                cursor.bump();
            }
        } else {
            break;
        }
    }

    if cursor.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
        return Err(start);
    }

    if is_float {
        text.parse::<f64>()
            .map(TokenKind::Float)
            .map_err(|_| start)
    } else {
        text.parse::<i64>()
            .map(TokenKind::Integer)
            .map_err(|_| cursor.error("integer literal out of range"))
    }
}

fn lex_escape(cursor: &mut Cursor) -> Result<char, CompileError> {
    match cursor.bump() {
        Some('n') => Ok('\n'),
        Some('t') => Ok('\t'),
        Some('r') => Ok('\r'),
        Some('0') => Ok('\0'),
        Some('\\') => Ok('\\'),
        Some('"') => Ok('"'),
        Some('\'') => Ok('\''),
        Some('x') => {
            let mut digits = String::new();
            while digits.len() < 4 {
                match cursor.peek() {
                    Some(c) if c.is_ascii_hexdigit() => {
                        digits.push(c);
                        cursor.bump();
                    }
                    _ => break,
                }
            }
            u32::from_str_radix(&digits, 16)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| cursor.error("hexadecimal number expected"))
        }
        Some(c) => Err(cursor.error(format!("unrecognised escaper char '{}'", c))),
        None => Err(cursor.error("unfinished string")),
    }
}

fn lex_string(cursor: &mut Cursor) -> Result<String, CompileError> {
    let start = cursor.error("unfinished string");
    cursor.bump();
    let mut result = String::new();
    loop {
        match cursor.bump() {
            Some('"') => return Ok(result),
            Some('\\') => result.push(lex_escape(cursor)?),
            Some('\n') | None => return Err(start),
            Some(c) => result.push(c),
        }
    }
}

/// Character literals evaluate to their code point as an integer
fn lex_char(cursor: &mut Cursor) -> Result<TokenKind, CompileError> {
    let start = cursor.error("invalid character literal");
    cursor.bump();
    let ch = match cursor.bump() {
        Some('\\') => lex_escape(cursor)?,
        Some('\'') | Some('\n') | None => return Err(start),
        Some(c) => c,
    };
    if cursor.bump() != Some('\'') {
        return Err(start);
    }
    Ok(TokenKind::Integer(ch as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_tokenize_return_statement() {
        assert_eq!(
            kinds("return 123;"),
            vec![
                TokenKind::Ident("return".to_string()),
                TokenKind::Integer(123),
                TokenKind::Punct(";"),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_new_slot_operator() {
        assert_eq!(
            kinds("a <- 1.25"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::Punct("<-"),
                TokenKind::Float(1.25),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_tokenize_strings_and_escapes() {
        assert_eq!(
            kinds(r#""a\tb\"c""#),
            vec![TokenKind::String("a\tb\"c".to_string()), TokenKind::Eof]
        );
        assert_eq!(kinds("'A'"), vec![TokenKind::Integer(65), TokenKind::Eof]);
    }

    #[test]
    fn test_tokenize_hex_and_exponent() {
        assert_eq!(
            kinds("0xff 1e3"),
            vec![
                TokenKind::Integer(255),
                TokenKind::Float(1000.0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("// line\n# hash\n/* block\n */ x"),
            vec![TokenKind::Ident("x".to_string()), TokenKind::Eof]
        );
    }

    #[test]
    fn test_positions_are_tracked() {
        let tokens = tokenize("a\n  b").unwrap();
        assert_eq!((tokens[1].line, tokens[1].column), (1, 2));
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("&*^$!@").unwrap_err();
        assert!(err.message.contains("unexpected character"));
    }

    #[test]
    fn test_unfinished_string() {
        let err = tokenize("\"abc").unwrap_err();
        assert_eq!(err.message, "unfinished string");
    }
}
