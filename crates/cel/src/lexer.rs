//! Character stream → token stream (§4.1).
//!
//! Positions are byte offsets into the original source, not character or
//! line/column counts — the error formatter (`error::render_at`) derives
//! line/column from the offset only when it needs to render a caret.

use std::sync::Arc;

use crate::error::ParseError;
use crate::value::Uint;

#[derive(Debug, Clone, PartialEq)]
pub enum NumberValue {
    Int(i64),
    Uint(u64),
    Double(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(NumberValue),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    Bool(bool),
    Null,
    Ident(Arc<str>),
    In,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Dot,
    Comma,
    Colon,
    Question,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: usize,
}

/// Reserved words (§6.2) that may never be used as an identifier, even
/// though CEL has no syntax that would use them as keywords today.
const RESERVED_WORDS: &[&str] = &[
    "as", "break", "const", "continue", "else", "for", "function", "if", "import", "let", "loop",
    "package", "namespace", "return", "var", "void", "while",
];

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    idx: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            source,
            chars: source.char_indices().collect(),
            idx: 0,
        }
    }

    fn pos(&self) -> usize {
        self.chars
            .get(self.idx)
            .map(|(p, _)| *p)
            .unwrap_or(self.source.len())
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).map(|(_, c)| *c)
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.idx + n).map(|(_, c)| *c)
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.idx += 1;
        }
        c
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') | Some('\n') => {
                    self.advance();
                }
                Some('/') if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_number(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos();
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            let digits_start = self.pos();
            while self
                .peek()
                .is_some_and(|c| c.is_ascii_hexdigit())
            {
                self.advance();
            }
            let text = &self.source[digits_start..self.pos()];
            if text.is_empty() {
                return Err(ParseError::at(start, "malformed hex literal"));
            }
            let is_uint = self.eat('u') || self.eat('U');
            let magnitude = u64::from_str_radix(text, 16)
                .map_err(|_| ParseError::at(start, "hex literal out of range"))?;
            return Ok(if is_uint {
                TokenKind::Number(NumberValue::Uint(magnitude))
            } else {
                TokenKind::Number(NumberValue::Int(magnitude as i64))
            });
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        let mut is_double = false;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_double = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        let text = &self.source[start..self.pos()];
        if is_double {
            if self.eat('u') || self.eat('U') {
                return Err(ParseError::at(start, "illegal 'u' suffix on a double literal"));
            }
            let value: f64 = text
                .parse()
                .map_err(|_| ParseError::at(start, "malformed double literal"))?;
            Ok(TokenKind::Number(NumberValue::Double(value)))
        } else {
            let is_uint = self.eat('u') || self.eat('U');
            if is_uint {
                let magnitude: u64 = text
                    .parse()
                    .map_err(|_| ParseError::at(start, "integer literal out of range"))?;
                Ok(TokenKind::Number(NumberValue::Uint(magnitude)))
            } else {
                let magnitude: i64 = text
                    .parse()
                    .map_err(|_| ParseError::at(start, "integer literal out of range"))?;
                Ok(TokenKind::Number(NumberValue::Int(magnitude)))
            }
        }
    }

    /// Reads one escape sequence (the cursor is positioned just after the
    /// backslash). Returns the decoded scalar as a sequence of bytes
    /// (UTF-8 encoded for `\u`/`\U`, single byte otherwise) and whether it
    /// is permitted inside a `bytes` literal.
    fn lex_escape(&mut self, escape_start: usize, in_bytes: bool) -> Result<Vec<u8>, ParseError> {
        let c = self.advance().ok_or_else(|| {
            ParseError::at(escape_start, "unterminated escape sequence")
        })?;
        let bytes = match c {
            '\\' => vec![b'\\'],
            '\'' => vec![b'\''],
            '"' => vec![b'"'],
            '`' => vec![b'`'],
            '?' => vec![b'?'],
            'a' => vec![0x07],
            'b' => vec![0x08],
            'f' => vec![0x0c],
            'n' => vec![b'\n'],
            'r' => vec![b'\r'],
            't' => vec![b'\t'],
            'v' => vec![0x0b],
            'x' | 'X' => {
                let mut hex = String::new();
                for _ in 0..2 {
                    match self.advance() {
                        Some(c) if c.is_ascii_hexdigit() => hex.push(c),
                        _ => return Err(ParseError::at(escape_start, "Invalid \\x escape sequence")),
                    }
                }
                let value = u8::from_str_radix(&hex, 16)
                    .map_err(|_| ParseError::at(escape_start, "Invalid \\x escape sequence"))?;
                vec![value]
            }
            '0'..='7' => {
                let mut octal = String::new();
                octal.push(c);
                for _ in 0..2 {
                    match self.peek() {
                        Some(c) if ('0'..='7').contains(&c) => {
                            octal.push(c);
                            self.advance();
                        }
                        _ => return Err(ParseError::at(escape_start, "Invalid \\ooo escape sequence")),
                    }
                }
                let value = u32::from_str_radix(&octal, 8)
                    .map_err(|_| ParseError::at(escape_start, "Invalid \\ooo escape sequence"))?;
                if value > 0xff {
                    return Err(ParseError::at(escape_start, "Invalid \\ooo escape sequence"));
                }
                vec![value as u8]
            }
            'u' => {
                if in_bytes {
                    return Err(ParseError::at(
                        escape_start,
                        "Invalid \\u escape sequence in bytes literal",
                    ));
                }
                let mut hex = String::new();
                for _ in 0..4 {
                    match self.advance() {
                        Some(c) if c.is_ascii_hexdigit() => hex.push(c),
                        _ => return Err(ParseError::at(escape_start, "Invalid \\u escape sequence")),
                    }
                }
                let value = u32::from_str_radix(&hex, 16)
                    .map_err(|_| ParseError::at(escape_start, "Invalid \\u escape sequence"))?;
                if (0xd800..=0xdfff).contains(&value) {
                    return Err(ParseError::at(escape_start, "Invalid \\u escape sequence"));
                }
                let ch = char::from_u32(value)
                    .ok_or_else(|| ParseError::at(escape_start, "Invalid \\u escape sequence"))?;
                let mut buf = [0u8; 4];
                ch.encode_utf8(&mut buf).as_bytes().to_vec()
            }
            'U' => {
                if in_bytes {
                    return Err(ParseError::at(
                        escape_start,
                        "Invalid \\U escape sequence in bytes literal",
                    ));
                }
                let mut hex = String::new();
                for _ in 0..8 {
                    match self.advance() {
                        Some(c) if c.is_ascii_hexdigit() => hex.push(c),
                        _ => return Err(ParseError::at(escape_start, "Invalid \\U escape sequence")),
                    }
                }
                let value = u32::from_str_radix(&hex, 16)
                    .map_err(|_| ParseError::at(escape_start, "Invalid \\U escape sequence"))?;
                if value > 0x10ffff || (0xd800..=0xdfff).contains(&value) {
                    return Err(ParseError::at(escape_start, "Invalid \\U escape sequence"));
                }
                let ch = char::from_u32(value)
                    .ok_or_else(|| ParseError::at(escape_start, "Invalid \\U escape sequence"))?;
                let mut buf = [0u8; 4];
                ch.encode_utf8(&mut buf).as_bytes().to_vec()
            }
            other => {
                return Err(ParseError::at(
                    escape_start,
                    format!("Invalid \\{other} escape sequence"),
                ));
            }
        };
        Ok(bytes)
    }

    fn lex_string_or_bytes(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos();
        let mut is_raw = false;
        let mut is_bytes = false;
        for _ in 0..2 {
            match self.peek() {
                Some('r') | Some('R') if !is_raw => {
                    is_raw = true;
                    self.advance();
                }
                Some('b') | Some('B') if !is_bytes => {
                    is_bytes = true;
                    self.advance();
                }
                _ => break,
            }
        }

        let quote = self
            .peek()
            .filter(|c| *c == '"' || *c == '\'')
            .ok_or_else(|| ParseError::at(start, "expected string literal"))?;
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.advance();
        if triple {
            self.advance();
            self.advance();
        }

        let mut bytes = Vec::new();
        loop {
            if self.peek().is_none() {
                return Err(ParseError::at(start, "unterminated string literal"));
            }
            if self.peek() == Some(quote) {
                if !triple {
                    self.advance();
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.advance();
                    self.advance();
                    self.advance();
                    break;
                }
            }
            if self.peek() == Some('\\') && !is_raw {
                let escape_start = self.pos();
                self.advance();
                bytes.extend(self.lex_escape(escape_start, is_bytes)?);
                continue;
            }
            if !triple && self.peek() == Some('\n') {
                return Err(ParseError::at(start, "unterminated string literal"));
            }
            let c = self.advance().expect("checked by peek above");
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }

        if is_bytes {
            Ok(TokenKind::Bytes(Arc::from(bytes.into_boxed_slice())))
        } else {
            let text = String::from_utf8(bytes)
                .map_err(|_| ParseError::at(start, "string literal is not valid UTF-8"))?;
            Ok(TokenKind::Str(Arc::from(text)))
        }
    }

    fn lex_ident(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos();
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.advance();
        }
        let text = &self.source[start..self.pos()];
        match text {
            "true" => Ok(TokenKind::Bool(true)),
            "false" => Ok(TokenKind::Bool(false)),
            "null" => Ok(TokenKind::Null),
            "in" => Ok(TokenKind::In),
            _ if RESERVED_WORDS.contains(&text) => Err(ParseError::at(
                start,
                format!("'{text}' is a reserved word and cannot be used as an identifier"),
            )),
            _ => Ok(TokenKind::Ident(Arc::from(text))),
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_trivia();
        let pos = self.pos();
        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                pos,
            });
        };

        if c.is_ascii_digit() {
            return Ok(Token {
                kind: self.lex_number()?,
                pos,
            });
        }

        if c == '"' || c == '\'' {
            return Ok(Token {
                kind: self.lex_string_or_bytes()?,
                pos,
            });
        }
        if (c == 'r' || c == 'R' || c == 'b' || c == 'B')
            && matches!(self.peek_at(1), Some('"') | Some('\''))
        {
            return Ok(Token {
                kind: self.lex_string_or_bytes()?,
                pos,
            });
        }
        if (c == 'r' || c == 'R')
            && matches!(self.peek_at(1), Some('b') | Some('B'))
            && matches!(self.peek_at(2), Some('"') | Some('\''))
        {
            return Ok(Token {
                kind: self.lex_string_or_bytes()?,
                pos,
            });
        }

        if c.is_ascii_alphabetic() || c == '_' {
            return Ok(Token {
                kind: self.lex_ident()?,
                pos,
            });
        }

        self.advance();
        let kind = match c {
            '=' if self.eat('=') => TokenKind::EqEq,
            '!' if self.eat('=') => TokenKind::Ne,
            '<' if self.eat('=') => TokenKind::Le,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::Ge,
            '>' => TokenKind::Gt,
            '&' if self.eat('&') => TokenKind::AndAnd,
            '|' if self.eat('|') => TokenKind::OrOr,
            '!' => TokenKind::Not,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '.' => TokenKind::Dot,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '?' => TokenKind::Question,
            other => return Err(ParseError::at(pos, format!("unexpected character '{other}'"))),
        };
        Ok(Token { kind, pos })
    }
}

/// Tokenize an entire source string, ending with a single `Eof` token.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let is_eof = token.kind == TokenKind::Eof;
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    Ok(tokens)
}

/// Convert a lexed [`NumberValue`] into the runtime-compatible `Uint`
/// wrapper used by the AST's literal representation.
pub fn number_as_uint(value: u64) -> Uint {
    Uint(value)
}

/// True if `name` is one of the reserved words in §6.2 and therefore
/// cannot be used as an identifier or a registered variable name.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn skips_whitespace_and_comments() {
        let tokens = kinds("  1 + // trailing comment\n  2");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Number(NumberValue::Int(1)),
                TokenKind::Plus,
                TokenKind::Number(NumberValue::Int(2)),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn hex_and_uint_suffix() {
        let tokens = kinds("0x1Fu");
        assert_eq!(
            tokens,
            vec![TokenKind::Number(NumberValue::Uint(31)), TokenKind::Eof]
        );
    }

    #[test]
    fn double_rejects_uint_suffix() {
        assert!(tokenize("1.5u").is_err());
    }

    #[test]
    fn dot_after_int_without_digit_is_not_part_of_number() {
        let tokens = kinds("1.foo");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Number(NumberValue::Int(1)),
                TokenKind::Dot,
                TokenKind::Ident(Arc::from("foo")),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn triple_quoted_string_allows_newlines() {
        let tokens = kinds("\"\"\"a\nb\"\"\"");
        assert_eq!(
            tokens,
            vec![TokenKind::Str(Arc::from("a\nb")), TokenKind::Eof]
        );
    }

    #[test]
    fn raw_string_suppresses_escapes() {
        let tokens = kinds(r#"r"\n""#);
        assert_eq!(
            tokens,
            vec![TokenKind::Str(Arc::from("\\n")), TokenKind::Eof]
        );
    }

    #[test]
    fn bytes_prefix_produces_bytes_token() {
        let tokens = kinds(r#"b"ab""#);
        assert_eq!(
            tokens,
            vec![
                TokenKind::Bytes(Arc::from(b"ab".to_vec().into_boxed_slice())),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn rejects_reserved_word_as_identifier() {
        let err = tokenize("let").unwrap_err();
        assert!(err.message.contains("reserved word"));
    }

    #[test]
    fn true_false_null_in_are_keywords_not_identifiers() {
        let tokens = kinds("true false null in");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Bool(true),
                TokenKind::Bool(false),
                TokenKind::Null,
                TokenKind::In,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_is_a_parse_error() {
        assert!(tokenize("\"abc").is_err());
    }

    #[test]
    fn unicode_escape_rejects_surrogate() {
        assert!(tokenize(r#""\ud800""#).is_err());
    }
}
