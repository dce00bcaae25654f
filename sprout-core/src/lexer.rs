//! Lexer for Sprout.
//!
//! A single left-to-right scan with at most two characters of lookahead.
//! Lexing is fail-fast: the first character that cannot start a token
//! aborts with [`CoreError::LexError`]. Unterminated strings, characters
//! and block comments are *not* errors here; they come out as
//! [`TokenKind::Unknown`] so the parser can report them with context.

use crate::error::CoreError;
use crate::span::{SourceFile, SourceLocation};
use crate::types::Primitive;

/// Kind of a token produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Special
    Eof,
    Unknown,
    Comment,

    // Identifiers and literals
    Identifier,
    Integer,
    Float,  // 1.5f, 2f
    Double, // 1.5, 1e3, 2i
    Bool,   // true / false
    Char,
    String,

    // Primitive type names
    Type(Primitive),

    // Keywords
    Main,
    Var,
    Const,
    If,
    Else,
    While,
    For,
    Break,
    Continue,
    Return,
    Null,

    // Arithmetic
    Plus,    // +
    Minus,   // -
    Star,    // *
    Slash,   // /
    Percent, // %
    Caret,   // ^

    // Compound assignment
    PlusEqual,    // +=
    MinusEqual,   // -=
    StarEqual,    // *=
    SlashEqual,   // /=
    PercentEqual, // %=
    CaretEqual,   // ^=

    // Comparison
    EqualEqual,   // ==
    BangEqual,    // !=
    Less,         // <
    Greater,      // >
    LessEqual,    // <=
    GreaterEqual, // >=

    // Logical
    AndAnd, // &&
    OrOr,   // ||
    Bang,   // !

    PlusPlus,   // ++
    MinusMinus, // --
    Equal,      // =
    Dot,        // .

    // Punctuation
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    LBrace,   // {
    RBrace,   // }
    Comma,    // ,
    Colon,    // :
    Semi,     // ;
}

impl TokenKind {
    pub fn is_compound_assign(self) -> bool {
        matches!(
            self,
            TokenKind::PlusEqual
                | TokenKind::MinusEqual
                | TokenKind::StarEqual
                | TokenKind::SlashEqual
                | TokenKind::PercentEqual
                | TokenKind::CaretEqual
        )
    }

    pub fn is_binary_operator(self) -> bool {
        matches!(
            self,
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::Percent
                | TokenKind::Caret
                | TokenKind::EqualEqual
                | TokenKind::BangEqual
                | TokenKind::Less
                | TokenKind::Greater
                | TokenKind::LessEqual
                | TokenKind::GreaterEqual
                | TokenKind::AndAnd
                | TokenKind::OrOr
        )
    }

    /// Keywords that start a new statement.
    pub fn starts_statement(self) -> bool {
        matches!(
            self,
            TokenKind::Main
                | TokenKind::Var
                | TokenKind::Const
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::While
                | TokenKind::For
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Return
        )
    }
}

/// A single token with its kind, source text and position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub location: SourceLocation,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, location: SourceLocation) -> Self {
        Token {
            kind,
            lexeme: lexeme.into(),
            location,
        }
    }

    /// Width of the lexeme in columns, for caret highlighting.
    pub fn width(&self) -> usize {
        self.lexeme.chars().count().max(1)
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

/// Lex a whole source file into tokens, terminated by [`TokenKind::Eof`].
pub fn tokenize(file: &SourceFile) -> Result<Vec<Token>, CoreError> {
    let mut lexer = Lexer {
        file,
        chars: file.text.as_bytes(),
        index: 0,
        line: 1,
        column: 1,
    };
    lexer.run()
}

struct Lexer<'src> {
    file: &'src SourceFile,
    chars: &'src [u8],
    index: usize,
    line: u32,
    column: u32,
}

impl<'src> Lexer<'src> {
    fn run(&mut self) -> Result<Vec<Token>, CoreError> {
        let mut tokens = Vec::new();

        while let Some(ch) = self.peek_char() {
            let start = self.index;
            let location = self.location();

            let kind = match ch {
                b'a'..=b'z' | b'A'..=b'Z' => self.lex_ident_or_keyword(),
                b'0'..=b'9' => self.lex_number(),
                b'_' => self.lex_ident_or_keyword(),
                b'#' => self.lex_radix_number(location)?,
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.consume_char();
                    continue;
                }
                b'/' if self.peek_next() == Some(b'/') => self.lex_line_comment(),
                b'/' if self.peek_next() == Some(b'*') => self.lex_block_comment(),
                b'.' => {
                    if self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
                        self.lex_number()
                    } else {
                        self.consume_char();
                        TokenKind::Dot
                    }
                }
                b'"' => self.lex_quoted(b'"', TokenKind::String),
                b'\'' => self.lex_quoted(b'\'', TokenKind::Char),
                _ => {
                    if let Some(kind) = self.lex_operator() {
                        kind
                    } else if let Some(kind) = punctuation(ch) {
                        self.consume_char();
                        kind
                    } else {
                        let offending = self.file.text[start..].chars().next().unwrap_or('?');
                        let message = format!("unknown character '{offending}'");
                        return Err(self.error(&message, location, start));
                    }
                }
            };

            tokens.push(Token::new(kind, &self.file.text[start..self.index], location));
        }

        tokens.push(Token::new(TokenKind::Eof, "", self.location()));
        Ok(tokens)
    }

    fn lex_ident_or_keyword(&mut self) -> TokenKind {
        let start = self.index;
        while self.peek_char().is_some_and(is_ident_continue) {
            self.consume_char();
        }
        let text = &self.file.text[start..self.index];
        keyword(text)
            .or_else(|| Primitive::from_name(text).map(TokenKind::Type))
            .unwrap_or(TokenKind::Identifier)
    }

    /// digits [ '.' digits ] [ ('e'|'E') ['+'|'-'] digits ] [ 'f' | 'i' ]
    fn lex_number(&mut self) -> TokenKind {
        let mut is_double = false;
        self.consume_digits();

        if self.peek_char() == Some(b'.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            is_double = true;
            self.consume_char(); // '.'
            self.consume_digits();
        }

        if matches!(self.peek_char(), Some(b'e' | b'E')) {
            let signed = matches!(self.peek_next(), Some(b'+' | b'-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_double = true;
                for _ in 0..digit_at {
                    self.consume_char();
                }
                self.consume_digits();
            }
        }

        match self.peek_char() {
            Some(b'f') => {
                self.consume_char();
                TokenKind::Float
            }
            Some(b'i') => {
                self.consume_char();
                TokenKind::Double
            }
            _ if is_double => TokenKind::Double,
            _ => TokenKind::Integer,
        }
    }

    /// `#FF` (hexadecimal) or `#o17` (octal).
    fn lex_radix_number(&mut self, location: SourceLocation) -> Result<TokenKind, CoreError> {
        let start = self.index;
        self.consume_char(); // '#'

        let (is_digit, name): (fn(u8) -> bool, &str) = if self.peek_char() == Some(b'o') {
            self.consume_char();
            (|c: u8| (b'0'..=b'7').contains(&c), "octal")
        } else {
            (|c: u8| c.is_ascii_hexdigit(), "hexadecimal")
        };

        let digits_start = self.index;
        while self.peek_char().is_some_and(is_digit) {
            self.consume_char();
        }
        if self.index == digits_start {
            return Err(self.error(&format!("expected {name} digits"), location, start));
        }
        if self.peek_char().is_some_and(is_ident_continue) {
            self.consume_char();
            return Err(self.error(&format!("invalid digit in {name} literal"), location, start));
        }
        Ok(TokenKind::Integer)
    }

    fn lex_line_comment(&mut self) -> TokenKind {
        while self.peek_char().is_some_and(|c| c != b'\n') {
            self.consume_char();
        }
        TokenKind::Comment
    }

    fn lex_block_comment(&mut self) -> TokenKind {
        self.consume_char(); // '/'
        self.consume_char(); // '*'
        while let Some(ch) = self.peek_char() {
            if ch == b'*' && self.peek_next() == Some(b'/') {
                self.consume_char();
                self.consume_char();
                return TokenKind::Comment;
            }
            self.consume_char();
        }
        TokenKind::Unknown
    }

    fn lex_quoted(&mut self, delimiter: u8, kind: TokenKind) -> TokenKind {
        self.consume_char(); // opening delimiter
        while let Some(ch) = self.peek_char() {
            match ch {
                b'\\' => {
                    self.consume_char();
                    if self.peek_char().is_some() {
                        self.consume_char();
                    }
                }
                c if c == delimiter => {
                    self.consume_char();
                    return kind;
                }
                _ => self.consume_char(),
            }
        }
        TokenKind::Unknown
    }

    /// Greedy longest match: the two-character table first.
    fn lex_operator(&mut self) -> Option<TokenKind> {
        let first = self.peek_char()?;
        if let Some(kind) = self.peek_next().and_then(|second| double_char_operator(first, second)) {
            self.consume_char();
            self.consume_char();
            return Some(kind);
        }
        let kind = single_char_operator(first)?;
        self.consume_char();
        Some(kind)
    }

    fn consume_digits(&mut self) {
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.consume_char();
        }
    }

    fn error(&self, message: &str, location: SourceLocation, start: usize) -> CoreError {
        let lexeme_end = self.index.max(start + 1);
        let width = self
            .file
            .text
            .get(start..lexeme_end)
            .map(|s| s.chars().count())
            .unwrap_or(1);
        CoreError::LexError {
            location,
            message: format!("{}: {message}", self.file.describe(location)),
            context: self.file.highlight(location, width),
        }
    }

    fn location(&self) -> SourceLocation {
        SourceLocation::new(self.file.id, self.line, self.column)
    }

    fn peek_char(&self) -> Option<u8> {
        self.chars.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.peek_at(1)
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.chars.get(self.index + offset).copied()
    }

    fn consume_char(&mut self) {
        let Some(ch) = self.peek_char() else {
            return;
        };
        self.index += 1;
        if ch == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if ch & 0xC0 != 0x80 {
            // UTF-8 continuation bytes share the column of their lead byte.
            self.column += 1;
        }
    }
}

fn double_char_operator(first: u8, second: u8) -> Option<TokenKind> {
    match (first, second) {
        (b'+', b'=') => Some(TokenKind::PlusEqual),
        (b'-', b'=') => Some(TokenKind::MinusEqual),
        (b'*', b'=') => Some(TokenKind::StarEqual),
        (b'/', b'=') => Some(TokenKind::SlashEqual),
        (b'%', b'=') => Some(TokenKind::PercentEqual),
        (b'^', b'=') => Some(TokenKind::CaretEqual),
        (b'=', b'=') => Some(TokenKind::EqualEqual),
        (b'!', b'=') => Some(TokenKind::BangEqual),
        (b'<', b'=') => Some(TokenKind::LessEqual),
        (b'>', b'=') => Some(TokenKind::GreaterEqual),
        (b'&', b'&') => Some(TokenKind::AndAnd),
        (b'|', b'|') => Some(TokenKind::OrOr),
        (b'+', b'+') => Some(TokenKind::PlusPlus),
        (b'-', b'-') => Some(TokenKind::MinusMinus),
        _ => None,
    }
}

fn single_char_operator(ch: u8) -> Option<TokenKind> {
    match ch {
        b'+' => Some(TokenKind::Plus),
        b'-' => Some(TokenKind::Minus),
        b'*' => Some(TokenKind::Star),
        b'/' => Some(TokenKind::Slash),
        b'%' => Some(TokenKind::Percent),
        b'^' => Some(TokenKind::Caret),
        b'<' => Some(TokenKind::Less),
        b'>' => Some(TokenKind::Greater),
        b'!' => Some(TokenKind::Bang),
        b'=' => Some(TokenKind::Equal),
        _ => None,
    }
}

fn punctuation(ch: u8) -> Option<TokenKind> {
    match ch {
        b'(' => Some(TokenKind::LParen),
        b')' => Some(TokenKind::RParen),
        b'[' => Some(TokenKind::LBracket),
        b']' => Some(TokenKind::RBracket),
        b'{' => Some(TokenKind::LBrace),
        b'}' => Some(TokenKind::RBrace),
        b',' => Some(TokenKind::Comma),
        b':' => Some(TokenKind::Colon),
        b';' => Some(TokenKind::Semi),
        _ => None,
    }
}

fn keyword(text: &str) -> Option<TokenKind> {
    let kind = match text {
        "main" => TokenKind::Main,
        "var" => TokenKind::Var,
        "const" => TokenKind::Const,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "break" => TokenKind::Break,
        "continue" => TokenKind::Continue,
        "return" => TokenKind::Return,
        "null" => TokenKind::Null,
        "true" | "false" => TokenKind::Bool,
        _ => return None,
    };
    Some(kind)
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}
