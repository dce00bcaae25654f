//! Expression parser.
//!
//! Precedence climbing over a run of tokens (one instruction's worth, or a
//! part of one). `parse_expression(min)` keeps consuming binary operators
//! while their precedence is strictly greater than `min`, recursing with
//! the operator's own precedence for the right-hand side, which makes every
//! binary operator left-associative. Prefix operators bind tighter than any
//! binary operator.

use crate::ast::{BinaryOp, Index, Literal, Node, NodeKind, Number, UnaryOp};
use crate::error::CoreError;
use crate::lexer::{Token, TokenKind};
use crate::span::{SourceFile, SourceLocation};

/// Precedence of prefix operators; higher than every binary operator.
pub const UNARY_PRECEDENCE: u8 = 8;

/// Deepest sub-expression nesting accepted. Typing and printing recurse
/// over the tree, so this also bounds them.
pub const MAX_NESTING: usize = 128;

/// A malformed token run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub message: String,
    pub location: SourceLocation,
    pub width: usize,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, token: &Token) -> Self {
        SyntaxError {
            message: message.into(),
            location: token.location,
            width: token.width(),
        }
    }

    pub fn into_error(self, file: &SourceFile) -> CoreError {
        CoreError::ParseError {
            message: format!("{}: {}", file.describe(self.location), self.message),
            context: file.highlight(self.location, self.width),
            location: self.location,
        }
    }
}

/// Parse a whole token run as one expression.
pub fn parse_expression(tokens: &[Token]) -> Result<Node, SyntaxError> {
    let mut parser = Parser::new(tokens);
    let node = parser.parse_expression(0)?;
    parser.finish()?;
    Ok(node)
}

/// Parse a whole token run as a comma-separated list of expressions.
pub fn parse_expressions(tokens: &[Token]) -> Result<Vec<Node>, SyntaxError> {
    let mut parser = Parser::new(tokens);
    let nodes = parser.parse_expression_list()?;
    parser.finish()?;
    Ok(nodes)
}

/// Parse a whole token run as a type (`i32`, `f64[3][]`).
pub fn parse_type(tokens: &[Token]) -> Result<Node, SyntaxError> {
    let mut parser = Parser::new(tokens);
    let node = parser.parse_type()?;
    parser.finish()?;
    Ok(node)
}

pub struct Parser<'t> {
    tokens: &'t [Token],
    position: usize,
    /// Open `parse_expression` calls.
    depth: usize,
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Token]) -> Self {
        Parser {
            tokens,
            position: 0,
            depth: 0,
        }
    }

    pub fn parse_expression(&mut self, min_precedence: u8) -> Result<Node, SyntaxError> {
        if self.depth >= MAX_NESTING {
            return Err(match self.peek() {
                Some(token) => SyntaxError::new("expression nested too deeply", token),
                None => self.end_of_input(),
            });
        }
        self.depth += 1;
        let result = self.parse_binary(min_precedence);
        self.depth -= 1;
        result
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Node, SyntaxError> {
        let mut left = self.parse_unary()?;
        while let Some((op, precedence)) = self.peek().and_then(|t| binary_operator(t.kind)) {
            if precedence <= min_precedence {
                break;
            }
            let operator = self.consume_token()?;
            let right = self.parse_expression(precedence)?;
            left = Node::new(
                NodeKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                operator.location,
            );
        }
        Ok(left)
    }

    pub fn parse_expression_list(&mut self) -> Result<Vec<Node>, SyntaxError> {
        let mut nodes = vec![self.parse_expression(0)?];
        while self.eat(TokenKind::Comma) {
            nodes.push(self.parse_expression(0)?);
        }
        Ok(nodes)
    }

    pub fn parse_type(&mut self) -> Result<Node, SyntaxError> {
        let token = self.consume_token()?;
        let TokenKind::Type(name) = token.kind else {
            return Err(SyntaxError::new(format!("unknown type '{}'", token.lexeme), token));
        };
        let index = self.parse_index_chain(true)?;
        Ok(Node::new(
            NodeKind::Type {
                name,
                index,
                call: None,
            },
            token.location,
        ))
    }

    /// Fails if any token is left unconsumed.
    pub fn finish(&self) -> Result<(), SyntaxError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(SyntaxError::new(
                format!("unexpected '{}' after expression", token.lexeme),
                token,
            )),
        }
    }

    fn parse_unary(&mut self) -> Result<Node, SyntaxError> {
        let op = match self.peek().map(|t| t.kind) {
            Some(TokenKind::Plus) => UnaryOp::Plus,
            Some(TokenKind::Minus) => UnaryOp::Minus,
            Some(TokenKind::Bang) => UnaryOp::Not,
            Some(TokenKind::PlusPlus) => UnaryOp::Increment,
            Some(TokenKind::MinusMinus) => UnaryOp::Decrement,
            _ => return self.parse_postfix(),
        };
        let operator = self.consume_token()?;
        let operand = self.parse_expression(UNARY_PRECEDENCE)?;
        Ok(Node::new(
            NodeKind::Unary {
                op,
                operand: Box::new(operand),
            },
            operator.location,
        ))
    }

    fn parse_postfix(&mut self) -> Result<Node, SyntaxError> {
        let mut node = self.parse_primary()?;
        loop {
            let op = match self.peek().map(|t| t.kind) {
                Some(TokenKind::PlusPlus) => UnaryOp::Increment,
                Some(TokenKind::MinusMinus) => UnaryOp::Decrement,
                _ => return Ok(node),
            };
            let operator = self.consume_token()?;
            node = Node::new(
                NodeKind::Postfix {
                    op,
                    operand: Box::new(node),
                },
                operator.location,
            );
        }
    }

    fn parse_primary(&mut self) -> Result<Node, SyntaxError> {
        let token = self.consume_token()?;
        let location = token.location;
        let kind = match token.kind {
            TokenKind::Integer | TokenKind::Float | TokenKind::Double => NodeKind::Number(convert_number(token)),
            TokenKind::Bool => NodeKind::Literal(Literal::Bool(token.lexeme == "true")),
            TokenKind::Char => {
                let text = unescape(strip_quotes(&token.lexeme));
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => NodeKind::Literal(Literal::Char(ch)),
                    _ => return Err(SyntaxError::new("invalid character literal", token)),
                }
            }
            TokenKind::String => NodeKind::Literal(Literal::Str(unescape(strip_quotes(&token.lexeme)))),
            TokenKind::Null => NodeKind::Nullptr,
            TokenKind::Identifier => return self.parse_variable(token),
            TokenKind::Type(name) => {
                let index = self.parse_index_chain(true)?;
                let call = if self.check(TokenKind::LParen) {
                    Some(self.parse_arguments()?)
                } else {
                    None
                };
                NodeKind::Type { name, index, call }
            }
            TokenKind::LParen => {
                let inner = self.parse_expression(0)?;
                if !self.eat(TokenKind::RParen) {
                    return Err(SyntaxError::new("unclosed parenthesis", token));
                }
                return Ok(inner);
            }
            TokenKind::LBracket => {
                let mut elements = Vec::new();
                if !self.eat(TokenKind::RBracket) {
                    elements = self.parse_expression_list()?;
                    if !self.eat(TokenKind::RBracket) {
                        return Err(SyntaxError::new("unclosed array literal", token));
                    }
                }
                NodeKind::Array(elements)
            }
            TokenKind::Unknown => return Err(SyntaxError::new(describe_unknown(&token.lexeme), token)),
            _ => {
                return Err(SyntaxError::new(
                    format!("expected an expression, found '{}'", token.lexeme),
                    token,
                ));
            }
        };
        Ok(Node::new(kind, location))
    }

    /// `name (args)? ([index])* (. member)?`
    fn parse_variable(&mut self, token: &Token) -> Result<Node, SyntaxError> {
        let call = if self.check(TokenKind::LParen) {
            Some(self.parse_arguments()?)
        } else {
            None
        };
        let index = self.parse_index_chain(false)?;
        let member = if self.eat(TokenKind::Dot) {
            let name = self.consume_token()?;
            if name.kind != TokenKind::Identifier {
                return Err(SyntaxError::new("expected a member name after '.'", name));
            }
            if self.depth >= MAX_NESTING {
                return Err(SyntaxError::new("expression nested too deeply", name));
            }
            self.depth += 1;
            let member = self.parse_variable(name);
            self.depth -= 1;
            Some(Box::new(member?))
        } else {
            None
        };
        Ok(Node::new(
            NodeKind::Variable {
                name: token.lexeme.clone(),
                call,
                index,
                member,
            },
            token.location,
        ))
    }

    fn parse_arguments(&mut self) -> Result<Vec<Node>, SyntaxError> {
        let open = self.consume_token()?;
        if self.eat(TokenKind::RParen) {
            return Ok(Vec::new());
        }
        let args = self.parse_expression_list()?;
        if !self.eat(TokenKind::RParen) {
            return Err(SyntaxError::new("expected ')' to close the argument list", open));
        }
        Ok(args)
    }

    /// Bracket levels following a name. Empty brackets are only allowed in types.
    fn parse_index_chain(&mut self, allow_empty: bool) -> Result<Option<Index>, SyntaxError> {
        let mut chain: Option<Index> = None;
        while self.check(TokenKind::LBracket) {
            let open = self.consume_token()?;
            let size = if self.check(TokenKind::RBracket) {
                if !allow_empty {
                    return Err(SyntaxError::new("missing index expression", open));
                }
                None
            } else {
                Some(self.parse_expression(0)?)
            };
            if !self.eat(TokenKind::RBracket) {
                return Err(SyntaxError::new("expected ']'", open));
            }
            let level = Index::new(size);
            match &mut chain {
                Some(index) => index.push(level),
                None => chain = Some(level),
            }
        }
        Ok(chain)
    }

    pub fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.position).filter(|t| t.kind != TokenKind::Eof)
    }

    /// Advances past the current token.
    pub fn consume_token(&mut self) -> Result<&'t Token, SyntaxError> {
        match self.peek() {
            Some(token) => {
                self.position += 1;
                Ok(token)
            }
            None => Err(self.end_of_input()),
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|t| t.kind == kind)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn end_of_input(&self) -> SyntaxError {
        match self.tokens.last() {
            Some(last) => SyntaxError {
                message: "unexpected end of expression".to_string(),
                location: SourceLocation::new(
                    last.location.file,
                    last.location.line,
                    last.location.column + last.width() as u32,
                ),
                width: 1,
            },
            None => SyntaxError {
                message: "expected an expression".to_string(),
                location: SourceLocation::new(Default::default(), 1, 1),
                width: 1,
            },
        }
    }
}

fn binary_operator(kind: TokenKind) -> Option<(BinaryOp, u8)> {
    let entry = match kind {
        TokenKind::OrOr => (BinaryOp::Or, 1),
        TokenKind::AndAnd => (BinaryOp::And, 2),
        TokenKind::EqualEqual => (BinaryOp::Eq, 3),
        TokenKind::BangEqual => (BinaryOp::Ne, 3),
        TokenKind::Less => (BinaryOp::Lt, 4),
        TokenKind::Greater => (BinaryOp::Gt, 4),
        TokenKind::LessEqual => (BinaryOp::Le, 4),
        TokenKind::GreaterEqual => (BinaryOp::Ge, 4),
        TokenKind::Plus => (BinaryOp::Add, 5),
        TokenKind::Minus => (BinaryOp::Sub, 5),
        TokenKind::Star => (BinaryOp::Mul, 6),
        TokenKind::Slash => (BinaryOp::Div, 6),
        TokenKind::Percent => (BinaryOp::Mod, 6),
        TokenKind::Caret => (BinaryOp::Pow, 7),
        _ => return None,
    };
    Some(entry)
}

/// Converts a numeric token. Malformed text converts to zero.
pub fn convert_number(token: &Token) -> Number {
    let text = token.lexeme.as_str();
    match token.kind {
        TokenKind::Float => {
            let digits = text.strip_suffix('f').unwrap_or(text);
            Number::F32(with_leading_zero(digits).parse().unwrap_or(0.0))
        }
        TokenKind::Double => {
            let digits = text.strip_suffix('i').unwrap_or(text);
            Number::F64(with_leading_zero(digits).parse().unwrap_or(0.0))
        }
        _ => {
            let value = if let Some(octal) = text.strip_prefix("#o") {
                u64::from_str_radix(octal, 8).unwrap_or(0)
            } else if let Some(hex) = text.strip_prefix('#') {
                u64::from_str_radix(hex, 16).unwrap_or(0)
            } else {
                text.parse::<u64>().unwrap_or(0)
            };
            integer_literal(value)
        }
    }
}

/// The narrowest of `i32`, `i64`, `u64` that holds `value`.
fn integer_literal(value: u64) -> Number {
    if let Ok(v) = i32::try_from(value) {
        Number::I32(v)
    } else if let Ok(v) = i64::try_from(value) {
        Number::I64(v)
    } else {
        Number::U64(value)
    }
}

fn with_leading_zero(digits: &str) -> String {
    if digits.starts_with('.') {
        format!("0{digits}")
    } else {
        digits.to_string()
    }
}

fn strip_quotes(lexeme: &str) -> &str {
    let inner = lexeme.get(1..lexeme.len().saturating_sub(1));
    inner.unwrap_or_default()
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

pub(crate) fn describe_unknown(lexeme: &str) -> &'static str {
    if lexeme.starts_with("/*") {
        "unterminated block comment"
    } else if lexeme.starts_with('"') {
        "unterminated string literal"
    } else if lexeme.starts_with('\'') {
        "unterminated character literal"
    } else {
        "unrecognized token"
    }
}
