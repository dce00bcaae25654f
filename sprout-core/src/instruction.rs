//! Statement grouping.
//!
//! The comment-free token stream is cut into [`Instruction`]s: one
//! statement, block header or brace each. Statements end at `;`, at a brace,
//! at the start of a statement keyword, or at a line break that does not
//! fall inside brackets and does not follow a token that needs a right-hand
//! side.

use std::fmt;

use crate::lexer::{Token, TokenKind};
use crate::parser::{SyntaxError, describe_unknown};
use crate::span::SourceLocation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionKind {
    /// `main`
    Main,
    /// `var a, b: T` / `const` without initializer
    Declaration,
    /// `var a: T = e` / `const N: T = e`
    Initialization,
    /// Expressions evaluated for their effect: calls, `i++`.
    Operation,
    /// `a = e`, `a += e`
    Assignation,
    /// `if c`, `while c`, or the `for` part of a for header.
    Structure,
    /// `else` / `else if c`
    Else,
    /// Bound of a for header.
    ForCondition,
    /// Step of a for header.
    ForStep,
    /// `break` / `continue`
    Break,
    /// `return [e]`
    Return,
    OpenScope,
    CloseScope,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub tokens: Vec<Token>,
    pub kind: InstructionKind,
}

impl Instruction {
    pub fn new(kind: InstructionKind, tokens: Vec<Token>) -> Self {
        Instruction { tokens, kind }
    }

    /// Location of the first token.
    pub fn location(&self) -> SourceLocation {
        self.tokens[0].location
    }

    /// Lexemes joined by single spaces.
    pub fn text(&self) -> String {
        let lexemes: Vec<&str> = self.tokens.iter().map(|t| t.lexeme.as_str()).collect();
        lexemes.join(" ")
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} `{}`", self.kind, self.text())
    }
}

/// Group a comment-free token stream into instructions.
pub fn group(tokens: &[Token]) -> Result<Vec<Instruction>, SyntaxError> {
    let mut grouper = Grouper::default();
    for token in tokens {
        grouper.push(token)?;
    }
    grouper.flush()?;
    Ok(grouper.instructions)
}

#[derive(Default)]
struct Grouper {
    instructions: Vec<Instruction>,
    current: Vec<Token>,
    /// `(`/`[` nesting of the current run.
    depth: usize,
    /// Positions in `current` where a for header was split by `;`.
    for_splits: Vec<usize>,
}

impl Grouper {
    fn push(&mut self, token: &Token) -> Result<(), SyntaxError> {
        match token.kind {
            TokenKind::Eof => return Ok(()),
            TokenKind::Comment => return Ok(()),
            TokenKind::Unknown => return Err(SyntaxError::new(describe_unknown(&token.lexeme), token)),
            TokenKind::LBrace | TokenKind::RBrace => {
                self.flush()?;
                let kind = if token.kind == TokenKind::LBrace {
                    InstructionKind::OpenScope
                } else {
                    InstructionKind::CloseScope
                };
                self.instructions.push(Instruction::new(kind, vec![token.clone()]));
                return Ok(());
            }
            TokenKind::Semi if self.depth == 0 => {
                if self.is_for_header() {
                    self.for_splits.push(self.current.len());
                } else {
                    self.flush()?;
                }
                return Ok(());
            }
            _ => {}
        }

        if self.depth == 0 && self.ends_before(token) {
            self.flush()?;
        }

        match token.kind {
            TokenKind::LParen | TokenKind::LBracket => self.depth += 1,
            TokenKind::RParen | TokenKind::RBracket => self.depth = self.depth.saturating_sub(1),
            _ => {}
        }
        self.current.push(token.clone());
        Ok(())
    }

    /// Whether `next` starts a new statement.
    fn ends_before(&self, next: &Token) -> bool {
        let Some(last) = self.current.last() else {
            return false;
        };
        if next.kind.starts_statement() {
            // `else if` and `for var` stay one header.
            let joined = self.current.len() == 1
                && matches!(
                    (last.kind, next.kind),
                    (TokenKind::Else, TokenKind::If) | (TokenKind::For, TokenKind::Var)
                );
            return !joined;
        }
        next.location.line != last.location.line && !continues(last.kind)
    }

    fn is_for_header(&self) -> bool {
        self.current.first().is_some_and(|t| t.kind == TokenKind::For)
    }

    fn flush(&mut self) -> Result<(), SyntaxError> {
        self.depth = 0;
        if self.current.is_empty() {
            self.for_splits.clear();
            return Ok(());
        }
        let tokens = std::mem::take(&mut self.current);
        let splits = std::mem::take(&mut self.for_splits);

        if tokens[0].kind == TokenKind::For {
            return self.push_for_header(tokens, &splits);
        }

        let kind = classify(&tokens);
        self.instructions.push(Instruction::new(kind, tokens));
        Ok(())
    }

    /// `for init ; bound [; step]` becomes up to three instructions.
    fn push_for_header(&mut self, mut tokens: Vec<Token>, splits: &[usize]) -> Result<(), SyntaxError> {
        let header = tokens[0].clone();
        if splits.is_empty() {
            return Err(SyntaxError::new("expected ';' after the for initializer", &header));
        }
        if splits.len() > 2 {
            return Err(SyntaxError::new("too many clauses in for header", &header));
        }

        let mut parts = Vec::new();
        for &split in splits.iter().rev() {
            parts.push(tokens.split_off(split));
        }
        parts.push(tokens);
        parts.reverse();

        let kinds = [
            InstructionKind::Structure,
            InstructionKind::ForCondition,
            InstructionKind::ForStep,
        ];
        for (kind, part) in kinds.into_iter().zip(parts) {
            let minimum = if kind == InstructionKind::Structure { 2 } else { 1 };
            if part.len() < minimum {
                return Err(SyntaxError::new("empty clause in for header", &header));
            }
            self.instructions.push(Instruction::new(kind, part));
        }
        Ok(())
    }
}

fn classify(tokens: &[Token]) -> InstructionKind {
    match tokens[0].kind {
        TokenKind::Main => InstructionKind::Main,
        TokenKind::If | TokenKind::While => InstructionKind::Structure,
        TokenKind::Else => InstructionKind::Else,
        TokenKind::Break | TokenKind::Continue => InstructionKind::Break,
        TokenKind::Return => InstructionKind::Return,
        TokenKind::Var | TokenKind::Const => {
            if find_top_level(tokens, |k| k == TokenKind::Equal).is_some() {
                InstructionKind::Initialization
            } else {
                InstructionKind::Declaration
            }
        }
        _ => {
            if find_top_level(tokens, |k| k == TokenKind::Equal || k.is_compound_assign()).is_some() {
                InstructionKind::Assignation
            } else {
                InstructionKind::Operation
            }
        }
    }
}

/// Tokens after which a statement always continues on the next line.
fn continues(kind: TokenKind) -> bool {
    kind.is_binary_operator()
        || kind.is_compound_assign()
        || matches!(
            kind,
            TokenKind::Comma
                | TokenKind::Equal
                | TokenKind::Colon
                | TokenKind::Bang
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::Dot
        )
}

/// Position of the first token outside any brackets that satisfies `pred`.
pub fn find_top_level(tokens: &[Token], pred: impl Fn(TokenKind) -> bool) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket => depth += 1,
            TokenKind::RParen | TokenKind::RBracket => depth = depth.saturating_sub(1),
            kind if depth == 0 && pred(kind) => return Some(i),
            _ => {}
        }
    }
    None
}

/// Splits a run on top-level commas. An empty run gives no parts.
pub fn split_top_level_commas(tokens: &[Token]) -> Vec<&[Token]> {
    let mut parts = Vec::new();
    let mut rest = tokens;
    while !rest.is_empty() {
        match find_top_level(rest, |k| k == TokenKind::Comma) {
            Some(i) => {
                parts.push(&rest[..i]);
                rest = &rest[i + 1..];
            }
            None => {
                parts.push(rest);
                break;
            }
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::span::{FileId, SourceFile};

    fn group_text(text: &str) -> Vec<Instruction> {
        let file = SourceFile::new(FileId(0), "test.spr", text);
        let tokens = tokenize(&file).expect("lex");
        group(&tokens).expect("group")
    }

    fn kinds(text: &str) -> Vec<InstructionKind> {
        group_text(text).into_iter().map(|i| i.kind).collect()
    }

    #[test]
    fn groups_main_block() {
        use InstructionKind::*;
        let source = "main {\n    var x: i32 = 1\n    var y: f64\n    x += 2; println(x)\n}";
        assert_eq!(
            kinds(source),
            vec![Main, OpenScope, Initialization, Declaration, Assignation, Operation, CloseScope]
        );
    }

    #[test]
    fn groups_if_else_chain() {
        use InstructionKind::*;
        let source = "if a {\n} else if b {\n} else {\n}";
        assert_eq!(
            kinds(source),
            vec![Structure, OpenScope, CloseScope, Else, OpenScope, CloseScope, Else, OpenScope, CloseScope]
        );
        let instructions = group_text(source);
        assert_eq!(instructions[3].text(), "else if b");
    }

    #[test]
    fn splits_for_header() {
        use InstructionKind::*;
        let instructions = group_text("for var i: i32 = 0; 10; 2 {\n}");
        let kinds: Vec<_> = instructions.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![Structure, ForCondition, ForStep, OpenScope, CloseScope]);
        assert_eq!(instructions[0].text(), "for var i : i32 = 0");
        assert_eq!(instructions[1].text(), "10");
        assert_eq!(instructions[2].text(), "2");
    }

    #[test]
    fn for_header_without_step() {
        use InstructionKind::*;
        assert_eq!(kinds("for i = 0; n {}"), vec![Structure, ForCondition, OpenScope, CloseScope]);
    }

    #[test]
    fn for_header_needs_a_bound() {
        let file = SourceFile::new(FileId(0), "test.spr", "for var i: i32 = 0 {}");
        let tokens = tokenize(&file).expect("lex");
        let err = group(&tokens).unwrap_err();
        assert!(err.message.contains("expected ';'"));
    }

    #[test]
    fn continues_after_operator_and_inside_brackets() {
        let instructions = group_text("var x = 1 +\n    2\nprint(\"{}\",\n    x)");
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].kind, InstructionKind::Initialization);
        assert_eq!(instructions[1].kind, InstructionKind::Operation);
    }

    #[test]
    fn keywords_split_statements_on_one_line() {
        use InstructionKind::*;
        assert_eq!(kinds("x++ break"), vec![Operation, Break]);
        assert_eq!(kinds("return 1"), vec![Return]);
    }

    #[test]
    fn equality_is_not_assignment() {
        assert_eq!(kinds("a == b"), vec![InstructionKind::Operation]);
        assert_eq!(kinds("v[i] = a == b"), vec![InstructionKind::Assignation]);
    }

    #[test]
    fn reports_unterminated_string() {
        let file = SourceFile::new(FileId(0), "test.spr", "main {\n print(\"oops)\n}");
        let tokens = tokenize(&file).expect("lex");
        let err = group(&tokens).unwrap_err();
        assert_eq!(err.message, "unterminated string literal");
        assert_eq!(err.location.line, 2);
    }

    #[test]
    fn splits_top_level_commas_only() {
        let file = SourceFile::new(FileId(0), "test.spr", "max(a, b), v[1], c");
        let tokens = tokenize(&file).expect("lex");
        let parts = split_top_level_commas(&tokens[..tokens.len() - 1]);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 6);
    }
}
