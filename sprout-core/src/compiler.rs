use std::path::Path;

use crate::diagnostic::{Diagnostic, STAGE_SUMMARY};
use crate::error::CoreError;
use crate::instruction::{Instruction, InstructionKind, find_top_level, group, split_top_level_commas};
use crate::lexer::{Token, TokenKind, tokenize};
use crate::parser::parse_expression;
use crate::span::{FileId, SourceFile};
use crate::transpiler::Transpiler;

/// Knobs shared by every stage of a compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// File named by the `#include` at the top of the output.
    pub runtime_header: String,
    /// Spaces per open scope.
    pub indent: usize,
    /// Fail on the first warning instead of collecting it.
    pub deny_warnings: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            runtime_header: "sprout_runtime.hpp".to_string(),
            indent: 4,
            deny_warnings: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompilationArtifact {
    pub code: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// Transpile Sprout source to C++.
///
/// `file_name` only appears in diagnostics. Nothing is produced when any
/// stage fails.
pub fn transpile(source: &str, file_name: &str, options: &Options) -> Result<CompilationArtifact, CoreError> {
    let file = SourceFile::new(FileId(0), file_name, source);
    let tokens = significant_tokens(&file)?;
    let instructions = group(&tokens).map_err(|err| err.into_error(&file))?;

    let output = Transpiler::new(&file, options).generate(&instructions)?;

    let mut diagnostics = vec![
        Diagnostic::info(format!("{file_name}: {} tokens", tokens.len())).with_code(STAGE_SUMMARY),
        Diagnostic::info(format!("{file_name}: {} instructions", instructions.len())).with_code(STAGE_SUMMARY),
    ];
    diagnostics.extend(output.diagnostics);
    Ok(CompilationArtifact {
        code: output.code,
        diagnostics,
    })
}

pub fn transpile_file(path: impl AsRef<Path>, options: &Options) -> Result<CompilationArtifact, CoreError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)?;
    transpile(&source, &path.display().to_string(), options)
}

/// One line per token: position, kind and lexeme.
pub fn dump_tokens(source: &str, file_name: &str) -> Result<String, CoreError> {
    let file = SourceFile::new(FileId(0), file_name, source);
    let tokens = tokenize(&file)?;
    let mut out = String::new();
    for token in &tokens {
        out.push_str(&format!("{}\t{:?}\t{}\n", token.location, token.kind, token.lexeme));
    }
    Ok(out)
}

/// One line per instruction, each followed by the prefix form of the
/// expressions it contains.
pub fn dump_ast(source: &str, file_name: &str) -> Result<String, CoreError> {
    let file = SourceFile::new(FileId(0), file_name, source);
    let tokens = significant_tokens(&file)?;
    let instructions = group(&tokens).map_err(|err| err.into_error(&file))?;

    let mut out = String::new();
    for instruction in &instructions {
        out.push_str(&format!("{instruction}\n"));
        for run in expression_runs(instruction) {
            let node = parse_expression(run).map_err(|err| err.into_error(&file))?;
            out.push_str(&format!("    {node}\n"));
        }
    }
    Ok(out)
}

fn significant_tokens(file: &SourceFile) -> Result<Vec<Token>, CoreError> {
    let mut tokens = tokenize(file)?;
    tokens.retain(|t| !matches!(t.kind, TokenKind::Comment | TokenKind::Eof));
    Ok(tokens)
}

/// Token runs of `instruction` that hold expressions.
fn expression_runs(instruction: &Instruction) -> Vec<&[Token]> {
    let tokens = instruction.tokens.as_slice();
    match instruction.kind {
        InstructionKind::Operation | InstructionKind::ForCondition | InstructionKind::ForStep => {
            split_top_level_commas(tokens)
        }
        InstructionKind::Return => split_top_level_commas(&tokens[1..]),
        InstructionKind::Structure if tokens[0].kind != TokenKind::For => split_top_level_commas(&tokens[1..]),
        InstructionKind::Else if tokens.len() > 2 => split_top_level_commas(&tokens[2..]),
        InstructionKind::Structure | InstructionKind::Initialization => {
            match find_top_level(tokens, |k| k == TokenKind::Equal) {
                Some(equal) => split_top_level_commas(&tokens[equal + 1..]),
                None => Vec::new(),
            }
        }
        InstructionKind::Assignation => {
            match find_top_level(tokens, |k| k == TokenKind::Equal || k.is_compound_assign()) {
                Some(split) => {
                    let mut runs = split_top_level_commas(&tokens[..split]);
                    runs.extend(split_top_level_commas(&tokens[split + 1..]));
                    runs
                }
                None => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}
