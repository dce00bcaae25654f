use thiserror::Error;

use crate::span::SourceLocation;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("lex error: {message}\n{context}")]
    LexError {
        location: SourceLocation,
        message: String,
        context: String,
    },
    #[error("syntax error: {message}\n{context}")]
    ParseError {
        location: SourceLocation,
        message: String,
        context: String,
    },
    #[error("semantic error: {message}\n  in `{instruction}`")]
    SemanticError {
        location: SourceLocation,
        message: String,
        instruction: String,
    },
}

impl CoreError {
    pub fn location(&self) -> Option<SourceLocation> {
        match self {
            CoreError::SourceIo(_) => None,
            CoreError::LexError { location, .. }
            | CoreError::ParseError { location, .. }
            | CoreError::SemanticError { location, .. } => Some(*location),
        }
    }

    pub fn message(&self) -> String {
        match self {
            CoreError::SourceIo(err) => err.to_string(),
            CoreError::LexError { message, .. }
            | CoreError::ParseError { message, .. }
            | CoreError::SemanticError { message, .. } => message.clone(),
        }
    }
}

/// A contract violation found while checking a single instruction.
///
/// Helpers below the transpiler only know *what* went wrong; the
/// transpiler turns a violation into a [`CoreError::SemanticError`] by
/// attaching the instruction being generated.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct Violation {
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl Violation {
    pub fn new(message: impl Into<String>) -> Self {
        Violation {
            message: message.into(),
            location: None,
        }
    }

    pub fn at(message: impl Into<String>, location: SourceLocation) -> Self {
        Violation {
            message: message.into(),
            location: Some(location),
        }
    }

    /// Attaches `location` unless a more precise one is already known.
    pub fn or_at(mut self, location: SourceLocation) -> Self {
        self.location.get_or_insert(location);
        self
    }
}
