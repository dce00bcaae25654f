//! Core pipeline of the Sprout-to-C++ transpiler.
//!
//! The pipeline is roughly:
//!
//!   source .spr
//!     -> lexer       (tokens)
//!     -> instruction (tokens grouped into statements and braces)
//!     -> parser      (expression trees, per statement)
//!     -> scope + expression typing
//!     -> transpiler  (C++ text)
//!
//! Higher-level tools (the CLI, tests) should depend on this crate rather
//! than reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Front-end: lexing, grouping and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod instruction;
pub mod parser;
pub mod ast;

// ---------------------------------------------------------------------
// Semantic layers: types, scopes, typed expressions
// ---------------------------------------------------------------------

pub mod types;
pub mod scope;
pub mod expression;

// ---------------------------------------------------------------------
// Builtins
// ---------------------------------------------------------------------

pub mod builtins;

// ---------------------------------------------------------------------
// Back-end: C++ generation and compiler orchestration
// ---------------------------------------------------------------------

pub mod transpiler;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{CompilationArtifact, Options, dump_ast, dump_tokens, transpile, transpile_file};
pub use diagnostic::{Diagnostic, Severity};
pub use error::CoreError;
