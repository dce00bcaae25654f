//! Source files and locations.
//!
//! Every token carries a [`SourceLocation`]. Locations are resolved back
//! to text through the [`SourceFile`] they were produced from, which is
//! how diagnostics get their highlighted context line.

use std::fmt;

/// Identifier of a source file within one compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileId(pub u32);

/// A 1-based line/column position inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub file: FileId,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: FileId, line: u32, column: u32) -> Self {
        SourceLocation { file, line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A named source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub id: FileId,
    pub name: String,
    pub text: String,
}

impl SourceFile {
    pub fn new(id: FileId, name: impl Into<String>, text: impl Into<String>) -> Self {
        SourceFile {
            id,
            name: name.into(),
            text: text.into(),
        }
    }

    /// Returns the text of the given 1-based line without its terminator.
    pub fn line(&self, line: u32) -> Option<&str> {
        if line == 0 {
            return None;
        }
        self.text
            .split('\n')
            .nth(line as usize - 1)
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }

    /// Renders the line of `location` with a caret run under `width` columns.
    ///
    /// ```text
    ///  3 | var x: i32 = $
    ///    |              ^
    /// ```
    pub fn highlight(&self, location: SourceLocation, width: usize) -> String {
        let Some(text) = self.line(location.line) else {
            return String::new();
        };
        let gutter = location.line.to_string();
        let pad = " ".repeat(gutter.len());
        let offset = " ".repeat(location.column.saturating_sub(1) as usize);
        let available = text
            .chars()
            .count()
            .saturating_sub(location.column.saturating_sub(1) as usize);
        let carets = "^".repeat(width.clamp(1, available.max(1)));
        format!("{gutter} | {text}\n{pad} | {offset}{carets}")
    }

    /// `name:line:column` form used at the head of error messages.
    pub fn describe(&self, location: SourceLocation) -> String {
        format!("{}:{}", self.name, location)
    }
}
