// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for kiln.
//!
//! This module defines [`KilnError`], the main error enum, and helper types
//! for rich error reporting with source context.
//!
//! # Error Categories
//!
//! - **Configuration errors**: schema validation failures, reported per field
//! - **Resolution errors**: no server entry, directory scans that failed
//! - **Compile errors**: template or markup failures reported by the compiler
//! - **Request errors**: oversized bodies, failed response streaming
//! - **Build errors**: illegal imports, adapter failures, phase ordering

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed error used at trait seams where the failure comes from user code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Source context for enhanced error messages.
///
/// Captures a snippet of source code around an error location,
/// enabling rich error messages with line numbers and visual indicators.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFrame {
    /// All lines from the source file.
    pub lines: Vec<String>,
    /// The line number where the error occurred (1-indexed).
    pub error_line: usize,
    /// The column number where the error occurred (1-indexed).
    pub error_column: usize,
    /// First line number of the snippet (1-indexed).
    pub snippet_start: usize,
    /// Last line number of the snippet (1-indexed).
    pub snippet_end: usize,
}

impl SourceFrame {
    /// Creates a source frame from source code and error location.
    ///
    /// Captures 2 lines before and after the error line.
    pub fn from_source(source: &str, line: usize, column: usize) -> Self {
        let lines: Vec<String> = source.lines().map(|l| l.to_string()).collect();
        let snippet_start = line.saturating_sub(2).max(1);
        let snippet_end = (line + 2).min(lines.len());

        Self {
            lines,
            error_line: line,
            error_column: column,
            snippet_start,
            snippet_end,
        }
    }

    /// Formats the snippet with line numbers and a caret under the error column.
    ///
    /// ```text
    ///    4 | <div class="container">
    ///    5 |   {invalid.syntax}
    ///      |   ^
    ///    6 | </div>
    /// ```
    pub fn format_snippet(&self) -> String {
        let mut result = String::new();

        for line_num in self.snippet_start..=self.snippet_end {
            if line_num == 0 || line_num > self.lines.len() {
                break;
            }

            let line = &self.lines[line_num - 1];
            result.push_str(&format!("{:4} | {}\n", line_num, line));

            if line_num == self.error_line {
                result.push_str(&format!(
                    "     | {}^\n",
                    " ".repeat(self.error_column.saturating_sub(1))
                ));
            }
        }

        result
    }
}

impl fmt::Display for SourceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_snippet())
    }
}

/// A compile failure reported by the component compiler or the bundler.
#[derive(Debug, Clone, Default)]
pub struct CompileError {
    /// Human readable message.
    pub message: String,
    /// File the error was raised for, if known.
    pub file: Option<PathBuf>,
    /// Line number (1-indexed), if known.
    pub line: Option<usize>,
    /// Column number (1-indexed), if known.
    pub column: Option<usize>,
    /// Source frame around the failing location.
    pub frame: Option<SourceFrame>,
    /// Stack or tool output captured with the error.
    pub stack: Option<String>,
}

impl CompileError {
    /// Creates a compile error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Attaches the file and location, building a frame from `source`.
    pub fn at(mut self, file: impl Into<PathBuf>, source: &str, line: usize, column: usize) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self.column = Some(column);
        self.frame = Some(SourceFrame::from_source(source, line, column));
        self
    }

    /// Attaches a captured stack.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Returns `file:line:column` when a location is known.
    pub fn location(&self) -> Option<String> {
        let file = self.file.as_ref()?;
        Some(match (self.line, self.column) {
            (Some(line), Some(column)) => format!("{}:{}:{}", file.display(), line, column),
            (Some(line), None) => format!("{}:{}", file.display(), line),
            _ => file.display().to_string(),
        })
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location() {
            Some(location) => write!(f, "{} ({})", self.message, location)?,
            None => write!(f, "{}", self.message)?,
        }
        if let Some(frame) = &self.frame {
            write!(f, "\n{}", frame)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileError {}

/// A single configuration field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path of the field, e.g. `paths.base`.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl FieldError {
    /// Creates a field error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The main error type for kiln operations.
#[derive(Error, Debug)]
pub enum KilnError {
    /// Configuration failed schema validation.
    #[error("Invalid configuration:\n{}", format_field_errors(.0))]
    ConfigParse(Vec<FieldError>),

    /// No server entry could be resolved.
    #[error("No server entry found at {} (tried .js, .ts and index files)", .0.display())]
    NoEntryFile(PathBuf),

    /// Scanning the views or assets directory failed.
    #[error("Failed to scan {}: {message}", path.display())]
    Glob {
        /// Directory being scanned.
        path: PathBuf,
        /// Underlying failure.
        message: String,
    },

    /// Template or markup compilation failed.
    #[error("Compile error: {0}")]
    Compile(CompileError),

    /// Malformed markup while rewriting asset references.
    #[error("Markup error: {0}")]
    HtmlTransform(CompileError),

    /// The request body exceeded the configured limit.
    #[error("Request body too large: {0}")]
    RequestBodyTooLarge(String),

    /// Writing a streamed response body failed.
    #[error("Failed to stream response body: {0}")]
    StreamingWrite(String),

    /// A private environment module is reachable from client code.
    #[error(
        "Cannot import {module} into client-side code. Import chain:\n{}",
        chain.join("\n  imports ")
    )]
    IllegalImport {
        /// The private module id.
        module: String,
        /// Chain of module ids from the view to the private module.
        chain: Vec<String>,
    },

    /// The deployment adapter failed.
    #[error("Adapter {name} failed: {message}")]
    Adapter {
        /// Adapter name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// A build phase was entered out of order.
    #[error("Invalid build state: {0}")]
    BuildState(String),

    /// The user's entry handler failed.
    #[error("Entry handler error: {0}")]
    Handler(BoxError),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results with [`KilnError`].
pub type Result<T> = std::result::Result<T, KilnError>;
