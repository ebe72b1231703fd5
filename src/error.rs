//! Error types and position tracking for the transformation engine
//!
//! A single [`EngineError`] sum type crosses every layer of the pipeline:
//! lexing, parsing, format adapters, evaluation and the standard library.
//! Errors are first-class values at the crate boundary; they are never
//! embedded inside a returned data-model value.

use std::fmt;
use thiserror::Error;

/// Represents a position in the script source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub column: usize,
    /// Byte offset from start of input (0-based)
    pub offset: usize,
}

impl Position {
    /// Creates a new position at the start of input
    pub fn new() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }

    /// Advances the position by one character
    pub fn advance(&mut self, c: char) {
        match c {
            '\n' => {
                self.line += 1;
                self.column = 1;
            }
            _ => {
                self.column += 1;
            }
        }
        self.offset += c.len_utf8();
    }

    /// Advances the position over a string slice
    pub fn advance_by(&mut self, text: &str) {
        for c in text.chars() {
            self.advance(c);
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Represents a span of text in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Start position of the span
    pub start: Position,
    /// End position of the span (exclusive)
    pub end: Position,
}

impl Span {
    /// Creates a new span from start and end positions
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Creates a span covering a single position
    pub fn single(position: Position) -> Self {
        Self {
            start: position,
            end: position,
        }
    }

    /// Returns the length of the span in bytes
    pub fn len(&self) -> usize {
        self.end.offset.saturating_sub(self.start.offset)
    }

    /// Returns true if the span is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            write!(
                f,
                "{}:{}-{}",
                self.start.line, self.start.column, self.end.column
            )
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// The engine-wide error taxonomy
///
/// Every fallible operation in the pipeline returns this type. The first
/// error aborts the transformation and propagates out of `execute`; nothing
/// is recovered locally inside the evaluator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// Malformed script source detected by the lexer or parser
    #[error("Syntax error at {position}: {message}")]
    Syntax { message: String, position: Position },

    /// Missing or invalid header directive, declaration or option
    #[error("Header error at {position}: {message}")]
    Header { message: String, position: Position },

    /// Input bytes are malformed for the declared format
    #[error("{format} parse error: {message}")]
    FormatParse {
        format: &'static str,
        message: String,
    },

    /// A value cannot be rendered in the target format
    #[error("{format} serialise error: {message}")]
    FormatSerialise {
        format: &'static str,
        message: String,
    },

    /// Unbound identifier during evaluation
    #[error("Undefined variable '{name}' at {position}")]
    UndefinedVariable { name: String, position: Position },

    /// Property access on a value missing the key
    #[error("Property '{key}' not found at {position}")]
    PropertyNotFound { key: String, position: Position },

    /// Attribute access on a value missing the attribute
    #[error("Attribute '@{name}' not found at {position}")]
    AttributeNotFound { name: String, position: Position },

    /// Array index outside the valid range
    #[error("Index {index} out of bounds (length {length}) at {position}")]
    IndexOutOfBounds {
        index: i64,
        length: usize,
        position: Position,
    },

    /// Operand or argument kind mismatch
    #[error("Type error at {position}: {message}")]
    Type { message: String, position: Position },

    /// Wrong argument count for a lambda or builtin
    #[error("Arity error: {callee} expects {expected}, got {got}")]
    Arity {
        callee: String,
        expected: String,
        got: usize,
    },

    /// Argument fails a function-specific precondition
    #[error("Invalid argument to {function}: expected {expected}, got {got}. {hint}")]
    FunctionArgument {
        function: &'static str,
        expected: String,
        got: String,
        hint: String,
    },

    /// No match arm fired for the subject value
    #[error("No match arm matched the subject at {position}")]
    MatchExhaustiveness { position: Position },

    /// Evaluator stack depth bound exceeded
    #[error("Recursion limit of {limit} exceeded")]
    RecursionLimit { limit: usize },

    /// A wrapped error enriched with a suggestion by the error enhancer
    #[error("[{code}] {message}")]
    Enhanced {
        /// Stable diagnostic code, e.g. `UTLX-002`
        code: &'static str,
        message: String,
        suggestion: String,
        correct_example: Option<String>,
        incorrect_example: Option<String>,
        source: Box<EngineError>,
    },
}

impl EngineError {
    /// Convenience constructor for syntax errors
    pub fn syntax(message: impl Into<String>, position: Position) -> Self {
        EngineError::Syntax {
            message: message.into(),
            position,
        }
    }

    /// Convenience constructor for header errors
    pub fn header(message: impl Into<String>, position: Position) -> Self {
        EngineError::Header {
            message: message.into(),
            position,
        }
    }

    /// Convenience constructor for type errors
    pub fn type_error(message: impl Into<String>, position: Position) -> Self {
        EngineError::Type {
            message: message.into(),
            position,
        }
    }

    /// Convenience constructor for format parse errors
    pub fn format_parse(format: &'static str, message: impl Into<String>) -> Self {
        EngineError::FormatParse {
            format,
            message: message.into(),
        }
    }

    /// Convenience constructor for format serialise errors
    pub fn format_serialise(format: &'static str, message: impl Into<String>) -> Self {
        EngineError::FormatSerialise {
            format,
            message: message.into(),
        }
    }

    /// Returns the source position attached to the error, if any
    pub fn position(&self) -> Option<Position> {
        match self {
            EngineError::Syntax { position, .. }
            | EngineError::Header { position, .. }
            | EngineError::UndefinedVariable { position, .. }
            | EngineError::PropertyNotFound { position, .. }
            | EngineError::AttributeNotFound { position, .. }
            | EngineError::IndexOutOfBounds { position, .. }
            | EngineError::Type { position, .. }
            | EngineError::MatchExhaustiveness { position } => Some(*position),
            EngineError::Enhanced { source, .. } => source.position(),
            _ => None,
        }
    }

    /// Returns true for the two conditions `??` and `?.` absorb:
    /// a missing key/attribute or an unbound name
    pub fn is_absent_condition(&self) -> bool {
        matches!(
            self,
            EngineError::PropertyNotFound { .. }
                | EngineError::AttributeNotFound { .. }
                | EngineError::UndefinedVariable { .. }
        )
    }
}

/// Result alias used throughout the crate
pub type EngineResult<T> = Result<T, EngineError>;
