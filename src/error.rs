//! Everything that can go wrong between template text and a compiled tree.
//!
//! Each stage has its own error type, and [`Error`] unifies them for the
//! public entry points. The first error of any stage aborts the whole call.
use core::fmt;

use crate::lexer::{LexErrorKind, Span};

/// Line and column (both starting at 1) of a byte offset in some source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn of(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = source.get(..offset).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |idx| idx + 1);
        let column = before[line_start..].chars().count() + 1;
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {} column {}", self.line, self.column)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Lex error on {location}: {kind} {text:?}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub text: Box<str>,
    pub span: Span,
    pub location: Location,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Parse error on {location}: {message}")]
pub struct ParseError {
    pub message: String,
    pub span: Span,
    pub location: Location,
}

impl ParseError {
    pub fn new(message: impl Into<String>, span: Span, source: &str) -> Self {
        Self {
            message: message.into(),
            location: Location::of(source, span.start),
            span,
        }
    }
}

/// Numeric codes of compile errors, stable across releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum CompileErrorCode {
    UnknownHelper = 1,
    DepthOverflow = 2,
    UnexpectedNode = 3,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct CompileError {
    pub code: CompileErrorCode,
    pub message: String,
    /// Where in the template the offending node was, when it came from one
    pub span: Option<Span>,
}

impl CompileError {
    pub fn unknown_helper(name: &str, span: Span) -> Self {
        Self {
            code: CompileErrorCode::UnknownHelper,
            message: format!("You specified knownHelpersOnly, but used the unknown helper {name}"),
            span: Some(span),
        }
    }

    pub fn depth_overflow(depth: usize, span: Span) -> Self {
        Self {
            code: CompileErrorCode::DepthOverflow,
            message: format!("Path depth {depth} exceeds the maximum of {}", u64::BITS - 1),
            span: Some(span),
        }
    }

    pub fn unexpected_node(expected: &str, found: &str, span: Span) -> Self {
        Self {
            code: CompileErrorCode::UnexpectedNode,
            message: format!("Expected {expected} node, found {found}"),
            span: Some(span),
        }
    }
}

/// The tag thrown errors carry, named after the failing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    LexError,
    ParseError,
    CompileError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LexError => "LexError",
            Self::ParseError => "ParseError",
            Self::CompileError => "CompileError",
        })
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Lex(_) => ErrorKind::LexError,
            Self::Parse(_) => ErrorKind::ParseError,
            Self::Compile(_) => ErrorKind::CompileError,
        }
    }

    /// Compile errors carry their [`CompileErrorCode`], everything else is 0
    pub fn code(&self) -> i64 {
        match self {
            Self::Compile(err) => err.code as i64,
            Self::Lex(_) | Self::Parse(_) => 0,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Lex(err) => Some(err.span.clone()),
            Self::Parse(err) => Some(err.span.clone()),
            Self::Compile(err) => err.span.clone(),
        }
    }

    /// The bare message, without location information
    pub fn message(&self) -> String {
        match self {
            Self::Lex(err) => format!("{} {:?}", err.kind, err.text),
            Self::Parse(err) => err.message.clone(),
            Self::Compile(err) => err.message.clone(),
        }
    }
}
