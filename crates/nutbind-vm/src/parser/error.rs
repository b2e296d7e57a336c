//! Parse error types

use crate::lexer::{LexError, Span, Token};
use std::fmt;

/// A parse error with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
    /// Human-readable error message
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    UnexpectedToken { expected: String, found: Token },
    InvalidAssignmentTarget,
    NestingTooDeep,
    Lex(LexError),
}

impl ParseError {
    pub fn unexpected(expected: impl Into<String>, found: Token, span: Span) -> Self {
        let expected = expected.into();
        let message = format!("expected {} but found {}", expected, found);
        Self {
            kind: ParseErrorKind::UnexpectedToken { expected, found },
            span,
            message,
        }
    }

    pub fn invalid_target(span: Span) -> Self {
        Self {
            kind: ParseErrorKind::InvalidAssignmentTarget,
            span,
            message: "can't assign expression".to_string(),
        }
    }

    pub fn too_deep(span: Span) -> Self {
        Self {
            kind: ParseErrorKind::NestingTooDeep,
            span,
            message: "nesting too deep".to_string(),
        }
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        Self {
            span: err.span(),
            message: err.to_string(),
            kind: ParseErrorKind::Lex(err),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}:{}", self.message, self.span.line, self.span.column)
    }
}

impl std::error::Error for ParseError {}
