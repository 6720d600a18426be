//! Parse errors.

use tern_diagnostic::{Diagnostic, ErrorCode};
use tern_ir::{Span, TokenKind};

/// A recorded parse error: `(code, message, token span)`.
///
/// Errors accumulate on the parser and are truncated on speculative
/// rollback; whatever survives the parse is converted into diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub code: ErrorCode,
    pub message: String,
    pub span: Span,
}

impl ParseError {
    #[cold]
    pub fn new(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        ParseError {
            code,
            message: message.into(),
            span,
        }
    }

    /// The error for an `expect` failure.
    #[cold]
    pub fn expected(kind: &TokenKind, found: &TokenKind, span: Span) -> Self {
        ParseError::new(
            ErrorCode::E1001,
            format!("expected {}, found {}", kind.display_name(), found.display_name()),
            span,
        )
    }

    pub fn into_diagnostic(self) -> Diagnostic {
        Diagnostic::error(self.code, self.message, self.span)
    }
}
