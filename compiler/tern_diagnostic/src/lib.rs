//! Diagnostic system for the tern compiler and VM.
//!
//! Every reportable problem is a [`Diagnostic`]: severity, stable
//! [`ErrorCode`], message, source span, and optionally the parse node it
//! was raised for. Errors never throw across component boundaries inside
//! the compiler: they are recorded in a [`Diagnostics`] sink and
//! compilation continues with poison values wherever one can be
//! substituted. `info` diagnostics exist only as "could be X" notes
//! attached to ambiguity errors; they never poison anything.

mod error_code;
mod sink;

pub use error_code::ErrorCode;
pub use sink::Diagnostics;

use tern_ir::{NodeId, Span};

/// Diagnostic severity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// Attached note ("could be ..."); never poisons.
    Info,
    /// Suspicious but compilable.
    Warn,
    /// Compilation (or execution) problem.
    Error,
}

/// A single diagnostic message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
    pub span: Span,
    /// Parse node the message was raised for, when one exists.
    pub node: Option<NodeId>,
}

impl Diagnostic {
    #[cold]
    pub fn error(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Error,
            code,
            message: message.into(),
            span,
            node: None,
        }
    }

    #[cold]
    pub fn warn(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Warn,
            code,
            message: message.into(),
            span,
            node: None,
        }
    }

    #[cold]
    pub fn info(code: ErrorCode, message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            severity: Severity::Info,
            code,
            message: message.into(),
            span,
            node: None,
        }
    }

    /// Attach the parse node this diagnostic was raised for.
    #[must_use]
    pub fn with_node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warn);
        assert!(Severity::Warn > Severity::Info);
    }

    #[test]
    fn test_with_node() {
        let d = Diagnostic::error(ErrorCode::E2001, "identifier not found", Span::new(1, 4))
            .with_node(NodeId(9));
        assert_eq!(d.node, Some(NodeId(9)));
        assert_eq!(d.severity, Severity::Error);
    }
}
