//! Terminal diagnostic rendering.

use tern_diagnostic::{Diagnostic, Severity};
use tern_ir::SourceMap;

/// Render one diagnostic as `severity[code]: message --> path:line:col`.
pub fn render(diagnostic: &Diagnostic, path: &str, map: &SourceMap) -> String {
    let severity = match diagnostic.severity {
        Severity::Error => "error",
        Severity::Warn => "warning",
        Severity::Info => "info",
    };
    let loc = map.resolve(diagnostic.span);
    format!(
        "{severity}[{}]: {}\n  --> {path}:{}:{}",
        diagnostic.code, diagnostic.message, loc.line, loc.col
    )
}

/// Print a batch of diagnostics to stderr; returns the error count.
pub fn emit_all(diagnostics: &[Diagnostic], path: &str, map: &SourceMap) -> usize {
    let mut errors = 0;
    for diagnostic in diagnostics {
        if diagnostic.severity == Severity::Error {
            errors += 1;
        }
        eprintln!("{}", render(diagnostic, path, map));
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_diagnostic::ErrorCode;
    use tern_ir::Span;

    #[test]
    fn test_render_format() {
        let map = SourceMap::new("let x = ;\n");
        let diagnostic = Diagnostic::error(ErrorCode::E1002, "expected an expression", Span::new(8, 9));
        let rendered = render(&diagnostic, "demo.tn", &map);
        assert_eq!(
            rendered,
            "error[E1002]: expected an expression\n  --> demo.tn:1:9"
        );
    }
}
